//! Animation output.
//!
//! Sinks consume assembled frames in playback order; the assembler feeds them from the frame
//! directory.

/// Frame-set verification and loop assembly.
pub mod assemble;
/// Looping GIF sink.
pub mod gif;
/// MP4 sink piping frames into the system `ffmpeg`.
pub mod mp4;
/// Generic frame sink trait and built-in sinks.
pub mod sink;
