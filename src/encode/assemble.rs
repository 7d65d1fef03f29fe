use std::path::Path;

use crate::encode::gif::{GifSink, GifSinkOpts};
use crate::encode::mp4::{Mp4Sink, Mp4SinkOpts};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{Fps, FrameLayout};
use crate::foundation::error::{MorphError, MorphResult};
use crate::render::frames::FrameDirectory;

/// Joins rendered frames into one looping animation.
///
/// Frames are read in increasing global order. The first frame of every transition is emitted
/// `1 + pause_frames` times, so the output holds
/// `transitions * (frames_per_transition + pause_frames)` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopAssembler {
    layout: FrameLayout,
    pause_frames: u32,
    workers: Option<u32>,
}

impl LoopAssembler {
    /// Assembler for `layout` holding each picture for `pause_frames` extra frames.
    pub fn new(layout: FrameLayout, pause_frames: u32) -> Self {
        Self {
            layout,
            pause_frames,
            workers: None,
        }
    }

    /// Also require a completion marker from each of `workers` render workers.
    pub fn expect_workers(mut self, workers: u32) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Number of frames in the assembled animation.
    pub fn output_len(&self) -> u64 {
        self.layout.total_frames()
            + u64::from(self.pause_frames) * u64::from(self.layout.transitions)
    }

    /// Check that `dir` holds exactly the expected frame set.
    pub fn verify(&self, dir: &FrameDirectory) -> MorphResult<()> {
        let expected = self.layout.total_frames();
        let present = dir.list_frames()?;
        let found = present.len();

        let missing: Vec<u64> = (0..expected).filter(|g| !present.contains(g)).collect();
        if found as u64 != expected || !missing.is_empty() {
            return Err(MorphError::IncompleteFrameSet {
                found,
                expected: expected as usize,
                detail: (!missing.is_empty()).then(|| summarize("missing frames", &missing)),
            });
        }

        if let Some(workers) = self.workers {
            let done = dir.completed_workers()?;
            let absent: Vec<u64> = (0..workers)
                .filter(|r| !done.contains_key(r))
                .map(u64::from)
                .collect();
            if !absent.is_empty() {
                return Err(MorphError::IncompleteFrameSet {
                    found,
                    expected: expected as usize,
                    detail: Some(summarize("no completion marker from workers", &absent)),
                });
            }
            let reported: u64 = done
                .iter()
                .filter(|(r, _)| **r < workers)
                .map(|(_, n)| *n)
                .sum();
            if reported != expected {
                return Err(MorphError::IncompleteFrameSet {
                    found,
                    expected: expected as usize,
                    detail: Some(format!("workers report {reported} frames")),
                });
            }
        }
        Ok(())
    }

    /// Verify `dir`, then stream the looping sequence into `sink`. Returns the frames emitted.
    #[tracing::instrument(skip_all, fields(dir = %dir.root().display()))]
    pub fn assemble(
        &self,
        dir: &FrameDirectory,
        fps: Fps,
        sink: &mut dyn FrameSink,
    ) -> MorphResult<u64> {
        self.verify(dir)?;

        let mut out = 0u64;
        let total = self.layout.total_frames();
        for global in 0..total {
            let frame = dir.read_frame(global)?;
            if global == 0 {
                sink.begin(SinkConfig {
                    width: frame.width,
                    height: frame.height,
                    fps,
                })?;
            }
            let copies = if self.layout.is_transition_start(global) {
                1 + u64::from(self.pause_frames)
            } else {
                1
            };
            for _ in 0..copies {
                sink.push_frame(out, &frame)?;
                out += 1;
            }
        }
        sink.end()?;

        debug_assert_eq!(out, self.output_len());
        tracing::info!(frames = out, source_frames = total, "animation assembled");
        Ok(out)
    }
}

fn summarize(what: &str, items: &[u64]) -> String {
    const SHOWN: usize = 8;
    let head: Vec<String> = items.iter().take(SHOWN).map(u64::to_string).collect();
    if items.len() > SHOWN {
        format!("{what} {}, ... ({} total)", head.join(", "), items.len())
    } else {
        format!("{what} {}", head.join(", "))
    }
}

/// Output encoding, chosen from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Animated GIF, looping forever.
    Gif,
    /// H.264 MP4 through the system `ffmpeg`.
    Mp4,
}

impl OutputFormat {
    /// Format matching the extension of `path`.
    pub fn from_path(path: &Path) -> MorphResult<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "gif" => Ok(Self::Gif),
            "mp4" => Ok(Self::Mp4),
            _ => Err(MorphError::validation(format!(
                "unsupported output '{}': expected a .gif or .mp4 file",
                path.display()
            ))),
        }
    }
}

/// Sink writing `path` in the format given by its extension.
pub fn sink_for_path(path: &Path, paper_rgba: [u8; 4]) -> MorphResult<Box<dyn FrameSink>> {
    Ok(match OutputFormat::from_path(path)? {
        OutputFormat::Gif => Box::new(GifSink::new(GifSinkOpts::new(path))),
        OutputFormat::Mp4 => {
            let mut opts = Mp4SinkOpts::new(path);
            opts.paper_rgba = paper_rgba;
            Box::new(Mp4Sink::new(opts))
        }
    })
}

#[cfg(test)]
#[path = "../../tests/unit/encode/assemble.rs"]
mod tests;
