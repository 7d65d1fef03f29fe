use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::error::{MorphError, MorphResult};
use crate::foundation::fsio::replace_atomically;
use crate::render::raster::FrameRGBA;

/// Options for [`GifSink`].
#[derive(Clone, Debug)]
pub struct GifSinkOpts {
    /// Output GIF file path.
    pub out_path: PathBuf,
    /// Palette quantization speed, 1 (best) to 30 (fastest).
    pub speed: i32,
}

impl GifSinkOpts {
    /// Create options for outputting a GIF to `out_path`.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            speed: 10,
        }
    }
}

/// In-memory byte stream behind the GIF encoder.
///
/// The encoder only writes the GIF trailer when dropped, so the bytes are reclaimed through a
/// second handle afterwards and written to disk with checked IO.
#[derive(Clone, Default)]
struct Spool(Arc<Mutex<Vec<u8>>>);

impl Spool {
    fn take(&self) -> MorphResult<Vec<u8>> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| MorphError::encode("gif buffer poisoned"))?;
        Ok(std::mem::take(&mut *buf))
    }
}

impl std::io::Write for Spool {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("gif buffer poisoned"))?
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sink writing an endlessly looping animated GIF.
///
/// The animation is encoded in memory and written to `out_path` in one atomic replace when the
/// sink ends, so a failed run never leaves a truncated GIF behind. GIF delays have centisecond
/// resolution, so the playback rate is rounded by the encoder.
pub struct GifSink {
    opts: GifSinkOpts,
    spool: Spool,
    encoder: Option<GifEncoder<Spool>>,
    cfg: Option<SinkConfig>,
    last_idx: Option<u64>,
    frames: u64,
}

impl GifSink {
    /// Create a new GIF sink.
    pub fn new(opts: GifSinkOpts) -> Self {
        Self {
            opts,
            spool: Spool::default(),
            encoder: None,
            cfg: None,
            last_idx: None,
            frames: 0,
        }
    }
}

impl FrameSink for GifSink {
    fn begin(&mut self, cfg: SinkConfig) -> MorphResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(MorphError::validation("gif sink width/height must be non-zero"));
        }
        if cfg.width > u32::from(u16::MAX) || cfg.height > u32::from(u16::MAX) {
            return Err(MorphError::validation(format!(
                "gif frames are limited to {0}x{0}, got {1}x{2}",
                u16::MAX,
                cfg.width,
                cfg.height
            )));
        }
        if !(1..=30).contains(&self.opts.speed) {
            return Err(MorphError::validation(format!(
                "gif speed must lie in 1..=30, got {}",
                self.opts.speed
            )));
        }

        self.spool = Spool::default();
        let mut encoder = GifEncoder::new_with_speed(self.spool.clone(), self.opts.speed);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| MorphError::encode(format!("gif repeat: {e}")))?;

        self.encoder = Some(encoder);
        self.cfg = Some(cfg);
        self.last_idx = None;
        self.frames = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: u64, frame: &FrameRGBA) -> MorphResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| MorphError::encode("gif sink not started"))?;
        if let Some(last) = self.last_idx
            && idx <= last
        {
            return Err(MorphError::encode("gif sink received out-of-order frame index"));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(MorphError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| MorphError::encode("gif sink is already finalized"))?;

        let img = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| MorphError::validation("frame.data size mismatch with width*height*4"))?;
        let (numer, denom) = cfg.fps.frame_delay_ms();
        let delay = Delay::from_numer_denom_ms(numer, denom);
        encoder
            .encode_frame(Frame::from_parts(img, 0, 0, delay))
            .map_err(|e| MorphError::encode(format!("gif frame {idx}: {e}")))?;
        self.frames += 1;
        Ok(())
    }

    fn end(&mut self) -> MorphResult<()> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| MorphError::encode("gif sink not started"))?;
        // dropping the encoder writes the trailer
        drop(encoder);
        let bytes = self.spool.take()?;
        replace_atomically(&self.opts.out_path, |w| {
            w.write_all(&bytes)?;
            Ok(())
        })?;
        tracing::debug!(
            out = %self.opts.out_path.display(),
            frames = self.frames,
            bytes = bytes.len(),
            "gif written"
        );
        self.cfg = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/gif.rs"]
mod tests;
