use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::error::{MorphError, MorphResult};
use crate::foundation::fsio::{ensure_parent_dir, temp_sibling};
use crate::render::raster::FrameRGBA;

/// Options for [`Mp4Sink`].
#[derive(Clone, Debug)]
pub struct Mp4SinkOpts {
    /// Output MP4 file path.
    pub out_path: PathBuf,
    /// Paper color; fills the padding row or column added to odd canvases.
    pub paper_rgba: [u8; 4],
    /// x264 constant rate factor, 0 (lossless) to 51.
    pub crf: u8,
}

impl Mp4SinkOpts {
    /// Create options for outputting an MP4 to `out_path`.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            paper_rgba: [255, 255, 255, 255],
            crf: 18,
        }
    }
}

/// Sink piping opaque RGB frames into the system `ffmpeg`.
///
/// `ffmpeg` encodes into a hidden sibling of `out_path` that is renamed into place only after a
/// clean exit; its diagnostics go to a log file next to it and are reported on failure. yuv420p
/// needs even dimensions, so odd canvases get one extra row or column of paper. The loop point
/// is not encoded in MP4; players have to repeat the file themselves.
pub struct Mp4Sink {
    opts: Mp4SinkOpts,
    run: Option<Encoding>,
    rgb: Vec<u8>,
    cfg: Option<SinkConfig>,
    last_idx: Option<u64>,
}

struct Encoding {
    child: Child,
    stdin: Option<ChildStdin>,
    tmp_path: PathBuf,
    log_path: PathBuf,
}

impl Encoding {
    fn discard(mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_file(&self.tmp_path);
        let _ = std::fs::remove_file(&self.log_path);
    }
}

impl Mp4Sink {
    /// Create a new sink writing `opts.out_path`.
    pub fn new(opts: Mp4SinkOpts) -> Self {
        Self {
            opts,
            run: None,
            rgb: Vec::new(),
            cfg: None,
            last_idx: None,
        }
    }

    fn command(&self, cfg: SinkConfig, tmp_path: &std::path::Path) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", cfg.width, cfg.height)])
            .args(["-r", &format!("{}/{}", cfg.fps.num, cfg.fps.den)])
            .args(["-i", "pipe:0", "-an"])
            .args(["-vf", &pad_filter(self.opts.paper_rgba)])
            .args(["-c:v", "libx264", "-crf", &self.opts.crf.to_string()])
            .args(["-pix_fmt", "yuv420p", "-movflags", "+faststart", "-f", "mp4"])
            .arg(tmp_path);
        cmd
    }
}

impl FrameSink for Mp4Sink {
    fn begin(&mut self, cfg: SinkConfig) -> MorphResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(MorphError::validation("mp4 sink width/height must be non-zero"));
        }
        if self.opts.crf > 51 {
            return Err(MorphError::validation(format!(
                "mp4 crf must lie in 0..=51, got {}",
                self.opts.crf
            )));
        }
        if let Some(run) = self.run.take() {
            run.discard();
        }
        ensure_parent_dir(&self.opts.out_path)?;

        let tmp_path = temp_sibling(&self.opts.out_path);
        let mut log_name = tmp_path.as_os_str().to_owned();
        log_name.push(".log");
        let log_path = PathBuf::from(log_name);
        let log = File::create(&log_path).map_err(|e| {
            MorphError::encode(format!("create ffmpeg log '{}': {e}", log_path.display()))
        })?;

        let spawned = self
            .command(cfg, &tmp_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = std::fs::remove_file(&log_path);
                return Err(if e.kind() == std::io::ErrorKind::NotFound {
                    MorphError::encode("MP4 output needs ffmpeg, which was not found on PATH")
                } else {
                    MorphError::encode(format!("spawn ffmpeg: {e}"))
                });
            }
        };
        let stdin = child.stdin.take();
        let run = Encoding {
            child,
            stdin,
            tmp_path,
            log_path,
        };
        if run.stdin.is_none() {
            run.discard();
            return Err(MorphError::encode("ffmpeg stdin is not piped"));
        }

        self.rgb = vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 3];
        self.run = Some(run);
        self.cfg = Some(cfg);
        self.last_idx = None;
        tracing::debug!(out = %self.opts.out_path.display(), "ffmpeg started");
        Ok(())
    }

    fn push_frame(&mut self, idx: u64, frame: &FrameRGBA) -> MorphResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| MorphError::encode("mp4 sink not started"))?;
        if let Some(last) = self.last_idx
            && idx <= last
        {
            return Err(MorphError::encode("mp4 sink received out-of-order frame index"));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(MorphError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        opaque_rgb(&mut self.rgb, &frame.data)
            .map_err(|e| MorphError::encode(format!("frame {idx}: {e}")))?;

        let stdin = self
            .run
            .as_mut()
            .and_then(|run| run.stdin.as_mut())
            .ok_or_else(|| MorphError::encode("mp4 sink is already finalized"))?;
        stdin
            .write_all(&self.rgb)
            .map_err(|e| MorphError::encode(format!("pipe frame {idx} to ffmpeg: {e}")))?;
        Ok(())
    }

    fn end(&mut self) -> MorphResult<()> {
        let mut run = self
            .run
            .take()
            .ok_or_else(|| MorphError::encode("mp4 sink not started"))?;
        self.cfg = None;
        drop(run.stdin.take());

        let status = match run.child.wait() {
            Ok(status) => status,
            Err(e) => {
                run.discard();
                return Err(MorphError::encode(format!("wait for ffmpeg: {e}")));
            }
        };
        let log = std::fs::read_to_string(&run.log_path).unwrap_or_default();
        let _ = std::fs::remove_file(&run.log_path);
        if !status.success() {
            let _ = std::fs::remove_file(&run.tmp_path);
            return Err(MorphError::encode(format!(
                "ffmpeg exited with {status}: {}",
                log.trim()
            )));
        }
        if let Err(e) = std::fs::rename(&run.tmp_path, &self.opts.out_path) {
            let _ = std::fs::remove_file(&run.tmp_path);
            return Err(MorphError::encode(format!(
                "move into place at '{}': {e}",
                self.opts.out_path.display()
            )));
        }
        tracing::debug!(out = %self.opts.out_path.display(), "mp4 written");
        Ok(())
    }
}

impl Drop for Mp4Sink {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.discard();
        }
    }
}

/// `ffmpeg` filter rounding both dimensions up to even, filled with paper.
fn pad_filter(paper_rgba: [u8; 4]) -> String {
    let [r, g, b, _] = paper_rgba;
    format!("pad=ceil(iw/2)*2:ceil(ih/2)*2:color=0x{r:02X}{g:02X}{b:02X}")
}

/// Drop the alpha channel of an opaque RGBA8 frame into `dst`.
///
/// Rendered frames sit on opaque paper; a translucent pixel means the frame did not come from
/// the renderer and is rejected rather than guessed at.
fn opaque_rgb(dst: &mut [u8], src: &[u8]) -> MorphResult<()> {
    if !src.len().is_multiple_of(4) || dst.len() != src.len() / 4 * 3 {
        return Err(MorphError::validation(
            "frame.data size mismatch with width*height*4",
        ));
    }
    for (i, (d, s)) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)).enumerate() {
        if s[3] != 255 {
            return Err(MorphError::validation(format!(
                "pixel {i} has alpha {}; mp4 frames must be opaque",
                s[3]
            )));
        }
        d.copy_from_slice(&s[..3]);
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/mp4.rs"]
mod tests;
