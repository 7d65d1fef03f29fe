use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::animation::ease::Ease;
use crate::cluster::slurm::SlurmOptions;
use crate::foundation::core::{Canvas, Fps, FrameLayout};
use crate::foundation::error::{MorphError, MorphResult};

/// Settings of the assignment solver.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Hard cap on augmenting-path steps; exhausting it fails the solve.
    pub max_iterations: u64,
    /// Worker threads used inside one solve. `None` uses every available core.
    pub threads: Option<usize>,
    /// Clouds up to this size get a materialized cost matrix; larger ones compute costs on demand.
    pub dense_cost_limit: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1_000_000_000,
            threads: None,
            dense_cost_limit: 4096,
        }
    }
}

/// Complete configuration of one morphing run.
///
/// Every stage receives this value explicitly; there is no ambient global configuration. Relative
/// paths are resolved against the directory of the JSON file the configuration was loaded from.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MorphConfig {
    /// Pictures of the cycle, in order. The last one morphs back into the first.
    pub pictures: Vec<PathBuf>,
    /// Points drawn from every picture.
    pub n_points: usize,
    /// Resize pictures to this size before sampling. `None` keeps the native size.
    pub size: Option<Canvas>,
    /// Contrast adjustment applied to the grey picture; 0 leaves it untouched.
    pub contrast_level: f64,
    /// Exponent applied to darkness before sampling.
    pub gamma: f64,
    /// RNG seed for sampling. `None` draws a fresh seed from the OS.
    pub seed: Option<u64>,
    /// Output frame size in pixels.
    pub canvas: Canvas,
    /// Radius of one rendered point in canvas pixels. `None` derives it from density.
    pub point_radius: Option<f64>,
    /// Straight-alpha RGBA8 color of the points.
    pub ink_rgba: [u8; 4],
    /// Straight-alpha RGBA8 background color; alpha is forced opaque.
    pub paper_rgba: [u8; 4],
    /// Seconds spent morphing one picture into the next.
    pub duration_secs: f64,
    /// Playback rate of the final animation.
    pub fps: Fps,
    /// Seconds the animation holds on every picture before moving on.
    pub pause_secs: f64,
    /// Speed modulation of every transition. `None` is pure linear motion.
    pub easing: Option<Ease>,
    /// Assignment solver settings.
    pub solver: SolverConfig,
    /// Number of render workers.
    pub workers: usize,
    /// Archive written by the solve stage and read by render workers.
    pub archive: PathBuf,
    /// Directory holding one PNG per global frame index.
    pub frame_dir: PathBuf,
    /// Final animation; `.gif` or `.mp4`.
    pub output: PathBuf,
    /// Delete the archive and the frame directory after a successful assembly.
    pub cleanup_after: bool,
    /// Cluster submission settings, used by `launch`.
    pub cluster: Option<SlurmOptions>,

    /// Directory relative paths are resolved against; not serialized.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            pictures: Vec::new(),
            n_points: 40_000,
            size: None,
            contrast_level: 0.0,
            gamma: 3.25,
            seed: None,
            canvas: Canvas {
                width: 320,
                height: 480,
            },
            point_radius: None,
            ink_rgba: [0, 0, 0, 255],
            paper_rgba: [255, 255, 255, 255],
            duration_secs: 2.0,
            fps: Fps { num: 60, den: 1 },
            pause_secs: 0.5,
            easing: Some(Ease::InOutCubic),
            solver: SolverConfig::default(),
            workers: 1,
            archive: PathBuf::from("data.json"),
            frame_dir: PathBuf::from("pic"),
            output: PathBuf::from("morph.gif"),
            cleanup_after: false,
            cluster: None,
            base_dir: PathBuf::new(),
        }
    }
}

impl MorphConfig {
    /// Parse a configuration from a JSON reader. Relative paths resolve against the working
    /// directory.
    pub fn from_reader<R: std::io::Read>(r: R) -> MorphResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| MorphError::serde(format!("parse configuration JSON: {e}")))
    }

    /// Parse a configuration from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> MorphResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            MorphError::validation(format!("open configuration '{}': {e}", path.display()))
        })?;
        let mut cfg = Self::from_reader(BufReader::new(f))?;
        cfg.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(cfg)
    }

    /// Set the directory relative paths are resolved against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Resolve `p` against the configuration directory.
    pub fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    /// Resolved picture paths, in cycle order.
    pub fn picture_paths(&self) -> Vec<PathBuf> {
        self.pictures.iter().map(|p| self.resolve(p)).collect()
    }

    /// Resolved archive path.
    pub fn archive_path(&self) -> PathBuf {
        self.resolve(&self.archive)
    }

    /// Resolved frame directory.
    pub fn frame_dir_path(&self) -> PathBuf {
        self.resolve(&self.frame_dir)
    }

    /// Resolved output animation path.
    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.output)
    }

    /// Frames rendered for one transition (at least one).
    pub fn frames_per_transition(&self) -> u32 {
        self.fps
            .secs_to_frames_round(self.duration_secs)
            .clamp(1, u64::from(u32::MAX)) as u32
    }

    /// Extra copies of the first frame of every transition.
    pub fn pause_frames(&self) -> u32 {
        self.fps
            .secs_to_frames_round(self.pause_secs)
            .min(u64::from(u32::MAX)) as u32
    }

    /// Global frame layout: one transition per picture (the cycle is closed).
    pub fn frame_layout(&self) -> MorphResult<FrameLayout> {
        let transitions = u32::try_from(self.pictures.len())
            .map_err(|_| MorphError::validation("too many pictures"))?;
        FrameLayout::new(transitions, self.frames_per_transition())
    }

    /// Point radius in canvas pixels, derived from the mean area per point when unset.
    pub fn point_radius(&self) -> f64 {
        self.point_radius.unwrap_or_else(|| {
            let per_point = self.canvas.area() as f64 / self.n_points.max(1) as f64;
            (0.3 * per_point.sqrt()).clamp(0.5, 4.0)
        })
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> MorphResult<()> {
        if self.pictures.len() < 2 {
            return Err(MorphError::validation(format!(
                "a cycle needs at least 2 pictures, got {}",
                self.pictures.len()
            )));
        }
        if self.n_points == 0 {
            return Err(MorphError::validation("n_points must be >= 1"));
        }
        if let Some(size) = self.size {
            Canvas::new(size.width, size.height)?;
        }
        if !(self.contrast_level > -255.0 && self.contrast_level < 259.0) {
            return Err(MorphError::validation(format!(
                "contrast_level must lie in (-255, 259), got {}",
                self.contrast_level
            )));
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(MorphError::validation(format!(
                "gamma must be finite and > 0, got {}",
                self.gamma
            )));
        }
        Canvas::new(self.canvas.width, self.canvas.height)?;
        if self.canvas.width > u32::from(u16::MAX) || self.canvas.height > u32::from(u16::MAX) {
            return Err(MorphError::validation(format!(
                "canvas {}x{} exceeds {}x{}",
                self.canvas.width,
                self.canvas.height,
                u16::MAX,
                u16::MAX
            )));
        }
        if let Some(r) = self.point_radius
            && !(r.is_finite() && r > 0.0)
        {
            return Err(MorphError::validation(format!(
                "point_radius must be finite and > 0, got {r}"
            )));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(MorphError::validation("duration_secs must be > 0"));
        }
        if !(self.pause_secs.is_finite() && self.pause_secs >= 0.0) {
            return Err(MorphError::validation("pause_secs must be >= 0"));
        }
        if self.workers == 0 {
            return Err(MorphError::validation("workers must be >= 1"));
        }
        if self.solver.max_iterations == 0 {
            return Err(MorphError::validation("solver.max_iterations must be >= 1"));
        }
        if self.solver.threads == Some(0) {
            return Err(MorphError::validation(
                "solver.threads must be >= 1 when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
