use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{MorphError, MorphResult};
use crate::render::raster::FrameRGBA;

const FRAME_EXT: &str = "png";
const MARKER_EXT: &str = "done";
const MARKER_PREFIX: &str = "worker-";

/// Directory of rendered frames shared by all workers and the assembler.
///
/// Frame `g` lives at `<g>.png`. Files are first written under a hidden temporary name and
/// renamed into place, so a listing never sees a partial frame. Worker `r` leaves
/// `worker-<r>.done` (holding its frame count) once all of its frames are in place.
#[derive(Clone, Debug)]
pub struct FrameDirectory {
    root: PathBuf,
}

impl FrameDirectory {
    /// Directory rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory location.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory, or clear the artifacts of an earlier run from it.
    ///
    /// Only frames, completion markers and temporary files are removed.
    pub fn prepare(&self) -> MorphResult<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("create frame directory '{}'", self.root.display()))?;
        let mut removed = 0usize;
        for entry in self.entries()? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let ours = is_temp_name(&name)
                || parse_frame_name(&name).is_some()
                || parse_marker_name(&name).is_some();
            if ours {
                std::fs::remove_file(entry.path())
                    .with_context(|| format!("remove stale '{}'", entry.path().display()))?;
                removed += 1;
            }
        }
        tracing::debug!(dir = %self.root.display(), removed, "frame directory prepared");
        Ok(())
    }

    /// Path of frame `global`.
    pub fn frame_path(&self, global: u64) -> PathBuf {
        self.root.join(format!("{global}.{FRAME_EXT}"))
    }

    /// Write frame `global`, replacing any earlier copy.
    pub fn write_frame(&self, global: u64, frame: &FrameRGBA) -> MorphResult<()> {
        let tmp = self.root.join(format!(".{global}.{FRAME_EXT}.tmp"));
        frame.write_png(&tmp)?;
        let dst = self.frame_path(global);
        std::fs::rename(&tmp, &dst)
            .with_context(|| format!("move frame into place at '{}'", dst.display()))?;
        Ok(())
    }

    /// Read frame `global`.
    pub fn read_frame(&self, global: u64) -> MorphResult<FrameRGBA> {
        FrameRGBA::read_png(&self.frame_path(global))
    }

    /// Record that worker `rank` finished after writing `frames` frames.
    pub fn mark_worker_done(&self, rank: u32, frames: u64) -> MorphResult<()> {
        let name = format!("{MARKER_PREFIX}{rank}.{MARKER_EXT}");
        let tmp = self.root.join(format!(".{name}.tmp"));
        let dst = self.root.join(name);
        std::fs::write(&tmp, frames.to_string())
            .with_context(|| format!("write marker '{}'", tmp.display()))?;
        std::fs::rename(&tmp, &dst)
            .with_context(|| format!("move marker into place at '{}'", dst.display()))?;
        Ok(())
    }

    /// Completion markers present, as `rank -> frame count`.
    pub fn completed_workers(&self) -> MorphResult<BTreeMap<u32, u64>> {
        let mut out = BTreeMap::new();
        for entry in self.entries()? {
            let name = entry.file_name();
            let Some(rank) = parse_marker_name(&name.to_string_lossy()) else {
                continue;
            };
            let body = std::fs::read_to_string(entry.path())
                .with_context(|| format!("read marker '{}'", entry.path().display()))?;
            let frames = body.trim().parse::<u64>().map_err(|e| {
                MorphError::validation(format!(
                    "marker '{}' does not hold a frame count: {e}",
                    entry.path().display()
                ))
            })?;
            out.insert(rank, frames);
        }
        Ok(out)
    }

    /// Global indices of the frames present, in increasing order.
    pub fn list_frames(&self) -> MorphResult<BTreeSet<u64>> {
        Ok(self
            .entries()?
            .iter()
            .filter_map(|e| parse_frame_name(&e.file_name().to_string_lossy()))
            .collect())
    }

    /// Delete the directory and everything in it. A missing directory is not an error.
    pub fn remove(&self) -> MorphResult<()> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("remove frame directory '{}'", self.root.display()))
                .into()),
        }
    }

    fn entries(&self) -> MorphResult<Vec<std::fs::DirEntry>> {
        let rd = std::fs::read_dir(&self.root)
            .with_context(|| format!("list frame directory '{}'", self.root.display()))?;
        let mut out = Vec::new();
        for entry in rd {
            let entry = entry
                .with_context(|| format!("list frame directory '{}'", self.root.display()))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

fn parse_frame_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(FRAME_EXT)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // leading zeros would alias another index
    if stem.len() > 1 && stem.starts_with('0') {
        return None;
    }
    stem.parse().ok()
}

/// `.<frame or marker>.tmp`, left behind by an interrupted write.
fn is_temp_name(name: &str) -> bool {
    let Some(inner) = name.strip_prefix('.').and_then(|n| n.strip_suffix(".tmp")) else {
        return false;
    };
    parse_frame_name(inner).is_some() || parse_marker_name(inner).is_some()
}

fn parse_marker_name(name: &str) -> Option<u32> {
    name.strip_prefix(MARKER_PREFIX)?
        .strip_suffix(MARKER_EXT)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

#[cfg(test)]
#[path = "../../tests/unit/render/frames.rs"]
mod tests;
