use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::MorphResult;

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> MorphResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Hidden sibling of `path` private to this process.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_owned());
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}

/// Write `path` through a temporary sibling and rename it into place.
///
/// Readers see either the old file or the complete new one. Every write, flush and sync error is
/// returned; on failure the temporary file is removed and `path` is left untouched.
pub fn replace_atomically<F>(path: &Path, write: F) -> MorphResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> anyhow::Result<()>,
{
    ensure_parent_dir(path)?;
    let tmp = temp_sibling(path);
    let attempt = || -> anyhow::Result<()> {
        let f = File::create(&tmp).with_context(|| format!("create '{}'", tmp.display()))?;
        let mut w = BufWriter::new(f);
        write(&mut w)?;
        w.flush()
            .with_context(|| format!("flush '{}'", tmp.display()))?;
        let f = w
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flush '{}': {}", tmp.display(), e.error()))?;
        f.sync_all()
            .with_context(|| format!("sync '{}'", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("move into place at '{}'", path.display()))?;
        Ok(())
    };
    if let Err(e) = attempt() {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/fsio.rs"]
mod tests;
