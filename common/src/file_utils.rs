//! File system helpers shared by the weighting tools.

use std::path::Path;

use anyhow::bail;

/// Creates `dir` (and its parents) unless it already exists.
///
/// Fails if `dir` exists but is not a directory.
pub fn safe_mkdir(dir: &Path) -> anyhow::Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            bail!("{} exists and is not a directory", dir.display());
        }
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Creates the parent directory of `path` when it has one.
pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => safe_mkdir(parent),
        _ => Ok(()),
    }
}

/// Returns the paths from `paths` that do not exist on disk.
pub fn missing_files<'a, I>(paths: I) -> Vec<&'a Path>
where
    I: IntoIterator<Item = &'a Path>,
{
    paths.into_iter().filter(|path| !path.exists()).collect()
}
