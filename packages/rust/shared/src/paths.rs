//! Library-root sandboxing for caller-supplied relative paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{FurtherError, Result};

/// Resolve `relative` under `root`, refusing anything that escapes it.
///
/// The containment check runs lexically first so `../` escapes are reported
/// as `Forbidden` even when the target does not exist. Existing paths are
/// then canonicalized and re-checked so symlinks cannot leave the root.
pub fn resolve_under_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let root_abs = absolutize(root)?;
    let joined = normalize(&root_abs.join(relative));

    if !joined.starts_with(&root_abs) {
        return Err(FurtherError::Forbidden { path: joined });
    }
    if !joined.exists() {
        return Err(FurtherError::not_found(format!(
            "file not found: {}",
            joined.display()
        )));
    }

    let real = joined
        .canonicalize()
        .map_err(|e| FurtherError::io(&joined, e))?;
    let real_root = root_abs
        .canonicalize()
        .map_err(|e| FurtherError::io(&root_abs, e))?;
    if !real.starts_with(&real_root) {
        return Err(FurtherError::Forbidden { path: real });
    }

    Ok(real)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().map_err(|e| FurtherError::io(path, e))?;
    Ok(normalize(&cwd.join(path)))
}

/// Lexical normalization: drops `.` and folds `..` without touching the disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
