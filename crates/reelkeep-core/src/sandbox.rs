//! Confining user-supplied relative paths under a root.

use std::path::{Component, Path, PathBuf};

use crate::error::{LibraryError, Result};

/// Normalize a relative path to forward-slash form.
///
/// Leading separators are dropped, `.` segments vanish and `..` segments
/// pop their parent. A `..` that would climb above the root is rejected.
pub fn normalize_relpath(relpath: &str) -> Result<String> {
    let cleaned = relpath.trim().replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in cleaned.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(LibraryError::invalid_path(relpath));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Resolve `relpath` under `root`.
///
/// Returns the absolute path and the normalized relative path. Fails with
/// `InvalidPath` when the input escapes the root.
pub fn safe_path(root: &Path, relpath: &str) -> Result<(PathBuf, String)> {
    let norm = normalize_relpath(relpath)?;
    let root_abs = clean_absolute(root)?;
    if norm.is_empty() {
        return Ok((root_abs, norm));
    }

    let abs = root_abs.join(&norm);
    let escapes = abs
        .strip_prefix(&root_abs)
        .map(|rest| rest.components().any(|c| !matches!(c, Component::Normal(_))))
        .unwrap_or(true);
    if escapes {
        return Err(LibraryError::invalid_path(relpath));
    }
    Ok((abs, norm))
}

/// Make `path` absolute and resolve `.`/`..` lexically (no symlink lookups).
pub fn clean_absolute(path: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(path).map_err(|e| LibraryError::io(path, e))?;
    let mut out = PathBuf::new();
    for component in abs.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Join a normalized directory and a file name into a relative path.
pub fn join_relpath(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
