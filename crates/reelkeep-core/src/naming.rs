//! Naming-collision resolution for writes into shared directories.

use std::path::Path;

use crate::tags::split_extension;

/// Pick a free file name in `dir`, starting from `desired`.
///
/// If `desired` is taken, `_1`, `_2`, ... is inserted before the extension
/// until a name is free: `clip.mp4` becomes `clip_1.mp4`, then `clip_2.mp4`.
/// The result depends only on the directory contents and `desired`.
pub fn unique_file_name(dir: &Path, desired: &str) -> String {
    if !dir.join(desired).exists() {
        return desired.to_string();
    }

    let (stem, ext) = split_extension(desired);
    (1u64..)
        .map(|i| format!("{stem}_{i}{ext}"))
        .find(|candidate| !dir.join(candidate).exists())
        .unwrap_or_else(|| desired.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_free_name_is_kept() {
        let temp = TempDir::new().unwrap();
        assert_eq!(unique_file_name(temp.path(), "clip.mp4"), "clip.mp4");
    }

    #[test]
    fn test_numeric_suffix_increments() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("clip.mp4"), b"a").unwrap();
        assert_eq!(unique_file_name(temp.path(), "clip.mp4"), "clip_1.mp4");

        fs::write(temp.path().join("clip_1.mp4"), b"b").unwrap();
        assert_eq!(unique_file_name(temp.path(), "clip.mp4"), "clip_2.mp4");
    }

    #[test]
    fn test_name_without_extension() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes"), b"a").unwrap();
        assert_eq!(unique_file_name(temp.path(), "notes"), "notes_1");
    }
}
