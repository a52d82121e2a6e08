//! Temporary input lists for the concat demuxer.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use reelkeep_core::{LibraryError, Result};

/// Quote a path for a concat list line.
///
/// Paths are single-quoted; a `'` inside is closed, escaped and reopened as
/// `'\''`.
pub fn escape_concat_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// A concat list file that is deleted when dropped.
#[derive(Debug)]
pub struct ConcatList {
    file: NamedTempFile,
}

impl ConcatList {
    /// Write `inputs` (absolute paths) to a new list file in `dir`.
    pub fn write(dir: &Path, inputs: &[PathBuf]) -> Result<Self> {
        let file = Builder::new()
            .prefix(".concat-")
            .suffix(".txt")
            .tempfile_in(dir)
            .map_err(|e| LibraryError::io(dir, e))?;

        {
            let mut writer = BufWriter::new(file.as_file());
            for input in inputs {
                writeln!(writer, "file {}", escape_concat_path(input))
                    .map_err(|e| LibraryError::io(file.path(), e))?;
            }
            writer.flush().map_err(|e| LibraryError::io(file.path(), e))?;
        }
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape_concat_path(Path::new("/m/a b.mp4")), "'/m/a b.mp4'");
        assert_eq!(
            escape_concat_path(Path::new("/m/it's [x].mp4")),
            r"'/m/it'\''s [x].mp4'"
        );
    }

    #[test]
    fn test_list_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let list = ConcatList::write(
            temp.path(),
            &[PathBuf::from("/m/one.mp4"), PathBuf::from("/m/two's.mp4")],
        )
        .unwrap();

        let path = list.path().to_path_buf();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "file '/m/one.mp4'\nfile '/m/two'\\''s.mp4'\n");

        drop(list);
        assert!(!path.exists());
    }
}
