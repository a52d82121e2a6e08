//! Durable per-job checkpoints.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::warn;

use reelkeep_core::{LibraryError, Result};

use crate::id::JobId;

/// Directory holding one `<id>.json` file per job.
///
/// Every save writes a temporary file in the same directory and renames it
/// over the previous checkpoint, so readers see either the old or the new
/// record.
#[derive(Debug, Clone)]
pub struct CheckpointDir {
    dir: PathBuf,
}

impl CheckpointDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Atomically replace the checkpoint of `id`.
    pub fn save<J: Serialize>(&self, id: JobId, record: &J) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| LibraryError::io(&self.dir, e))?;

        let tmp = NamedTempFile::new_in(&self.dir).map_err(|e| LibraryError::io(&self.dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, record)
                .map_err(|e| LibraryError::io(tmp.path(), e.into()))?;
            writer.flush().map_err(|e| LibraryError::io(tmp.path(), e))?;
        }

        let target = self.path_for(id);
        tmp.persist(&target)
            .map_err(|e| LibraryError::io(&target, e.error))?;
        Ok(())
    }

    /// Read the checkpoint of `id`.
    ///
    /// A missing file is `Ok(None)`. An unreadable or corrupt one is logged
    /// and also treated as absent.
    pub fn load<J: DeserializeOwned>(&self, id: JobId) -> Option<J> {
        let path = self.path_for(id);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "checkpoint unreadable");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "checkpoint corrupt");
                None
            }
        }
    }

    /// Delete the checkpoint of `id`, ignoring a missing file.
    pub fn remove(&self, id: JobId) -> Result<()> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(LibraryError::io(path, e)),
            _ => Ok(()),
        }
    }
}
