//! The ordered selection of files feeding merges and exports.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use reelkeep_core::{
    LibraryError, MediaFilter, Result, join_relpath, normalize_relpath, safe_path, unique_file_name,
};

use crate::scans::move_file;

/// Anything that can list queued target paths in order.
pub trait QueueSource {
    /// Root-relative target paths, first to last.
    fn target_paths(&self) -> Vec<String>;
}

impl QueueSource for [String] {
    fn target_paths(&self) -> Vec<String> {
        self.to_vec()
    }
}

impl QueueSource for Vec<String> {
    fn target_paths(&self) -> Vec<String> {
        self.clone()
    }
}

/// One queued file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u64,
    /// Target-root-relative path of the queued file. Unique within a queue.
    pub target_path: String,
    /// Media-root-relative path the file was transferred from, if it was.
    pub source_path: Option<String>,
}

/// Whether a transfer copies or moves its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
}

/// In-memory ordered queue, serializable for persistence between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderedQueue {
    items: Vec<QueueItem>,
    next_id: u64,
}

impl OrderedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a queue saved with [`OrderedQueue::save`]; a missing file is an
    /// empty queue.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LibraryError::invalid_config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(LibraryError::io(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LibraryError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| LibraryError::io(path, e.into()))?;
        fs::write(path, json).map_err(|e| LibraryError::io(path, e))
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a media path. Returns the item and whether it was newly added;
    /// a path already queued returns the existing item.
    pub fn add(
        &mut self,
        filter: &MediaFilter,
        target_path: &str,
        source_path: Option<&str>,
    ) -> Result<(QueueItem, bool)> {
        let target_path = normalize_relpath(target_path)?;
        if target_path.is_empty() {
            return Err(LibraryError::invalid_path(target_path));
        }
        if let Some(existing) = self.items.iter().find(|i| i.target_path == target_path) {
            return Ok((existing.clone(), false));
        }
        let file_name = target_path.rsplit('/').next().unwrap_or(&target_path);
        if !filter.is_media(file_name) {
            return Err(LibraryError::invalid_input(format!(
                "not a media file: {file_name}"
            )));
        }

        self.next_id += 1;
        let item = QueueItem {
            id: self.next_id,
            target_path,
            source_path: source_path.map(normalize_relpath).transpose()?,
        };
        self.items.push(item.clone());
        Ok((item, true))
    }

    pub fn remove(&mut self, id: u64) -> Result<QueueItem> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| LibraryError::not_found(format!("queue item {id}")))?;
        Ok(self.items.remove(pos))
    }

    /// Reorder by a full permutation of the current ids.
    pub fn reorder(&mut self, ordered_ids: &[u64]) -> Result<()> {
        let mut wanted = ordered_ids.to_vec();
        wanted.sort_unstable();
        let mut current: Vec<u64> = self.items.iter().map(|i| i.id).collect();
        current.sort_unstable();
        if wanted != current {
            return Err(LibraryError::invalid_input(
                "ordered ids must list every queued item exactly once",
            ));
        }

        let mut items = std::mem::take(&mut self.items);
        for id in ordered_ids {
            if let Some(pos) = items.iter().position(|i| i.id == *id) {
                self.items.push(items.swap_remove(pos));
            }
        }
        Ok(())
    }

    /// Remove everything. Returns how many items were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    /// Copy or move a media file (relative to `source_root`) into
    /// `target_subdir` of `target_root` under a free name, and queue the
    /// result.
    pub fn transfer(
        &mut self,
        source_root: &Path,
        target_root: &Path,
        filter: &MediaFilter,
        source: &str,
        target_subdir: &str,
        mode: TransferMode,
    ) -> Result<QueueItem> {
        let (src_abs, src_rel) = safe_path(source_root, source)?;
        if !src_abs.is_file() {
            return Err(LibraryError::not_found(src_rel));
        }
        let file_name = src_rel.rsplit('/').next().unwrap_or(&src_rel).to_string();
        if !filter.is_media(&file_name) {
            return Err(LibraryError::invalid_input(format!(
                "not a media file: {file_name}"
            )));
        }
        if self
            .items
            .iter()
            .any(|i| i.source_path.as_deref() == Some(src_rel.as_str()))
        {
            return Err(LibraryError::conflict(format!("{src_rel} is already queued")));
        }

        let (dir_abs, dir_rel) = safe_path(target_root, target_subdir)?;
        fs::create_dir_all(&dir_abs).map_err(|e| LibraryError::io(&dir_abs, e))?;
        let name = unique_file_name(&dir_abs, &file_name);
        let dest_abs = dir_abs.join(&name);

        match mode {
            TransferMode::Copy => {
                fs::copy(&src_abs, &dest_abs).map_err(|e| LibraryError::io(&src_abs, e))?;
            }
            TransferMode::Move => move_file(&src_abs, &dest_abs)?,
        }
        debug!(from = %src_rel, to = %dest_abs.display(), %mode, "transferred");

        let (item, _) = self.add(filter, &join_relpath(&dir_rel, &name), Some(&src_rel))?;
        Ok(item)
    }
}

impl QueueSource for OrderedQueue {
    fn target_paths(&self) -> Vec<String> {
        self.items.iter().map(|i| i.target_path.clone()).collect()
    }
}
