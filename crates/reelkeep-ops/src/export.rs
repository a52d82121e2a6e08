//! Copying the queue into an export folder in queue order.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use reelkeep_core::tags::split_extension;
use reelkeep_core::{LibraryError, Result, join_relpath, safe_path, unique_file_name};

use crate::queue::QueueSource;

/// One exported file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedFile {
    pub source: String,
    /// Export-root-relative destination.
    pub dest_relpath: String,
    pub dest_filename: String,
}

/// One queued file that was not exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub source: String,
    pub reason: String,
}

/// Result of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub destination: String,
    pub exported: Vec<ExportedFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Width of the position prefix: at least three digits.
pub fn prefix_width(count: usize) -> usize {
    count.to_string().len().max(3)
}

/// Copy every queued file from `source_root` into `destination_subdir` of
/// `export_root`, named `<position>_<name>`.
///
/// A non-empty destination is refused unless `clear_destination` is set, in
/// which case its contents are deleted first. Missing or unreadable sources
/// are skipped.
pub fn export(
    source_root: &Path,
    export_root: &Path,
    queue: &dyn QueueSource,
    destination_subdir: &str,
    clear_destination: bool,
) -> Result<ExportOutcome> {
    let paths = queue.target_paths();
    if paths.is_empty() {
        return Err(LibraryError::empty("queue is empty"));
    }

    let (dest_abs, dest_rel) = safe_path(export_root, destination_subdir)?;
    fs::create_dir_all(&dest_abs).map_err(|e| LibraryError::io(&dest_abs, e))?;

    let has_entries = fs::read_dir(&dest_abs)
        .map_err(|e| LibraryError::io(&dest_abs, e))?
        .next()
        .is_some();
    if has_entries {
        if !clear_destination {
            return Err(LibraryError::conflict(format!(
                "destination {dest_rel:?} is not empty"
            )));
        }
        clear_directory(&dest_abs)?;
    }

    let width = prefix_width(paths.len());
    let mut outcome = ExportOutcome {
        destination: dest_rel.clone(),
        ..ExportOutcome::default()
    };

    for (idx, target) in paths.iter().enumerate() {
        let skip = |reason: &str| SkippedFile {
            source: target.clone(),
            reason: reason.to_string(),
        };

        let src_abs = match safe_path(source_root, target) {
            Ok((abs, _)) if abs.is_file() => abs,
            Ok(_) => {
                outcome.skipped.push(skip("missing_source"));
                continue;
            }
            Err(_) => {
                outcome.skipped.push(skip("invalid_path"));
                continue;
            }
        };

        let file_name = target.rsplit('/').next().unwrap_or(target);
        let (stem, ext) = split_extension(file_name);
        let prefixed = format!("{:0width$}_{stem}{ext}", idx + 1);
        let name = unique_file_name(&dest_abs, &prefixed);

        if let Err(err) = fs::copy(&src_abs, dest_abs.join(&name)) {
            warn!(source = %target, error = %err, "export copy failed");
            outcome.skipped.push(skip("copy_failed"));
            continue;
        }

        outcome.exported.push(ExportedFile {
            source: target.clone(),
            dest_relpath: join_relpath(&dest_rel, &name),
            dest_filename: name,
        });
    }

    info!(
        destination = %dest_abs.display(),
        exported = outcome.exported.len(),
        skipped = outcome.skipped.len(),
        "export finished"
    );
    Ok(outcome)
}

fn clear_directory(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| LibraryError::io(dir, e))? {
        let entry = entry.map_err(|e| LibraryError::io(dir, e))?;
        let path = entry.path();
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        let removed = if is_dir {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| LibraryError::io(&path, e))?;
    }
    Ok(())
}
