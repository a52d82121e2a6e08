//! Adding and removing tags by renaming files.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::info;

use reelkeep_core::tags::{TaggedName, validate_tag};
use reelkeep_core::{LibraryError, Result, TagSet, join_relpath, safe_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TagAction {
    Add,
    Remove,
}

/// Result of a retag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetagOutcome {
    pub changed: bool,
    /// Root-relative path after the rename.
    pub relpath: String,
    pub name: String,
    pub tags: TagSet,
}

/// Rewrite the trailing tag block of `relpath` under `root`.
///
/// Adding a tag already present (ignoring case) or removing an absent one
/// leaves the file alone. Renaming onto an existing file is a `Conflict`.
pub fn retag(root: &Path, relpath: &str, action: TagAction, tag: &str) -> Result<RetagOutcome> {
    let tag = validate_tag(tag)?;
    let (src_abs, src_rel) = safe_path(root, relpath)?;
    if !src_abs.is_file() {
        return Err(LibraryError::not_found(src_rel));
    }

    let (dir_rel, old_name) = match src_rel.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", src_rel.as_str()),
    };

    let mut parsed = TaggedName::parse(old_name);
    match action {
        TagAction::Add => {
            parsed.tags.insert(&tag);
        }
        TagAction::Remove => {
            parsed.tags.remove(&tag);
        }
    }

    let new_name = parsed.to_filename();
    if new_name == old_name {
        return Ok(RetagOutcome {
            changed: false,
            name: old_name.to_string(),
            relpath: src_rel.clone(),
            tags: parsed.tags,
        });
    }

    let (dst_abs, dst_rel) = safe_path(root, &join_relpath(dir_rel, &new_name))?;
    if dst_abs.exists() {
        return Err(LibraryError::conflict(format!("{dst_rel} already exists")));
    }
    fs::rename(&src_abs, &dst_abs).map_err(|e| LibraryError::io(&src_abs, e))?;
    info!(from = %src_rel, to = %dst_rel, %action, %tag, "retagged");

    Ok(RetagOutcome {
        changed: true,
        relpath: dst_rel,
        name: new_name,
        tags: parsed.tags,
    })
}
