//! Media entry and snapshot types.

use std::path::PathBuf;
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// BLAKE3 content hash for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Tags of a file in first-seen order, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<CompactString>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag unless an equal one (ignoring case) is present.
    ///
    /// Returns `true` if the tag was added.
    pub fn insert(&mut self, tag: &str) -> bool {
        if self.contains(tag) {
            return false;
        }
        self.0.push(CompactString::new(tag));
        true
    }

    /// Remove a tag, ignoring case. Returns `true` if one was removed.
    pub fn remove(&mut self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        let before = self.0.len();
        self.0.retain(|t| t.as_str().to_lowercase() != wanted);
        self.0.len() != before
    }

    pub fn contains(&self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        self.0.iter().any(|t| t.as_str().to_lowercase() == wanted)
    }

    pub fn as_slice(&self) -> &[CompactString] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(CompactString::as_str)
    }

    /// Lowercased tags, used as comparison keys.
    pub fn lowercase(&self) -> impl Iterator<Item = String> + '_ {
        self.0.iter().map(|t| t.as_str().to_lowercase())
    }

    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for TagSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

/// One media file under a scan root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    /// Root-relative path with forward slashes.
    pub path: String,
    /// File name.
    pub name: CompactString,
    /// Tags parsed from the file name.
    pub tags: TagSet,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl MediaEntry {
    /// Lowercased name, used by name searches.
    pub fn name_lower(&self) -> String {
        self.name.as_str().to_lowercase()
    }
}

/// An immutable tag-index build result for one root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagIndexSnapshot {
    /// Absolute scan root.
    pub root: PathBuf,
    /// When this snapshot was built.
    pub built_at: SystemTime,
    /// Entries sorted by case-insensitive path.
    pub entries: Vec<MediaEntry>,
}

impl TagIndexSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
