//! Recognized media extensions.

use std::path::Path;

use crate::config::LibraryConfig;

/// Decides which files count as media.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    extensions: Vec<String>,
}

impl MediaFilter {
    /// Create a filter from extensions (case and leading dots are ignored).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(&config.extensions)
    }

    /// Check a file name against the extension list.
    pub fn is_media(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
    }
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::new(["mp4", "mov", "mkv", "webm", "avi"])
    }
}
