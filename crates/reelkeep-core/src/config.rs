//! Library configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};

/// Configuration shared by every reelkeep service.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct LibraryConfig {
    /// Root of the media tree.
    pub media_root: PathBuf,

    /// Root scanned by the tag index (must be inside `media_root`).
    #[builder(default)]
    #[serde(default)]
    pub tag_root: Option<PathBuf>,

    /// Root receiving transferred files; queue paths are relative to it.
    #[builder(default)]
    #[serde(default)]
    pub target_root: Option<PathBuf>,

    /// Root for exported queue copies.
    #[builder(default)]
    #[serde(default)]
    pub export_root: Option<PathBuf>,

    /// Directory for job checkpoints and merge outputs.
    #[builder(default = "default_state_dir()")]
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Name of the quarantine folder created at a scan root.
    #[builder(default = "default_quarantine_dir()")]
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: String,

    /// Recognized media extensions (lowercase, without dot).
    #[builder(default = "default_extensions()")]
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Seconds a tag-index snapshot stays fresh.
    #[builder(default = "30")]
    #[serde(default = "default_tag_freshness_secs")]
    pub tag_freshness_secs: u64,

    /// Report walk progress every N directories.
    #[builder(default = "50")]
    #[serde(default = "default_walk_progress_every")]
    pub walk_progress_every: u64,

    /// Report hash progress every N files.
    #[builder(default = "25")]
    #[serde(default = "default_hash_progress_every")]
    pub hash_progress_every: u64,

    /// Capacity of a scan job's log ring.
    #[builder(default = "200")]
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Finished jobs kept in memory per job kind.
    #[builder(default = "256")]
    #[serde(default = "default_max_retained_jobs")]
    pub max_retained_jobs: usize,

    /// Extra directories searched for the media tool before `PATH`.
    #[builder(default)]
    #[serde(default)]
    pub tool_candidates: Vec<PathBuf>,
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reelkeep")
}

fn default_quarantine_dir() -> String {
    "_duplicates".to_string()
}

fn default_extensions() -> Vec<String> {
    ["mp4", "mov", "mkv", "webm", "avi"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_tag_freshness_secs() -> u64 {
    30
}

fn default_walk_progress_every() -> u64 {
    50
}

fn default_hash_progress_every() -> u64 {
    25
}

fn default_log_capacity() -> usize {
    200
}

fn default_max_retained_jobs() -> usize {
    256
}

impl LibraryConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.media_root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Media root cannot be empty".to_string());
            }
            None => return Err("Media root is required".to_string()),
            Some(_) => {}
        }
        if let Some(ref name) = self.quarantine_dir {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(format!("Invalid quarantine folder name: {name:?}"));
            }
        }
        Ok(())
    }
}

impl LibraryConfig {
    /// Create a new config builder.
    pub fn builder() -> LibraryConfigBuilder {
        LibraryConfigBuilder::default()
    }

    /// Create a simple config for a media root with default settings.
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            tag_root: None,
            target_root: None,
            export_root: None,
            state_dir: default_state_dir(),
            quarantine_dir: default_quarantine_dir(),
            extensions: default_extensions(),
            tag_freshness_secs: default_tag_freshness_secs(),
            walk_progress_every: default_walk_progress_every(),
            hash_progress_every: default_hash_progress_every(),
            log_capacity: default_log_capacity(),
            max_retained_jobs: default_max_retained_jobs(),
            tool_candidates: Vec::new(),
        }
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| LibraryError::io(path, e))?;
        toml::from_str(&text)
            .map_err(|e| LibraryError::invalid_config(format!("{}: {e}", path.display())))
    }

    /// Root scanned by the tag index.
    pub fn tag_root(&self) -> &Path {
        self.tag_root.as_deref().unwrap_or(&self.media_root)
    }

    /// Root holding queued files.
    pub fn target_root(&self) -> PathBuf {
        self.target_root
            .clone()
            .unwrap_or_else(|| self.state_dir.join("target"))
    }

    /// Root used for exports.
    pub fn export_root(&self) -> PathBuf {
        self.export_root
            .clone()
            .unwrap_or_else(|| self.state_dir.join("export"))
    }

    /// Checkpoint directory for a job kind.
    pub fn jobs_dir(&self, kind: &str) -> PathBuf {
        self.state_dir.join("jobs").join(kind)
    }

    /// Directory receiving merged outputs.
    pub fn merges_dir(&self) -> PathBuf {
        self.state_dir.join("merges")
    }

    /// Freshness window of the tag index.
    pub fn tag_freshness(&self) -> Duration {
        Duration::from_secs(self.tag_freshness_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LibraryConfig::builder()
            .media_root("/media/videos")
            .quarantine_dir("_dupes")
            .tag_freshness_secs(5u64)
            .build()
            .unwrap();

        assert_eq!(config.media_root, PathBuf::from("/media/videos"));
        assert_eq!(config.quarantine_dir, "_dupes");
        assert_eq!(config.tag_freshness(), Duration::from_secs(5));
        assert_eq!(config.tag_root(), Path::new("/media/videos"));
        assert_eq!(config.log_capacity, 200);
        assert_eq!(config.target_root(), config.state_dir.join("target"));
    }

    #[test]
    fn test_config_builder_rejects_bad_quarantine_name() {
        let result = LibraryConfig::builder()
            .media_root("/media")
            .quarantine_dir("a/b")
            .build();
        assert!(result.is_err());

        assert!(LibraryConfig::builder().build().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let config: LibraryConfig = toml::from_str(
            r#"
            media_root = "/srv/media"
            tag_root = "/srv/media/tagged"
            target_root = "/srv/picked"
            extensions = ["mp4"]
            "#,
        )
        .unwrap();

        assert_eq!(config.tag_root(), Path::new("/srv/media/tagged"));
        assert_eq!(config.target_root(), Path::new("/srv/picked"));
        assert_eq!(config.extensions, vec!["mp4".to_string()]);
        assert_eq!(config.quarantine_dir, "_duplicates");
        assert_eq!(config.tag_freshness_secs, 30);
    }
}
