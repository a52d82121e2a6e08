//! Locating the external media tools.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

use reelkeep_core::{LibraryConfig, LibraryError, Result};

/// Encoder binary name.
pub const FFMPEG: &str = "ffmpeg";
/// Duration probe binary name.
pub const FFPROBE: &str = "ffprobe";

/// Directories checked before `PATH`.
const FIXED_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];

/// Finds tool executables: configured directories first, then a few fixed
/// install locations, then `PATH`.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    candidate_dirs: Vec<PathBuf>,
    search_path: bool,
}

impl ToolLocator {
    pub fn new(candidate_dirs: Vec<PathBuf>) -> Self {
        Self {
            candidate_dirs,
            search_path: true,
        }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(config.tool_candidates.clone())
    }

    /// Only look in the given directories.
    pub fn only(candidate_dirs: Vec<PathBuf>) -> Self {
        Self {
            candidate_dirs,
            search_path: false,
        }
    }

    /// Resolve `name` to an executable path, or fail with `ToolMissing`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let found = self
            .candidate_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|p| is_executable(p));
        if let Some(path) = found {
            debug!(tool = name, path = %path.display(), "tool found in candidate dir");
            return Ok(path);
        }
        if !self.search_path {
            return Err(LibraryError::ToolMissing {
                tool: name.to_string(),
            });
        }

        FIXED_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(name))
            .find(|p| is_executable(p))
            .or_else(|| which::which(name).ok())
            .ok_or_else(|| LibraryError::ToolMissing {
                tool: name.to_string(),
            })
    }
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Probe the duration of one input in seconds.
///
/// `None` if the probe fails or prints something that is not a positive
/// number.
pub async fn probe_duration(probe: &Path, input: &Path) -> Option<f64> {
    let output = Command::new(probe)
        .args(["-v", "error", "-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(input)
        .kill_on_drop(true)
        .output()
        .await;

    let output = match output {
        Ok(o) if o.status.success() => o,
        Ok(o) => {
            warn!(input = %input.display(), status = %o.status, "duration probe failed");
            return None;
        }
        Err(err) => {
            warn!(input = %input.display(), error = %err, "duration probe did not start");
            return None;
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Sum of probed durations, or `1.0` when nothing usable was probed.
pub async fn total_duration(probe: Option<&Path>, inputs: &[PathBuf]) -> f64 {
    let Some(probe) = probe else {
        return 1.0;
    };
    let mut total = 0.0;
    for input in inputs {
        total += probe_duration(probe, input).await.unwrap_or(0.0);
    }
    if total > 0.0 { total } else { 1.0 }
}
