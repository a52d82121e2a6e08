//! Cutting clips out of a media file with stream copy.

use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use reelkeep_core::tags::TaggedName;
use reelkeep_core::{LibraryError, MediaFilter, Result, join_relpath, safe_path};

use crate::merge::{DiagnosticTail, FFMPEG, ToolLocator};

/// Most segments accepted in one request.
pub const MAX_SEGMENTS: usize = 100;

/// Shortest clip, in seconds.
pub const MIN_CLIP_SECS: f64 = 0.05;

/// A `[start, end)` range of the source, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipSegment {
    pub start: f64,
    pub end: f64,
}

impl ClipSegment {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    fn validate(&self) -> Result<()> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(LibraryError::invalid_input("segment bounds must be finite"));
        }
        if self.start < 0.0 {
            return Err(LibraryError::invalid_input(format!(
                "segment start {} is negative",
                self.start
            )));
        }
        if self.end <= self.start + MIN_CLIP_SECS {
            return Err(LibraryError::invalid_input(format!(
                "segment {}-{} is too short",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Parses `START-END` in seconds, e.g. `12.5-20`.
impl FromStr for ClipSegment {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || LibraryError::invalid_input(format!("expected START-END, got {s:?}"));
        let (start, end) = s.split_once('-').ok_or_else(bad)?;
        let start = start.trim().parse().map_err(|_| bad())?;
        let end = end.trim().parse().map_err(|_| bad())?;
        Ok(Self { start, end })
    }
}

/// One clip written next to its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedClip {
    /// Root-relative path of the clip.
    pub relpath: String,
    pub name: String,
    pub start: f64,
    pub end: f64,
    /// The `NN` in `stem_NN`.
    pub index: u32,
}

/// Result of a clip request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipOutcome {
    pub source_relpath: String,
    pub created: Vec<CreatedClip>,
}

/// Check a whole request before anything is written.
pub fn validate_segments(segments: &[ClipSegment]) -> Result<()> {
    if segments.is_empty() {
        return Err(LibraryError::invalid_input("no segments given"));
    }
    if segments.len() > MAX_SEGMENTS {
        return Err(LibraryError::invalid_input(format!(
            "{} segments given, at most {MAX_SEGMENTS} allowed",
            segments.len()
        )));
    }
    segments.iter().try_for_each(ClipSegment::validate)
}

/// First free `stem_NN [tags].ext` in `dir`, counting from 01.
pub fn next_clip_name(dir: &Path, source: &TaggedName) -> (String, u32) {
    let mut index = 1;
    loop {
        let candidate = TaggedName {
            stem: format!("{}_{index:02}", source.stem),
            ext: source.ext.clone(),
            tags: source.tags.clone(),
        }
        .to_filename();
        if !dir.join(&candidate).exists() {
            return (candidate, index);
        }
        index += 1;
    }
}

/// Cut each segment of `relpath` (under `root`) into its own file beside the
/// source, in order. The source's tag block carries over to every clip.
///
/// Segments are all validated first. A tool failure stops the request;
/// clips already written stay on disk.
pub async fn cut_clips(
    locator: &ToolLocator,
    root: &Path,
    filter: &MediaFilter,
    relpath: &str,
    segments: &[ClipSegment],
) -> Result<ClipOutcome> {
    validate_segments(segments)?;
    let (src_abs, src_rel) = safe_path(root, relpath)?;
    if !src_abs.is_file() {
        return Err(LibraryError::not_found(src_rel));
    }
    let (dir_rel, file_name) = match src_rel.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", src_rel.as_str()),
    };
    if !filter.is_media(file_name) {
        return Err(LibraryError::invalid_input(format!(
            "not a media file: {file_name}"
        )));
    }
    let ffmpeg = locator.resolve(FFMPEG)?;

    let parsed = TaggedName::parse(file_name);
    let dir_abs = src_abs
        .parent()
        .ok_or_else(|| LibraryError::invalid_path(&src_rel))?
        .to_path_buf();

    let mut created = Vec::with_capacity(segments.len());
    for segment in segments {
        let (name, index) = next_clip_name(&dir_abs, &parsed);
        let (dst_abs, dst_rel) = safe_path(root, &join_relpath(dir_rel, &name))?;
        cut_one(&ffmpeg, &src_abs, &dst_abs, segment).await?;
        debug!(clip = %dst_rel, start = segment.start, end = segment.end, "clip written");
        created.push(CreatedClip {
            relpath: dst_rel,
            name,
            start: segment.start,
            end: segment.end,
            index,
        });
    }

    info!(source = %src_rel, clips = created.len(), "clips created");
    Ok(ClipOutcome {
        source_relpath: src_rel,
        created,
    })
}

async fn cut_one(ffmpeg: &Path, src: &Path, dst: &Path, segment: &ClipSegment) -> Result<()> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-ss"])
        .arg(segment.start.to_string())
        .arg("-t")
        .arg(segment.duration().to_string())
        .arg("-i")
        .arg(src)
        .args(["-c", "copy", "-movflags", "+faststart"])
        .arg(dst)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LibraryError::ToolMissing {
                tool: FFMPEG.to_string(),
            },
            _ => LibraryError::ToolFailed {
                tool: FFMPEG.to_string(),
                detail: format!("could not start {}: {e}", ffmpeg.display()),
            },
        })?;

    if !output.status.success() {
        let mut tail = DiagnosticTail::default();
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            tail.push(line);
        }
        let detail = if tail.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}\n{}", output.status, tail.render())
        };
        return Err(LibraryError::ToolFailed {
            tool: FFMPEG.to_string(),
            detail,
        });
    }
    if !dst.is_file() {
        return Err(LibraryError::ToolFailed {
            tool: FFMPEG.to_string(),
            detail: format!("{} was not created", dst.display()),
        });
    }
    Ok(())
}
