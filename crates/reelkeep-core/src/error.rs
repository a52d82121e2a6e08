//! Error types shared by every reelkeep service.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Convenience alias for results carrying a [`LibraryError`].
pub type Result<T, E = LibraryError> = std::result::Result<T, E>;

/// Stable, machine-readable failure category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidPath,
    InvalidInput,
    NotFound,
    ToolMissing,
    ToolFailed,
    Conflict,
    Empty,
    InvalidConfig,
    Io,
    Interrupted,
    WorkerPanicked,
    NoRuntime,
}

/// Errors that can occur in library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// A relative path escaped its root or was malformed.
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    /// A request argument has the wrong shape.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A file, job or group does not exist.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The external media tool could not be resolved.
    #[error("Required tool '{tool}' was not found on this system")]
    ToolMissing { tool: String },

    /// The external media tool exited unsuccessfully.
    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    /// The destination name is already taken.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Nothing to operate on.
    #[error("Nothing to do: {message}")]
    Empty { message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A job stopped without finishing, e.g. because the process restarted.
    #[error("Interrupted: {message}")]
    Interrupted { message: String },

    /// A job worker panicked.
    #[error("Worker panicked: {message}")]
    WorkerPanicked { message: String },

    /// Background work was requested outside an async runtime.
    #[error("No async runtime is available to run background jobs")]
    NoRuntime,

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LibraryError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                what: path.display().to_string(),
            },
            _ => Self::Io { path, source },
        }
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::Empty {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::Interrupted {
            message: message.into(),
        }
    }

    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPath { .. } => ErrorKind::InvalidPath,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ToolMissing { .. } => ErrorKind::ToolMissing,
            Self::ToolFailed { .. } => ErrorKind::ToolFailed,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Empty { .. } => ErrorKind::Empty,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::Io { .. } => ErrorKind::Io,
            Self::Interrupted { .. } => ErrorKind::Interrupted,
            Self::WorkerPanicked { .. } => ErrorKind::WorkerPanicked,
            Self::NoRuntime => ErrorKind::NoRuntime,
        }
    }
}
