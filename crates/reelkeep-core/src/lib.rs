//! Core types and traits for reelkeep.
//!
//! This crate provides the fundamental data structures shared by the scanner,
//! the duplicate engine and the job services: library configuration, the
//! error vocabulary, media entries and their tag sets, and the small path
//! rules (sandboxing, naming collisions) every writer into the library obeys.

mod config;
mod entry;
mod error;
mod media;
mod naming;
mod sandbox;
pub mod tags;

pub use config::{LibraryConfig, LibraryConfigBuilder};
pub use entry::{ContentHash, MediaEntry, TagIndexSnapshot, TagSet};
pub use error::{ErrorKind, LibraryError, Result};
pub use media::MediaFilter;
pub use naming::unique_file_name;
pub use sandbox::{clean_absolute, join_relpath, normalize_relpath, safe_path};
