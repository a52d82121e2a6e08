//! Whole-file content fingerprints.

use std::path::Path;

use blake3::Hasher;

use reelkeep_core::{ContentHash, LibraryError, Result};

/// Compute the BLAKE3 digest of a whole file.
///
/// Large files are memory-mapped; small ones are read directly.
pub fn fingerprint(path: &Path) -> Result<ContentHash> {
    let mut hasher = Hasher::new();
    hasher
        .update_mmap(path)
        .map_err(|e| LibraryError::io(path, e))?;
    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Digest of an in-memory buffer, matching [`fingerprint`] for the same bytes.
pub fn fingerprint_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(*blake3::hash(bytes).as_bytes())
}
