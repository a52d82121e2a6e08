//! Bracketed tag tokens embedded in filenames.
//!
//! A filename such as `goal [left wing] [fast].mp4` carries the tags
//! `left`, `wing` and `fast`. Tokens are separated by whitespace or commas,
//! and repeated tokens are dropped case-insensitively (first spelling wins).

use compact_str::CompactString;

use crate::entry::TagSet;
use crate::error::{LibraryError, Result};

/// Longest accepted tag token.
pub const MAX_TAG_LEN: usize = 48;

/// Extract every tag from every `[...]` block of a filename.
pub fn extract_tags(filename: &str) -> TagSet {
    let mut tags = TagSet::new();
    let mut rest = filename;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            break;
        };
        for token in split_tokens(&after[..close]) {
            tags.insert(token);
        }
        rest = &after[close + 1..];
    }
    tags
}

/// Split a query or bracket body into tokens.
pub fn split_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
}

/// A filename split into its stem, extension and trailing tag block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedName {
    pub stem: String,
    /// Extension including the leading dot, or empty.
    pub ext: String,
    pub tags: TagSet,
}

impl TaggedName {
    /// Parse the trailing run of `[...]` blocks off a filename.
    ///
    /// Only brackets at the end of the stem count; `a [x] b.mp4` has no tag
    /// block because `b` follows it.
    pub fn parse(filename: &str) -> Self {
        let (base, ext) = split_extension(filename);

        let mut cut = base.len();
        loop {
            let trimmed = base[..cut].trim_end();
            if !trimmed.ends_with(']') {
                break;
            }
            let body_end = trimmed.len() - 1;
            match trimmed[..body_end].rfind(['[', ']']) {
                Some(open) if trimmed.as_bytes()[open] == b'[' => cut = open,
                _ => break,
            }
        }

        if cut == base.len() {
            return Self {
                stem: base.to_string(),
                ext: ext.to_string(),
                tags: TagSet::new(),
            };
        }

        Self {
            stem: base[..cut].trim_end().to_string(),
            ext: ext.to_string(),
            tags: extract_tags(&base[cut..]),
        }
    }

    /// Render back to `stem [t1 t2].ext`, or `stem.ext` without tags.
    pub fn to_filename(&self) -> String {
        let stem = self.stem.trim();
        if self.tags.is_empty() {
            format!("{stem}{}", self.ext)
        } else {
            format!("{stem} [{}]{}", self.tags.join(" "), self.ext)
        }
    }
}

/// Validate a single tag token supplied by a user.
pub fn validate_tag(tag: &str) -> Result<CompactString> {
    let t = tag.trim();
    let bad = t.is_empty()
        || t.chars().count() > MAX_TAG_LEN
        || t.chars().any(char::is_whitespace)
        || t.contains(['[', ']', '/', '\\']);
    if bad {
        return Err(LibraryError::invalid_input(format!("bad tag: {tag:?}")));
    }
    Ok(CompactString::new(t))
}

/// Split `name.ext` into (`name`, `.ext`), leaving dotfiles intact.
pub fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(0) | None => (filename, ""),
        Some(dot) => filename.split_at(dot),
    }
}
