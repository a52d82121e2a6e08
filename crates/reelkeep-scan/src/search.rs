//! Queries over a tag-index snapshot.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use reelkeep_core::tags::split_tokens;
use reelkeep_core::{MediaEntry, TagIndexSnapshot};

/// Largest number of results a search returns.
pub const MAX_RESULTS: usize = 2000;

/// How query tags combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchMode {
    /// Every query tag must be present.
    #[default]
    #[strum(to_string = "and", serialize = "all")]
    #[serde(rename = "and")]
    All,
    /// Any query tag suffices.
    #[strum(to_string = "or", serialize = "any")]
    #[serde(rename = "or")]
    Any,
}

/// How many entries carry a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    /// Lowercased tag.
    pub tag: String,
    pub count: usize,
}

fn query_tokens(query: &str) -> Vec<String> {
    split_tokens(query).map(str::to_lowercase).collect()
}

/// Entries whose tags match the query, in snapshot order.
///
/// An empty query matches nothing. `limit` is clamped to `1..=2000`.
pub fn search_tags<'a>(
    snapshot: &'a TagIndexSnapshot,
    query: &str,
    mode: MatchMode,
    limit: usize,
) -> Vec<&'a MediaEntry> {
    let wanted = query_tokens(query);
    if wanted.is_empty() {
        return Vec::new();
    }

    snapshot
        .entries
        .iter()
        .filter(|entry| {
            let have: Vec<String> = entry.tags.lowercase().collect();
            match mode {
                MatchMode::All => wanted.iter().all(|w| have.contains(w)),
                MatchMode::Any => wanted.iter().any(|w| have.contains(w)),
            }
        })
        .take(limit.clamp(1, MAX_RESULTS))
        .collect()
}

/// Entries whose lowercased name contains every query token.
pub fn search_names<'a>(snapshot: &'a TagIndexSnapshot, query: &str, limit: usize) -> Vec<&'a MediaEntry> {
    let wanted = query_tokens(query);
    if wanted.is_empty() {
        return Vec::new();
    }

    snapshot
        .entries
        .iter()
        .filter(|entry| {
            let name = entry.name_lower();
            wanted.iter().all(|w| name.contains(w.as_str()))
        })
        .take(limit.clamp(1, MAX_RESULTS))
        .collect()
}

/// Tag usage counts, most used first, ties by tag name.
pub fn tag_counts(snapshot: &TagIndexSnapshot) -> Vec<TagCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for tag in snapshot.entries.iter().flat_map(|e| e.tags.lowercase()) {
        *counts.entry(tag).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelkeep_core::tags::extract_tags;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn snapshot(names: &[&str]) -> TagIndexSnapshot {
        TagIndexSnapshot {
            root: PathBuf::from("/media"),
            built_at: SystemTime::now(),
            entries: names
                .iter()
                .map(|n| MediaEntry {
                    path: n.to_string(),
                    name: (*n).into(),
                    tags: extract_tags(n),
                    size_bytes: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_search_tags_modes() {
        let snap = snapshot(&["a [goal fast].mp4", "b [Goal].mp4", "c [save].mp4"]);

        let all: Vec<_> = search_tags(&snap, "GOAL, fast", MatchMode::All, 10)
            .into_iter()
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(all, vec!["a [goal fast].mp4"]);

        let any: Vec<_> = search_tags(&snap, "fast save", MatchMode::Any, 10)
            .into_iter()
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(any, vec!["a [goal fast].mp4", "c [save].mp4"]);
    }

    #[test]
    fn test_empty_query_and_limit() {
        let snap = snapshot(&["a [x].mp4", "b [x].mp4", "c [x].mp4"]);
        assert!(search_tags(&snap, "  , ", MatchMode::All, 10).is_empty());
        assert_eq!(search_tags(&snap, "x", MatchMode::All, 2).len(), 2);
        assert_eq!(search_tags(&snap, "x", MatchMode::All, 0).len(), 1);
    }

    #[test]
    fn test_search_names() {
        let snap = snapshot(&["Derby Final [goal].mp4", "derby warmup.mp4", "final.mp4"]);
        let hits: Vec<_> = search_names(&snap, "derby final", 10)
            .into_iter()
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(hits, vec!["Derby Final [goal].mp4"]);
    }

    #[test]
    fn test_tag_counts_order() {
        let snap = snapshot(&["a [b a].mp4", "c [A].mp4", "d [b c].mp4"]);
        let counts = tag_counts(&snap);
        assert_eq!(
            counts,
            vec![
                TagCount { tag: "a".into(), count: 2 },
                TagCount { tag: "b".into(), count: 2 },
                TagCount { tag: "c".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_match_mode_parse() {
        assert_eq!("and".parse::<MatchMode>().unwrap(), MatchMode::All);
        assert_eq!("or".parse::<MatchMode>().unwrap(), MatchMode::Any);
        assert_eq!(MatchMode::Any.to_string(), "or");
    }
}
