// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Retrieval value objects
//!
//! Corpus entries are the durable source of truth for the vector index.
//! Retrieval results and health snapshots are computed per call and never
//! persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key that scopes a corpus entry to a single user.
pub const USER_SCOPE_KEY: &str = "user_id";

/// One text chunk of the "rules of life" corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CorpusEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(text: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        let source = metadata.get("source").cloned();
        Self {
            text: text.into(),
            source,
            metadata,
        }
    }

    /// Entries without a user scope are shared by everyone.
    pub fn visible_to(&self, scope: Option<&str>) -> bool {
        match (scope, self.metadata.get(USER_SCOPE_KEY)) {
            (Some(user), Some(owner)) => owner == user,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    /// `1 / (1 + raw_distance)`, always in (0, 1].
    pub score: f64,
    /// 1-based position after deduplication.
    pub rank: usize,
    pub raw_distance: f64,
}

impl RetrievalResult {
    pub fn from_distance(text: String, raw_distance: f64, rank: usize) -> Self {
        Self {
            text,
            score: relevance_score(raw_distance),
            rank,
            raw_distance,
        }
    }
}

/// Map an L2 distance onto (0, 1], rounded to four decimals.
pub fn relevance_score(distance: f64) -> f64 {
    let distance = if distance.is_finite() { distance.max(0.0) } else { f64::MAX };
    let score = 1.0 / (1.0 + distance);
    let rounded = (score * 10_000.0).round() / 10_000.0;
    // Very distant matches would otherwise round down to zero.
    if rounded > 0.0 { rounded } else { score.max(f64::MIN_POSITIVE) }
}

/// Key used to decide whether two chunks are near-identical.
pub fn dedup_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Read-only diagnostic snapshot of the retrieval subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagHealth {
    pub index_loaded: bool,
    pub indexed_entries: usize,
    pub source_entries: usize,
    pub index_stale: bool,
    pub embedding_dim: usize,
    pub index_file: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_score_bounds() {
        assert_eq!(relevance_score(0.0), 1.0);
        assert_eq!(relevance_score(1.0), 0.5);
        assert!(relevance_score(1e12) > 0.0);
        assert!(relevance_score(f64::NAN) > 0.0);
        assert!(relevance_score(3.0) < relevance_score(2.0));
    }

    #[test]
    fn test_dedup_key_normalizes() {
        assert_eq!(dedup_key("  Sleep   by 11pm "), dedup_key("sleep by 11PM"));
    }

    #[test]
    fn test_visibility_scope() {
        let shared = CorpusEntry::new("Drink water");
        let mut meta = BTreeMap::new();
        meta.insert(USER_SCOPE_KEY.to_string(), "alice".to_string());
        let private = CorpusEntry::with_metadata("Call mom on Sundays", meta);

        assert!(shared.visible_to(Some("bob")));
        assert!(private.visible_to(Some("alice")));
        assert!(!private.visible_to(Some("bob")));
        assert!(private.visible_to(None));
    }
}
