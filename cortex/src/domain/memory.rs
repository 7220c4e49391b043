// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # UserMemory Aggregate
//!
//! A fact the planner has learned about a user ("I am vegetarian", "no
//! meetings before 10"). Each record carries a confidence that decays while
//! the memory sits idle in the SHORT_TERM tier. Records that keep getting
//! used are promoted to LONG_TERM, where they are permanent.
//!
//! ## Tier state machine
//!
//! ```text
//! SHORT_TERM ──promote──▶ LONG_TERM
//!     │
//!     └──prune (confidence < 0.3)──▶ deleted
//! ```
//!
//! There is no transition out of LONG_TERM.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Confidence lost per idle day by a SHORT_TERM memory.
pub const DECAY_RATE_PER_DAY: f64 = 0.1;

/// SHORT_TERM memories below this confidence are deleted by the lifecycle run.
pub const PRUNE_THRESHOLD: f64 = 0.3;

/// Minimum confidence for promotion to LONG_TERM.
pub const PROMOTION_CONFIDENCE: f64 = 0.8;

/// Minimum access count for promotion to LONG_TERM.
pub const PROMOTION_ACCESS_COUNT: u32 = 3;

/// Word-set overlap at which an incoming fact reinforces an existing memory.
pub const REINFORCEMENT_OVERLAP: f64 = 0.8;

/// Longest fact text accepted on ingestion.
pub const MAX_MEMORY_TEXT_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Constraint,
    Preference,
    Goal,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Constraint => "constraint",
            MemoryCategory::Preference => "preference",
            MemoryCategory::Goal => "goal",
        }
    }

    /// Lenient parse used for model output and CLI input.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "constraint" | "constraints" | "rule" => Some(MemoryCategory::Constraint),
            "preference" | "preferences" | "like" | "dislike" => Some(MemoryCategory::Preference),
            "goal" | "goals" | "objective" => Some(MemoryCategory::Goal),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryTier {
    ShortTerm,
    LongTerm,
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::ShortTerm => "SHORT_TERM",
            MemoryTier::LongTerm => "LONG_TERM",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SHORT_TERM" => Some(MemoryTier::ShortTerm),
            "LONG_TERM" => Some(MemoryTier::LongTerm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMemory {
    pub id: MemoryId,
    pub user_id: UserId,
    pub text: String,
    pub category: MemoryCategory,
    pub confidence: f64,
    pub tier: MemoryTier,
    pub access_count: u32,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Point up to which idle time has already been charged by decay.
    #[serde(default)]
    pub decayed_at: Option<DateTime<Utc>>,
}

impl UserMemory {
    /// A freshly extracted fact: full confidence, one access.
    pub fn new(user_id: UserId, text: impl Into<String>, category: MemoryCategory) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            user_id,
            text: text.into(),
            category,
            confidence: 1.0,
            tier: MemoryTier::ShortTerm,
            access_count: 1,
            last_accessed: now,
            created_at: now,
            decayed_at: None,
        }
    }

    pub fn is_long_term(&self) -> bool {
        self.tier == MemoryTier::LongTerm
    }

    /// Whole days of idleness not yet charged by a previous decay pass.
    pub fn idle_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.decay_anchor()).num_days().max(0)
    }

    fn decay_anchor(&self) -> DateTime<Utc> {
        match self.decayed_at {
            Some(checkpoint) if checkpoint > self.last_accessed => checkpoint,
            _ => self.last_accessed,
        }
    }

    /// Apply decay for the uncharged idle days. Returns true when confidence changed.
    ///
    /// LONG_TERM records and records touched today are left alone.
    pub fn apply_decay(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_long_term() {
            return false;
        }
        let days = self.idle_days(now);
        if days <= 0 {
            return false;
        }
        let decayed = decay(self.confidence, days);
        // Only charged days move the checkpoint; the partial day carries over
        self.decayed_at = Some(self.decay_anchor() + Duration::days(days));
        if (decayed - self.confidence).abs() < f64::EPSILON {
            return false;
        }
        self.confidence = decayed;
        true
    }

    pub fn should_prune(&self) -> bool {
        !self.is_long_term() && self.confidence < PRUNE_THRESHOLD
    }

    pub fn is_promotable(&self) -> bool {
        !self.is_long_term()
            && self.confidence >= PROMOTION_CONFIDENCE
            && self.access_count >= PROMOTION_ACCESS_COUNT
    }

    /// SHORT_TERM → LONG_TERM. A no-op on records that are already LONG_TERM.
    pub fn promote(&mut self) {
        self.tier = MemoryTier::LongTerm;
    }

    /// The same fact was observed again.
    pub fn reinforce(&mut self, now: DateTime<Utc>) {
        self.confidence = 1.0;
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
    }

    /// The memory was handed to the planner as context.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
    }

    /// `1 / (1 + 0.1 * days_since_access)`
    pub fn recency_weight(&self, now: DateTime<Utc>) -> f64 {
        let days = (now - self.last_accessed).num_days().max(0) as f64;
        1.0 / (1.0 + days * DECAY_RATE_PER_DAY)
    }

    pub fn priority(&self, now: DateTime<Utc>) -> f64 {
        self.confidence * self.recency_weight(now)
    }
}

/// `max(0, confidence - 0.1 * days)`, rounded to three decimals.
pub fn decay(confidence: f64, days: i64) -> f64 {
    let days = days.max(0) as f64;
    let value = (confidence - DECAY_RATE_PER_DAY * days).max(0.0);
    (value * 1000.0).round() / 1000.0
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// `|A ∩ B| / max(|A|, |B|)` over lower-cased word sets.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let left = word_set(a);
    let right = word_set(b);
    let larger = left.len().max(right.len());
    if larger == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / larger as f64
}

/// Whether `candidate` restates `existing` closely enough to reinforce it.
pub fn is_same_fact(existing: &str, candidate: &str) -> bool {
    if existing.trim().eq_ignore_ascii_case(candidate.trim()) {
        return true;
    }
    word_overlap(existing, candidate) >= REINFORCEMENT_OVERLAP
}
