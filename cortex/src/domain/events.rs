// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the Cortex bounded context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::memory::{MemoryCategory, MemoryId, UserId};

/// Cortex domain events
/// These events are published to the EventBus for observability and integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CortexEvent {
    /// A new fact was stored as a SHORT_TERM memory
    MemoryStored {
        memory_id: MemoryId,
        user_id: UserId,
        category: MemoryCategory,
        timestamp: DateTime<Utc>,
    },

    /// An incoming fact matched an existing memory instead of creating a row
    MemoryReinforced {
        memory_id: MemoryId,
        user_id: UserId,
        old_confidence: f64,
        access_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// A memory crossed the promotion threshold
    MemoryPromoted {
        memory_id: MemoryId,
        user_id: UserId,
        confidence: f64,
        access_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// A SHORT_TERM memory fell below the prune threshold and was deleted
    MemoryPruned {
        memory_id: MemoryId,
        user_id: UserId,
        final_confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// A lifecycle run finished for one user
    LifecycleCompleted {
        user_id: UserId,
        decayed: usize,
        pruned: usize,
        promoted: usize,
        timestamp: DateTime<Utc>,
    },

    /// The vector index was rebuilt from the corpus
    IndexRebuilt {
        indexed_entries: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl CortexEvent {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CortexEvent::MemoryStored { user_id, .. }
            | CortexEvent::MemoryReinforced { user_id, .. }
            | CortexEvent::MemoryPromoted { user_id, .. }
            | CortexEvent::MemoryPruned { user_id, .. }
            | CortexEvent::LifecycleCompleted { user_id, .. } => Some(*user_id),
            CortexEvent::IndexRebuilt { .. } => None,
        }
    }
}
