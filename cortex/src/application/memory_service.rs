// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # MemoryService: Memory Lifecycle Engine
//!
//! Application service for a user's long-term memory.
//!
//! ## Lifecycle run
//!
//! `run_lifecycle` processes every SHORT_TERM record of a user, in this
//! order:
//!
//! 1. **Decay**: lose `0.1` confidence per idle day not yet charged.
//! 2. **Prune**: delete the record if confidence fell below `0.3`.
//! 3. **Promote**: move to LONG_TERM at confidence `>= 0.8` with at least
//!    three accesses.
//!
//! LONG_TERM records are skipped entirely.
//!
//! ## Reinforcement
//!
//! `add_memory` never creates a near-duplicate. A fact that restates an
//! existing memory of the same category (exact match or 80% word overlap)
//! resets that memory's confidence to 1.0 and bumps its access count.
//!
//! ## Prioritized context
//!
//! `get_prioritized_context` ranks by `confidence × recency_weight` and marks
//! the returned memories as accessed. Being used as context is itself a
//! reinforcement signal.

use std::sync::Arc;
use async_trait::async_trait;
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::application::rag_manager::{RagManager, RetrievalError};
use crate::domain::{
    is_same_fact, CortexEvent, MemoryCategory, MemoryTier, RetrievalResult, UserId, UserMemory,
    MAX_MEMORY_TEXT_LEN, PRUNE_THRESHOLD,
};
use crate::infrastructure::MemoryRepository;

/// Event bus trait for publishing domain events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: CortexEvent) -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Invalid memory: {0}")]
    Validation(String),

    #[error("Memory storage failed: {0}")]
    Storage(#[from] anyhow::Error),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// Counts produced by one lifecycle run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleReport {
    pub decayed: usize,
    pub pruned: usize,
    pub promoted: usize,
}

impl LifecycleReport {
    pub fn merge(&mut self, other: LifecycleReport) {
        self.decayed += other.decayed;
        self.pruned += other.pruned;
        self.promoted += other.promoted;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Created(UserMemory),
    Reinforced(UserMemory),
}

impl IngestOutcome {
    pub fn memory(&self) -> &UserMemory {
        match self {
            IngestOutcome::Created(m) | IngestOutcome::Reinforced(m) => m,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, IngestOutcome::Created(_))
    }
}

/// A memory as handed to the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedMemory {
    pub text: String,
    pub category: MemoryCategory,
    pub tier: MemoryTier,
    pub confidence: f64,
    pub priority: f64,
}

#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Store a fact, reinforcing an existing same-category memory when it matches
    async fn add_memory(
        &self,
        user_id: UserId,
        text: &str,
        category: MemoryCategory,
    ) -> Result<IngestOutcome, MemoryError>;

    /// Decay, prune and promote one user's memories
    async fn run_lifecycle(&self, user_id: UserId) -> Result<LifecycleReport, MemoryError>;

    /// Top memories by `confidence × recency_weight`; marks them accessed
    async fn get_prioritized_context(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<PrioritizedMemory>, MemoryError>;

    /// Vector search over rules visible to the user
    async fn query_memory(
        &self,
        user_id: UserId,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievalResult>, MemoryError>;

    async fn list_memories(&self, user_id: UserId) -> Result<Vec<UserMemory>, MemoryError>;

    async fn users_with_memories(&self) -> Result<Vec<UserId>, MemoryError>;
}

pub struct StandardMemoryService {
    memory_repo: Arc<dyn MemoryRepository>,
    event_bus: Arc<dyn EventBus>,
    retriever: Option<Arc<RagManager>>,
    ingest_lock: tokio::sync::Mutex<()>,
}

impl StandardMemoryService {
    pub fn new(memory_repo: Arc<dyn MemoryRepository>, event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            memory_repo,
            event_bus,
            retriever: None,
            ingest_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<RagManager>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    fn validate_text(text: &str) -> Result<&str, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::Validation("memory text cannot be empty".into()));
        }
        if text.chars().count() > MAX_MEMORY_TEXT_LEN {
            return Err(MemoryError::Validation(format!(
                "memory text exceeds {} characters",
                MAX_MEMORY_TEXT_LEN
            )));
        }
        Ok(text)
    }

    async fn publish(&self, event: CortexEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            warn!("Failed to publish cortex event: {}", e);
        }
    }
}

#[async_trait]
impl MemoryService for StandardMemoryService {
    async fn add_memory(
        &self,
        user_id: UserId,
        text: &str,
        category: MemoryCategory,
    ) -> Result<IngestOutcome, MemoryError> {
        let text = Self::validate_text(text)?;

        // Serialise the match-then-write so concurrent ingests of the same fact
        // cannot both miss and insert.
        let _guard = self.ingest_lock.lock().await;

        let candidates = self.memory_repo.find_by_category(user_id, category).await?;
        if let Some(mut existing) = candidates.into_iter().find(|m| is_same_fact(&m.text, text)) {
            let old_confidence = existing.confidence;
            existing.reinforce(Utc::now());
            self.memory_repo.update(&existing).await?;

            debug!(
                memory_id = %existing.id.0,
                access_count = existing.access_count,
                "Reinforced existing memory"
            );
            self.publish(CortexEvent::MemoryReinforced {
                memory_id: existing.id,
                user_id,
                old_confidence,
                access_count: existing.access_count,
                timestamp: Utc::now(),
            })
            .await;
            return Ok(IngestOutcome::Reinforced(existing));
        }

        let memory = UserMemory::new(user_id, text, category);
        self.memory_repo.insert(&memory).await?;

        info!(user_id = %user_id, category = %category, "Stored new memory");
        self.publish(CortexEvent::MemoryStored {
            memory_id: memory.id,
            user_id,
            category,
            timestamp: Utc::now(),
        })
        .await;
        Ok(IngestOutcome::Created(memory))
    }

    async fn run_lifecycle(&self, user_id: UserId) -> Result<LifecycleReport, MemoryError> {
        let now = Utc::now();
        let memories = self.memory_repo.find_by_user(user_id).await?;
        let mut report = LifecycleReport::default();

        for original in memories.into_iter().filter(|m| !m.is_long_term()) {
            let mut memory = original.clone();

            if memory.apply_decay(now) {
                report.decayed += 1;
            }

            if memory.should_prune() {
                self.memory_repo.delete(memory.id).await?;
                report.pruned += 1;
                self.publish(CortexEvent::MemoryPruned {
                    memory_id: memory.id,
                    user_id,
                    final_confidence: memory.confidence,
                    timestamp: now,
                })
                .await;
                continue;
            }

            if memory.is_promotable() {
                memory.promote();
                report.promoted += 1;
                self.publish(CortexEvent::MemoryPromoted {
                    memory_id: memory.id,
                    user_id,
                    confidence: memory.confidence,
                    access_count: memory.access_count,
                    timestamp: now,
                })
                .await;
            }

            if memory != original {
                self.memory_repo.update(&memory).await?;
            }
        }

        metrics::counter!("lifeos_memory_pruned_total").increment(report.pruned as u64);
        info!(
            user_id = %user_id,
            decayed = report.decayed,
            pruned = report.pruned,
            promoted = report.promoted,
            "Memory lifecycle completed"
        );
        self.publish(CortexEvent::LifecycleCompleted {
            user_id,
            decayed: report.decayed,
            pruned: report.pruned,
            promoted: report.promoted,
            timestamp: now,
        })
        .await;

        Ok(report)
    }

    async fn get_prioritized_context(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<PrioritizedMemory>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();

        let mut ranked: Vec<(f64, UserMemory)> = self
            .memory_repo
            .find_by_user(user_id)
            .await?
            .into_iter()
            .filter(|m| m.confidence >= PRUNE_THRESHOLD)
            .map(|m| (m.priority(now), m))
            .collect();

        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);

        let mut context = Vec::with_capacity(ranked.len());
        for (priority, mut memory) in ranked {
            let snapshot = PrioritizedMemory {
                text: memory.text.clone(),
                category: memory.category,
                tier: memory.tier,
                confidence: memory.confidence,
                priority,
            };
            memory.touch(now);
            self.memory_repo.update(&memory).await?;
            context.push(snapshot);
        }

        Ok(context)
    }

    async fn query_memory(
        &self,
        user_id: UserId,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievalResult>, MemoryError> {
        let Some(retriever) = &self.retriever else {
            debug!("No retriever configured, returning empty memory query");
            return Ok(Vec::new());
        };
        let scope = user_id.to_string();
        Ok(retriever.query_scoped(text, k, Some(&scope)).await?)
    }

    async fn list_memories(&self, user_id: UserId) -> Result<Vec<UserMemory>, MemoryError> {
        Ok(self.memory_repo.find_by_user(user_id).await?)
    }

    async fn users_with_memories(&self) -> Result<Vec<UserId>, MemoryError> {
        Ok(self.memory_repo.list_users().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryMemoryRepository;
    use chrono::Duration;

    struct MockEventBus {
        events: std::sync::Mutex<Vec<CortexEvent>>,
    }

    impl MockEventBus {
        fn new() -> Self {
            Self {
                events: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EventBus for MockEventBus {
        async fn publish(&self, event: CortexEvent) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn service() -> (StandardMemoryService, Arc<InMemoryMemoryRepository>, Arc<MockEventBus>) {
        let repo = Arc::new(InMemoryMemoryRepository::new());
        let bus = Arc::new(MockEventBus::new());
        let service = StandardMemoryService::new(repo.clone(), bus.clone());
        (service, repo, bus)
    }

    #[tokio::test]
    async fn test_add_memory_validates_text() {
        let (service, _, _) = service();
        let user = UserId::new();

        assert!(matches!(
            service.add_memory(user, "   ", MemoryCategory::Goal).await,
            Err(MemoryError::Validation(_))
        ));
        let long = "a".repeat(MAX_MEMORY_TEXT_LEN + 1);
        assert!(matches!(
            service.add_memory(user, &long, MemoryCategory::Goal).await,
            Err(MemoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reinforcement_requires_same_category() {
        let (service, repo, _) = service();
        let user = UserId::new();

        service.add_memory(user, "No meetings on Friday", MemoryCategory::Constraint).await.unwrap();
        let outcome = service
            .add_memory(user, "No meetings on Friday", MemoryCategory::Preference)
            .await
            .unwrap();

        assert!(outcome.is_new());
        assert_eq!(repo.find_by_user(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reinforcement_resets_confidence() {
        let (service, repo, bus) = service();
        let user = UserId::new();

        let created = service.add_memory(user, "I am vegetarian", MemoryCategory::Preference).await.unwrap();
        let mut stored = created.memory().clone();
        stored.confidence = 0.4;
        repo.update(&stored).await.unwrap();

        let outcome = service.add_memory(user, "i am vegetarian", MemoryCategory::Preference).await.unwrap();
        assert!(!outcome.is_new());
        assert_eq!(outcome.memory().confidence, 1.0);
        assert_eq!(outcome.memory().access_count, 2);

        let events = bus.events.lock().unwrap();
        assert!(matches!(events.last(), Some(CortexEvent::MemoryReinforced { old_confidence, .. }) if *old_confidence == 0.4));
    }

    #[tokio::test]
    async fn test_lifecycle_order_decay_then_prune() {
        let (service, repo, _) = service();
        let user = UserId::new();

        // 0.5 - 3 days * 0.1 = 0.2 < 0.3, pruned in the same run
        let mut fading = UserMemory::new(user, "Try pottery", MemoryCategory::Goal);
        fading.confidence = 0.5;
        fading.last_accessed = Utc::now() - Duration::days(3);
        repo.insert(&fading).await.unwrap();

        let report = service.run_lifecycle(user).await.unwrap();
        assert_eq!(report, LifecycleReport { decayed: 1, pruned: 1, promoted: 0 });
        assert!(repo.find_by_id(fading.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prioritized_context_ranks_and_touches() {
        let (service, repo, _) = service();
        let user = UserId::new();

        let mut stale = UserMemory::new(user, "Likes jazz", MemoryCategory::Preference);
        stale.last_accessed = Utc::now() - Duration::days(10);
        let fresh = UserMemory::new(user, "Training for 10k", MemoryCategory::Goal);
        let mut weak = UserMemory::new(user, "Maybe learn chess", MemoryCategory::Goal);
        weak.confidence = 0.2;
        for m in [&stale, &fresh, &weak] {
            repo.insert(m).await.unwrap();
        }

        let context = service.get_prioritized_context(user, 5).await.unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].text, "Training for 10k");
        assert_eq!(context[1].text, "Likes jazz");

        let touched = repo.find_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(touched.access_count, 2);
        assert!(touched.last_accessed > stale.last_accessed);

        let untouched = repo.find_by_id(weak.id).await.unwrap().unwrap();
        assert_eq!(untouched.access_count, 1);
    }

    #[tokio::test]
    async fn test_prioritized_context_limit() {
        let (service, _, _) = service();
        let user = UserId::new();
        for text in ["a b", "c d", "e f"] {
            service.add_memory(user, text, MemoryCategory::Goal).await.unwrap();
        }
        assert_eq!(service.get_prioritized_context(user, 2).await.unwrap().len(), 2);
        assert!(service.get_prioritized_context(user, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_memory_without_retriever_is_empty() {
        let (service, _, _) = service();
        let results = service.query_memory(UserId::new(), "anything", 3).await.unwrap();
        assert!(results.is_empty());
    }
}
