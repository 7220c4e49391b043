// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use lifeos_cortex::application::{EventBus, LifecycleReport, MemoryService, StandardMemoryService};
use lifeos_cortex::domain::{CortexEvent, MemoryCategory, MemoryTier, UserId, UserMemory};
use lifeos_cortex::infrastructure::{InMemoryMemoryRepository, MemoryRepository};

struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish(&self, _event: CortexEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

fn setup() -> (Arc<StandardMemoryService>, Arc<InMemoryMemoryRepository>) {
    let repo = Arc::new(InMemoryMemoryRepository::new());
    let service = Arc::new(StandardMemoryService::new(repo.clone(), Arc::new(NullEventBus)));
    (service, repo)
}

#[tokio::test]
async fn test_repeated_fact_reinforces_single_record() {
    let (service, repo) = setup();
    let user = UserId::new();

    service.add_memory(user, "I am vegetarian", MemoryCategory::Preference).await.unwrap();
    service.add_memory(user, "I am vegetarian", MemoryCategory::Preference).await.unwrap();

    let memories = repo.find_by_user(user).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].access_count, 2);
    assert_eq!(memories[0].confidence, 1.0);
}

#[tokio::test]
async fn test_concurrent_identical_submissions_collapse() {
    let (service, repo) = setup();
    let user = UserId::new();
    let submissions = 10;

    let mut handles = Vec::new();
    for _ in 0..submissions {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .add_memory(user, "Gym on Mondays and Thursdays", MemoryCategory::Goal)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let memories = repo.find_by_user(user).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].access_count, submissions);
    assert_eq!(memories[0].confidence, 1.0);
}

#[tokio::test]
async fn test_promotion_at_exact_thresholds() {
    let (service, repo) = setup();
    let user = UserId::new();

    let mut ready = UserMemory::new(user, "Reads before bed", MemoryCategory::Preference);
    ready.confidence = 0.8;
    ready.access_count = 3;
    let mut not_ready = UserMemory::new(user, "Drinks green tea", MemoryCategory::Preference);
    not_ready.confidence = 0.8;
    not_ready.access_count = 2;
    repo.insert(&ready).await.unwrap();
    repo.insert(&not_ready).await.unwrap();

    let report = service.run_lifecycle(user).await.unwrap();
    assert_eq!(report.promoted, 1);

    let promoted = repo.find_by_id(ready.id).await.unwrap().unwrap();
    assert_eq!(promoted.tier, MemoryTier::LongTerm);
    let unchanged = repo.find_by_id(not_ready.id).await.unwrap().unwrap();
    assert_eq!(unchanged.tier, MemoryTier::ShortTerm);
}

#[tokio::test]
async fn test_long_term_memories_are_exempt() {
    let (service, repo) = setup();
    let user = UserId::new();

    let mut anchored = UserMemory::new(user, "Allergic to peanuts", MemoryCategory::Constraint);
    anchored.tier = MemoryTier::LongTerm;
    anchored.confidence = 0.9;
    anchored.last_accessed = Utc::now() - Duration::days(60);
    repo.insert(&anchored).await.unwrap();

    let report = service.run_lifecycle(user).await.unwrap();
    assert_eq!(report, LifecycleReport::default());

    let stored = repo.find_by_id(anchored.id).await.unwrap().unwrap();
    assert_eq!(stored.confidence, 0.9);
    assert_eq!(stored.tier, MemoryTier::LongTerm);
}

#[tokio::test]
async fn test_prune_removes_short_term_below_threshold() {
    let (service, repo) = setup();
    let user = UserId::new();

    let mut weak = UserMemory::new(user, "Might take up surfing", MemoryCategory::Goal);
    weak.confidence = 0.29;
    let mut borderline = UserMemory::new(user, "Prefers quiet mornings", MemoryCategory::Preference);
    borderline.confidence = 0.3;
    repo.insert(&weak).await.unwrap();
    repo.insert(&borderline).await.unwrap();

    let report = service.run_lifecycle(user).await.unwrap();
    assert_eq!(report.pruned, 1);
    assert!(repo.find_by_id(weak.id).await.unwrap().is_none());
    assert!(repo.find_by_id(borderline.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_decay_is_not_charged_twice() {
    let (service, repo) = setup();
    let user = UserId::new();

    let mut idle = UserMemory::new(user, "Journals on Sundays", MemoryCategory::Preference);
    idle.last_accessed = Utc::now() - Duration::days(2);
    repo.insert(&idle).await.unwrap();

    service.run_lifecycle(user).await.unwrap();
    service.run_lifecycle(user).await.unwrap();

    let stored = repo.find_by_id(idle.id).await.unwrap().unwrap();
    assert_eq!(stored.confidence, 0.8);
}

#[tokio::test]
async fn test_partial_idle_days_carry_over_between_sweeps() {
    let user = UserId::new();
    let t0 = Utc::now();
    let mut memory = UserMemory::new(user, "Reads before bed", MemoryCategory::Preference);
    memory.last_accessed = t0;

    // 36h: one whole day charged, the remaining 12h stay owed
    assert!(memory.apply_decay(t0 + Duration::hours(36)));
    assert_eq!(memory.confidence, 0.9);

    // 72h total: two more whole days since the last charged day
    assert!(memory.apply_decay(t0 + Duration::hours(72)));
    assert_eq!(memory.confidence, 0.7);
    assert_eq!(memory.decayed_at, Some(t0 + Duration::days(3)));
}
