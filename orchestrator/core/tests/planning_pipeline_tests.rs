// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

use lifeos_cortex::domain::MemoryCategory;
use lifeos_cortex::infrastructure::HashEmbeddingClient;
use lifeos_orchestrator_core::application::{PlanningError, PlanningRuntime, Repositories};
use lifeos_orchestrator_core::domain::config::LifeOsConfigSpec;
use lifeos_orchestrator_core::domain::llm::{
    FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage,
};
use lifeos_orchestrator_core::domain::{
    ClockTime, PlanRepository, PlanStatus, PlanType, ProfileRepository, TaskStatus, UserId,
    UserProfile,
};
use lifeos_orchestrator_core::infrastructure::event_bus::EventBus;
use lifeos_orchestrator_core::infrastructure::llm::registry::ProviderRegistry;
use lifeos_orchestrator_core::infrastructure::NoopCalendarSync;

struct OfflineBackend;

#[async_trait]
impl LLMProvider for OfflineBackend {
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        Err(LLMError::Network("connection refused".to_string()))
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Err(LLMError::Network("connection refused".to_string()))
    }
}

/// Answers fact-extraction prompts with a fact and plan prompts with a plan
struct ScriptedBackend;

#[async_trait]
impl LLMProvider for ScriptedBackend {
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        let text = if prompt.contains("Memory Extractor") {
            r#"{"found": true, "fact": "I train for a marathon", "category": "goal"}"#
        } else {
            r#"{"plan_summary": "Training day", "tasks": [
                {"title": "Morning run", "category": "health", "start_time": "07:00", "end_time": "08:00", "priority": 1},
                {"title": "Work", "category": "work", "start_time": "09:00", "end_time": "17:00", "priority": 2}
            ]}"#
        };
        Ok(GenerationResponse {
            text: text.to_string(),
            usage: TokenUsage::default(),
            provider: "scripted".to_string(),
            model: "test".to_string(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

struct Harness {
    runtime: PlanningRuntime,
    repositories: Repositories,
    _dir: tempfile::TempDir,
}

fn harness(backend: Arc<dyn LLMProvider>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = LifeOsConfigSpec::default();
    spec.generation.retry_base_delay_ms = 1;
    spec.rag.corpus_path = dir.path().join("data.json");
    spec.rag.index_path = dir.path().join("index.json");

    let mut registry = ProviderRegistry::default();
    registry.register("test", spec.generation.model_alias.clone(), "test", backend);

    let repositories = Repositories::in_memory();
    let runtime = PlanningRuntime::build(
        &spec,
        repositories.clone(),
        Arc::new(registry),
        Arc::new(HashEmbeddingClient::new(32)),
        Arc::new(NoopCalendarSync),
        EventBus::new(256),
    )
    .unwrap();

    Harness {
        runtime,
        repositories,
        _dir: dir,
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

#[tokio::test]
async fn test_offline_backend_yields_fallback_day() {
    let h = harness(Arc::new(OfflineBackend));
    let user = UserId::new();
    let mut profile = UserProfile::with_defaults(user);
    profile.wake_time = ClockTime::hm(7, 0);
    profile.work_start_time = ClockTime::hm(9, 0);
    profile.work_end_time = ClockTime::hm(18, 0);
    profile.sleep_time = ClockTime::hm(23, 0);
    h.repositories.profiles.save_profile(&profile).await.unwrap();

    let generated = h
        .runtime
        .pipeline
        .generate_plan(user, PlanType::Daily, date(), "plan my day")
        .await
        .unwrap();

    assert!(generated.used_fallback);
    assert!(!generated.plan.summary.is_empty());
    assert!(generated.tasks.len() >= 5);
    assert!(!generated.clarification_questions.is_empty());

    let titles: Vec<&str> = generated.tasks.iter().map(|t| t.title.as_str()).collect();
    for expected in ["Morning Routine", "Work Block", "Lunch", "Afternoon Work Block", "Evening Wind-down"] {
        assert!(titles.contains(&expected), "missing {expected}");
    }

    let windows: Vec<(ClockTime, ClockTime)> = generated.tasks.iter().filter_map(|t| t.window()).collect();
    for pair in windows.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlap between {:?} and {:?}", pair[0], pair[1]);
    }
}

#[tokio::test]
async fn test_concurrent_approvals_exactly_one_wins() {
    let h = harness(Arc::new(OfflineBackend));
    let user = UserId::new();
    let generated = h
        .runtime
        .pipeline
        .generate_plan(user, PlanType::Daily, date(), "")
        .await
        .unwrap();
    let plan_id = generated.plan.id;

    let first = {
        let pipeline = h.runtime.pipeline.clone();
        tokio::spawn(async move { pipeline.approve(plan_id, 1).await })
    };
    let second = {
        let pipeline = h.runtime.pipeline.clone();
        tokio::spawn(async move { pipeline.approve(plan_id, 1).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].version, 2);
    assert_eq!(winners[0].status, PlanStatus::Approved);

    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, PlanningError::Conflict { expected: 1, actual: 2, .. }));
    assert!(loser.is_retryable());
}

#[tokio::test]
async fn test_repeated_fact_is_reinforced_not_duplicated() {
    let h = harness(Arc::new(OfflineBackend));
    let user = UserId::new();

    let first = h
        .runtime
        .pipeline
        .add_memory(user, "I am vegetarian", MemoryCategory::Constraint)
        .await
        .unwrap();
    assert!(first.is_new());
    let second = h
        .runtime
        .pipeline
        .add_memory(user, "I am vegetarian", MemoryCategory::Constraint)
        .await
        .unwrap();
    assert!(!second.is_new());

    let memories = h.runtime.pipeline.list_memories(user).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].confidence, 1.0);
    assert_eq!(memories[0].access_count, 2);
}

#[tokio::test]
async fn test_request_context_becomes_retrievable_memory() {
    let h = harness(Arc::new(ScriptedBackend));
    h.runtime.start_workers().unwrap();
    let user = UserId::new();

    let generated = h
        .runtime
        .pipeline
        .generate_plan(user, PlanType::Daily, date(), "I am training for a marathon")
        .await
        .unwrap();
    assert!(!generated.used_fallback);
    assert_eq!(generated.plan.summary, "Training day");

    assert!(h.runtime.jobs.wait_idle(Duration::from_secs(5)).await);

    let memories = h.runtime.pipeline.list_memories(user).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].category, MemoryCategory::Goal);

    let rules = h
        .runtime
        .pipeline
        .query_memory(user, "marathon", 3)
        .await
        .unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].text, "I train for a marathon");

    let other_user = h
        .runtime
        .pipeline
        .query_memory(UserId::new(), "marathon", 3)
        .await
        .unwrap();
    assert!(other_user.is_empty());

    let health = h.runtime.pipeline.health_check().await;
    assert_eq!(health.indexed_entries, 1);
    assert!(!health.index_stale);

    h.runtime.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_replan_swaps_tasks_and_tracks_progress() {
    let h = harness(Arc::new(ScriptedBackend));
    let user = UserId::new();
    let generated = h
        .runtime
        .pipeline
        .generate_plan(user, PlanType::Daily, date(), "")
        .await
        .unwrap();
    let plan_id = generated.plan.id;

    let done = h
        .runtime
        .pipeline
        .set_task_status(generated.tasks[0].id, TaskStatus::Done)
        .await
        .unwrap();
    assert_eq!(done.plan_progress, 50.0);

    let revised = h
        .runtime
        .pipeline
        .replan(plan_id, 1, "run later in the evening")
        .await
        .unwrap();
    assert_eq!(revised.plan.version, 2);
    assert_eq!(revised.plan.progress, 0.0);
    assert_eq!(revised.tasks.len(), 2);
    assert!(revised.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    assert!(revised.tasks.iter().all(|t| !generated.tasks.iter().any(|old| old.id == t.id)));

    let stale = h
        .runtime
        .pipeline
        .replan(plan_id, 1, "skip the run")
        .await
        .unwrap_err();
    assert!(matches!(stale, PlanningError::Conflict { expected: 1, actual: 2, .. }));

    let (stored, tasks) = h.runtime.pipeline.get_plan(plan_id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(tasks, revised.tasks);
}

#[tokio::test]
async fn test_replan_without_model_keeps_plan() {
    let h = harness(Arc::new(OfflineBackend));
    let user = UserId::new();
    let generated = h
        .runtime
        .pipeline
        .generate_plan(user, PlanType::Daily, date(), "")
        .await
        .unwrap();

    let err = h
        .runtime
        .pipeline
        .replan(generated.plan.id, 1, "make it lighter")
        .await
        .unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));

    let stored = h.repositories.plans.find_by_id(generated.plan.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(h.repositories.plans.find_tasks(generated.plan.id).await.unwrap(), generated.tasks);
}
