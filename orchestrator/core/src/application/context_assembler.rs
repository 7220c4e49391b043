// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context Assembler
//!
//! First stage of the planning pipeline. Gathers everything the generator
//! needs into a [`GenerationPayload`]:
//!
//! - the profile (defaults when the user has none)
//! - stats for the last 7 plans of the same type, and failure slots
//! - the routine template for the target weekday
//! - "rules of life" retrieved for the request, unless it is generic
//! - prioritised long-term memories
//! - for daily plans, the summary of the current weekly plan
//!
//! Every optional section degrades to empty on failure. Payloads are cached
//! per `(user, plan type, date, sha256(context))` with a fixed TTL and no
//! write invalidation, so a profile edit can take up to one TTL to show up.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use lifeos_cortex::application::{MemoryService, PrioritizedMemory};
use lifeos_cortex::domain::RetrievalResult;

use crate::domain::config::{CacheConfig, GenerationConfig};
use crate::domain::plan::{FailurePattern, PlanStats, PlanStatus, PlanType};
use crate::domain::profile::{RoutineTemplate, UserId, UserProfile};
use crate::domain::repository::{PlanRepository, ProfileRepository};
use crate::infrastructure::cache::KeyValueCache;

use super::history::{failure_patterns, plan_stats};

/// Requests that carry no information worth a retrieval round-trip
pub const GENERIC_REQUESTS: [&str; 5] = [
    "plan my day",
    "plan today",
    "what should i do",
    "generate plan",
    "plan my day today",
];

/// Plans considered for stats and failure patterns
pub const STATS_WINDOW: usize = 7;

/// How far back a weekly plan still frames a daily one
const WEEK_SPAN_DAYS: i64 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPayload {
    pub user_id: UserId,
    pub plan_type: PlanType,
    pub date: NaiveDate,
    pub request: String,
    pub profile: UserProfile,
    pub stats: Vec<PlanStats>,
    pub patterns: Vec<FailurePattern>,
    pub routine: Option<RoutineTemplate>,
    pub rules: Vec<RetrievalResult>,
    pub memories: Vec<PrioritizedMemory>,
    pub hierarchy: Option<String>,
}

pub fn is_generic_request(context: &str) -> bool {
    let normalized = context.trim().to_lowercase();
    normalized.is_empty() || GENERIC_REQUESTS.contains(&normalized.as_str())
}

pub struct ContextAssembler {
    profiles: Arc<dyn ProfileRepository>,
    plans: Arc<dyn PlanRepository>,
    memory: Arc<dyn MemoryService>,
    cache: Arc<dyn KeyValueCache>,
    cache_ttl: Duration,
    rules_k: usize,
    memory_limit: usize,
}

impl ContextAssembler {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        plans: Arc<dyn PlanRepository>,
        memory: Arc<dyn MemoryService>,
        cache: Arc<dyn KeyValueCache>,
        generation: &GenerationConfig,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            profiles,
            plans,
            memory,
            cache,
            cache_ttl: Duration::from_secs(cache_config.context_ttl_seconds),
            rules_k: generation.rules_k,
            memory_limit: generation.memory_limit,
        }
    }

    pub async fn assemble(
        &self,
        user_id: UserId,
        plan_type: PlanType,
        date: NaiveDate,
        context: &str,
    ) -> GenerationPayload {
        let request = context.trim().to_string();
        let key = cache_key(user_id, plan_type, date, &request);

        if let Some(cached) = self.cache.get(&key) {
            match serde_json::from_str::<GenerationPayload>(&cached) {
                Ok(payload) => {
                    debug!(%user_id, %plan_type, "Generation payload served from cache");
                    return payload;
                }
                Err(e) => warn!("Discarding unreadable cached payload: {}", e),
            }
        }

        let payload = self.build(user_id, plan_type, date, request).await;

        match serde_json::to_string(&payload) {
            Ok(serialized) => self.cache.set(&key, serialized, self.cache_ttl),
            Err(e) => warn!("Failed to cache generation payload: {}", e),
        }
        payload
    }

    async fn build(
        &self,
        user_id: UserId,
        plan_type: PlanType,
        date: NaiveDate,
        request: String,
    ) -> GenerationPayload {
        let profile = match self.profiles.find_profile(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::with_defaults(user_id),
            Err(e) => {
                warn!(%user_id, "Profile lookup failed, using defaults: {}", e);
                degraded("profile");
                UserProfile::with_defaults(user_id)
            }
        };

        let ((stats, patterns), routine, rules, memories) = tokio::join!(
            self.history(user_id, plan_type),
            self.routine(user_id, date),
            self.rules(user_id, &request),
            self.memories(user_id),
        );
        let hierarchy = if plan_type == PlanType::Daily {
            self.weekly_frame(user_id, date).await
        } else {
            None
        };

        debug!(
            %user_id,
            %plan_type,
            stats = stats.len(),
            patterns = patterns.len(),
            rules = rules.len(),
            memories = memories.len(),
            has_routine = routine.is_some(),
            "Generation payload assembled"
        );

        GenerationPayload {
            user_id,
            plan_type,
            date,
            request,
            profile,
            stats,
            patterns,
            routine,
            rules,
            memories,
            hierarchy,
        }
    }

    async fn history(&self, user_id: UserId, plan_type: PlanType) -> (Vec<PlanStats>, Vec<FailurePattern>) {
        let plans = match self.plans.recent_plans(user_id, Some(plan_type), STATS_WINDOW).await {
            Ok(plans) => plans,
            Err(e) => {
                warn!(%user_id, "Plan history unavailable: {}", e);
                degraded("history");
                return (Vec::new(), Vec::new());
            }
        };

        let task_lists = join_all(plans.iter().map(|plan| self.plans.find_tasks(plan.id))).await;

        let mut stats = Vec::with_capacity(plans.len());
        let mut all_tasks = Vec::new();
        for (plan, tasks) in plans.iter().zip(task_lists) {
            match tasks {
                Ok(tasks) => {
                    stats.push(plan_stats(plan, &tasks));
                    all_tasks.extend(tasks);
                }
                Err(e) => {
                    warn!(plan_id = %plan.id, "Task history unavailable: {}", e);
                    degraded("history");
                }
            }
        }

        let patterns = failure_patterns(&all_tasks);
        (stats, patterns)
    }

    async fn routine(&self, user_id: UserId, date: NaiveDate) -> Option<RoutineTemplate> {
        match self.profiles.find_routine(user_id, date.weekday()).await {
            Ok(routine) => routine,
            Err(e) => {
                warn!(%user_id, "Routine lookup failed: {}", e);
                degraded("routine");
                None
            }
        }
    }

    async fn rules(&self, user_id: UserId, request: &str) -> Vec<RetrievalResult> {
        if is_generic_request(request) {
            debug!(%user_id, "Generic request, skipping retrieval");
            return Vec::new();
        }
        match self.memory.query_memory(user_id, request, self.rules_k).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(%user_id, "Rule retrieval failed, continuing without it: {}", e);
                degraded("rag");
                Vec::new()
            }
        }
    }

    async fn memories(&self, user_id: UserId) -> Vec<PrioritizedMemory> {
        match self.memory.get_prioritized_context(user_id, self.memory_limit).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!(%user_id, "Memory context unavailable: {}", e);
                degraded("memory");
                Vec::new()
            }
        }
    }

    /// Summary of the latest non-rejected weekly plan covering `date`.
    async fn weekly_frame(&self, user_id: UserId, date: NaiveDate) -> Option<String> {
        let weeklies = match self.plans.recent_plans(user_id, Some(PlanType::Weekly), 5).await {
            Ok(plans) => plans,
            Err(e) => {
                warn!(%user_id, "Weekly plan lookup failed: {}", e);
                degraded("hierarchy");
                return None;
            }
        };
        let earliest = date - ChronoDuration::days(WEEK_SPAN_DAYS);

        weeklies
            .into_iter()
            .find(|p| p.status != PlanStatus::Rejected && p.date <= date && p.date >= earliest)
            .map(|p| p.summary)
    }
}

fn degraded(section: &'static str) {
    metrics::counter!("lifeos_retrieval_error_total", "section" => section).increment(1);
}

fn cache_key(user_id: UserId, plan_type: PlanType, date: NaiveDate, request: &str) -> String {
    let digest = Sha256::digest(request.as_bytes());
    format!(
        "lifeos:context:{}:{}:{}:{}",
        user_id,
        plan_type,
        date,
        hex::encode(digest)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::Plan;
    use crate::domain::profile::RoutineBlock;
    use crate::domain::task::{ClockTime, TaskCategory};
    use crate::infrastructure::cache::MokaCache;
    use crate::infrastructure::repositories::{InMemoryPlanRepository, InMemoryProfileRepository};
    use async_trait::async_trait;
    use chrono::Weekday;
    use lifeos_cortex::application::{IngestOutcome, LifecycleReport, MemoryError};
    use lifeos_cortex::domain::{MemoryCategory, MemoryTier, UserMemory};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockMemory {
        fail: bool,
        queries: AtomicUsize,
        context_calls: AtomicUsize,
    }

    #[async_trait]
    impl MemoryService for MockMemory {
        async fn add_memory(
            &self,
            _user_id: UserId,
            _text: &str,
            _category: MemoryCategory,
        ) -> Result<IngestOutcome, MemoryError> {
            Err(MemoryError::Validation("unused".into()))
        }

        async fn run_lifecycle(&self, _user_id: UserId) -> Result<LifecycleReport, MemoryError> {
            Ok(LifecycleReport::default())
        }

        async fn get_prioritized_context(
            &self,
            _user_id: UserId,
            _limit: usize,
        ) -> Result<Vec<PrioritizedMemory>, MemoryError> {
            self.context_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MemoryError::Storage(anyhow::anyhow!("db down")));
            }
            Ok(vec![PrioritizedMemory {
                text: "Vegetarian".into(),
                category: MemoryCategory::Constraint,
                tier: MemoryTier::LongTerm,
                confidence: 1.0,
                priority: 1.0,
            }])
        }

        async fn query_memory(
            &self,
            _user_id: UserId,
            text: &str,
            k: usize,
        ) -> Result<Vec<RetrievalResult>, MemoryError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MemoryError::Storage(anyhow::anyhow!("embedding backend down")));
            }
            Ok((1..=k)
                .map(|rank| RetrievalResult::from_distance(format!("{} rule {}", text, rank), rank as f64, rank))
                .collect())
        }

        async fn list_memories(&self, _user_id: UserId) -> Result<Vec<UserMemory>, MemoryError> {
            Ok(Vec::new())
        }

        async fn users_with_memories(&self) -> Result<Vec<UserId>, MemoryError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        assembler: ContextAssembler,
        memory: Arc<MockMemory>,
        profiles: Arc<InMemoryProfileRepository>,
        plans: Arc<InMemoryPlanRepository>,
    }

    fn fixture(memory: MockMemory) -> Fixture {
        let profiles = Arc::new(InMemoryProfileRepository::new());
        let plans = Arc::new(InMemoryPlanRepository::new());
        let memory = Arc::new(memory);
        let assembler = ContextAssembler::new(
            profiles.clone(),
            plans.clone(),
            memory.clone(),
            Arc::new(MokaCache::new(100)),
            &GenerationConfig::default(),
            &CacheConfig::default(),
        );
        Fixture {
            assembler,
            memory,
            profiles,
            plans,
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn test_generic_whitelist() {
        assert!(is_generic_request("  Plan my day "));
        assert!(is_generic_request("WHAT SHOULD I DO"));
        assert!(is_generic_request(""));
        assert!(!is_generic_request("plan my day around the dentist at 3pm"));
    }

    #[tokio::test]
    async fn test_generic_request_skips_retrieval() {
        let f = fixture(MockMemory::default());
        let payload = f
            .assembler
            .assemble(UserId::new(), PlanType::Daily, monday(), "plan today")
            .await;

        assert!(payload.rules.is_empty());
        assert_eq!(f.memory.queries.load(Ordering::SeqCst), 0);
        assert_eq!(payload.memories.len(), 1);
    }

    #[tokio::test]
    async fn test_specific_request_retrieves_rules() {
        let f = fixture(MockMemory::default());
        let payload = f
            .assembler
            .assemble(UserId::new(), PlanType::Daily, monday(), "exam prep this week")
            .await;

        assert_eq!(payload.rules.len(), GenerationConfig::default().rules_k);
        assert_eq!(payload.profile.wake_time, ClockTime::hm(7, 0));
    }

    #[tokio::test]
    async fn test_failures_degrade_to_empty_sections() {
        let f = fixture(MockMemory {
            fail: true,
            ..Default::default()
        });
        let payload = f
            .assembler
            .assemble(UserId::new(), PlanType::Daily, monday(), "gym schedule")
            .await;

        assert!(payload.rules.is_empty());
        assert!(payload.memories.is_empty());
    }

    #[tokio::test]
    async fn test_payload_is_cached_per_context() {
        let f = fixture(MockMemory::default());
        let user = UserId::new();

        let first = f.assembler.assemble(user, PlanType::Daily, monday(), "deep work").await;
        let second = f.assembler.assemble(user, PlanType::Daily, monday(), " deep work ").await;
        assert_eq!(first, second);
        assert_eq!(f.memory.context_calls.load(Ordering::SeqCst), 1);

        f.assembler.assemble(user, PlanType::Daily, monday(), "light day").await;
        assert_eq!(f.memory.context_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_routine_and_weekly_frame() {
        let f = fixture(MockMemory::default());
        let user = UserId::new();

        f.profiles
            .save_routine(&RoutineTemplate {
                user_id: user,
                name: "weekday".into(),
                weekdays: vec![Weekday::Mon, Weekday::Tue],
                blocks: vec![RoutineBlock {
                    title: "Gym".into(),
                    start_time: ClockTime::hm(7, 0),
                    end_time: ClockTime::hm(8, 0),
                    category: TaskCategory::Health,
                }],
            })
            .await
            .unwrap();

        let weekly = Plan::new_draft(
            user,
            PlanType::Weekly,
            monday() - ChronoDuration::days(2),
            "Ship the release",
        );
        f.plans.create_with_tasks(&weekly, &[]).await.unwrap();

        let payload = f.assembler.assemble(user, PlanType::Daily, monday(), "").await;
        assert_eq!(payload.routine.map(|r| r.name), Some("weekday".to_string()));
        assert_eq!(payload.hierarchy.as_deref(), Some("Ship the release"));

        let weekly_payload = f.assembler.assemble(user, PlanType::Weekly, monday(), "").await;
        assert!(weekly_payload.hierarchy.is_none());
    }

    #[test]
    fn test_cache_key_hashes_context() {
        let user = UserId::new();
        let a = cache_key(user, PlanType::Daily, monday(), "deep work");
        let b = cache_key(user, PlanType::Daily, monday(), "deep work!");
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("lifeos:context:{}:daily:2026-03-02:", user)));
        assert!(!a.contains("deep work"));
    }
}
