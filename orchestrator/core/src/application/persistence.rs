// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Persistence Coordinator
//!
//! Final stage of the planning pipeline: heals a draft, then commits the
//! plan and its tasks as one batch. Also owns the approve/reject state
//! changes and replanning, which are compare-and-swap on the plan
//! `version`, and task status writes, which roll up into plan progress.
//!
//! Approval hands the plan to [`CalendarSync`] on a spawned task. A sync
//! failure is published and counted but never undoes the approval.

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::calendar::CalendarSync;
use crate::domain::config::PersistenceConfig;
use crate::domain::draft::{DraftSource, DraftTask, GeneratedPlan, PlanDraft};
use crate::domain::events::PlanningEvent;
use crate::domain::plan::{Plan, PlanId, PlanStatus, PlanType};
use crate::domain::profile::{UserId, UserProfile};
use crate::domain::repository::{PlanRepository, RepositoryError, TaskStatusChange};
use crate::domain::task::{ClockTime, Task, TaskId, TaskStatus, LAST_MINUTE_OF_DAY};
use crate::infrastructure::event_bus::EventBus;

use super::constraints::day_boundary;
use super::self_healing::{HealingReport, SelfHealer};

#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    /// Retryable: re-read the plan and try again with its current version
    #[error("Plan {plan_id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        plan_id: PlanId,
        expected: i64,
        actual: i64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for PlanningError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => PlanningError::NotFound(what),
            RepositoryError::Validation(msg) => PlanningError::Validation(msg),
            other => PlanningError::Repository(other),
        }
    }
}

impl PlanningError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlanningError::Conflict { .. })
    }
}

pub struct PersistenceCoordinator {
    plans: Arc<dyn PlanRepository>,
    calendar: Arc<dyn CalendarSync>,
    event_bus: EventBus,
    healer: SelfHealer,
}

impl PersistenceCoordinator {
    pub fn new(
        plans: Arc<dyn PlanRepository>,
        calendar: Arc<dyn CalendarSync>,
        event_bus: EventBus,
        config: &PersistenceConfig,
    ) -> Self {
        Self {
            plans,
            calendar,
            event_bus,
            healer: SelfHealer::new(config),
        }
    }

    /// Heal the draft and commit it as a new `draft` plan with all of its
    /// tasks, or nothing.
    pub async fn persist_draft(
        &self,
        user_id: UserId,
        date: NaiveDate,
        profile: &UserProfile,
        draft: PlanDraft,
    ) -> Result<GeneratedPlan, PlanningError> {
        let (healed, report) = self.heal(draft.plan_type, profile, draft.tasks)?;

        let used_fallback = matches!(draft.source, DraftSource::Fallback { .. });
        let mut plan = Plan::new_draft(user_id, draft.plan_type, date, draft.summary);
        plan.metadata = draft_metadata(draft.metadata, &draft.source, &draft.clarification_questions);

        let tasks: Vec<Task> = healed.into_iter().map(|t| t.into_task(plan.id)).collect();
        plan.task_ids = tasks.iter().map(|t| t.id).collect();

        self.plans.create_with_tasks(&plan, &tasks).await?;

        info!(
            plan_id = %plan.id,
            user_id = %user_id,
            plan_type = %plan.plan_type,
            %date,
            tasks = tasks.len(),
            shifted = report.shifted,
            dropped = report.dropped,
            relabeled = report.relabeled,
            gaps_filled = report.gaps_filled,
            used_fallback,
            "Plan persisted"
        );
        self.event_bus.publish_planning_event(PlanningEvent::PlanGenerated {
            plan_id: plan.id,
            user_id,
            plan_type: plan.plan_type,
            date,
            task_count: tasks.len(),
            used_fallback,
            generated_at: Utc::now(),
        });

        Ok(GeneratedPlan {
            plan,
            tasks,
            clarification_questions: draft.clarification_questions,
            used_fallback,
        })
    }

    pub async fn approve(&self, plan_id: PlanId, version: i64) -> Result<Plan, PlanningError> {
        let plan = self.transition(plan_id, version, PlanStatus::Approved).await?;

        self.event_bus.publish_planning_event(PlanningEvent::PlanApproved {
            plan_id: plan.id,
            user_id: plan.user_id,
            version: plan.version,
            approved_at: Utc::now(),
        });
        self.spawn_calendar_sync(plan.clone());

        Ok(plan)
    }

    pub async fn reject(&self, plan_id: PlanId, version: i64) -> Result<Plan, PlanningError> {
        let plan = self.transition(plan_id, version, PlanStatus::Rejected).await?;

        self.event_bus.publish_planning_event(PlanningEvent::PlanRejected {
            plan_id: plan.id,
            user_id: plan.user_id,
            version: plan.version,
            rejected_at: Utc::now(),
        });

        Ok(plan)
    }

    /// Replace the tasks of a draft plan with a healed `draft`, as one
    /// compare-and-swap on `version`. Approved and rejected plans are final.
    pub async fn replan(
        &self,
        plan_id: PlanId,
        version: i64,
        profile: &UserProfile,
        draft: PlanDraft,
    ) -> Result<GeneratedPlan, PlanningError> {
        let mut plan = self
            .plans
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| PlanningError::NotFound(format!("Plan {}", plan_id)))?;
        if draft.plan_type != plan.plan_type {
            return Err(PlanningError::Validation(format!(
                "Cannot replan a {} plan with a {} draft",
                plan.plan_type, draft.plan_type
            )));
        }

        let (healed, report) = self.heal(plan.plan_type, profile, draft.tasks)?;

        let used_fallback = matches!(draft.source, DraftSource::Fallback { .. });
        plan.summary = draft.summary;
        plan.metadata = draft_metadata(draft.metadata, &draft.source, &draft.clarification_questions);
        let tasks: Vec<Task> = healed.into_iter().map(|t| t.into_task(plan_id)).collect();
        plan.task_ids = tasks.iter().map(|t| t.id).collect();

        let plan = match self.plans.replace_tasks(&plan, version, &tasks).await {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict {
                expected, actual, ..
            }) => return Err(self.conflict(plan_id, expected, actual)),
            Err(e) => return Err(e.into()),
        };

        info!(
            %plan_id,
            version = plan.version,
            tasks = tasks.len(),
            shifted = report.shifted,
            dropped = report.dropped,
            used_fallback,
            "Plan revised"
        );
        self.event_bus.publish_planning_event(PlanningEvent::PlanRevised {
            plan_id,
            user_id: plan.user_id,
            version: plan.version,
            task_count: tasks.len(),
            revised_at: Utc::now(),
        });

        Ok(GeneratedPlan {
            plan,
            tasks,
            clarification_questions: draft.clarification_questions,
            used_fallback,
        })
    }

    /// Record a task outcome; the owning plan's progress is recomputed in
    /// the same write.
    pub async fn set_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<TaskStatusChange, PlanningError> {
        let change = self.plans.update_task_status(task_id, status).await?;
        debug!(
            task_id = %change.task.id.0,
            %status,
            progress = change.plan_progress,
            "Task status updated"
        );
        self.event_bus.publish_planning_event(PlanningEvent::TaskStatusChanged {
            plan_id: change.task.plan_id,
            task_id,
            status,
            progress: change.plan_progress,
            changed_at: Utc::now(),
        });
        Ok(change)
    }

    fn heal(
        &self,
        plan_type: PlanType,
        profile: &UserProfile,
        tasks: Vec<DraftTask>,
    ) -> Result<(Vec<DraftTask>, HealingReport), PlanningError> {
        let day_end = match plan_type {
            PlanType::Daily => day_boundary(profile),
            _ => ClockTime::hm(LAST_MINUTE_OF_DAY / 60, LAST_MINUTE_OF_DAY % 60),
        };
        let (healed, report) = self.healer.heal(tasks, day_end);
        if healed.is_empty() {
            return Err(PlanningError::Validation(
                "Draft has no tasks left after self-healing".to_string(),
            ));
        }
        Ok((healed, report))
    }

    fn conflict(&self, plan_id: PlanId, expected: i64, actual: i64) -> PlanningError {
        warn!(%plan_id, expected, actual, "Stale plan version");
        metrics::counter!("lifeos_plan_conflict_total").increment(1);
        self.event_bus.publish_planning_event(PlanningEvent::PlanConflict {
            plan_id,
            expected_version: expected,
            actual_version: actual,
            detected_at: Utc::now(),
        });
        PlanningError::Conflict {
            plan_id,
            expected,
            actual,
        }
    }

    async fn transition(
        &self,
        plan_id: PlanId,
        version: i64,
        status: PlanStatus,
    ) -> Result<Plan, PlanningError> {
        match self.plans.update_status(plan_id, version, status).await {
            Ok(plan) => {
                info!(%plan_id, %status, version = plan.version, "Plan status changed");
                Ok(plan)
            }
            Err(RepositoryError::Conflict {
                expected, actual, ..
            }) => Err(self.conflict(plan_id, expected, actual)),
            Err(e) => Err(e.into()),
        }
    }

    fn spawn_calendar_sync(&self, plan: Plan) {
        let plans = self.plans.clone();
        let calendar = self.calendar.clone();
        let event_bus = self.event_bus.clone();

        tokio::spawn(async move {
            let result = match plans.find_tasks(plan.id).await {
                Ok(tasks) => calendar.sync_plan(&plan, &tasks).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            if let Err(e) = result {
                error!(plan_id = %plan.id, error = %e, "Calendar sync failed");
                metrics::counter!("lifeos_calendar_sync_failure_total").increment(1);
                event_bus.publish_planning_event(PlanningEvent::CalendarSyncFailed {
                    plan_id: plan.id,
                    error: e,
                    failed_at: Utc::now(),
                });
            }
        });
    }
}

fn draft_metadata(
    mut metadata: BTreeMap<String, Value>,
    source: &DraftSource,
    clarification_questions: &[String],
) -> BTreeMap<String, Value> {
    metadata.insert("source".to_string(), json!(source));
    if !clarification_questions.is_empty() {
        metadata.insert(
            "clarification_questions".to_string(),
            json!(clarification_questions),
        );
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::CalendarError;
    use crate::domain::draft::DraftTask;
    use crate::domain::task::TaskCategory;
    use crate::infrastructure::event_bus::DomainEvent;
    use crate::infrastructure::repositories::InMemoryPlanRepository;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingCalendar;

    #[async_trait]
    impl CalendarSync for FailingCalendar {
        async fn sync_plan(&self, _plan: &Plan, _tasks: &[Task]) -> Result<(), CalendarError> {
            Err(CalendarError::Unavailable("calendar offline".into()))
        }
    }

    fn coordinator(calendar: Arc<dyn CalendarSync>) -> (PersistenceCoordinator, InMemoryPlanRepository, EventBus) {
        let repo = InMemoryPlanRepository::new();
        let bus = EventBus::new(64);
        let coordinator = PersistenceCoordinator::new(
            Arc::new(repo.clone()),
            calendar,
            bus.clone(),
            &PersistenceConfig::default(),
        );
        (coordinator, repo, bus)
    }

    fn draft(tasks: Vec<DraftTask>) -> PlanDraft {
        PlanDraft {
            plan_type: PlanType::Daily,
            summary: "Focus day".into(),
            tasks,
            clarification_questions: Vec::new(),
            metadata: BTreeMap::new(),
            source: DraftSource::Model {
                provider: "ollama".into(),
                model: "phi3".into(),
            },
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[tokio::test]
    async fn test_persist_heals_and_commits_batch() {
        let (coordinator, repo, _) = coordinator(Arc::new(crate::infrastructure::NoopCalendarSync));
        let user = UserId::new();
        let profile = UserProfile::with_defaults(user);
        let tasks = vec![
            DraftTask::timed("Deep work", TaskCategory::Work, ClockTime::hm(9, 0), ClockTime::hm(11, 0), 1),
            DraftTask::timed("Emails", TaskCategory::Work, ClockTime::hm(10, 0), ClockTime::hm(10, 30), 3),
        ];

        let generated = coordinator.persist_draft(user, date(), &profile, draft(tasks)).await.unwrap();

        assert_eq!(generated.plan.version, 1);
        assert_eq!(generated.plan.status, PlanStatus::Draft);
        let emails = generated.tasks.iter().find(|t| t.title == "Emails").unwrap();
        assert_eq!(emails.window(), Some((ClockTime::hm(11, 0), ClockTime::hm(11, 30))));

        let stored = repo.find_tasks(generated.plan.id).await.unwrap();
        assert_eq!(stored, generated.tasks);
        assert!(generated.plan.metadata.contains_key("source"));
    }

    #[tokio::test]
    async fn test_stale_version_is_conflict_without_mutation() {
        let (coordinator, repo, bus) = coordinator(Arc::new(crate::infrastructure::NoopCalendarSync));
        let user = UserId::new();
        let profile = UserProfile::with_defaults(user);
        let task = DraftTask::timed("Gym", TaskCategory::Health, ClockTime::hm(18, 0), ClockTime::hm(19, 0), 2);
        let generated = coordinator.persist_draft(user, date(), &profile, draft(vec![task])).await.unwrap();
        let plan_id = generated.plan.id;
        let mut events = bus.subscribe();

        let approved = coordinator.approve(plan_id, 1).await.unwrap();
        assert_eq!(approved.version, 2);

        let err = coordinator.reject(plan_id, 1).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, PlanningError::Conflict { expected: 1, actual: 2, .. }));

        let stored = repo.find_by_id(plan_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PlanStatus::Approved);
        assert_eq!(stored.version, 2);

        assert!(matches!(
            events.try_recv().unwrap(),
            DomainEvent::Planning(PlanningEvent::PlanApproved { version: 2, .. })
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            DomainEvent::Planning(PlanningEvent::PlanConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_approving_twice_is_invalid_transition() {
        let (coordinator, _, _) = coordinator(Arc::new(crate::infrastructure::NoopCalendarSync));
        let user = UserId::new();
        let profile = UserProfile::with_defaults(user);
        let task = DraftTask::untimed("Read", TaskCategory::Learning, 3);
        let generated = coordinator.persist_draft(user, date(), &profile, draft(vec![task])).await.unwrap();

        let approved = coordinator.approve(generated.plan.id, 1).await.unwrap();
        let err = coordinator.approve(generated.plan.id, approved.version).await.unwrap_err();
        assert!(matches!(err, PlanningError::Validation(_)));
    }

    #[tokio::test]
    async fn test_calendar_failure_does_not_undo_approval() {
        let (coordinator, repo, bus) = coordinator(Arc::new(FailingCalendar));
        let user = UserId::new();
        let profile = UserProfile::with_defaults(user);
        let task = DraftTask::timed("Gym", TaskCategory::Health, ClockTime::hm(18, 0), ClockTime::hm(19, 0), 2);
        let generated = coordinator.persist_draft(user, date(), &profile, draft(vec![task])).await.unwrap();
        let mut plan_events = bus.subscribe_plan(generated.plan.id);

        coordinator.approve(generated.plan.id, 1).await.unwrap();

        let failure = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match plan_events.recv().await {
                    Ok(PlanningEvent::CalendarSyncFailed { error, .. }) => break error,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream ended: {e}"),
                }
            }
        })
        .await
        .unwrap();
        assert!(failure.contains("calendar offline"));

        let stored = repo.find_by_id(generated.plan.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PlanStatus::Approved);
    }

    #[tokio::test]
    async fn test_unknown_plan_is_not_found() {
        let (coordinator, _, _) = coordinator(Arc::new(crate::infrastructure::NoopCalendarSync));
        let err = coordinator.approve(PlanId::new(), 1).await.unwrap_err();
        assert!(matches!(err, PlanningError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_replan_replaces_tasks_and_bumps_version() {
        let (coordinator, repo, bus) = coordinator(Arc::new(crate::infrastructure::NoopCalendarSync));
        let user = UserId::new();
        let profile = UserProfile::with_defaults(user);
        let first = DraftTask::timed("Gym", TaskCategory::Health, ClockTime::hm(18, 0), ClockTime::hm(19, 0), 2);
        let generated = coordinator.persist_draft(user, date(), &profile, draft(vec![first])).await.unwrap();
        let plan_id = generated.plan.id;
        let mut events = bus.subscribe_plan(plan_id);

        let mut revision = draft(vec![
            DraftTask::timed("Swim", TaskCategory::Health, ClockTime::hm(7, 0), ClockTime::hm(8, 0), 2),
            DraftTask::timed("Deep work", TaskCategory::Work, ClockTime::hm(9, 0), ClockTime::hm(12, 0), 1),
        ]);
        revision.summary = "Morning swim instead".into();

        let revised = coordinator.replan(plan_id, 1, &profile, revision).await.unwrap();

        assert_eq!(revised.plan.id, plan_id);
        assert_eq!(revised.plan.version, 2);
        assert_eq!(revised.plan.status, PlanStatus::Draft);
        assert_eq!(revised.plan.summary, "Morning swim instead");
        let titles: Vec<&str> = revised.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Swim", "Deep work"]);
        assert_eq!(repo.find_tasks(plan_id).await.unwrap(), revised.tasks);

        assert!(matches!(
            events.recv().await.unwrap(),
            PlanningEvent::PlanRevised { version: 2, task_count: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_replan_with_stale_version_is_conflict_without_mutation() {
        let (coordinator, repo, _) = coordinator(Arc::new(crate::infrastructure::NoopCalendarSync));
        let user = UserId::new();
        let profile = UserProfile::with_defaults(user);
        let task = DraftTask::untimed("Read", TaskCategory::Learning, 3);
        let generated = coordinator.persist_draft(user, date(), &profile, draft(vec![task])).await.unwrap();
        let plan_id = generated.plan.id;

        coordinator
            .replan(plan_id, 1, &profile, draft(vec![DraftTask::untimed("Write", TaskCategory::Work, 2)]))
            .await
            .unwrap();

        let err = coordinator
            .replan(plan_id, 1, &profile, draft(vec![DraftTask::untimed("Nap", TaskCategory::Personal, 5)]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, PlanningError::Conflict { expected: 1, actual: 2, .. }));

        let stored = repo.find_by_id(plan_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        let titles: Vec<String> = repo
            .find_tasks(plan_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["Write".to_string()]);
    }

    #[tokio::test]
    async fn test_replan_of_approved_plan_is_rejected() {
        let (coordinator, repo, _) = coordinator(Arc::new(crate::infrastructure::NoopCalendarSync));
        let user = UserId::new();
        let profile = UserProfile::with_defaults(user);
        let task = DraftTask::untimed("Read", TaskCategory::Learning, 3);
        let generated = coordinator.persist_draft(user, date(), &profile, draft(vec![task])).await.unwrap();
        let approved = coordinator.approve(generated.plan.id, 1).await.unwrap();

        let err = coordinator
            .replan(
                approved.id,
                approved.version,
                &profile,
                draft(vec![DraftTask::untimed("Write", TaskCategory::Work, 2)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PlanningError::Validation(_)));
        assert_eq!(repo.find_tasks(approved.id).await.unwrap(), generated.tasks);
    }

    #[tokio::test]
    async fn test_task_status_updates_plan_progress() {
        let (coordinator, repo, _) = coordinator(Arc::new(crate::infrastructure::NoopCalendarSync));
        let user = UserId::new();
        let profile = UserProfile::with_defaults(user);
        let tasks = ["Run", "Read", "Write", "Cook"]
            .into_iter()
            .map(|title| DraftTask::untimed(title, TaskCategory::Personal, 3))
            .collect();
        let generated = coordinator.persist_draft(user, date(), &profile, draft(tasks)).await.unwrap();
        assert_eq!(generated.plan.progress, 0.0);

        let change = coordinator
            .set_task_status(generated.tasks[0].id, TaskStatus::Done)
            .await
            .unwrap();
        assert_eq!(change.plan_progress, 25.0);

        coordinator
            .set_task_status(generated.tasks[1].id, TaskStatus::Missed)
            .await
            .unwrap();
        let change = coordinator
            .set_task_status(generated.tasks[2].id, TaskStatus::Done)
            .await
            .unwrap();
        assert_eq!(change.plan_progress, 50.0);

        let stored = repo.find_by_id(generated.plan.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 50.0);
        assert_eq!(stored.version, 1);
    }
}
