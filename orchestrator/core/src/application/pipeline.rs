// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Planning Pipeline
//!
//! Request-scoped facade over the three planning stages:
//!
//! ```text
//! ContextAssembler ──▶ PlanGenerator ──▶ PersistenceCoordinator
//!   (payload, cached)    (never fails)     (heal + atomic commit)
//! ```
//!
//! plus the memory and retrieval operations exposed to callers. Fact
//! extraction and memory indexing are queued as background jobs and never
//! delay the response.

use chrono::NaiveDate;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use lifeos_cortex::application::{
    IngestOutcome, LifecycleReport, MemoryError, MemoryService, RagManager,
};
use lifeos_cortex::domain::{MemoryCategory, RagHealth, RetrievalResult, UserMemory};

use crate::domain::draft::{DraftSource, GeneratedPlan};
use crate::domain::jobs::{Job, JobQueue};
use crate::domain::plan::{Plan, PlanId, PlanType};
use crate::domain::profile::UserId;
use crate::domain::repository::{PlanRepository, TaskStatusChange};
use crate::domain::task::{Task, TaskId, TaskStatus};

use super::context_assembler::{is_generic_request, ContextAssembler};
use super::fallback::fallback_draft;
use super::persistence::{PersistenceCoordinator, PlanningError};
use super::plan_generator::PlanGenerator;

pub struct PlanningPipeline {
    assembler: ContextAssembler,
    generator: PlanGenerator,
    persistence: PersistenceCoordinator,
    plans: Arc<dyn PlanRepository>,
    memory: Arc<dyn MemoryService>,
    rag: Arc<RagManager>,
    jobs: Arc<dyn JobQueue>,
}

impl PlanningPipeline {
    pub fn new(
        assembler: ContextAssembler,
        generator: PlanGenerator,
        persistence: PersistenceCoordinator,
        plans: Arc<dyn PlanRepository>,
        memory: Arc<dyn MemoryService>,
        rag: Arc<RagManager>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            assembler,
            generator,
            persistence,
            plans,
            memory,
            rag,
            jobs,
        }
    }

    /// Produce and persist a draft plan. The result is always structurally
    /// valid; generation problems end in the fallback plan, not an error.
    pub async fn generate_plan(
        &self,
        user_id: UserId,
        plan_type: PlanType,
        date: NaiveDate,
        context: &str,
    ) -> Result<GeneratedPlan, PlanningError> {
        info!(user_id = %user_id, %plan_type, %date, "Generating plan");

        if !is_generic_request(context) {
            self.enqueue(Job::ExtractFacts {
                user_id,
                text: context.trim().to_string(),
            });
        }

        let payload = self.assembler.assemble(user_id, plan_type, date, context).await;
        let draft = self.generator.generate(&payload).await;
        let used_fallback = draft.is_fallback();

        match self
            .persistence
            .persist_draft(user_id, date, &payload.profile, draft)
            .await
        {
            Err(PlanningError::Validation(reason)) if !used_fallback => {
                warn!(user_id = %user_id, %reason, "Generated draft unusable after healing, persisting fallback");
                metrics::counter!("lifeos_plan_fallback_total", "reason" => "healing").increment(1);
                let fallback = fallback_draft(&payload.profile, plan_type, reason);
                self.persistence
                    .persist_draft(user_id, date, &payload.profile, fallback)
                    .await
            }
            result => result,
        }
    }

    /// `Conflict` when `version` is stale; retry after re-reading the plan.
    pub async fn approve(&self, plan_id: PlanId, version: i64) -> Result<Plan, PlanningError> {
        self.persistence.approve(plan_id, version).await
    }

    pub async fn reject(&self, plan_id: PlanId, version: i64) -> Result<Plan, PlanningError> {
        self.persistence.reject(plan_id, version).await
    }

    /// Regenerate a draft plan around `context`, with its current tasks as
    /// the starting point, and swap the tasks in under `version`. When the
    /// model cannot produce a revision the plan is left as it was.
    pub async fn replan(
        &self,
        plan_id: PlanId,
        version: i64,
        context: &str,
    ) -> Result<GeneratedPlan, PlanningError> {
        let (plan, tasks) = self.get_plan(plan_id).await?;
        info!(%plan_id, version, user_id = %plan.user_id, "Replanning");

        if !is_generic_request(context) {
            self.enqueue(Job::ExtractFacts {
                user_id: plan.user_id,
                text: context.trim().to_string(),
            });
        }

        let request = revision_request(&plan, &tasks, context);
        let payload = self
            .assembler
            .assemble(plan.user_id, plan.plan_type, plan.date, &request)
            .await;
        let draft = self.generator.generate(&payload).await;

        if let DraftSource::Fallback { reason } = &draft.source {
            warn!(%plan_id, %reason, "No usable revision generated, keeping current plan");
            metrics::counter!("lifeos_plan_fallback_total", "reason" => "replan").increment(1);
            return Err(PlanningError::Validation(format!(
                "Could not generate a revision ({}); plan {} left unchanged",
                reason, plan_id
            )));
        }

        self.persistence
            .replan(plan_id, version, &payload.profile, draft)
            .await
    }

    /// Also recomputes the owning plan's progress.
    pub async fn set_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<TaskStatusChange, PlanningError> {
        self.persistence.set_task_status(task_id, status).await
    }

    pub async fn get_plan(&self, plan_id: PlanId) -> Result<(Plan, Vec<Task>), PlanningError> {
        let plan = self
            .plans
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| PlanningError::NotFound(format!("Plan {}", plan_id)))?;
        let tasks = self.plans.find_tasks(plan_id).await?;
        Ok((plan, tasks))
    }

    pub async fn recent_plans(
        &self,
        user_id: UserId,
        plan_type: Option<PlanType>,
        limit: usize,
    ) -> Result<Vec<Plan>, PlanningError> {
        Ok(self.plans.recent_plans(user_id, plan_type, limit).await?)
    }

    /// Store a fact directly. New memories are queued for indexing.
    pub async fn add_memory(
        &self,
        user_id: UserId,
        text: &str,
        category: MemoryCategory,
    ) -> Result<IngestOutcome, MemoryError> {
        let outcome = self.memory.add_memory(user_id, text, category).await?;
        if outcome.is_new() {
            self.enqueue(Job::IndexMemory {
                user_id,
                text: outcome.memory().text.clone(),
                category,
            });
        }
        Ok(outcome)
    }

    pub async fn list_memories(&self, user_id: UserId) -> Result<Vec<UserMemory>, MemoryError> {
        self.memory.list_memories(user_id).await
    }

    pub async fn query_memory(
        &self,
        user_id: UserId,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievalResult>, MemoryError> {
        self.memory.query_memory(user_id, text, k).await
    }

    pub async fn run_lifecycle(&self, user_id: UserId) -> Result<LifecycleReport, MemoryError> {
        self.memory.run_lifecycle(user_id).await
    }

    pub async fn health_check(&self) -> RagHealth {
        self.rag.health_check().await
    }

    fn enqueue(&self, job: Job) {
        let kind = job.kind();
        match self.jobs.enqueue(job) {
            Ok(()) => debug!(%kind, "Background job queued"),
            Err(e) => warn!(%kind, error = %e, "Background job not queued"),
        }
    }
}

/// Request text for a revision: the requested change followed by the plan
/// as it currently stands.
fn revision_request(plan: &Plan, tasks: &[Task], context: &str) -> String {
    let mut request = String::new();
    let change = context.trim();
    if change.is_empty() {
        request.push_str("Revise the current plan.\n");
    } else {
        let _ = writeln!(request, "Revise the current plan. Requested changes: {}", change);
    }
    let _ = writeln!(request, "Current plan: {}", plan.summary);
    request.push_str("Current tasks:\n");
    for task in tasks {
        match task.window() {
            Some((start, end)) => {
                let _ = writeln!(request, "- {}-{} {} ({})", start, end, task.title, task.category);
            }
            None => {
                let _ = writeln!(request, "- {} ({})", task.title, task.category);
            }
        }
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::draft::DraftTask;
    use crate::domain::task::{ClockTime, TaskCategory};

    #[test]
    fn test_revision_request_lists_current_tasks() {
        let plan = Plan::new_draft(
            UserId::new(),
            PlanType::Daily,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            "Focus day",
        );
        let tasks = vec![
            DraftTask::timed("Deep work", TaskCategory::Work, ClockTime::hm(9, 0), ClockTime::hm(11, 0), 1)
                .into_task(plan.id),
            DraftTask::untimed("Call mum", TaskCategory::Personal, 3).into_task(plan.id),
        ];

        let request = revision_request(&plan, &tasks, "  move the gym to the evening ");

        assert!(request.starts_with("Revise the current plan. Requested changes: move the gym to the evening\n"));
        assert!(request.contains("Current plan: Focus day"));
        assert!(request.contains("- 09:00-11:00 Deep work (work)"));
        assert!(request.contains("- Call mum (personal)"));
    }
}
