// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the planning aggregates. Implementations live in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `PlanRepository` | `Plan` + its `Task`s | `InMemoryPlanRepository`, `PostgresPlanRepository` |
//! | `ProfileRepository` | `UserProfile`, `RoutineTemplate` | `InMemoryProfileRepository`, `PostgresProfileRepository` |
//!
//! Memories are owned by the cortex crate (`lifeos_cortex::infrastructure::MemoryRepository`).
//!
//! ## Atomicity
//!
//! [`PlanRepository::create_with_tasks`] commits a plan and all of its tasks
//! or nothing. [`PlanRepository::update_status`] and
//! [`PlanRepository::replace_tasks`] are compare-and-swap on `version`; a
//! mismatch yields [`RepositoryError::Conflict`] and leaves the rows
//! untouched. [`PlanRepository::update_task_status`] writes the task and the
//! plan's recomputed progress together.

use async_trait::async_trait;
use chrono::Weekday;

use super::plan::{Plan, PlanId, PlanStatus, PlanType};
use super::profile::{RoutineTemplate, UserId, UserProfile};
use super::task::{Task, TaskId, TaskStatus};

#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Insert a plan together with its tasks, all-or-nothing
    async fn create_with_tasks(&self, plan: &Plan, tasks: &[Task]) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: PlanId) -> Result<Option<Plan>, RepositoryError>;

    /// Tasks of a plan in schedule order
    async fn find_tasks(&self, plan_id: PlanId) -> Result<Vec<Task>, RepositoryError>;

    /// Most recent plans first (by date, then creation time)
    async fn recent_plans(
        &self,
        user_id: UserId,
        plan_type: Option<PlanType>,
        limit: usize,
    ) -> Result<Vec<Plan>, RepositoryError>;

    /// Set `status` and increment `version` iff the stored version equals
    /// `expected_version`. Returns the updated plan.
    async fn update_status(
        &self,
        id: PlanId,
        expected_version: i64,
        status: PlanStatus,
    ) -> Result<Plan, RepositoryError>;

    /// Swap a draft plan's tasks for `tasks` iff the stored version equals
    /// `expected_version`. `plan` carries the new summary, metadata and
    /// `task_ids`; the stored version increments and progress resets.
    async fn replace_tasks(
        &self,
        plan: &Plan,
        expected_version: i64,
        tasks: &[Task],
    ) -> Result<Plan, RepositoryError>;

    async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<TaskStatusChange, RepositoryError>;
}

/// A task status write and the plan progress it produced
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusChange {
    pub task: Task,
    pub plan_progress: f64,
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, RepositoryError>;

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), RepositoryError>;

    /// First routine template that applies to `weekday`
    async fn find_routine(
        &self,
        user_id: UserId,
        weekday: Weekday,
    ) -> Result<Option<RoutineTemplate>, RepositoryError>;

    async fn save_routine(&self, routine: &RoutineTemplate) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    Conflict { id: String, expected: i64, actual: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
