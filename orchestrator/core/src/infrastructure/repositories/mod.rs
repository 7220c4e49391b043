// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve planning aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresPlanRepository** - plans and tasks, transactional batch insert
//! - **PostgresProfileRepository** - profiles and routine templates
//!
//! ## In-Memory Repositories
//!
//! Used when no database URL is configured, and in tests:
//! - **InMemoryPlanRepository** - one write lock covers a plan and its tasks
//! - **InMemoryProfileRepository**

pub mod postgres_plan;
pub mod postgres_profile;

pub use postgres_plan::PostgresPlanRepository;
pub use postgres_profile::PostgresProfileRepository;

use async_trait::async_trait;
use chrono::{Utc, Weekday};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::plan::{progress_of, Plan, PlanId, PlanStatus, PlanType};
use crate::domain::profile::{RoutineTemplate, UserId, UserProfile};
use crate::domain::repository::{
    PlanRepository, ProfileRepository, RepositoryError, TaskStatusChange,
};
use crate::domain::task::{Task, TaskId, TaskStatus};

/// Checks shared by every batch write (`create_with_tasks`, `replace_tasks`)
pub(crate) fn validate_batch(plan: &Plan, tasks: &[Task]) -> Result<(), RepositoryError> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if task.plan_id != plan.id {
            return Err(RepositoryError::Validation(format!(
                "Task {} belongs to plan {}, not {}",
                task.id.0, task.plan_id, plan.id
            )));
        }
        if !seen.insert(task.id) {
            return Err(RepositoryError::Validation(format!(
                "Duplicate task id {} in batch",
                task.id.0
            )));
        }
        if !(1..=5).contains(&task.priority) {
            return Err(RepositoryError::Validation(format!(
                "Task '{}' has priority {} outside 1..=5",
                task.title, task.priority
            )));
        }
    }

    let ordered: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
    if plan.task_ids != ordered {
        return Err(RepositoryError::Validation(
            "Plan task_ids do not match the task batch".to_string(),
        ));
    }

    Ok(())
}

#[derive(Default)]
struct PlanStore {
    plans: HashMap<PlanId, Plan>,
    tasks: HashMap<TaskId, Task>,
}

#[derive(Clone, Default)]
pub struct InMemoryPlanRepository {
    store: Arc<RwLock<PlanStore>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn create_with_tasks(&self, plan: &Plan, tasks: &[Task]) -> Result<(), RepositoryError> {
        validate_batch(plan, tasks)?;

        let mut store = self.store.write();
        if store.plans.contains_key(&plan.id) {
            return Err(RepositoryError::Validation(format!("Plan {} already exists", plan.id)));
        }
        if let Some(existing) = tasks.iter().find(|t| store.tasks.contains_key(&t.id)) {
            return Err(RepositoryError::Validation(format!(
                "Task {} already exists",
                existing.id.0
            )));
        }

        store.plans.insert(plan.id, plan.clone());
        for task in tasks {
            store.tasks.insert(task.id, task.clone());
        }
        Ok(())
    }

    async fn find_by_id(&self, id: PlanId) -> Result<Option<Plan>, RepositoryError> {
        Ok(self.store.read().plans.get(&id).cloned())
    }

    async fn find_tasks(&self, plan_id: PlanId) -> Result<Vec<Task>, RepositoryError> {
        let store = self.store.read();
        let plan = match store.plans.get(&plan_id) {
            Some(plan) => plan,
            None => return Ok(Vec::new()),
        };
        Ok(plan
            .task_ids
            .iter()
            .filter_map(|id| store.tasks.get(id).cloned())
            .collect())
    }

    async fn recent_plans(
        &self,
        user_id: UserId,
        plan_type: Option<PlanType>,
        limit: usize,
    ) -> Result<Vec<Plan>, RepositoryError> {
        let store = self.store.read();
        let mut plans: Vec<Plan> = store
            .plans
            .values()
            .filter(|p| p.user_id == user_id)
            .filter(|p| plan_type.is_none_or(|t| p.plan_type == t))
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        plans.truncate(limit);
        Ok(plans)
    }

    async fn update_status(
        &self,
        id: PlanId,
        expected_version: i64,
        status: PlanStatus,
    ) -> Result<Plan, RepositoryError> {
        let mut store = self.store.write();
        let plan = store
            .plans
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Plan {}", id)))?;

        if plan.version != expected_version {
            return Err(RepositoryError::Conflict {
                id: id.to_string(),
                expected: expected_version,
                actual: plan.version,
            });
        }

        plan.transition(status)
            .map_err(|e| RepositoryError::Validation(e.to_string()))?;
        Ok(plan.clone())
    }

    async fn replace_tasks(
        &self,
        plan: &Plan,
        expected_version: i64,
        tasks: &[Task],
    ) -> Result<Plan, RepositoryError> {
        validate_batch(plan, tasks)?;

        let mut guard = self.store.write();
        let store = &mut *guard;
        let current = store
            .plans
            .get(&plan.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Plan {}", plan.id)))?;

        if current.version != expected_version {
            return Err(RepositoryError::Conflict {
                id: plan.id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }
        if current.status != PlanStatus::Draft {
            return Err(RepositoryError::Validation(format!(
                "Plan {} is {} and can no longer be replanned",
                plan.id, current.status
            )));
        }
        if let Some(existing) = tasks
            .iter()
            .find(|t| store.tasks.get(&t.id).is_some_and(|stored| stored.plan_id != plan.id))
        {
            return Err(RepositoryError::Validation(format!(
                "Task {} already exists",
                existing.id.0
            )));
        }

        let old_ids = current.task_ids.clone();
        for id in &old_ids {
            store.tasks.remove(id);
        }
        for task in tasks {
            store.tasks.insert(task.id, task.clone());
        }

        let mut updated = current.clone();
        updated.summary = plan.summary.clone();
        updated.metadata = plan.metadata.clone();
        updated.task_ids = plan.task_ids.clone();
        updated.progress = progress_of(tasks);
        updated.version += 1;
        updated.updated_at = Utc::now();
        store.plans.insert(plan.id, updated.clone());
        Ok(updated)
    }

    async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<TaskStatusChange, RepositoryError> {
        let mut guard = self.store.write();
        let store = &mut *guard;
        let task = store
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Task {}", task_id.0)))?;
        task.status = status;
        let task = task.clone();

        let plan = store
            .plans
            .get_mut(&task.plan_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Plan {}", task.plan_id)))?;
        let siblings: Vec<Task> = plan
            .task_ids
            .iter()
            .filter_map(|id| store.tasks.get(id).cloned())
            .collect();
        plan.progress = progress_of(&siblings);

        Ok(TaskStatusChange {
            task,
            plan_progress: plan.progress,
        })
    }
}

#[derive(Default)]
struct ProfileStore {
    profiles: HashMap<UserId, UserProfile>,
    routines: HashMap<UserId, Vec<RoutineTemplate>>,
}

#[derive(Clone, Default)]
pub struct InMemoryProfileRepository {
    store: Arc<RwLock<ProfileStore>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn find_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        Ok(self.store.read().profiles.get(&user_id).cloned())
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), RepositoryError> {
        self.store.write().profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn find_routine(
        &self,
        user_id: UserId,
        weekday: Weekday,
    ) -> Result<Option<RoutineTemplate>, RepositoryError> {
        Ok(self
            .store
            .read()
            .routines
            .get(&user_id)
            .and_then(|routines| routines.iter().find(|r| r.applies_to(weekday)).cloned()))
    }

    async fn save_routine(&self, routine: &RoutineTemplate) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        let routines = store.routines.entry(routine.user_id).or_default();
        match routines.iter_mut().find(|r| r.name == routine.name) {
            Some(existing) => *existing = routine.clone(),
            None => routines.push(routine.clone()),
        }
        Ok(())
    }
}
