// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Plan Aggregate
//!
//! A Plan is the unit produced by the planning pipeline: a dated schedule of
//! [`Task`](super::task::Task)s for one user.
//!
//! ## Versioning
//!
//! `version` starts at 1 and is the optimistic-concurrency token. Every
//! status change increments it, and callers must present the version they
//! last read. A stale version is a conflict, never a silent overwrite.
//!
//! ## Status transitions
//!
//! ```text
//! draft ──approve──▶ approved
//!   │
//!   └───reject───▶ rejected
//! ```
//!
//! Any other transition is rejected by [`Plan::transition`]. A draft may
//! also be replanned: its tasks are replaced wholesale under the same
//! version check, and the version increments.
//!
//! ## Progress
//!
//! `progress` is the percentage of tasks marked done. It is recomputed
//! whenever a task status changes and does not touch `version`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::profile::UserId;
use super::task::{Task, TaskId, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Daily,
    Weekly,
    Monthly,
    Finance,
    Custom,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Daily => "daily",
            PlanType::Weekly => "weekly",
            PlanType::Monthly => "monthly",
            PlanType::Finance => "finance",
            PlanType::Custom => "custom",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "daily" => Some(PlanType::Daily),
            "weekly" => Some(PlanType::Weekly),
            "monthly" => Some(PlanType::Monthly),
            "finance" => Some(PlanType::Finance),
            "custom" => Some(PlanType::Custom),
            _ => None,
        }
    }

    /// Summary used when the generator returns none.
    pub fn default_summary(&self) -> &'static str {
        match self {
            PlanType::Daily => "Daily plan",
            PlanType::Weekly => "Weekly plan",
            PlanType::Monthly => "Monthly plan",
            PlanType::Finance => "Finance plan",
            PlanType::Custom => "Custom plan",
        }
    }

    /// Plan types whose tasks are laid out on a clock.
    pub fn is_time_blocked(&self) -> bool {
        matches!(self, PlanType::Daily | PlanType::Custom)
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Approved,
    Rejected,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Approved => "approved",
            PlanStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(PlanStatus::Draft),
            "approved" => Some(PlanStatus::Approved),
            "rejected" => Some(PlanStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Plan cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: PlanStatus,
    pub to: PlanStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub user_id: UserId,
    pub plan_type: PlanType,
    pub date: NaiveDate,
    pub status: PlanStatus,
    pub version: i64,
    pub summary: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub task_ids: Vec<TaskId>,
    /// Done tasks as a percentage, `0.0..=100.0`
    #[serde(default)]
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new_draft(
        user_id: UserId,
        plan_type: PlanType,
        date: NaiveDate,
        summary: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PlanId::new(),
            user_id,
            plan_type,
            date,
            status: PlanStatus::Draft,
            version: 1,
            summary: summary.into(),
            metadata: BTreeMap::new(),
            task_ids: Vec::new(),
            progress: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_transition(&self, to: PlanStatus) -> bool {
        matches!(
            (self.status, to),
            (PlanStatus::Draft, PlanStatus::Approved) | (PlanStatus::Draft, PlanStatus::Rejected)
        )
    }

    /// Apply a status change and bump the version.
    pub fn transition(&mut self, to: PlanStatus) -> Result<(), InvalidTransition> {
        if !self.can_transition(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Share of `tasks` marked done, as a percentage. An empty plan is at 0.
pub fn progress_of(tasks: &[Task]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();
    (done as f64 / tasks.len() as f64 * 1000.0).round() / 10.0
}

/// Completion summary of one past plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStats {
    pub date: NaiveDate,
    /// Completed / total, in `[0, 1]`
    pub success_rate: f64,
    pub completed: usize,
    pub missed: usize,
}

/// A time slot where a kind of task keeps getting missed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    pub task_type: String,
    pub failed_time: String,
    pub suggested_time: Option<String>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> Plan {
        Plan::new_draft(
            UserId::new(),
            PlanType::Daily,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            "Focus day",
        )
    }

    #[test]
    fn test_new_draft_starts_at_version_one() {
        let plan = draft();
        assert_eq!(plan.version, 1);
        assert_eq!(plan.status, PlanStatus::Draft);
    }

    #[test]
    fn test_approve_bumps_version() {
        let mut plan = draft();
        plan.transition(PlanStatus::Approved).unwrap();
        assert_eq!(plan.status, PlanStatus::Approved);
        assert_eq!(plan.version, 2);
    }

    #[test]
    fn test_only_draft_transitions_allowed() {
        let mut plan = draft();
        plan.transition(PlanStatus::Rejected).unwrap();

        let err = plan.transition(PlanStatus::Approved).unwrap_err();
        assert_eq!(err.from, PlanStatus::Rejected);
        assert_eq!(plan.version, 2);

        let mut fresh = draft();
        assert!(fresh.transition(PlanStatus::Draft).is_err());
    }

    #[test]
    fn test_plan_type_parse() {
        assert_eq!(PlanType::parse("Weekly"), Some(PlanType::Weekly));
        assert_eq!(PlanType::parse("yearly"), None);
        assert!(PlanType::Daily.is_time_blocked());
        assert!(!PlanType::Finance.is_time_blocked());
    }

    #[test]
    fn test_progress_counts_done_tasks_only() {
        use crate::domain::draft::DraftTask;
        use crate::domain::task::TaskCategory;

        let plan = draft();
        assert_eq!(progress_of(&[]), 0.0);

        let mut tasks: Vec<Task> = ["Run", "Read", "Cook"]
            .into_iter()
            .map(|title| DraftTask::untimed(title, TaskCategory::Personal, 3).into_task(plan.id))
            .collect();
        tasks[0].status = TaskStatus::Done;
        tasks[1].status = TaskStatus::Missed;
        assert_eq!(progress_of(&tasks), 33.3);

        tasks[1].status = TaskStatus::Done;
        tasks[2].status = TaskStatus::Done;
        assert_eq!(progress_of(&tasks), 100.0);
    }
}
