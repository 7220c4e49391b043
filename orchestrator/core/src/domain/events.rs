// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::plan::{PlanId, PlanType};
use crate::domain::profile::UserId;
use crate::domain::task::{TaskId, TaskStatus};

/// Planning pipeline events, published to the event bus for observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanningEvent {
    PlanGenerated {
        plan_id: PlanId,
        user_id: UserId,
        plan_type: PlanType,
        date: NaiveDate,
        task_count: usize,
        used_fallback: bool,
        generated_at: DateTime<Utc>,
    },
    PlanRevised {
        plan_id: PlanId,
        user_id: UserId,
        version: i64,
        task_count: usize,
        revised_at: DateTime<Utc>,
    },
    TaskStatusChanged {
        plan_id: PlanId,
        task_id: TaskId,
        status: TaskStatus,
        progress: f64,
        changed_at: DateTime<Utc>,
    },
    PlanApproved {
        plan_id: PlanId,
        user_id: UserId,
        version: i64,
        approved_at: DateTime<Utc>,
    },
    PlanRejected {
        plan_id: PlanId,
        user_id: UserId,
        version: i64,
        rejected_at: DateTime<Utc>,
    },
    PlanConflict {
        plan_id: PlanId,
        expected_version: i64,
        actual_version: i64,
        detected_at: DateTime<Utc>,
    },
    CalendarSyncFailed {
        plan_id: PlanId,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl PlanningEvent {
    pub fn plan_id(&self) -> PlanId {
        match self {
            PlanningEvent::PlanGenerated { plan_id, .. }
            | PlanningEvent::PlanRevised { plan_id, .. }
            | PlanningEvent::TaskStatusChanged { plan_id, .. }
            | PlanningEvent::PlanApproved { plan_id, .. }
            | PlanningEvent::PlanRejected { plan_id, .. }
            | PlanningEvent::PlanConflict { plan_id, .. }
            | PlanningEvent::CalendarSyncFailed { plan_id, .. } => *plan_id,
        }
    }
}
