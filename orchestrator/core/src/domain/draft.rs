// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Plan drafts
//!
//! A [`PlanDraft`] is the validated output of the generation stage, before
//! self-healing and persistence assign identities to anything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::plan::{Plan, PlanId, PlanType};
use super::task::{ClockTime, EnergyLevel, Task, TaskCategory, TaskId, TaskStatus};

/// Duration assumed for tasks with neither a window nor an estimate
pub const DEFAULT_TASK_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftTask {
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub priority: u8,
    pub energy_required: EnergyLevel,
    pub estimated_duration: u32,
}

impl DraftTask {
    pub fn timed(
        title: impl Into<String>,
        category: TaskCategory,
        start: ClockTime,
        end: ClockTime,
        priority: u8,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            category,
            start_time: Some(start),
            end_time: Some(end),
            priority,
            energy_required: EnergyLevel::Medium,
            estimated_duration: start.minutes_until(end).max(0) as u32,
        }
    }

    pub fn untimed(title: impl Into<String>, category: TaskCategory, priority: u8) -> Self {
        Self {
            title: title.into(),
            description: None,
            category,
            start_time: None,
            end_time: None,
            priority,
            energy_required: EnergyLevel::Medium,
            estimated_duration: DEFAULT_TASK_MINUTES,
        }
    }

    pub fn window(&self) -> Option<(ClockTime, ClockTime)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn into_task(self, plan_id: PlanId) -> Task {
        Task {
            id: TaskId::new(),
            plan_id,
            title: self.title,
            description: self.description,
            category: self.category,
            start_time: self.start_time,
            end_time: self.end_time,
            priority: self.priority,
            status: TaskStatus::Pending,
            estimated_duration: self.estimated_duration,
            energy_required: self.energy_required,
        }
    }
}

/// Where a draft came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DraftSource {
    Model { provider: String, model: String },
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub plan_type: PlanType,
    pub summary: String,
    pub tasks: Vec<DraftTask>,
    pub clarification_questions: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub source: DraftSource,
}

impl PlanDraft {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, DraftSource::Fallback { .. })
    }
}

/// A persisted draft as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPlan {
    pub plan: Plan,
    pub tasks: Vec<Task>,
    pub clarification_questions: Vec<String>,
    pub used_fallback: bool,
}
