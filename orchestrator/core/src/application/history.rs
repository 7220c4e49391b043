// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Completion history: per-plan stats and recurring failure slots

use std::collections::HashMap;

use crate::domain::plan::{FailurePattern, Plan, PlanStats};
use crate::domain::task::{ClockTime, Task, TaskCategory, TaskStatus};

pub fn plan_stats(plan: &Plan, tasks: &[Task]) -> PlanStats {
    let completed = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();
    let missed = tasks.iter().filter(|t| t.status == TaskStatus::Missed).count();
    let success_rate = if tasks.is_empty() {
        0.0
    } else {
        completed as f64 / tasks.len() as f64
    };

    PlanStats {
        date: plan.date,
        success_rate,
        completed,
        missed,
    }
}

/// Missed tasks grouped by category and start time, most frequent first.
/// The suggested slot is where tasks of the same category most often get
/// done (earliest wins a tie).
pub fn failure_patterns<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<FailurePattern> {
    let mut missed: HashMap<(TaskCategory, ClockTime), usize> = HashMap::new();
    let mut done: HashMap<TaskCategory, HashMap<ClockTime, usize>> = HashMap::new();

    for task in tasks {
        let Some(start) = task.start_time else {
            continue;
        };
        match task.status {
            TaskStatus::Missed => *missed.entry((task.category, start)).or_default() += 1,
            TaskStatus::Done => {
                *done.entry(task.category).or_default().entry(start).or_default() += 1
            }
            TaskStatus::Pending => {}
        }
    }

    let mut patterns: Vec<(usize, ClockTime, FailurePattern)> = missed
        .into_iter()
        .map(|((category, failed_at), count)| {
            let suggested = done.get(&category).and_then(|slots| {
                slots
                    .iter()
                    .filter(|(slot, _)| **slot != failed_at)
                    .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                    .map(|(slot, _)| slot.to_string())
            });
            (
                count,
                failed_at,
                FailurePattern {
                    task_type: category.to_string(),
                    failed_time: failed_at.to_string(),
                    suggested_time: suggested,
                    count,
                },
            )
        })
        .collect();

    patterns.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.task_type.cmp(&b.2.task_type))
    });
    patterns.into_iter().map(|(_, _, p)| p).collect()
}
