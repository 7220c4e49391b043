// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Generation-time schedule locks for daily plans
//!
//! Run on normalised model output before it becomes a draft. Untimed tasks
//! pass through both locks untouched.

use tracing::debug;

use crate::domain::draft::DraftTask;
use crate::domain::profile::UserProfile;
use crate::domain::task::{ClockTime, TaskCategory, LAST_MINUTE_OF_DAY};

/// Longest break allowed inside a locked work window
pub const MAX_BREAK_MINUTES: i32 = 90;

const BREAK_WORDS: [&str; 3] = ["break", "lunch", "dinner"];

/// Where the day ends. A sleep time at or before the wake time means the
/// user sleeps after midnight, so the day runs to 23:59.
pub fn day_boundary(profile: &UserProfile) -> ClockTime {
    if profile.sleep_time > profile.wake_time {
        profile.sleep_time
    } else {
        ClockTime::hm(LAST_MINUTE_OF_DAY / 60, LAST_MINUTE_OF_DAY % 60)
    }
}

/// Drop tasks starting at or after the sleep boundary and clip the ones
/// that run past it.
pub fn apply_sleep_lock(tasks: Vec<DraftTask>, profile: &UserProfile) -> Vec<DraftTask> {
    let boundary = day_boundary(profile);

    tasks
        .into_iter()
        .filter_map(|mut task| {
            let Some((start, end)) = task.window() else {
                return Some(task);
            };
            if start >= boundary {
                debug!(title = %task.title, %boundary, "Sleep lock dropped task");
                return None;
            }
            if end > boundary || end < start {
                debug!(title = %task.title, %boundary, "Sleep lock clipped task");
                task.end_time = Some(boundary);
                task.estimated_duration = start.minutes_until(boundary) as u32;
            }
            Some(task)
        })
        .collect()
}

/// Inside the work window of a Professional or Student, keep only
/// work/learning tasks and short meal breaks.
pub fn apply_work_lock(tasks: Vec<DraftTask>, profile: &UserProfile) -> Vec<DraftTask> {
    if !profile.has_locked_work_window() {
        return tasks;
    }
    let (lock_start, lock_end) = (profile.work_start_time, profile.work_end_time);
    if lock_end <= lock_start {
        return tasks;
    }

    tasks
        .into_iter()
        .filter(|task| {
            let Some((start, end)) = task.window() else {
                return true;
            };
            let inside = !(end <= lock_start || start >= lock_end);
            if !inside || task.category.is_focus_work() || is_short_break(task, start, end) {
                return true;
            }
            debug!(title = %task.title, "Work lock dropped task from locked window");
            false
        })
        .collect()
}

fn is_short_break(task: &DraftTask, start: ClockTime, end: ClockTime) -> bool {
    let title = task.title.to_lowercase();
    BREAK_WORDS.iter().any(|w| title.contains(w))
        && matches!(task.category, TaskCategory::Personal | TaskCategory::Health)
        && start.minutes_until(end) <= MAX_BREAK_MINUTES
}
