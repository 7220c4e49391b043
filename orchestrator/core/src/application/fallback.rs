// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deterministic fallback plans
//!
//! Used when every generation attempt failed. Time-blocked plans get the
//! fixed day skeleton built from the profile; other plan types get a short
//! generic checklist.

use std::collections::BTreeMap;

use crate::domain::draft::{DraftSource, DraftTask, PlanDraft};
use crate::domain::plan::PlanType;
use crate::domain::profile::UserProfile;
use crate::domain::task::{ClockTime, EnergyLevel, TaskCategory};

use super::constraints::day_boundary;

const NOON: ClockTime = ClockTime::hm(12, 0);
const LUNCH_END: ClockTime = ClockTime::hm(13, 0);

pub const FALLBACK_QUESTION: &str =
    "The planner could not produce a personalised plan. Would you like to regenerate it?";

struct Segment {
    title: &'static str,
    category: TaskCategory,
    priority: u8,
    energy: EnergyLevel,
    start: ClockTime,
    end: ClockTime,
}

pub fn fallback_draft(profile: &UserProfile, plan_type: PlanType, reason: impl Into<String>) -> PlanDraft {
    let (summary, tasks) = if plan_type.is_time_blocked() {
        (
            format!(
                "Fallback schedule: wake {}, sleep {}",
                profile.wake_time, profile.sleep_time
            ),
            day_skeleton(profile),
        )
    } else {
        (
            format!("Fallback {} checklist", plan_type),
            checklist(plan_type),
        )
    };

    PlanDraft {
        plan_type,
        summary,
        tasks,
        clarification_questions: vec![FALLBACK_QUESTION.to_string()],
        metadata: BTreeMap::new(),
        source: DraftSource::Fallback {
            reason: reason.into(),
        },
    }
}

/// Morning Routine, Work Block, Lunch, Afternoon Work Block, Evening
/// Wind-down. A cursor keeps segments from overlapping, and segments that
/// end up empty or inverted are skipped.
pub fn day_skeleton(profile: &UserProfile) -> Vec<DraftTask> {
    let boundary = day_boundary(profile);
    let segments = [
        Segment {
            title: "Morning Routine",
            category: TaskCategory::Health,
            priority: 2,
            energy: EnergyLevel::Medium,
            start: profile.wake_time,
            end: profile.work_start_time,
        },
        Segment {
            title: "Work Block",
            category: TaskCategory::Work,
            priority: 1,
            energy: EnergyLevel::High,
            start: profile.work_start_time,
            end: NOON,
        },
        Segment {
            title: "Lunch",
            category: TaskCategory::Personal,
            priority: 3,
            energy: EnergyLevel::Low,
            start: NOON,
            end: LUNCH_END,
        },
        Segment {
            title: "Afternoon Work Block",
            category: TaskCategory::Work,
            priority: 1,
            energy: EnergyLevel::High,
            start: LUNCH_END,
            end: profile.work_end_time,
        },
        Segment {
            title: "Evening Wind-down",
            category: TaskCategory::Personal,
            priority: 4,
            energy: EnergyLevel::Low,
            start: profile.work_end_time,
            end: boundary,
        },
    ];

    let mut cursor = profile.wake_time;
    let mut tasks = Vec::with_capacity(segments.len());
    for segment in segments {
        let start = segment.start.max(cursor);
        let end = segment.end.min(boundary);
        if end <= start {
            continue;
        }
        let mut task = DraftTask::timed(segment.title, segment.category, start, end, segment.priority);
        task.energy_required = segment.energy;
        tasks.push(task);
        cursor = end;
    }
    tasks
}

fn checklist(plan_type: PlanType) -> Vec<DraftTask> {
    let items: &[(&str, TaskCategory, u8)] = match plan_type {
        PlanType::Monthly => &[
            ("Set this month's milestones", TaskCategory::Work, 1),
            ("Review monthly budget", TaskCategory::Finance, 2),
            ("Health check-in", TaskCategory::Health, 2),
            ("Pick one skill to practise", TaskCategory::Learning, 3),
            ("Plan personal time", TaskCategory::Personal, 4),
        ],
        PlanType::Finance => &[
            ("Record this month's income", TaskCategory::Finance, 1),
            ("Review fixed expenses", TaskCategory::Finance, 2),
            ("Set a savings target", TaskCategory::Finance, 2),
            ("Check upcoming bills", TaskCategory::Finance, 2),
            ("Review discretionary spending", TaskCategory::Finance, 3),
        ],
        _ => &[
            ("Define the week's top work outcome", TaskCategory::Work, 1),
            ("Exercise three times", TaskCategory::Health, 2),
            ("Weekly budget check", TaskCategory::Finance, 3),
            ("Learning session", TaskCategory::Learning, 3),
            ("Review last week's progress", TaskCategory::Personal, 4),
        ],
    };

    items
        .iter()
        .map(|(title, category, priority)| DraftTask::untimed(*title, *category, *priority))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::profile::UserId;

    fn profile(wake: ClockTime, start: ClockTime, end: ClockTime, sleep: ClockTime) -> UserProfile {
        let mut profile = UserProfile::with_defaults(UserId::new());
        profile.wake_time = wake;
        profile.work_start_time = start;
        profile.work_end_time = end;
        profile.sleep_time = sleep;
        profile
    }

    fn assert_non_overlapping(tasks: &[DraftTask]) {
        for pair in tasks.windows(2) {
            let (_, prev_end) = pair[0].window().unwrap();
            let (next_start, _) = pair[1].window().unwrap();
            assert!(prev_end <= next_start, "{} overlaps {}", pair[0].title, pair[1].title);
        }
    }

    #[test]
    fn test_standard_day_has_five_segments() {
        let p = profile(ClockTime::hm(7, 0), ClockTime::hm(9, 0), ClockTime::hm(18, 0), ClockTime::hm(23, 0));
        let draft = fallback_draft(&p, PlanType::Daily, "backend down");

        let titles: Vec<&str> = draft.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Morning Routine", "Work Block", "Lunch", "Afternoon Work Block", "Evening Wind-down"]
        );
        assert_eq!(draft.tasks[0].window(), Some((ClockTime::hm(7, 0), ClockTime::hm(9, 0))));
        assert_eq!(draft.tasks[4].window(), Some((ClockTime::hm(18, 0), ClockTime::hm(23, 0))));
        assert_eq!(draft.summary, "Fallback schedule: wake 07:00, sleep 23:00");
        assert_eq!(draft.clarification_questions.len(), 1);
        assert!(draft.is_fallback());
        assert_non_overlapping(&draft.tasks);
    }

    #[test]
    fn test_afternoon_shift_skips_inverted_segments() {
        let p = profile(ClockTime::hm(11, 0), ClockTime::hm(14, 0), ClockTime::hm(22, 0), ClockTime::hm(23, 30));
        let tasks = day_skeleton(&p);

        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Morning Routine", "Afternoon Work Block", "Evening Wind-down"]);
        assert_eq!(tasks[1].window(), Some((ClockTime::hm(14, 0), ClockTime::hm(22, 0))));
        assert_non_overlapping(&tasks);
    }

    #[test]
    fn test_is_deterministic() {
        let p = profile(ClockTime::hm(6, 0), ClockTime::hm(8, 30), ClockTime::hm(16, 30), ClockTime::hm(22, 0));
        assert_eq!(day_skeleton(&p), day_skeleton(&p));
    }

    #[test]
    fn test_non_daily_plans_get_untimed_checklists() {
        let p = UserProfile::with_defaults(UserId::new());
        for plan_type in [PlanType::Weekly, PlanType::Monthly, PlanType::Finance] {
            let draft = fallback_draft(&p, plan_type, "timeout");
            assert_eq!(draft.tasks.len(), 5);
            assert!(draft.tasks.iter().all(|t| t.window().is_none()));
            assert!(!draft.summary.is_empty());
        }
    }
}
