// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Self-healing pass run on a draft before it is persisted
//!
//! 1. Overlap resolution: the lower-priority task of an intersecting pair
//!    moves to the end of the other, keeping its duration (minimum
//!    `min_task_minutes`). Repeats until nothing intersects. Tasks pushed
//!    past the end of the day are dropped.
//! 2. Label correction: `morning`/`afternoon`/`evening` in a title follows
//!    the task's start time.
//! 3. Gap filling: gaps longer than `gap_threshold_minutes` between
//!    consecutive timed tasks become a `Routine Block`.
//!
//! Timed tasks come out sorted by start time, followed by untimed tasks in
//! their original order.

use tracing::{debug, info, warn};

use crate::domain::config::PersistenceConfig;
use crate::domain::draft::DraftTask;
use crate::domain::task::{ClockTime, EnergyLevel, TaskCategory, PRIORITY_LOWEST};

pub const GAP_FILLER_TITLE: &str = "Routine Block";

const DAY_PARTS: [&str; 3] = ["morning", "afternoon", "evening"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealingReport {
    pub shifted: usize,
    pub dropped: usize,
    pub relabeled: usize,
    pub gaps_filled: usize,
}

pub struct SelfHealer {
    gap_threshold_minutes: u32,
    min_task_minutes: u32,
}

impl SelfHealer {
    pub fn new(config: &PersistenceConfig) -> Self {
        Self {
            gap_threshold_minutes: config.gap_threshold_minutes,
            min_task_minutes: config.min_task_minutes.max(1),
        }
    }

    /// Run all three steps. `day_end` is the latest minute a task may end.
    pub fn heal(&self, tasks: Vec<DraftTask>, day_end: ClockTime) -> (Vec<DraftTask>, HealingReport) {
        let mut report = HealingReport::default();
        let (timed, untimed): (Vec<DraftTask>, Vec<DraftTask>) =
            tasks.into_iter().partition(|t| t.window().is_some());

        let mut timed = self.resolve_overlaps(timed, day_end, &mut report);
        for task in &mut timed {
            if correct_day_part_label(task) {
                report.relabeled += 1;
            }
        }
        let mut healed = self.fill_gaps(timed, &mut report);
        healed.extend(untimed);

        if report != HealingReport::default() {
            info!(
                shifted = report.shifted,
                dropped = report.dropped,
                relabeled = report.relabeled,
                gaps_filled = report.gaps_filled,
                "Self-healing adjusted draft"
            );
        }
        (healed, report)
    }

    fn resolve_overlaps(
        &self,
        tasks: Vec<DraftTask>,
        day_end: ClockTime,
        report: &mut HealingReport,
    ) -> Vec<DraftTask> {
        let mut slots: Vec<Option<DraftTask>> = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if self.repair_window(&mut task, day_end) {
                slots.push(Some(task));
            } else {
                debug!(title = %task.title, "Dropped task with unusable window");
                report.dropped += 1;
            }
        }

        // Every shift moves a task strictly later, bounded by tasks × minutes per day
        let max_rounds = slots.len().saturating_mul(24 * 60).max(1);
        let mut rounds = 0;
        while let Some((loser, winner_end)) = find_overlap(&slots) {
            rounds += 1;
            if rounds > max_rounds {
                warn!("Overlap resolution did not converge, dropping remaining overlaps");
                slots[loser] = None;
                report.dropped += 1;
                continue;
            }

            let Some(task) = slots[loser].as_mut() else {
                continue;
            };
            let duration = task.estimated_duration.max(self.min_task_minutes);
            match winner_end.checked_add_minutes(duration).filter(|end| *end <= day_end) {
                Some(new_end) => {
                    debug!(title = %task.title, start = %winner_end, "Shifted overlapping task");
                    task.start_time = Some(winner_end);
                    task.end_time = Some(new_end);
                    task.estimated_duration = duration;
                    report.shifted += 1;
                }
                None => {
                    info!(title = %task.title, "Dropped task pushed past the end of the day");
                    slots[loser] = None;
                    report.dropped += 1;
                }
            }
        }

        let mut resolved: Vec<DraftTask> = slots.into_iter().flatten().collect();
        resolved.sort_by_key(|t| t.start_time);
        resolved
    }

    /// Give inverted or empty windows a duration-based end. Returns false
    /// when the task cannot fit before `day_end`.
    fn repair_window(&self, task: &mut DraftTask, day_end: ClockTime) -> bool {
        let Some((start, end)) = task.window() else {
            return false;
        };
        if start >= day_end {
            return false;
        }
        if end > start {
            if end > day_end {
                task.end_time = Some(day_end);
                task.estimated_duration = start.minutes_until(day_end) as u32;
            }
            return true;
        }
        let duration = task.estimated_duration.max(self.min_task_minutes);
        match start.checked_add_minutes(duration).filter(|e| *e <= day_end) {
            Some(end) => {
                task.end_time = Some(end);
                task.estimated_duration = duration;
                true
            }
            None => false,
        }
    }

    fn fill_gaps(&self, tasks: Vec<DraftTask>, report: &mut HealingReport) -> Vec<DraftTask> {
        let mut filled = Vec::with_capacity(tasks.len());
        let mut previous_end: Option<ClockTime> = None;

        for task in tasks {
            if let (Some(prev_end), Some((start, _))) = (previous_end, task.window()) {
                let gap = prev_end.minutes_until(start);
                if gap > self.gap_threshold_minutes as i32 {
                    let mut block = DraftTask::timed(
                        GAP_FILLER_TITLE,
                        TaskCategory::Personal,
                        prev_end,
                        start,
                        PRIORITY_LOWEST,
                    );
                    block.energy_required = EnergyLevel::Low;
                    filled.push(block);
                    report.gaps_filled += 1;
                }
            }
            previous_end = task.end_time;
            filled.push(task);
        }
        filled
    }
}

/// First intersecting pair, as `(loser index, winner end)`.
fn find_overlap(slots: &[Option<DraftTask>]) -> Option<(usize, ClockTime)> {
    let windows: Vec<(usize, u8, ClockTime, ClockTime)> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            let task = slot.as_ref()?;
            let (start, end) = task.window()?;
            Some((i, task.priority, start, end))
        })
        .collect();

    for (a, &(i, pi, si, ei)) in windows.iter().enumerate() {
        for &(j, pj, sj, ej) in &windows[a + 1..] {
            if si < ej && sj < ei {
                // Larger priority number loses, then the later start, then the later index
                let i_loses = (pi, si, i) > (pj, sj, j);
                return Some(if i_loses { (i, ej) } else { (j, ei) });
            }
        }
    }
    None
}

fn bucket_word(start: ClockTime) -> &'static str {
    match start.hour() {
        0..=11 => "morning",
        12..=17 => "afternoon",
        _ => "evening",
    }
}

/// Rewrite day-part words to match the start time, keeping their casing.
fn correct_day_part_label(task: &mut DraftTask) -> bool {
    let Some(start) = task.start_time else {
        return false;
    };
    let expected = bucket_word(start);
    let mut changed = false;
    let mut relabeled = String::with_capacity(task.title.len());
    let mut word = String::new();

    // Walk alphabetic runs so "Mornings" or "goodmorning" are left alone
    for c in task.title.chars().chain(std::iter::once(' ')) {
        if c.is_alphabetic() {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            let lower = word.to_lowercase();
            if DAY_PARTS.contains(&lower.as_str()) && lower != expected {
                relabeled.push_str(&match_case(&word, expected));
                changed = true;
            } else {
                relabeled.push_str(&word);
            }
            word.clear();
        }
        relabeled.push(c);
    }
    relabeled.pop();

    if changed {
        debug!(from = %task.title, to = %relabeled, "Corrected day-part label");
        task.title = relabeled;
    }
    changed
}

fn match_case(template: &str, word: &str) -> String {
    if template.chars().all(|c| c.is_uppercase()) {
        return word.to_uppercase();
    }
    let mut chars = word.chars();
    match (template.chars().next(), chars.next()) {
        (Some(first), Some(w)) if first.is_uppercase() => w.to_uppercase().chain(chars).collect(),
        _ => word.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u16, m: u16) -> ClockTime {
        ClockTime::hm(h, m)
    }

    fn healer() -> SelfHealer {
        SelfHealer::new(&PersistenceConfig::default())
    }

    fn task(title: &str, start: ClockTime, end: ClockTime, priority: u8) -> DraftTask {
        DraftTask::timed(title, TaskCategory::Work, start, end, priority)
    }

    fn assert_no_intersections(tasks: &[DraftTask]) {
        let windows: Vec<_> = tasks.iter().filter_map(|t| t.window()).collect();
        for (i, a) in windows.iter().enumerate() {
            for b in &windows[i + 1..] {
                assert!(!(a.0 < b.1 && b.0 < a.1), "{:?} intersects {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_lower_priority_task_moves_after_higher() {
        let tasks = vec![
            task("Emails", t(9, 0), t(10, 0), 3),
            task("Standup", t(9, 30), t(10, 0), 1),
        ];
        let (healed, report) = healer().heal(tasks, t(23, 59));

        assert_eq!(report.shifted, 1);
        assert_eq!(healed[0].title, "Standup");
        assert_eq!(healed[1].title, "Emails");
        assert_eq!(healed[1].window(), Some((t(10, 0), t(11, 0))));
        assert_no_intersections(&healed);
    }

    #[test]
    fn test_equal_priority_later_start_moves() {
        let tasks = vec![
            task("B", t(10, 0), t(11, 0), 2),
            task("A", t(9, 0), t(10, 30), 2),
        ];
        let (healed, _) = healer().heal(tasks, t(23, 59));

        assert_eq!(healed[0].title, "A");
        assert_eq!(healed[1].window(), Some((t(10, 30), t(11, 30))));
    }

    #[test]
    fn test_cascading_overlaps_resolve() {
        let tasks = vec![
            task("One", t(9, 0), t(10, 0), 1),
            task("Two", t(9, 0), t(10, 0), 2),
            task("Three", t(9, 0), t(10, 0), 3),
            task("Four", t(9, 15), t(9, 20), 4),
        ];
        let (healed, report) = healer().heal(tasks, t(23, 59));

        assert_eq!(healed.len(), 4);
        assert_no_intersections(&healed);
        assert!(report.shifted >= 3);
        // Short tasks get the minimum duration when moved
        let four = healed.iter().find(|t| t.title == "Four").unwrap();
        assert!(four.estimated_duration >= 15);
    }

    #[test]
    fn test_task_pushed_past_day_end_is_dropped() {
        let tasks = vec![
            task("Late work", t(21, 0), t(22, 45), 1),
            task("Series", t(22, 0), t(22, 50), 5),
        ];
        let (healed, report) = healer().heal(tasks, t(23, 0));

        assert_eq!(healed.len(), 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(healed[0].title, "Late work");
    }

    #[test]
    fn test_labels_follow_start_time() {
        let tasks = vec![
            task("Morning Run", t(19, 0), t(19, 30), 2),
            task("EVENING review", t(8, 0), t(8, 30), 2),
            task("afternoon nap", t(13, 0), t(13, 30), 2),
            task("Mornings are for reading", t(14, 0), t(14, 30), 2),
        ];
        let (healed, report) = healer().heal(tasks, t(23, 59));
        let titles: Vec<&str> = healed.iter().map(|t| t.title.as_str()).collect();

        assert_eq!(report.relabeled, 2);
        assert!(titles.contains(&"MORNING review"));
        assert!(titles.contains(&"Evening Run"));
        assert!(titles.contains(&"afternoon nap"));
        assert!(titles.contains(&"Mornings are for reading"));
    }

    #[test]
    fn test_long_gaps_are_filled() {
        let tasks = vec![
            task("Deep work", t(9, 0), t(11, 0), 1),
            task("Meeting", t(11, 30), t(12, 0), 2),
            task("Review", t(15, 0), t(16, 0), 2),
        ];
        let (healed, report) = healer().heal(tasks, t(23, 59));

        assert_eq!(report.gaps_filled, 1);
        assert_eq!(healed.len(), 4);
        let filler = &healed[2];
        assert_eq!(filler.title, GAP_FILLER_TITLE);
        assert_eq!(filler.window(), Some((t(12, 0), t(15, 0))));
        assert_eq!(filler.category, TaskCategory::Personal);
        assert_eq!(filler.priority, 5);
        assert_eq!(filler.energy_required, EnergyLevel::Low);
    }

    #[test]
    fn test_untimed_tasks_pass_through_last() {
        let tasks = vec![
            DraftTask::untimed("Call bank", TaskCategory::Finance, 2),
            task("Gym", t(18, 0), t(19, 0), 2),
        ];
        let (healed, _) = healer().heal(tasks, t(23, 59));

        assert_eq!(healed[0].title, "Gym");
        assert_eq!(healed[1].title, "Call bank");
    }

    #[test]
    fn test_inverted_window_gets_duration_based_end() {
        let mut inverted = task("Swap", t(10, 0), t(9, 0), 3);
        inverted.estimated_duration = 45;
        let (healed, _) = healer().heal(vec![inverted], t(23, 59));

        assert_eq!(healed[0].window(), Some((t(10, 0), t(10, 45))));
    }
}
