// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! User profile and weekday routine templates

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::task::{ClockTime, TaskCategory};

pub use lifeos_cortex::domain::UserId;

pub const DEFAULT_WAKE_TIME: ClockTime = ClockTime::hm(7, 0);
pub const DEFAULT_WORK_START: ClockTime = ClockTime::hm(9, 0);
pub const DEFAULT_WORK_END: ClockTime = ClockTime::hm(17, 0);
pub const DEFAULT_SLEEP_TIME: ClockTime = ClockTime::hm(23, 0);

fn default_wake_time() -> ClockTime {
    DEFAULT_WAKE_TIME
}

fn default_work_start() -> ClockTime {
    DEFAULT_WORK_START
}

fn default_work_end() -> ClockTime {
    DEFAULT_WORK_END
}

fn default_sleep_time() -> ClockTime {
    DEFAULT_SLEEP_TIME
}

/// Scheduling facts about a user. Missing fields fall back to a 07:00 to
/// 23:00 day with a 09:00 to 17:00 work block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,

    #[serde(default = "default_wake_time")]
    pub wake_time: ClockTime,

    #[serde(default = "default_work_start")]
    pub work_start_time: ClockTime,

    #[serde(default = "default_work_end")]
    pub work_end_time: ClockTime,

    #[serde(default = "default_sleep_time")]
    pub sleep_time: ClockTime,

    /// Free-form, e.g. "Student", "Professional"
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub health_goals: Vec<String>,

    #[serde(default)]
    pub learning_goals: Vec<String>,

    #[serde(default)]
    pub finance_goals: Vec<String>,

    #[serde(default)]
    pub constraints: Vec<String>,
}

impl UserProfile {
    pub fn with_defaults(user_id: UserId) -> Self {
        Self {
            user_id,
            wake_time: DEFAULT_WAKE_TIME,
            work_start_time: DEFAULT_WORK_START,
            work_end_time: DEFAULT_WORK_END,
            sleep_time: DEFAULT_SLEEP_TIME,
            role: None,
            health_goals: Vec::new(),
            learning_goals: Vec::new(),
            finance_goals: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Professionals and students have a protected work/school window.
    pub fn has_locked_work_window(&self) -> bool {
        match self.role.as_deref().map(|r| r.trim().to_lowercase()) {
            Some(role) => matches!(
                role.as_str(),
                "professional" | "working" | "employee" | "student"
            ),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineBlock {
    pub title: String,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub category: TaskCategory,
}

/// Recurring skeleton for the given weekdays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineTemplate {
    pub user_id: UserId,
    pub name: String,
    pub weekdays: Vec<Weekday>,
    pub blocks: Vec<RoutineBlock>,
}

impl RoutineTemplate {
    pub fn applies_to(&self, weekday: Weekday) -> bool {
        self.weekdays.contains(&weekday)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults_from_sparse_json() {
        let user = UserId::new();
        let json = format!(r#"{{"user_id": "{}", "role": "Student"}}"#, user.0);
        let profile: UserProfile = serde_json::from_str(&json).unwrap();

        assert_eq!(profile.wake_time, ClockTime::hm(7, 0));
        assert_eq!(profile.work_start_time, ClockTime::hm(9, 0));
        assert_eq!(profile.work_end_time, ClockTime::hm(17, 0));
        assert_eq!(profile.sleep_time, ClockTime::hm(23, 0));
        assert!(profile.has_locked_work_window());
    }

    #[test]
    fn test_unknown_role_has_no_work_lock() {
        let mut profile = UserProfile::with_defaults(UserId::new());
        assert!(!profile.has_locked_work_window());
        profile.role = Some("Retired".into());
        assert!(!profile.has_locked_work_window());
        profile.role = Some(" professional ".into());
        assert!(profile.has_locked_work_window());
    }
}
