// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task
//!
//! Scheduled units of work inside a Plan, plus the `HH:MM` clock type used
//! for task windows.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Task entity and its value objects

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::plan::PlanId;

pub const PRIORITY_HIGHEST: u8 = 1;
pub const PRIORITY_LOWEST: u8 = 5;
pub const PRIORITY_DEFAULT: u8 = 3;

/// Last representable minute of the day (23:59)
pub const LAST_MINUTE_OF_DAY: u16 = 23 * 60 + 59;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Minutes since midnight, serialised as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= LAST_MINUTE_OF_DAY).then_some(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    /// Const constructor for known-good literals.
    pub const fn hm(hour: u16, minute: u16) -> Self {
        Self(hour * 60 + minute)
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }

    pub fn hour(&self) -> u16 {
        self.0 / 60
    }

    /// `None` when the result would run past the end of the day.
    pub fn checked_add_minutes(&self, minutes: u32) -> Option<Self> {
        let total = self.0 as u32 + minutes;
        u16::try_from(total).ok().and_then(Self::from_minutes)
    }

    pub fn minutes_until(&self, later: ClockTime) -> i32 {
        later.0 as i32 - self.0 as i32
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid clock time '{0}', expected HH:MM")]
pub struct ClockTimeError(pub String);

impl FromStr for ClockTime {
    type Err = ClockTimeError;

    /// Accepts `HH:MM` and `H:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ClockTimeError(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(err());
        }
        let hour: u16 = h.parse().map_err(|_| err())?;
        let minute: u16 = m.parse().map_err(|_| err())?;
        ClockTime::from_hm(hour, minute).ok_or_else(err)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Work,
    Health,
    Learning,
    Finance,
    Personal,
    Other,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Work => "work",
            TaskCategory::Health => "health",
            TaskCategory::Learning => "learning",
            TaskCategory::Finance => "finance",
            TaskCategory::Personal => "personal",
            TaskCategory::Other => "other",
        }
    }

    /// Strict parse of the canonical lowercase name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "work" => Some(TaskCategory::Work),
            "health" => Some(TaskCategory::Health),
            "learning" => Some(TaskCategory::Learning),
            "finance" => Some(TaskCategory::Finance),
            "personal" => Some(TaskCategory::Personal),
            "other" => Some(TaskCategory::Other),
            _ => None,
        }
    }

    /// Lenient mapping of free-form labels: synonyms first, unknown → `Other`.
    ///
    /// `"work|learning"` style alternatives resolve to the first option.
    pub fn from_label(raw: &str) -> Self {
        let label = raw.split('|').next().unwrap_or("").trim().to_lowercase();
        if let Some(category) = Self::parse(&label) {
            return category;
        }
        match label.as_str() {
            "social" | "socializing" | "fun" | "entertainment" | "family" | "leisure" | "hobby"
            | "meal" | "chores" => TaskCategory::Personal,
            "study" | "reading" | "course" | "education" | "research" => TaskCategory::Learning,
            "gym" | "exercise" | "fitness" | "meditation" | "sleep" | "wellness" => {
                TaskCategory::Health
            }
            "job" | "meeting" | "email" | "office" | "career" => TaskCategory::Work,
            "budget" | "money" | "savings" | "investing" | "bills" => TaskCategory::Finance,
            _ => TaskCategory::Other,
        }
    }

    pub fn is_focus_work(&self) -> bool {
        matches!(self, TaskCategory::Work | TaskCategory::Learning)
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    High,
    Medium,
    Low,
}

impl EnergyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyLevel::High => "high",
            EnergyLevel::Medium => "medium",
            EnergyLevel::Low => "low",
        }
    }

    pub fn from_label(raw: &str) -> Self {
        let label = raw.to_lowercase();
        if label.contains("high") {
            EnergyLevel::High
        } else if label.contains("low") {
            EnergyLevel::Low
        } else {
            EnergyLevel::Medium
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
    Missed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
            TaskStatus::Missed => "missed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "done" | "completed" => Some(TaskStatus::Done),
            "missed" => Some(TaskStatus::Missed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted task belonging to exactly one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub plan_id: PlanId,
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    /// 1 = most important, 5 = optional
    pub priority: u8,
    pub status: TaskStatus,
    /// Minutes
    pub estimated_duration: u32,
    pub energy_required: EnergyLevel,
}

impl Task {
    pub fn window(&self) -> Option<(ClockTime, ClockTime)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_parse_and_display() {
        assert_eq!("09:30".parse::<ClockTime>().unwrap(), ClockTime::hm(9, 30));
        assert_eq!("9:05".parse::<ClockTime>().unwrap().to_string(), "09:05");
        assert!("24:00".parse::<ClockTime>().is_err());
        assert!("12:60".parse::<ClockTime>().is_err());
        assert!("noon".parse::<ClockTime>().is_err());
        assert!("123:00".parse::<ClockTime>().is_err());
    }

    #[test]
    fn test_clock_time_serde_as_string() {
        let json = serde_json::to_string(&ClockTime::hm(7, 0)).unwrap();
        assert_eq!(json, "\"07:00\"");
        let parsed: ClockTime = serde_json::from_str("\"23:59\"").unwrap();
        assert_eq!(parsed.minutes(), LAST_MINUTE_OF_DAY);
    }

    #[test]
    fn test_checked_add_stops_at_end_of_day() {
        assert_eq!(ClockTime::hm(23, 0).checked_add_minutes(59), Some(ClockTime::hm(23, 59)));
        assert_eq!(ClockTime::hm(23, 0).checked_add_minutes(60), None);
    }

    #[test]
    fn test_category_synonyms() {
        assert_eq!(TaskCategory::from_label("Gym"), TaskCategory::Health);
        assert_eq!(TaskCategory::from_label("study"), TaskCategory::Learning);
        assert_eq!(TaskCategory::from_label("work|learning"), TaskCategory::Work);
        assert_eq!(TaskCategory::from_label("commute"), TaskCategory::Other);
        assert_eq!(TaskCategory::from_label("socializing"), TaskCategory::Personal);
        assert_eq!(TaskCategory::from_label("astral projection"), TaskCategory::Other);
    }

    #[test]
    fn test_energy_from_label() {
        assert_eq!(EnergyLevel::from_label("HIGH focus"), EnergyLevel::High);
        assert_eq!(EnergyLevel::from_label("low"), EnergyLevel::Low);
        assert_eq!(EnergyLevel::from_label("whatever"), EnergyLevel::Medium);
    }
}
