// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Model output normalisation
//!
//! Maps the loosely-shaped object a model returns onto [`DraftTask`]s.
//! Nothing in here fails: unusable fields fall back to defaults and
//! unusable tasks are dropped.
//!
//! Finance responses list budget `items` and weekly responses list `goals`
//! instead of `tasks`; both become tasks. The remaining per-type sections
//! (projected totals, insights, outcomes, habits, allocation) are kept in
//! the plan metadata.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::draft::{DraftTask, DEFAULT_TASK_MINUTES};
use crate::domain::plan::PlanType;
use crate::domain::task::{
    ClockTime, EnergyLevel, TaskCategory, PRIORITY_DEFAULT, PRIORITY_HIGHEST, PRIORITY_LOWEST,
};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_SUMMARY_LEN: usize = 500;

/// Model output after normalisation, before any schedule rules run
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOutput {
    pub summary: String,
    pub tasks: Vec<DraftTask>,
    pub clarification_questions: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

pub fn normalize_output(mut raw: Map<String, Value>, plan_type: PlanType) -> NormalizedOutput {
    let summary = ["plan_summary", "summary"]
        .iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| truncate_chars(s, MAX_SUMMARY_LEN))
        .unwrap_or_else(|| plan_type.default_summary().to_string());

    let clarification_questions = raw
        .get("clarification_questions")
        .and_then(Value::as_array)
        .map(|questions| {
            questions
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut metadata: BTreeMap<String, Value> = match raw.remove("metadata") {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };

    let tasks = match plan_type {
        PlanType::Finance if !raw.contains_key("tasks") && raw.contains_key("items") => {
            debug!("Mapping finance items onto tasks");
            finance_tasks(&raw)
        }
        PlanType::Weekly if !raw.contains_key("tasks") && raw.contains_key("goals") => {
            debug!("Mapping weekly goals onto tasks");
            weekly_tasks(&raw)
        }
        _ => extract_tasks(&raw),
    };
    metadata.extend(type_sections(&raw, plan_type));

    NormalizedOutput {
        summary,
        tasks,
        clarification_questions,
        metadata,
    }
}

/// Models sometimes return a single task, or a map of tasks keyed by
/// position, instead of a `tasks` array.
fn extract_tasks(raw: &Map<String, Value>) -> Vec<DraftTask> {
    if let Some(tasks) = raw.get("tasks") {
        return tasks
            .as_array()
            .map(|items| items.iter().filter_map(normalize_task).collect())
            .unwrap_or_default();
    }

    if raw.contains_key("title") {
        debug!("Model returned a single task, wrapping it");
        return normalize_task_fields(raw).into_iter().collect();
    }

    let keyed: Vec<DraftTask> = raw
        .values()
        .filter_map(Value::as_object)
        .filter(|o| o.contains_key("title") || o.contains_key("category"))
        .filter_map(normalize_task_fields)
        .collect();
    if !keyed.is_empty() {
        debug!(count = keyed.len(), "Model returned keyed tasks, wrapping them");
    }
    keyed
}

const FINANCE_ITEM_TYPES: [&str; 5] = [
    "income",
    "expense_fixed",
    "expense_variable",
    "savings",
    "debt_payment",
];
const FINANCE_TAGS: [&str; 4] = ["need", "want", "investment", "waste"];

fn objects<'a>(raw: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    raw.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn finance_tasks(raw: &Map<String, Value>) -> Vec<DraftTask> {
    objects(raw, "items")
        .filter_map(|item| {
            let mut task = normalize_task_fields(item)?;
            task.category = TaskCategory::Finance;
            if task.description.is_none() {
                task.description = Some(finance_description(item));
            }
            Some(task)
        })
        .collect()
}

/// `"expense_fixed, need: 1100.00 due 2026-03-01"`
fn finance_description(item: &Map<String, Value>) -> String {
    let mut description = finance_item_type(item).to_string();
    if let Some(tag) = finance_tag(item) {
        description.push_str(", ");
        description.push_str(tag);
    }
    if let Some(amount) = item.get("amount").and_then(normalize_amount) {
        description.push_str(&format!(": {:.2}", amount));
    }
    if let Some(due) = text_field(item, "due_date") {
        description.push_str(" due ");
        description.push_str(due);
    }
    description
}

fn finance_item_type(item: &Map<String, Value>) -> &'static str {
    let label = item
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_lowercase())
        .unwrap_or_default();
    FINANCE_ITEM_TYPES
        .iter()
        .find(|known| **known == label)
        .copied()
        .unwrap_or("expense_variable")
}

fn finance_tag(item: &Map<String, Value>) -> Option<&'static str> {
    let label = item.get("tag").and_then(Value::as_str)?.trim().to_lowercase();
    FINANCE_TAGS.iter().find(|known| **known == label).copied()
}

fn weekly_tasks(raw: &Map<String, Value>) -> Vec<DraftTask> {
    objects(raw, "goals")
        .filter_map(|goal| {
            let mut task = normalize_task_fields(goal)?;
            if task.description.is_none() {
                task.description = weekly_description(goal);
            }
            Some(task)
        })
        .collect()
}

fn weekly_description(goal: &Map<String, Value>) -> Option<String> {
    let mut parts = Vec::new();
    let steps: Vec<&str> = goal
        .get("subtasks")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if !steps.is_empty() {
        parts.push(format!("Steps: {}", steps.join(", ")));
    }
    if let Some(day) = text_field(goal, "deadline_day") {
        parts.push(format!("Due {}", day));
    }
    if let Some(outcome) = text_field(goal, "linked_outcome_id") {
        parts.push(format!("Outcome {}", outcome));
    }
    (!parts.is_empty()).then(|| parts.join(". "))
}

/// Per-type sections that travel with the plan as metadata
fn type_sections(raw: &Map<String, Value>, plan_type: PlanType) -> BTreeMap<String, Value> {
    let mut sections = BTreeMap::new();
    match plan_type {
        PlanType::Finance => {
            for key in ["total_income_projected", "total_expenses_projected", "savings_goal"] {
                if let Some(amount) = raw.get(key).and_then(normalize_amount) {
                    sections.insert(key.to_string(), json!(amount));
                }
            }
            if let Some(score) = raw.get("financial_health_score").and_then(normalize_amount) {
                sections.insert(
                    "financial_health_score".to_string(),
                    json!(score.round().clamp(0.0, 100.0) as i64),
                );
            }

            let ledger: Vec<Value> = objects(raw, "items")
                .filter_map(|item| {
                    let title = text_field(item, "title")?;
                    Some(json!({
                        "title": truncate_chars(title, MAX_TITLE_LEN),
                        "type": finance_item_type(item),
                        "tag": finance_tag(item),
                        "amount": item.get("amount").and_then(normalize_amount).unwrap_or(0.0),
                        "due_date": text_field(item, "due_date"),
                    }))
                })
                .collect();
            if !ledger.is_empty() {
                sections.insert("items".to_string(), Value::Array(ledger));
            }

            let insights: Vec<Value> = objects(raw, "ai_insights")
                .map(|insight| Value::Object(insight.clone()))
                .collect();
            if !insights.is_empty() {
                sections.insert("ai_insights".to_string(), Value::Array(insights));
            }
        }
        PlanType::Weekly => {
            if let Some(focus) = text_field(raw, "focus_area") {
                sections.insert("focus_area".to_string(), json!(focus));
            }
            for key in ["outcomes", "habits", "capital_allocation"] {
                let entries: Vec<Value> = objects(raw, key).map(|e| Value::Object(e.clone())).collect();
                if !entries.is_empty() {
                    sections.insert(key.to_string(), Value::Array(entries));
                }
            }
        }
        PlanType::Daily | PlanType::Monthly | PlanType::Custom => {}
    }
    sections
}

fn text_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Numbers, or strings such as `"$1,200.50"`
pub fn normalize_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

pub fn normalize_task(value: &Value) -> Option<DraftTask> {
    normalize_task_fields(value.as_object()?)
}

fn normalize_task_fields(task: &Map<String, Value>) -> Option<DraftTask> {
    let title = task
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())?;

    let description = task
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let category = task
        .get("category")
        .and_then(Value::as_str)
        .map(TaskCategory::from_label)
        .unwrap_or(TaskCategory::Other);

    let energy_required = task
        .get("energy_required")
        .and_then(Value::as_str)
        .map(EnergyLevel::from_label)
        .unwrap_or(EnergyLevel::Medium);

    let start_time = task.get("start_time").and_then(normalize_time);
    let end_time = task.get("end_time").and_then(normalize_time);

    let estimated_duration = task
        .get("estimated_duration")
        .and_then(Value::as_f64)
        .filter(|d| d.is_finite() && *d >= 1.0)
        .map(|d| d as u32)
        .or_else(|| match (start_time, end_time) {
            (Some(start), Some(end)) if end > start => Some(start.minutes_until(end) as u32),
            _ => None,
        })
        .unwrap_or(DEFAULT_TASK_MINUTES);

    Some(DraftTask {
        title: truncate_chars(title, MAX_TITLE_LEN),
        description,
        category,
        start_time,
        end_time,
        priority: task
            .get("priority")
            .map(normalize_priority)
            .unwrap_or(PRIORITY_DEFAULT),
        energy_required,
        estimated_duration,
    })
}

/// Clamp to `1..=5`; labels map critical 1, high 2, medium 3, low 4, optional 5.
///
/// Numeric strings clamp exactly like numbers; `"p2"` reads its digits.
pub fn normalize_priority(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n.as_f64().and_then(round_priority),
        Value::String(s) => Some(priority_from_label(s)),
        _ => None,
    };

    raw.map(|p| p.clamp(PRIORITY_HIGHEST as i64, PRIORITY_LOWEST as i64) as u8)
        .unwrap_or(PRIORITY_DEFAULT)
}

fn round_priority(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.round() as i64)
}

fn priority_from_label(raw: &str) -> i64 {
    let label = raw.trim().to_lowercase();
    if let Some(numeric) = label.parse::<f64>().ok().and_then(round_priority) {
        return numeric;
    }

    if label.contains("critical") || label.contains("urgent") {
        return 1;
    }
    if label.contains("high") {
        return 2;
    }
    if label.contains("medium") || label.contains("normal") {
        return 3;
    }
    if label.contains("low") {
        return 4;
    }
    if label.contains("optional") {
        return 5;
    }

    let digits: String = label.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<i64>().unwrap_or(PRIORITY_DEFAULT as i64)
}

/// Accepts `HH:MM`, `H:MM`, hour integers (`9`) and packed integers (`930`).
pub fn normalize_time(value: &Value) -> Option<ClockTime> {
    match value {
        Value::Number(n) => {
            let v = n.as_f64().filter(|f| f.is_finite() && *f >= 0.0)? as u32;
            match v {
                0 => ClockTime::from_minutes(0),
                1..=23 => ClockTime::from_hm(v as u16, 0),
                v if v >= 100 => ClockTime::from_hm((v / 100) as u16, (v % 100) as u16),
                _ => None,
            }
        }
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
