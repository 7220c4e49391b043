// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Plan Generator
//!
//! Second stage of the planning pipeline. Renders the prompt, calls the
//! resolved [`LLMProvider`] with bounded retries inside a wall-clock budget,
//! recovers and normalises the JSON, and applies the daily schedule locks.
//!
//! Generation never fails from the caller's point of view. Once every
//! attempt has failed (or the budget ran out) the deterministic fallback
//! plan is returned instead, counted in `lifeos_plan_fallback_total`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use lifeos_cortex::application::PrioritizedMemory;

use crate::domain::config::GenerationConfig;
use crate::domain::draft::{DraftSource, PlanDraft};
use crate::domain::llm::{GenerationOptions, LLMError};
use crate::domain::plan::PlanType;
use crate::domain::profile::{RoutineTemplate, UserProfile};
use crate::infrastructure::json_recovery::{recover_object, JsonRecoveryError};
use crate::infrastructure::llm::registry::{ProviderRegistry, ResolvedProvider};
use crate::infrastructure::prompt_template_engine::{PromptTemplateEngine, PLAN_TEMPLATE};

use super::constraints::{apply_sleep_lock, apply_work_lock};
use super::context_assembler::GenerationPayload;
use super::fallback::fallback_draft;
use super::normalization::normalize_output;

const TIME_BLOCKED_EXAMPLE: &str = r#"{
  "plan_summary": "Productive work day",
  "tasks": [
    {"title": "Breakfast", "category": "health", "start_time": "08:00", "end_time": "08:30", "priority": 2, "energy_required": "low"},
    {"title": "Deep Work", "category": "work", "start_time": "09:00", "end_time": "11:00", "priority": 1, "energy_required": "high"},
    {"title": "Lunch", "category": "personal", "start_time": "13:00", "end_time": "14:00", "priority": 3}
  ],
  "clarification_questions": []
}"#;

const FINANCE_EXAMPLE: &str = r#"{
  "plan_summary": "Financial health summary",
  "total_income_projected": 3200.0,
  "total_expenses_projected": 2400.0,
  "savings_goal": 500.0,
  "financial_health_score": 72,
  "items": [
    {"title": "Salary", "category": "finance", "type": "income", "tag": "need", "amount": 3200.0, "due_date": "2026-03-28"},
    {"title": "Rent", "category": "finance", "type": "expense_fixed", "tag": "need", "amount": 1100.0, "due_date": "2026-03-01"},
    {"title": "Emergency fund", "category": "finance", "type": "savings", "tag": "investment", "amount": 500.0}
  ],
  "ai_insights": [
    {"item": "Food delivery", "verdict": "risky", "reason": "Several orders a week"}
  ],
  "clarification_questions": []
}"#;

const WEEKLY_EXAMPLE: &str = r#"{
  "plan_summary": "Ship the beta and rebuild the running habit",
  "focus_area": "Launch",
  "outcomes": [
    {"id": "o1", "title": "Beta shipped", "metric": "features done", "current_value": 3, "target_value": 5, "deadline": "Friday"}
  ],
  "goals": [
    {"title": "Finish onboarding flow", "category": "work", "priority": 1, "deadline_day": "Wednesday", "subtasks": ["Design", "Build", "Test"], "linked_outcome_id": "o1"}
  ],
  "habits": [
    {"habit": "Run 5k", "frequency": "3x", "target_days": ["Monday", "Wednesday", "Saturday"]}
  ],
  "capital_allocation": [
    {"category": "work", "resource_type": "time", "amount": 30, "percentage": 60}
  ],
  "clarification_questions": []
}"#;

const OUTCOME_EXAMPLE: &str = r#"{
  "plan_summary": "Theme for the period",
  "tasks": [
    {"title": "Complete Project X", "category": "work", "priority": 1, "estimated_duration": 600},
    {"title": "Three gym sessions", "category": "health", "priority": 2}
  ],
  "metadata": {"focus_area": "Growth"},
  "clarification_questions": []
}"#;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("Generation backend failed: {0}")]
    Backend(#[from] LLMError),

    #[error("Model output was not usable JSON: {0}")]
    Malformed(String),

    #[error("Model output contained no usable tasks")]
    ZeroTasks,

    #[error("No generation backend configured for alias '{0}'")]
    NotConfigured(String),
}

impl GenerationError {
    fn kind(&self) -> &'static str {
        match self {
            GenerationError::Timeout(_) => "timeout",
            GenerationError::Backend(_) => "backend",
            GenerationError::Malformed(_) => "malformed",
            GenerationError::ZeroTasks => "zero_tasks",
            GenerationError::NotConfigured(_) => "not_configured",
        }
    }
}

impl From<JsonRecoveryError> for GenerationError {
    fn from(err: JsonRecoveryError) -> Self {
        GenerationError::Malformed(err.to_string())
    }
}

/// What the plan template sees
#[derive(Serialize)]
struct PromptView<'a> {
    preamble: String,
    time_blocked: bool,
    work_locked: bool,
    finance: bool,
    weekly: bool,
    profile: &'a UserProfile,
    profile_json: String,
    stats_json: Option<String>,
    patterns_json: Option<String>,
    routine: Option<&'a RoutineTemplate>,
    rules: Vec<&'a str>,
    memories: &'a [PrioritizedMemory],
    hierarchy: Option<&'a str>,
    request: &'a str,
    example: &'static str,
}

pub struct PlanGenerator {
    registry: Arc<ProviderRegistry>,
    templates: Arc<PromptTemplateEngine>,
    config: GenerationConfig,
}

impl PlanGenerator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        templates: Arc<PromptTemplateEngine>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            registry,
            templates,
            config,
        }
    }

    /// Always returns a structurally valid draft.
    pub async fn generate(&self, payload: &GenerationPayload) -> PlanDraft {
        let budget = Duration::from_secs(self.config.budget_seconds);

        let outcome = match self.registry.resolve(&self.config.model_alias) {
            None => Err(GenerationError::NotConfigured(self.config.model_alias.clone())),
            Some(resolved) => {
                match tokio::time::timeout(budget, self.generate_with_retries(&resolved, payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(GenerationError::Timeout(budget)),
                }
            }
        };

        match outcome {
            Ok(draft) => draft,
            Err(e) => {
                warn!(
                    user_id = %payload.user_id,
                    plan_type = %payload.plan_type,
                    reason = e.kind(),
                    error = %e,
                    "Plan generation failed, using fallback schedule"
                );
                metrics::counter!("lifeos_plan_fallback_total", "reason" => e.kind()).increment(1);
                fallback_draft(&payload.profile, payload.plan_type, e.to_string())
            }
        }
    }

    async fn generate_with_retries(
        &self,
        resolved: &ResolvedProvider,
        payload: &GenerationPayload,
    ) -> Result<PlanDraft, GenerationError> {
        let prompt = self.render_prompt(payload)?;
        let options = GenerationOptions {
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            stop_sequences: None,
            json_mode: true,
        };
        let max_attempts = self.config.max_attempts.max(1);
        let base_delay = Duration::from_millis(self.config.retry_base_delay_ms);

        let mut attempt = 0;
        loop {
            info!(
                provider = %resolved.provider_name,
                model = %resolved.model,
                attempt = attempt + 1,
                max_attempts,
                "Requesting plan from model"
            );
            let error = match self.attempt(resolved, &prompt, &options, payload).await {
                Ok(draft) => return Ok(draft),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= max_attempts {
                return Err(error);
            }
            let delay = base_delay * 2u32.saturating_pow(attempt - 1);
            warn!(attempt, error = %error, "Plan attempt failed, retrying in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        resolved: &ResolvedProvider,
        prompt: &str,
        options: &GenerationOptions,
        payload: &GenerationPayload,
    ) -> Result<PlanDraft, GenerationError> {
        let response = resolved.provider.generate(prompt, options).await?;
        let raw = recover_object(&response.text)?;
        let output = normalize_output(raw, payload.plan_type);

        let mut tasks = output.tasks;
        if payload.plan_type == PlanType::Daily {
            tasks = apply_work_lock(tasks, &payload.profile);
            tasks = apply_sleep_lock(tasks, &payload.profile);
        }
        if tasks.is_empty() {
            return Err(GenerationError::ZeroTasks);
        }

        Ok(PlanDraft {
            plan_type: payload.plan_type,
            summary: output.summary,
            tasks,
            clarification_questions: output.clarification_questions,
            metadata: output.metadata,
            source: DraftSource::Model {
                provider: response.provider,
                model: response.model,
            },
        })
    }

    fn render_prompt(&self, payload: &GenerationPayload) -> Result<String, GenerationError> {
        let profile_json = serde_json::to_string(&payload.profile)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let stats_json = non_empty_json(&payload.stats)?;
        let patterns_json = non_empty_json(&payload.patterns)?;

        let view = PromptView {
            preamble: preamble(payload),
            time_blocked: payload.plan_type.is_time_blocked(),
            work_locked: payload.profile.has_locked_work_window(),
            profile: &payload.profile,
            profile_json,
            stats_json,
            patterns_json,
            routine: payload.routine.as_ref(),
            rules: payload.rules.iter().map(|r| r.text.as_str()).collect(),
            memories: &payload.memories,
            hierarchy: payload.hierarchy.as_deref(),
            request: &payload.request,
            finance: payload.plan_type == PlanType::Finance,
            weekly: payload.plan_type == PlanType::Weekly,
            example: response_example(payload.plan_type),
        };

        self.templates
            .render(PLAN_TEMPLATE, &view)
            .map_err(|e| GenerationError::Malformed(format!("prompt rendering failed: {:#}", e)))
    }
}

fn response_example(plan_type: PlanType) -> &'static str {
    match plan_type {
        PlanType::Daily | PlanType::Custom => TIME_BLOCKED_EXAMPLE,
        PlanType::Finance => FINANCE_EXAMPLE,
        PlanType::Weekly => WEEKLY_EXAMPLE,
        PlanType::Monthly => OUTCOME_EXAMPLE,
    }
}

fn non_empty_json<T: Serialize>(items: &[T]) -> Result<Option<String>, GenerationError> {
    if items.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(items)
        .map(Some)
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}

fn preamble(payload: &GenerationPayload) -> String {
    match payload.plan_type {
        PlanType::Daily => format!(
            "Strict Daily Scheduler. Generate a realistic plan for {} ({}).",
            payload.date,
            payload.date.format("%A")
        ),
        PlanType::Weekly => {
            "Weekly Planner. Generate high-level goals and focus areas for the week.".to_string()
        }
        PlanType::Monthly => {
            "Monthly Planner. Strategic overview with milestones and deadlines.".to_string()
        }
        PlanType::Finance => "Financial Advisor. Budget and expense planning.".to_string(),
        PlanType::Custom => format!(
            "Custom Scheduler. Generate a realistic time-blocked plan for {}.",
            payload.date
        ),
    }
}
