// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Template Engine
//!
//! Renders the planner and fact-extraction prompts with Handlebars.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn an assembled generation payload into model input
//! - **Integration:** Plan Generator / Fact Extractor → LLM input
//!
//! # Registered templates
//!
//! - [`PLAN_TEMPLATE`]: schedule generation. Time-blocked plan types get the
//!   hourly rules (no overlaps, meals, wake/sleep bounds, locked work window),
//!   the rest get outcome-level rules. Finance plans add a budget section
//!   (`items`, projected totals, `ai_insights`) and weekly plans add an
//!   outcome section (`outcomes`, `goals`, `habits`, `capital_allocation`).
//! - [`FACT_TEMPLATE`]: extraction of one permanent user fact.
//!
//! HTML escaping is disabled: prompts are plain text and user content must
//! reach the model verbatim.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;

pub const PLAN_TEMPLATE: &str = "plan";
pub const FACT_TEMPLATE: &str = "fact_extraction";

const PLAN_TEMPLATE_SOURCE: &str = r#"{{preamble}}
RULES:
{{#if time_blocked}}
1. HIGHEST PRIORITY: user constraints and morning requirements override everything.
2. JSON ONLY. No text outside the object.
3. Chronological, NO OVERLAPS, no gaps.
4. Minimum task length is 30 minutes.
5. REQUIRED MEALS: Breakfast (about 08:00), Lunch (about 13:00), Dinner (about 20:00).
6. First task starts at {{profile.wake_time}}, last task ends by {{profile.sleep_time}}.
{{#if work_locked}}
7. Window {{profile.work_start_time}} to {{profile.work_end_time}} is LOCKED for work/learning. Only breaks under 90 minutes are allowed inside it.
{{/if}}
{{else}}
1. Focus on key outcomes, not hourly scheduling.
2. Group tasks by category (work, health, learning, finance, personal).
3. Priorities run from 1 (most important) to 5 (optional).
4. JSON ONLY. No text outside the object.
{{/if}}
{{#if finance}}

BUDGET SECTION:
- Put every income, expense, saving and debt payment in "items", one entry each, with a numeric "amount".
- "type" MUST be one of: income, expense_fixed, expense_variable, savings, debt_payment.
- "tag" MUST be one of: need, want, investment, waste.
- "total_income_projected" and "total_expenses_projected" are the sums of the matching items.
- "financial_health_score" runs from 0 to 100.
- Judge notable items in "ai_insights" with a verdict of good_decision, risky or harmful.
{{/if}}
{{#if weekly}}

OUTCOME SECTION:
- Define 1 to 3 measurable "outcomes", each with a metric, current_value and target_value.
- Every entry in "goals" names its "linked_outcome_id" and a "deadline_day".
- List recurring "habits" with a frequency and "target_days".
- "capital_allocation" splits time and money across categories; percentages sum to 100.
{{/if}}

USER PROFILE: {{profile_json}}
{{#if stats_json}}
STATS: {{stats_json}}
{{/if}}
{{#if patterns_json}}
PATTERNS: {{patterns_json}}
{{/if}}
{{#if routine}}
ROUTINE ({{routine.name}}):
{{#each routine.blocks}}
- {{start_time}}-{{end_time}} {{title}} ({{category}})
{{/each}}
{{/if}}
{{#if rules}}
KNOWLEDGE:
{{#each rules}}
- {{this}}
{{/each}}
{{/if}}
{{#if memories}}
KNOWN ABOUT USER:
{{#each memories}}
- [{{category}}] {{text}}
{{/each}}
{{/if}}
{{#if hierarchy}}
THIS WEEK: {{hierarchy}}
{{/if}}
REQUEST: "{{request}}"

OUTPUT JSON EXAMPLE:
{{example}}
"#;

const FACT_TEMPLATE_SOURCE: &str = r#"You are a Memory Extractor. Identify PERMANENT user facts from the message.

FACT TYPES:
- constraint ("I work 9-5", "I sleep at 10pm")
- preference ("I hate jogging", "I love sci-fi")
- goal ("I want to learn French", "Save $5000 this year")

IGNORE: temporary states, questions, commands, greetings.

OUTPUT (JSON ONLY):
{"found": true/false, "fact": "extracted statement", "category": "constraint|preference|goal"}

MESSAGE: "{{message}}"
"#;

pub struct PromptTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl PromptTemplateEngine {
    /// Create an engine with the built-in templates registered
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars
            .register_template_string(PLAN_TEMPLATE, PLAN_TEMPLATE_SOURCE)
            .context("Invalid plan prompt template")?;
        handlebars
            .register_template_string(FACT_TEMPLATE, FACT_TEMPLATE_SOURCE)
            .context("Invalid fact extraction prompt template")?;

        Ok(Self { handlebars })
    }

    /// Replace a built-in template, e.g. with an operator-supplied prompt.
    pub fn override_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, source)
            .with_context(|| format!("Invalid Handlebars template '{}'", name))
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String> {
        self.handlebars
            .render(name, data)
            .with_context(|| format!("Failed to render prompt template '{}'", name))
    }
}
