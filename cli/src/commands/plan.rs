// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Plan commands
//!
//! Commands: generate, replan, show, list, approve, reject, task

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use lifeos_orchestrator_core::application::PlanningError;
use lifeos_orchestrator_core::domain::{
    GeneratedPlan, Plan, PlanId, PlanStatus, PlanType, Task, TaskId, TaskStatus,
};

use crate::wiring::{parse_user, Services};

const STALE_VERSION_HINT: &str = "Plan changed since you last read it. Run `lifeos plan show` and retry.";

#[derive(Subcommand)]
pub enum PlanCommand {
    /// Generate and store a draft plan
    Generate {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,

        /// daily, weekly, monthly, finance or custom
        #[arg(short = 't', long = "type", default_value = "daily")]
        plan_type: String,

        /// Target date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// What the plan should take into account
        #[arg(trailing_var_arg = true)]
        context: Vec<String>,
    },

    /// Regenerate a draft plan's tasks at the version you last saw
    Replan {
        plan_id: Uuid,

        #[arg(long)]
        version: i64,

        #[arg(long)]
        json: bool,

        /// What should change
        #[arg(trailing_var_arg = true)]
        context: Vec<String>,
    },

    /// Show a plan and its tasks
    Show {
        plan_id: Uuid,

        #[arg(long)]
        json: bool,
    },

    /// List a user's most recent plans
    List {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,

        #[arg(short = 't', long = "type")]
        plan_type: Option<String>,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Approve a draft plan at the version you last saw
    Approve {
        plan_id: Uuid,

        #[arg(long)]
        version: i64,
    },

    /// Reject a draft plan at the version you last saw
    Reject {
        plan_id: Uuid,

        #[arg(long)]
        version: i64,
    },

    /// Mark a task pending, done or missed
    Task { task_id: Uuid, status: String },
}

pub async fn handle_command(command: PlanCommand, services: &Services) -> Result<()> {
    match command {
        PlanCommand::Generate {
            user,
            plan_type,
            date,
            json,
            context,
        } => {
            let plan_type = parse_plan_type(&plan_type)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            generate(services, &user, plan_type, date, &context.join(" "), json).await
        }
        PlanCommand::Replan {
            plan_id,
            version,
            json,
            context,
        } => {
            let result = services
                .runtime
                .pipeline
                .replan(PlanId(plan_id), version, &context.join(" "))
                .await;
            match result {
                Ok(generated) => print_generated(&generated, json),
                Err(e @ PlanningError::Conflict { .. }) => {
                    eprintln!("{}", STALE_VERSION_HINT.yellow());
                    Err(e.into())
                }
                Err(e) => Err(e.into()),
            }
        }
        PlanCommand::Show { plan_id, json } => show(services, PlanId(plan_id), json).await,
        PlanCommand::List {
            user,
            plan_type,
            limit,
        } => {
            let plan_type = plan_type.as_deref().map(parse_plan_type).transpose()?;
            list(services, &user, plan_type, limit).await
        }
        PlanCommand::Approve { plan_id, version } => {
            let result = services.runtime.pipeline.approve(PlanId(plan_id), version).await;
            report_transition(result, "approved")
        }
        PlanCommand::Reject { plan_id, version } => {
            let result = services.runtime.pipeline.reject(PlanId(plan_id), version).await;
            report_transition(result, "rejected")
        }
        PlanCommand::Task { task_id, status } => {
            let status = TaskStatus::parse(&status)
                .with_context(|| format!("Unknown task status '{}'", status))?;
            let change = services
                .runtime
                .pipeline
                .set_task_status(TaskId(task_id), status)
                .await?;
            println!(
                "{} {} is now {} (plan {:.1}% done)",
                "✓".green(),
                change.task.title.bold(),
                change.task.status,
                change.plan_progress
            );
            Ok(())
        }
    }
}

fn parse_plan_type(raw: &str) -> Result<PlanType> {
    PlanType::parse(raw).with_context(|| {
        format!(
            "Unknown plan type '{}' (expected daily, weekly, monthly, finance or custom)",
            raw
        )
    })
}

async fn generate(
    services: &Services,
    user: &str,
    plan_type: PlanType,
    date: NaiveDate,
    context: &str,
    json: bool,
) -> Result<()> {
    let user_id = parse_user(user)?;
    let generated = services
        .runtime
        .pipeline
        .generate_plan(user_id, plan_type, date, context)
        .await?;
    print_generated(&generated, json)
}

fn print_generated(generated: &GeneratedPlan, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(generated)?);
        return Ok(());
    }

    if generated.used_fallback {
        println!("{}", "Generation backend unavailable, using the fallback plan".yellow());
    }
    print_plan(&generated.plan, &generated.tasks);
    if !generated.clarification_questions.is_empty() {
        println!();
        println!("{}", "Questions:".bold());
        for question in &generated.clarification_questions {
            println!("  ? {}", question);
        }
    }
    Ok(())
}

async fn show(services: &Services, plan_id: PlanId, json: bool) -> Result<()> {
    let (plan, tasks) = services.runtime.pipeline.get_plan(plan_id).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "plan": plan, "tasks": tasks }))?
        );
    } else {
        print_plan(&plan, &tasks);
    }
    Ok(())
}

async fn list(services: &Services, user: &str, plan_type: Option<PlanType>, limit: usize) -> Result<()> {
    let user_id = parse_user(user)?;
    let plans = services
        .runtime
        .pipeline
        .recent_plans(user_id, plan_type, limit)
        .await?;

    if plans.is_empty() {
        println!("{}", "No plans found".dimmed());
        return Ok(());
    }
    for plan in plans {
        println!(
            "{}  {}  {:<8} {:<9} v{}  {}",
            plan.id,
            plan.date,
            plan.plan_type.to_string(),
            status_label(plan.status),
            plan.version,
            plan.summary
        );
    }
    Ok(())
}

fn report_transition(result: Result<Plan, PlanningError>, verb: &str) -> Result<()> {
    match result {
        Ok(plan) => {
            println!("{} Plan {} {} (version {})", "✓".green(), plan.id, verb, plan.version);
            Ok(())
        }
        Err(e @ PlanningError::Conflict { .. }) => {
            eprintln!("{}", STALE_VERSION_HINT.yellow());
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn status_label(status: PlanStatus) -> colored::ColoredString {
    match status {
        PlanStatus::Draft => status.as_str().yellow(),
        PlanStatus::Approved => status.as_str().green(),
        PlanStatus::Rejected => status.as_str().red(),
    }
}

fn print_plan(plan: &Plan, tasks: &[Task]) {
    println!(
        "{} {} plan for {} ({}, version {}, {:.0}% done)",
        plan.id.to_string().dimmed(),
        plan.plan_type.to_string().bold(),
        plan.date,
        status_label(plan.status),
        plan.version,
        plan.progress
    );
    println!("{}", plan.summary);
    println!();

    for task in tasks {
        let slot = match task.window() {
            Some((start, end)) => format!("{}-{}", start, end),
            None => "     -     ".to_string(),
        };
        println!(
            "  {}  P{}  {:<40} {:<9} {}",
            slot,
            task.priority,
            task.title,
            task.category.to_string(),
            task.id.0.to_string().dimmed()
        );
    }
}
