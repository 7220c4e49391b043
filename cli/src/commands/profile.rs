// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Profile commands
//!
//! Commands: show, set, routine

use anyhow::{Context, Result};
use chrono::Weekday;
use clap::Subcommand;
use colored::Colorize;
use serde::Deserialize;
use std::path::PathBuf;

use lifeos_orchestrator_core::domain::{ClockTime, RoutineBlock, RoutineTemplate, UserId, UserProfile};

use crate::wiring::{parse_user, Services};

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Show a user's scheduling profile (defaults when none is stored)
    Show {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,
    },

    /// Update profile fields; unspecified fields keep their value
    Set {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,

        #[arg(long, value_name = "HH:MM")]
        wake: Option<ClockTime>,

        #[arg(long, value_name = "HH:MM")]
        work_start: Option<ClockTime>,

        #[arg(long, value_name = "HH:MM")]
        work_end: Option<ClockTime>,

        #[arg(long, value_name = "HH:MM")]
        sleep: Option<ClockTime>,

        /// e.g. Student, Professional
        #[arg(long)]
        role: Option<String>,

        /// Add a hard constraint (repeatable)
        #[arg(long = "constraint")]
        constraints: Vec<String>,
    },

    /// Store a weekday routine from a YAML file
    Routine {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,

        file: PathBuf,
    },
}

/// Routine file layout
#[derive(Debug, Deserialize)]
struct RoutineFile {
    name: String,
    weekdays: Vec<Weekday>,
    blocks: Vec<RoutineBlock>,
}

pub async fn handle_command(command: ProfileCommand, services: &Services) -> Result<()> {
    let profiles = &services.repositories.profiles;

    match command {
        ProfileCommand::Show { user } => {
            let user_id = parse_user(&user)?;
            let profile = load_profile(services, user_id).await?;
            print_profile(&profile);
        }
        ProfileCommand::Set {
            user,
            wake,
            work_start,
            work_end,
            sleep,
            role,
            constraints,
        } => {
            let user_id = parse_user(&user)?;
            let mut profile = load_profile(services, user_id).await?;
            if let Some(wake) = wake {
                profile.wake_time = wake;
            }
            if let Some(start) = work_start {
                profile.work_start_time = start;
            }
            if let Some(end) = work_end {
                profile.work_end_time = end;
            }
            if let Some(sleep) = sleep {
                profile.sleep_time = sleep;
            }
            if role.is_some() {
                profile.role = role;
            }
            profile.constraints.extend(constraints);

            profiles.save_profile(&profile).await?;
            println!("{} Profile saved", "✓".green());
            print_profile(&profile);
        }
        ProfileCommand::Routine { user, file } => {
            let user_id = parse_user(&user)?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read routine file {:?}", file))?;
            let parsed: RoutineFile =
                serde_yaml::from_str(&content).context("Invalid routine file")?;
            let routine = RoutineTemplate {
                user_id,
                name: parsed.name,
                weekdays: parsed.weekdays,
                blocks: parsed.blocks,
            };
            profiles.save_routine(&routine).await?;
            println!(
                "{} Routine '{}' saved ({} blocks)",
                "✓".green(),
                routine.name,
                routine.blocks.len()
            );
        }
    }

    Ok(())
}

async fn load_profile(services: &Services, user_id: UserId) -> Result<UserProfile> {
    Ok(services
        .repositories
        .profiles
        .find_profile(user_id)
        .await?
        .unwrap_or_else(|| UserProfile::with_defaults(user_id)))
}

fn print_profile(profile: &UserProfile) {
    println!("{}", "Profile:".bold());
    println!("  User:   {}", profile.user_id);
    println!("  Day:    {} to {}", profile.wake_time, profile.sleep_time);
    println!("  Work:   {} to {}", profile.work_start_time, profile.work_end_time);
    println!("  Role:   {}", profile.role.as_deref().unwrap_or("(none)"));
    for constraint in &profile.constraints {
        println!("  - {}", constraint);
    }
}
