// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory commands
//!
//! Commands: add, list, query, lifecycle

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use lifeos_cortex::domain::{MemoryCategory, MemoryTier};

use crate::wiring::{parse_user, Services};

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Store a fact about a user (reinforces an identical fact)
    Add {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,

        /// constraint, preference or goal
        #[arg(short, long, default_value = "preference")]
        category: String,

        text: String,
    },

    /// List a user's memories
    List {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,
    },

    /// Vector search over rules visible to a user
    Query {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,

        #[arg(short, default_value = "3")]
        k: usize,

        text: String,
    },

    /// Decay, prune and promote one user's memories now
    Lifecycle {
        #[arg(short, long, value_name = "USER_ID")]
        user: String,
    },
}

pub async fn handle_command(command: MemoryCommand, services: &Services) -> Result<()> {
    let pipeline = &services.runtime.pipeline;

    match command {
        MemoryCommand::Add {
            user,
            category,
            text,
        } => {
            let user_id = parse_user(&user)?;
            let category = MemoryCategory::parse(&category)
                .with_context(|| format!("Unknown memory category '{}'", category))?;
            let outcome = pipeline.add_memory(user_id, &text, category).await?;
            let memory = outcome.memory();
            if outcome.is_new() {
                println!("{} Stored [{}] {}", "✓".green(), memory.category, memory.text);
            } else {
                println!(
                    "{} Reinforced [{}] {} (seen {} times)",
                    "✓".green(),
                    memory.category,
                    memory.text,
                    memory.access_count
                );
            }
        }
        MemoryCommand::List { user } => {
            let memories = pipeline.list_memories(parse_user(&user)?).await?;
            if memories.is_empty() {
                println!("{}", "No memories stored".dimmed());
            }
            for memory in memories {
                let tier = match memory.tier {
                    MemoryTier::LongTerm => "long".green(),
                    MemoryTier::ShortTerm => "short".normal(),
                };
                println!(
                    "{:<5} {:.2}  x{:<3} [{}] {}",
                    tier, memory.confidence, memory.access_count, memory.category, memory.text
                );
            }
        }
        MemoryCommand::Query { user, k, text } => {
            let results = pipeline.query_memory(parse_user(&user)?, &text, k).await?;
            if results.is_empty() {
                println!("{}", "No matching rules".dimmed());
            }
            for result in results {
                println!("{}. ({:.3}) {}", result.rank, result.score, result.text);
            }
        }
        MemoryCommand::Lifecycle { user } => {
            let report = pipeline.run_lifecycle(parse_user(&user)?).await?;
            println!(
                "{} decayed {}, pruned {}, promoted {}",
                "✓".green(),
                report.decayed,
                report.pruned,
                report.promoted
            );
        }
    }

    Ok(())
}
