// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Retrieval corpus commands
//!
//! Commands: add, rebuild, health

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::collections::BTreeMap;

use lifeos_cortex::domain::{RagHealth, USER_SCOPE_KEY};

use crate::wiring::{parse_user, Services};

#[derive(Subcommand)]
pub enum RagCommand {
    /// Append a rule to the corpus and index it
    Add {
        /// Only visible to this user (default: shared)
        #[arg(short, long, value_name = "USER_ID")]
        user: Option<String>,

        /// Free-form origin label stored with the rule
        #[arg(long)]
        source: Option<String>,

        text: String,
    },

    /// Re-embed the whole corpus
    Rebuild,

    /// Show index and corpus sizes without loading anything
    Health {
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: RagCommand, services: &Services) -> Result<()> {
    let rag = &services.runtime.rag;

    match command {
        RagCommand::Add { user, source, text } => {
            let mut metadata = BTreeMap::new();
            if let Some(user) = user {
                metadata.insert(USER_SCOPE_KEY.to_string(), parse_user(&user)?.to_string());
            }
            if let Some(source) = source {
                metadata.insert("source".to_string(), source);
            }
            let indexed = rag.add(&text, metadata).await?;
            println!("{} Indexed ({} entries)", "✓".green(), indexed);
        }
        RagCommand::Rebuild => {
            let health = rag.rebuild().await?;
            println!("{} Rebuilt index", "✓".green());
            print_health(&health);
        }
        RagCommand::Health { json } => {
            let health = services.runtime.pipeline.health_check().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                print_health(&health);
            }
        }
    }

    Ok(())
}

fn print_health(health: &RagHealth) {
    let state = if !health.index_loaded {
        "not loaded".dimmed()
    } else if health.index_stale {
        "stale".yellow()
    } else {
        "current".green()
    };
    println!("  Index:      {}", state);
    println!("  Indexed:    {}", health.indexed_entries);
    println!("  Corpus:     {}", health.source_entries);
    println!("  Dimension:  {}", health.embedding_dim);
    println!("  File:       {}", health.index_file);
}
