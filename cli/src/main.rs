// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # LifeOS CLI
//!
//! The `lifeos` binary drives the planning core: generate and approve plans,
//! manage user memories and the retrieval corpus, and run the background
//! daemon.
//!
//! ## Commands
//!
//! - `lifeos plan generate|replan|show|list|approve|reject|task`
//! - `lifeos memory add|list|query|lifecycle`
//! - `lifeos rag add|rebuild|health`
//! - `lifeos profile show|set|routine`
//! - `lifeos config show|validate|init`
//! - `lifeos daemon run|sweep`
//! - `lifeos update`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use lifeos_orchestrator::commands::{
    self, ConfigCommand, DaemonCommand, MemoryCommand, PlanCommand, ProfileCommand, RagCommand,
};
use lifeos_orchestrator::logging::{init_logging, LogFormat};
use lifeos_orchestrator::wiring::Services;
use lifeos_orchestrator_core::domain::LifeOsConfigManifest;

/// LifeOS - AI-assisted personal planning
#[derive(Parser)]
#[command(name = "lifeos")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "LIFEOS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, inspect and approve plans
    #[command(name = "plan")]
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },

    /// Manage user memories
    #[command(name = "memory")]
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Manage the retrieval corpus
    #[command(name = "rag")]
    Rag {
        #[command(subcommand)]
        command: RagCommand,
    },

    /// Manage scheduling profiles and routines
    #[command(name = "profile")]
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run background workers and the memory lifecycle
    #[command(name = "daemon")]
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Update the LifeOS database
    #[command(name = "update")]
    Update {
        #[command(flatten)]
        command: commands::UpdateCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = LifeOsConfigManifest::load_or_default(cli.config.clone())
        .context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.spec.logging.level.clone());
    init_logging(&level, LogFormat::parse(&config.spec.logging.format))?;

    let Some(command) = cli.command else {
        eprintln!("{}", "No command specified. Use --help for usage.".yellow());
        std::process::exit(1);
    };

    match command {
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
        Commands::Update { command } => commands::update::execute(command, &config).await,
        other => run_with_services(other, &config).await,
    }
}

async fn run_with_services(command: Commands, config: &LifeOsConfigManifest) -> Result<()> {
    let services = Services::connect(config).await?;
    services.start_workers()?;

    let result = match command {
        Commands::Plan { command } => commands::plan::handle_command(command, &services).await,
        Commands::Memory { command } => commands::memory::handle_command(command, &services).await,
        Commands::Rag { command } => commands::rag::handle_command(command, &services).await,
        Commands::Profile { command } => {
            commands::profile::handle_command(command, &services).await
        }
        Commands::Daemon { command } => commands::daemon::handle_command(command, &services).await,
        Commands::Config { .. } | Commands::Update { .. } => Ok(()),
    };

    services.finish().await;
    result
}
