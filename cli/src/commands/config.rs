// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, init

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use lifeos_orchestrator_core::domain::LifeOsConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the default configuration
    Init {
        #[arg(short, long, default_value = "./lifeos-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Init { output, force } => init(output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = LifeOsConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. LIFEOS_CONFIG_PATH: {}",
            std::env::var("LIFEOS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./lifeos-config.yaml");
        println!("  4. ~/.lifeos/config.yaml");
        println!("  5. /etc/lifeos/config.yaml");
        println!();
    }

    let spec = &config.spec;

    println!("{}", "LLM Providers:".bold());
    if spec.llm_providers.is_empty() {
        println!("  {}", "(none, plans use the fallback template)".dimmed());
    }
    for provider in &spec.llm_providers {
        println!("  {} ({})", provider.name.bold(), provider.provider_type);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!(
        "  Default provider: {}",
        spec.llm_selection.default_provider.as_deref().unwrap_or("(none)")
    );
    println!();

    println!("{}", "Generation:".bold());
    println!("  Model alias:  {}", spec.generation.model_alias);
    println!("  Attempts:     {}", spec.generation.max_attempts);
    println!("  Budget:       {}s", spec.generation.budget_seconds);
    println!();

    println!("{}", "Retrieval:".bold());
    println!(
        "  Embedding:    {} ({}, dim {})",
        spec.embedding.provider, spec.embedding.model, spec.embedding.dimension
    );
    println!("  Corpus:       {}", spec.rag.corpus_path.display());
    println!("  Index:        {}", spec.rag.index_path.display());
    println!();

    println!("{}", "Storage:".bold());
    println!(
        "  Database:     {}",
        if spec.database.url.is_some() {
            "postgres".normal()
        } else {
            "in-memory".yellow()
        }
    );

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = LifeOsConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn init(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    LifeOsConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration written: {}", output.display()).green()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lifeos-config.yaml");

        init(path.clone(), false).unwrap();
        let loaded = LifeOsConfigManifest::from_yaml_file(&path).unwrap();
        loaded.validate().unwrap();

        assert!(init(path.clone(), false).is_err());
        init(path, true).unwrap();
    }
}
