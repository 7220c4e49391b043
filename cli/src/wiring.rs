// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Builds the planning services for a CLI invocation
//!
//! Without `database.url` everything lives in memory and is gone when the
//! process exits, which is only useful for trying things out and for the
//! daemon's own lifetime.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use lifeos_orchestrator_core::application::{
    create_repositories, embedder_from_config, PlanningRuntime, Repositories,
};
use lifeos_orchestrator_core::domain::config::LifeOsConfigManifest;
use lifeos_orchestrator_core::domain::UserId;
use lifeos_orchestrator_core::infrastructure::llm::registry::ProviderRegistry;
use lifeos_orchestrator_core::infrastructure::{Database, EventBus, LoggingCalendarSync};

/// How long a one-shot command waits for its background jobs
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Services {
    pub runtime: PlanningRuntime,
    pub repositories: Repositories,
}

impl Services {
    pub async fn connect(config: &LifeOsConfigManifest) -> Result<Self> {
        let spec = &config.spec;

        let database = Database::from_config(&spec.database)
            .await
            .context("Failed to connect to database")?;
        info!(backend = Repositories::backend_name(database.as_ref()), "Storage backend selected");
        let repositories = create_repositories(database.as_ref());

        let registry = Arc::new(ProviderRegistry::from_config(spec)?);
        let embedder = embedder_from_config(&spec.embedding)?;

        let runtime = PlanningRuntime::build(
            spec,
            repositories.clone(),
            registry,
            embedder,
            Arc::new(LoggingCalendarSync),
            EventBus::with_default_capacity(),
        )?;

        Ok(Self {
            runtime,
            repositories,
        })
    }

    /// Start job workers for the duration of one command
    pub fn start_workers(&self) -> Result<()> {
        self.runtime
            .start_workers()
            .context("Failed to start job workers")?;
        Ok(())
    }

    pub async fn finish(&self) {
        self.runtime.shutdown(DRAIN_TIMEOUT).await;
    }
}

pub fn parse_user(raw: &str) -> Result<UserId> {
    let id = Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid user id '{}'", raw))?;
    Ok(UserId(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user() {
        let id = Uuid::new_v4();
        assert_eq!(parse_user(&id.to_string()).unwrap(), UserId(id));
        assert!(parse_user("alice").is_err());
    }
}
