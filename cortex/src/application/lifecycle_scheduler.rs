// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory Lifecycle Scheduler - Background task for decay, prune and promote
//!
//! Runs [`MemoryService::run_lifecycle`] for every user that owns memories,
//! once per interval (daily by default). A failure for one user is logged and
//! does not stop the sweep for the others.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic maintenance of user memories

use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::application::{LifecycleReport, MemoryService};

fn default_interval_seconds() -> u64 {
    86_400
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSchedulerConfig {
    /// How often to sweep all users (in seconds)
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for LifecycleSchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            enabled: default_enabled(),
        }
    }
}

pub struct LifecycleScheduler {
    memory_service: Arc<dyn MemoryService>,
    config: LifecycleSchedulerConfig,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl LifecycleScheduler {
    pub fn new(memory_service: Arc<dyn MemoryService>, config: LifecycleSchedulerConfig) -> Self {
        Self {
            memory_service,
            config,
            shutdown_token: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Memory lifecycle scheduler is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            "Starting memory lifecycle scheduler"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running memory lifecycle sweep");
                    let report = self.sweep().await;
                    info!(
                        decayed = report.decayed,
                        pruned = report.pruned,
                        promoted = report.promoted,
                        "Memory lifecycle sweep completed"
                    );
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping memory lifecycle scheduler");
                    break;
                }
            }
        }
    }

    /// One pass over every user. Totals only count users whose run succeeded.
    pub async fn sweep(&self) -> LifecycleReport {
        let mut total = LifecycleReport::default();

        let users = match self.memory_service.users_with_memories().await {
            Ok(users) => users,
            Err(e) => {
                warn!("Failed to list users for lifecycle sweep: {}", e);
                return total;
            }
        };

        for user_id in users {
            match self.memory_service.run_lifecycle(user_id).await {
                Ok(report) => total.merge(report),
                Err(e) => warn!(user_id = %user_id, "Memory lifecycle failed: {}", e),
            }
        }

        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{IngestOutcome, MemoryError, PrioritizedMemory};
    use crate::domain::{MemoryCategory, RetrievalResult, UserId, UserMemory};
    use async_trait::async_trait;

    struct MockMemoryService {
        users: Vec<UserId>,
        failing: Option<UserId>,
    }

    #[async_trait]
    impl MemoryService for MockMemoryService {
        async fn add_memory(
            &self,
            _user_id: UserId,
            _text: &str,
            _category: MemoryCategory,
        ) -> Result<IngestOutcome, MemoryError> {
            Err(MemoryError::Validation("unused".into()))
        }

        async fn run_lifecycle(&self, user_id: UserId) -> Result<LifecycleReport, MemoryError> {
            if Some(user_id) == self.failing {
                return Err(MemoryError::Storage(anyhow::anyhow!("database unavailable")));
            }
            Ok(LifecycleReport { decayed: 2, pruned: 1, promoted: 1 })
        }

        async fn get_prioritized_context(
            &self,
            _user_id: UserId,
            _limit: usize,
        ) -> Result<Vec<PrioritizedMemory>, MemoryError> {
            Ok(vec![])
        }

        async fn query_memory(
            &self,
            _user_id: UserId,
            _text: &str,
            _k: usize,
        ) -> Result<Vec<RetrievalResult>, MemoryError> {
            Ok(vec![])
        }

        async fn list_memories(&self, _user_id: UserId) -> Result<Vec<UserMemory>, MemoryError> {
            Ok(vec![])
        }

        async fn users_with_memories(&self) -> Result<Vec<UserId>, MemoryError> {
            Ok(self.users.clone())
        }
    }

    #[test]
    fn test_scheduler_configuration() {
        let config = LifecycleSchedulerConfig::default();
        assert_eq!(config.interval_seconds, 86_400);
        assert!(config.enabled);
    }

    #[tokio::test]
    async fn test_sweep_skips_failing_user() {
        let bad = UserId::new();
        let service = MockMemoryService {
            users: vec![UserId::new(), bad, UserId::new()],
            failing: Some(bad),
        };
        let scheduler = LifecycleScheduler::new(Arc::new(service), LifecycleSchedulerConfig::default());

        let report = scheduler.sweep().await;
        assert_eq!(report, LifecycleReport { decayed: 4, pruned: 2, promoted: 2 });
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let service = MockMemoryService { users: vec![], failing: None };
        let config = LifecycleSchedulerConfig { interval_seconds: 3600, enabled: true };
        let scheduler = Arc::new(LifecycleScheduler::new(Arc::new(service), config));

        let token = scheduler.shutdown_token();
        let handle = scheduler.start();
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_scheduler_returns_immediately() {
        let service = MockMemoryService { users: vec![], failing: None };
        let config = LifecycleSchedulerConfig { interval_seconds: 3600, enabled: false };
        let handle = Arc::new(LifecycleScheduler::new(Arc::new(service), config)).start();

        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
