// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Picks the storage backend once at startup: Postgres when a database is
//! configured, in-memory otherwise. Callers only ever see the traits.

use std::sync::Arc;

use lifeos_cortex::infrastructure::{
    InMemoryMemoryRepository, MemoryRepository, PostgresMemoryRepository,
};

use crate::domain::repository::{PlanRepository, ProfileRepository};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryPlanRepository, InMemoryProfileRepository, PostgresPlanRepository,
    PostgresProfileRepository,
};

/// Every repository the planning pipeline needs, on one backend
#[derive(Clone)]
pub struct Repositories {
    pub plans: Arc<dyn PlanRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub memories: Arc<dyn MemoryRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            plans: Arc::new(InMemoryPlanRepository::new()),
            profiles: Arc::new(InMemoryProfileRepository::new()),
            memories: Arc::new(InMemoryMemoryRepository::new()),
        }
    }

    pub fn postgres(database: &Database) -> Self {
        let pool = database.get_pool().clone();
        Self {
            plans: Arc::new(PostgresPlanRepository::new_with_pool(pool.clone())),
            profiles: Arc::new(PostgresProfileRepository::new_with_pool(pool.clone())),
            memories: Arc::new(PostgresMemoryRepository::new_with_pool(pool)),
        }
    }

    pub fn backend_name(database: Option<&Database>) -> &'static str {
        match database {
            Some(_) => "postgres",
            None => "in-memory",
        }
    }
}

/// Creates the repositories for the configured backend
pub fn create_repositories(database: Option<&Database>) -> Repositories {
    match database {
        Some(db) => Repositories::postgres(db),
        None => Repositories::in_memory(),
    }
}
