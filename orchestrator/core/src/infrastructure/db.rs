// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into the Postgres repositories. Only used when `database.url`
//! is configured; otherwise the in-memory repositories are wired instead.
//!
//! Schema lives in `migrations/` at the workspace root.

use sqlx::postgres::{PgPool, PgPoolOptions};
use anyhow::Result;

use crate::domain::config::DatabaseConfig;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    /// `None` when no URL is configured
    pub async fn from_config(config: &DatabaseConfig) -> Result<Option<Self>> {
        match config.url.as_deref() {
            Some(url) => Ok(Some(Self::new(url, config.max_connections).await?)),
            None => Ok(None),
        }
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
