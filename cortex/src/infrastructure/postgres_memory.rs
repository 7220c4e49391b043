// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL memory store (`user_memories` table)

use async_trait::async_trait;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{MemoryCategory, MemoryId, MemoryTier, UserId, UserMemory};
use crate::infrastructure::repository::MemoryRepository;

pub struct PostgresMemoryRepository {
    pool: PgPool,
}

impl PostgresMemoryRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<UserMemory> {
        let category: String = row.try_get("category")?;
        let tier: String = row.try_get("tier")?;
        let access_count: i32 = row.try_get("access_count")?;

        Ok(UserMemory {
            id: MemoryId(row.try_get::<Uuid, _>("id")?),
            user_id: UserId(row.try_get::<Uuid, _>("user_id")?),
            text: row.try_get("text")?,
            category: MemoryCategory::parse(&category)
                .with_context(|| format!("Unknown memory category '{}'", category))?,
            confidence: row.try_get("confidence")?,
            tier: MemoryTier::parse(&tier)
                .with_context(|| format!("Unknown memory tier '{}'", tier))?,
            access_count: access_count.max(0) as u32,
            last_accessed: row.try_get::<DateTime<Utc>, _>("last_accessed")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            decayed_at: row.try_get::<Option<DateTime<Utc>>, _>("decayed_at")?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, user_id, text, category, confidence, tier, access_count, \
                              last_accessed, created_at, decayed_at";

#[async_trait]
impl MemoryRepository for PostgresMemoryRepository {
    async fn insert(&self, memory: &UserMemory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_memories
                (id, user_id, text, category, confidence, tier, access_count,
                 last_accessed, created_at, decayed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(memory.id.0)
        .bind(memory.user_id.0)
        .bind(&memory.text)
        .bind(memory.category.as_str())
        .bind(memory.confidence)
        .bind(memory.tier.as_str())
        .bind(memory.access_count as i32)
        .bind(memory.last_accessed)
        .bind(memory.created_at)
        .bind(memory.decayed_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert user memory")?;

        Ok(())
    }

    async fn update(&self, memory: &UserMemory) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_memories
            SET confidence = $2,
                tier = $3,
                access_count = $4,
                last_accessed = $5,
                decayed_at = $6
            WHERE id = $1
            "#,
        )
        .bind(memory.id.0)
        .bind(memory.confidence)
        .bind(memory.tier.as_str())
        .bind(memory.access_count as i32)
        .bind(memory.last_accessed)
        .bind(memory.decayed_at)
        .execute(&self.pool)
        .await
        .context("Failed to update user memory")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Memory not found: {:?}", memory.id);
        }
        Ok(())
    }

    async fn delete(&self, id: MemoryId) -> Result<()> {
        sqlx::query("DELETE FROM user_memories WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .context("Failed to delete user memory")?;
        Ok(())
    }

    async fn find_by_id(&self, id: MemoryId) -> Result<Option<UserMemory>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_memories WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<UserMemory>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM user_memories WHERE user_id = $1 ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn find_by_category(
        &self,
        user_id: UserId,
        category: MemoryCategory,
    ) -> Result<Vec<UserMemory>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM user_memories WHERE user_id = $1 AND category = $2 ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(user_id.0)
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_users(&self) -> Result<Vec<UserId>> {
        let rows = sqlx::query("SELECT DISTINCT user_id FROM user_memories ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Ok(UserId(row.try_get::<Uuid, _>("user_id")?)))
            .collect()
    }
}
