// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::plan::{progress_of, Plan, PlanId, PlanStatus, PlanType};
use crate::domain::profile::UserId;
use crate::domain::repository::{PlanRepository, RepositoryError, TaskStatusChange};
use crate::domain::task::{ClockTime, EnergyLevel, Task, TaskCategory, TaskId, TaskStatus};

use super::validate_batch;

const PLAN_COLUMNS: &str = r#"
    p.id, p.user_id, p.plan_type, p.date, p.status, p.version, p.summary, p.metadata,
    p.progress, p.created_at, p.updated_at,
    ARRAY(SELECT t.id FROM tasks t WHERE t.plan_id = p.id ORDER BY t.position) AS task_ids
"#;

const TASK_COLUMNS: &str = "id, plan_id, title, description, category, start_time, end_time, \
                            priority, status, estimated_duration, energy_required";

pub struct PostgresPlanRepository {
    pool: PgPool,
}

impl PostgresPlanRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn plan_from_row(row: &PgRow) -> Result<Plan, RepositoryError> {
        let plan_type: String = row.try_get("plan_type")?;
        let status: String = row.try_get("status")?;
        let metadata: serde_json::Value = row.try_get("metadata")?;
        let task_ids: Vec<Uuid> = row.try_get("task_ids")?;

        Ok(Plan {
            id: PlanId(row.try_get("id")?),
            user_id: UserId(row.try_get("user_id")?),
            plan_type: PlanType::parse(&plan_type)
                .ok_or_else(|| RepositoryError::Serialization(format!("Unknown plan type '{}'", plan_type)))?,
            date: row.try_get::<NaiveDate, _>("date")?,
            status: PlanStatus::parse(&status)
                .ok_or_else(|| RepositoryError::Serialization(format!("Unknown plan status '{}'", status)))?,
            version: row.try_get("version")?,
            summary: row.try_get("summary")?,
            metadata: serde_json::from_value::<BTreeMap<String, serde_json::Value>>(metadata)?,
            task_ids: task_ids.into_iter().map(TaskId).collect(),
            progress: row.try_get("progress")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn task_from_row(row: &PgRow) -> Result<Task, RepositoryError> {
        let parse_time = |column: &str| -> Result<Option<ClockTime>, RepositoryError> {
            let raw: Option<String> = row.try_get(column)?;
            raw.map(|s| s.parse::<ClockTime>())
                .transpose()
                .map_err(|e| RepositoryError::Serialization(e.to_string()))
        };
        let category: String = row.try_get("category")?;
        let status: String = row.try_get("status")?;
        let energy: String = row.try_get("energy_required")?;
        let priority: i16 = row.try_get("priority")?;
        let duration: i32 = row.try_get("estimated_duration")?;

        Ok(Task {
            id: TaskId(row.try_get("id")?),
            plan_id: PlanId(row.try_get("plan_id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            category: TaskCategory::parse(&category)
                .ok_or_else(|| RepositoryError::Serialization(format!("Unknown category '{}'", category)))?,
            start_time: parse_time("start_time")?,
            end_time: parse_time("end_time")?,
            priority: priority.clamp(1, 5) as u8,
            status: TaskStatus::parse(&status)
                .ok_or_else(|| RepositoryError::Serialization(format!("Unknown task status '{}'", status)))?,
            estimated_duration: duration.max(0) as u32,
            energy_required: EnergyLevel::from_label(&energy),
        })
    }

    async fn insert_tasks(
        tx: &mut Transaction<'_, Postgres>,
        plan_id: PlanId,
        tasks: &[Task],
    ) -> Result<(), RepositoryError> {
        for (position, task) in tasks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO tasks
                    (id, plan_id, position, title, description, category, start_time, end_time,
                     priority, status, estimated_duration, energy_required)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(task.id.0)
            .bind(plan_id.0)
            .bind(position as i32)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.category.as_str())
            .bind(task.start_time.map(|t| t.to_string()))
            .bind(task.end_time.map(|t| t.to_string()))
            .bind(task.priority as i16)
            .bind(task.status.as_str())
            .bind(task.estimated_duration as i32)
            .bind(task.energy_required.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to insert task '{}': {}", task.title, e)))?;
        }
        Ok(())
    }

    /// Explain why a version-guarded write on a draft matched no row
    async fn guarded_write_miss(
        &self,
        id: PlanId,
        expected_version: i64,
        attempted: &str,
    ) -> RepositoryError {
        match self.find_by_id(id).await {
            Err(e) => e,
            Ok(None) => RepositoryError::NotFound(format!("Plan {}", id)),
            Ok(Some(current)) if current.version != expected_version => RepositoryError::Conflict {
                id: id.to_string(),
                expected: expected_version,
                actual: current.version,
            },
            Ok(Some(current)) => RepositoryError::Validation(format!(
                "Plan {} is {} and cannot be {}",
                id, current.status, attempted
            )),
        }
    }
}

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn create_with_tasks(&self, plan: &Plan, tasks: &[Task]) -> Result<(), RepositoryError> {
        validate_batch(plan, tasks)?;
        let metadata = serde_json::to_value(&plan.metadata)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO plans
                (id, user_id, plan_type, date, status, version, summary, metadata, progress, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(plan.id.0)
        .bind(plan.user_id.0)
        .bind(plan.plan_type.as_str())
        .bind(plan.date)
        .bind(plan.status.as_str())
        .bind(plan.version)
        .bind(&plan.summary)
        .bind(&metadata)
        .bind(plan.progress)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert plan: {}", e)))?;

        Self::insert_tasks(&mut tx, plan.id, tasks).await?;

        // Dropping the transaction on any error above rolls everything back
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: PlanId) -> Result<Option<Plan>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM plans p WHERE p.id = $1", PLAN_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::plan_from_row).transpose()
    }

    async fn find_tasks(&self, plan_id: PlanId) -> Result<Vec<Task>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE plan_id = $1 ORDER BY position",
            TASK_COLUMNS
        ))
        .bind(plan_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::task_from_row).collect()
    }

    async fn recent_plans(
        &self,
        user_id: UserId,
        plan_type: Option<PlanType>,
        limit: usize,
    ) -> Result<Vec<Plan>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM plans p
            WHERE p.user_id = $1 AND ($2::TEXT IS NULL OR p.plan_type = $2)
            ORDER BY p.date DESC, p.created_at DESC
            LIMIT $3
            "#,
            PLAN_COLUMNS
        ))
        .bind(user_id.0)
        .bind(plan_type.map(|t| t.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::plan_from_row).collect()
    }

    async fn update_status(
        &self,
        id: PlanId,
        expected_version: i64,
        status: PlanStatus,
    ) -> Result<Plan, RepositoryError> {
        // Only drafts move, so the status guard doubles as the transition check
        let updated = sqlx::query(&format!(
            r#"
            WITH updated AS (
                UPDATE plans
                SET status = $3, version = version + 1, updated_at = NOW()
                WHERE id = $1 AND version = $2 AND status = 'draft' AND $3 <> 'draft'
                RETURNING *
            )
            SELECT {} FROM updated p
            "#,
            PLAN_COLUMNS
        ))
        .bind(id.0)
        .bind(expected_version)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Self::plan_from_row(&row);
        }

        Err(self
            .guarded_write_miss(id, expected_version, &format!("moved to {}", status))
            .await)
    }

    async fn replace_tasks(
        &self,
        plan: &Plan,
        expected_version: i64,
        tasks: &[Task],
    ) -> Result<Plan, RepositoryError> {
        validate_batch(plan, tasks)?;
        let metadata = serde_json::to_value(&plan.metadata)?;

        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE plans
            SET summary = $3, metadata = $4, progress = $5, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2 AND status = 'draft'
            RETURNING id
            "#,
        )
        .bind(plan.id.0)
        .bind(expected_version)
        .bind(&plan.summary)
        .bind(&metadata)
        .bind(progress_of(tasks))
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            return Err(self.guarded_write_miss(plan.id, expected_version, "replanned").await);
        }

        sqlx::query("DELETE FROM tasks WHERE plan_id = $1")
            .bind(plan.id.0)
            .execute(&mut *tx)
            .await?;
        Self::insert_tasks(&mut tx, plan.id, tasks).await?;

        let row = sqlx::query(&format!("SELECT {} FROM plans p WHERE p.id = $1", PLAN_COLUMNS))
            .bind(plan.id.0)
            .fetch_one(&mut *tx)
            .await?;
        let stored = Self::plan_from_row(&row)?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<TaskStatusChange, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "UPDATE tasks SET status = $2 WHERE id = $1 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task_id.0)
        .bind(status.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Task {}", task_id.0)))?;
        let task = Self::task_from_row(&row)?;

        let plan_progress: f64 = sqlx::query_scalar(
            r#"
            UPDATE plans
            SET progress = (
                SELECT COALESCE(ROUND((100.0 * COUNT(*) FILTER (WHERE status = 'done')
                                       / NULLIF(COUNT(*), 0))::NUMERIC, 1), 0)::DOUBLE PRECISION
                FROM tasks
                WHERE plan_id = $1
            )
            WHERE id = $1
            RETURNING progress
            "#,
        )
        .bind(task.plan_id.0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(TaskStatusChange { task, plan_progress })
    }
}
