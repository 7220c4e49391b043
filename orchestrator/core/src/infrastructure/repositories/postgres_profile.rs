// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::Weekday;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::profile::{RoutineBlock, RoutineTemplate, UserId, UserProfile};
use crate::domain::repository::{ProfileRepository, RepositoryError};
use crate::domain::task::ClockTime;

pub struct PostgresProfileRepository {
    pool: PgPool,
}

impl PostgresProfileRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn clock(row: &PgRow, column: &str) -> Result<ClockTime, RepositoryError> {
        let raw: String = row.try_get(column)?;
        raw.parse()
            .map_err(|e: crate::domain::task::ClockTimeError| RepositoryError::Serialization(e.to_string()))
    }

    fn goals(row: &PgRow, column: &str) -> Result<Vec<String>, RepositoryError> {
        let value: serde_json::Value = row.try_get(column)?;
        Ok(serde_json::from_value(value)?)
    }

    fn profile_from_row(row: &PgRow) -> Result<UserProfile, RepositoryError> {
        Ok(UserProfile {
            user_id: UserId(row.try_get("user_id")?),
            wake_time: Self::clock(row, "wake_time")?,
            work_start_time: Self::clock(row, "work_start_time")?,
            work_end_time: Self::clock(row, "work_end_time")?,
            sleep_time: Self::clock(row, "sleep_time")?,
            role: row.try_get("role")?,
            health_goals: Self::goals(row, "health_goals")?,
            learning_goals: Self::goals(row, "learning_goals")?,
            finance_goals: Self::goals(row, "finance_goals")?,
            constraints: Self::goals(row, "constraints")?,
        })
    }
}

fn weekday_index(weekday: Weekday) -> i16 {
    weekday.num_days_from_monday() as i16
}

fn weekday_from_index(index: i16) -> Option<Weekday> {
    u8::try_from(index).ok().and_then(|i| Weekday::try_from(i).ok())
}

#[async_trait]
impl ProfileRepository for PostgresProfileRepository {
    async fn find_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, wake_time, work_start_time, work_end_time, sleep_time, role,
                   health_goals, learning_goals, finance_goals, constraints
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::profile_from_row).transpose()
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles
                (user_id, wake_time, work_start_time, work_end_time, sleep_time, role,
                 health_goals, learning_goals, finance_goals, constraints, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                wake_time = EXCLUDED.wake_time,
                work_start_time = EXCLUDED.work_start_time,
                work_end_time = EXCLUDED.work_end_time,
                sleep_time = EXCLUDED.sleep_time,
                role = EXCLUDED.role,
                health_goals = EXCLUDED.health_goals,
                learning_goals = EXCLUDED.learning_goals,
                finance_goals = EXCLUDED.finance_goals,
                constraints = EXCLUDED.constraints,
                updated_at = NOW()
            "#,
        )
        .bind(profile.user_id.0)
        .bind(profile.wake_time.to_string())
        .bind(profile.work_start_time.to_string())
        .bind(profile.work_end_time.to_string())
        .bind(profile.sleep_time.to_string())
        .bind(&profile.role)
        .bind(serde_json::to_value(&profile.health_goals)?)
        .bind(serde_json::to_value(&profile.learning_goals)?)
        .bind(serde_json::to_value(&profile.finance_goals)?)
        .bind(serde_json::to_value(&profile.constraints)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save profile: {}", e)))?;

        Ok(())
    }

    async fn find_routine(
        &self,
        user_id: UserId,
        weekday: Weekday,
    ) -> Result<Option<RoutineTemplate>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT name, weekdays, blocks
            FROM routine_templates
            WHERE user_id = $1 AND $2 = ANY(weekdays)
            ORDER BY name
            LIMIT 1
            "#,
        )
        .bind(user_id.0)
        .bind(weekday_index(weekday))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let weekdays: Vec<i16> = row.try_get("weekdays")?;
        let blocks: serde_json::Value = row.try_get("blocks")?;

        Ok(Some(RoutineTemplate {
            user_id,
            name: row.try_get("name")?,
            weekdays: weekdays.into_iter().filter_map(weekday_from_index).collect(),
            blocks: serde_json::from_value::<Vec<RoutineBlock>>(blocks)?,
        }))
    }

    async fn save_routine(&self, routine: &RoutineTemplate) -> Result<(), RepositoryError> {
        let weekdays: Vec<i16> = routine.weekdays.iter().copied().map(weekday_index).collect();

        sqlx::query(
            r#"
            INSERT INTO routine_templates (user_id, name, weekdays, blocks, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (user_id, name) DO UPDATE SET
                weekdays = EXCLUDED.weekdays,
                blocks = EXCLUDED.blocks,
                updated_at = NOW()
            "#,
        )
        .bind(routine.user_id.0)
        .bind(&routine.name)
        .bind(&weekdays)
        .bind(serde_json::to_value(&routine.blocks)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save routine: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_index_roundtrip() {
        for weekday in [Weekday::Mon, Weekday::Thu, Weekday::Sun] {
            assert_eq!(weekday_from_index(weekday_index(weekday)), Some(weekday));
        }
        assert_eq!(weekday_from_index(7), None);
        assert_eq!(weekday_from_index(-1), None);
    }
}
