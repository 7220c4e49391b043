// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Calendar sync adapters. No external calendar is integrated; these cover
//! deployments without one and local inspection of what would be pushed.

use async_trait::async_trait;
use tracing::info;

use crate::domain::calendar::{CalendarError, CalendarSync};
use crate::domain::plan::Plan;
use crate::domain::task::Task;

#[derive(Debug, Default, Clone)]
pub struct NoopCalendarSync;

#[async_trait]
impl CalendarSync for NoopCalendarSync {
    async fn sync_plan(&self, _plan: &Plan, _tasks: &[Task]) -> Result<(), CalendarError> {
        Ok(())
    }
}

/// Logs each timed task as the event it would become
#[derive(Debug, Default, Clone)]
pub struct LoggingCalendarSync;

#[async_trait]
impl CalendarSync for LoggingCalendarSync {
    async fn sync_plan(&self, plan: &Plan, tasks: &[Task]) -> Result<(), CalendarError> {
        let mut synced = 0;
        for task in tasks {
            if let Some((start, end)) = task.window() {
                info!(
                    plan_id = %plan.id,
                    date = %plan.date,
                    %start,
                    %end,
                    title = %task.title,
                    "Calendar event"
                );
                synced += 1;
            }
        }
        info!(plan_id = %plan.id, synced, "Calendar sync complete");
        Ok(())
    }
}
