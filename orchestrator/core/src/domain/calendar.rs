// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Calendar collaborator. Approved plans are pushed here without blocking
//! the approval itself.

use async_trait::async_trait;

use super::plan::Plan;
use super::task::Task;

#[async_trait]
pub trait CalendarSync: Send + Sync {
    async fn sync_plan(&self, plan: &Plan, tasks: &[Task]) -> Result<(), CalendarError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar unavailable: {0}")]
    Unavailable(String),

    #[error("Calendar rejected the plan: {0}")]
    Rejected(String),
}
