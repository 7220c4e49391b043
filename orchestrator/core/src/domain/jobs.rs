// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Background jobs
//!
//! Fire-and-forget work the request path hands off: fact extraction,
//! indexing new memories into the vector store, and lifecycle runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use lifeos_cortex::domain::MemoryCategory;

use super::profile::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    IndexMemory,
    ExtractFacts,
    RunLifecycle,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::IndexMemory => "index_memory",
            JobKind::ExtractFacts => "extract_facts",
            JobKind::RunLifecycle => "run_lifecycle",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Make a stored memory retrievable by vector search
    IndexMemory {
        user_id: UserId,
        text: String,
        category: MemoryCategory,
    },
    /// Mine free text for a durable fact about the user
    ExtractFacts { user_id: UserId, text: String },
    RunLifecycle { user_id: UserId },
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::IndexMemory { .. } => JobKind::IndexMemory,
            Job::ExtractFacts { .. } => JobKind::ExtractFacts,
            Job::RunLifecycle { .. } => JobKind::RunLifecycle,
        }
    }
}

/// A job plus its delivery bookkeeping
#[derive(Debug, Clone)]
pub struct JobEnvelope {
    pub id: Uuid,
    pub job: Job,
    /// 1 on first delivery
    pub attempt: u32,
}

impl JobEnvelope {
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            attempt: 1,
        }
    }

    pub fn retry(&self) -> Self {
        Self {
            id: self.id,
            job: self.job.clone(),
            attempt: self.attempt + 1,
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> anyhow::Result<()>;
}

pub trait JobQueue: Send + Sync {
    /// Never blocks. A full queue drops the job.
    fn enqueue(&self, job: Job) -> Result<(), JobQueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum JobQueueError {
    #[error("Job queue is full, dropped {0} job")]
    Full(JobKind),

    #[error("Job queue is closed")]
    Closed,

    #[error("Job queue workers already started")]
    AlreadyStarted,
}
