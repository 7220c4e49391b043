// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Handlers for the background job kinds

use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use lifeos_cortex::application::{MemoryService, RagManager};
use lifeos_cortex::domain::USER_SCOPE_KEY;

use crate::domain::jobs::{Job, JobHandler, JobKind};
use crate::infrastructure::job_queue::JobRegistry;

use super::fact_extraction::{ExtractionError, FactExtractor};

/// Adds a stored memory to the user's scope of the vector index
pub struct IndexMemoryHandler {
    rag: Arc<RagManager>,
}

impl IndexMemoryHandler {
    pub fn new(rag: Arc<RagManager>) -> Self {
        Self { rag }
    }
}

#[async_trait]
impl JobHandler for IndexMemoryHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let Job::IndexMemory {
            user_id,
            text,
            category,
        } = job
        else {
            anyhow::bail!("IndexMemoryHandler cannot handle {} jobs", job.kind());
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(USER_SCOPE_KEY.to_string(), user_id.to_string());
        metadata.insert("category".to_string(), category.to_string());

        let indexed = self
            .rag
            .add(text, metadata)
            .await
            .context("Failed to index memory")?;
        debug!(user_id = %user_id, indexed, "Memory indexed");
        Ok(())
    }
}

pub struct ExtractFactsHandler {
    extractor: Arc<FactExtractor>,
}

impl ExtractFactsHandler {
    pub fn new(extractor: Arc<FactExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl JobHandler for ExtractFactsHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let Job::ExtractFacts { user_id, text } = job else {
            anyhow::bail!("ExtractFactsHandler cannot handle {} jobs", job.kind());
        };

        match self.extractor.extract(*user_id, text).await {
            Ok(outcome) => {
                debug!(user_id = %user_id, ?outcome, "Fact extraction finished");
                Ok(())
            }
            // Retrying cannot help until a backend is configured
            Err(ExtractionError::NotConfigured(alias)) => {
                debug!(%alias, "Skipping fact extraction, no backend");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct RunLifecycleHandler {
    memory: Arc<dyn MemoryService>,
}

impl RunLifecycleHandler {
    pub fn new(memory: Arc<dyn MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl JobHandler for RunLifecycleHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let Job::RunLifecycle { user_id } = job else {
            anyhow::bail!("RunLifecycleHandler cannot handle {} jobs", job.kind());
        };

        let report = self.memory.run_lifecycle(*user_id).await?;
        info!(
            user_id = %user_id,
            decayed = report.decayed,
            pruned = report.pruned,
            promoted = report.promoted,
            "Lifecycle job complete"
        );
        Ok(())
    }
}

/// Dispatch table with a handler for every job kind
pub fn standard_job_registry(
    rag: Arc<RagManager>,
    extractor: Arc<FactExtractor>,
    memory: Arc<dyn MemoryService>,
) -> JobRegistry {
    JobRegistry::new()
        .register(JobKind::IndexMemory, Arc::new(IndexMemoryHandler::new(rag)))
        .register(JobKind::ExtractFacts, Arc::new(ExtractFactsHandler::new(extractor)))
        .register(JobKind::RunLifecycle, Arc::new(RunLifecycleHandler::new(memory)))
}
