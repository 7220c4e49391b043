// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Runtime wiring
//!
//! Builds every long-lived service from a [`LifeOsConfigSpec`] in one place
//! so the CLI commands, the daemon and the integration tests share it.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use lifeos_cortex::application::{
    LifecycleScheduler, MemoryService, RagManager, StandardMemoryService,
};
use lifeos_cortex::infrastructure::{EmbeddingProvider, HashEmbeddingClient, OllamaEmbeddingClient};

use crate::domain::calendar::CalendarSync;
use crate::domain::config::{EmbeddingConfig, LifeOsConfigSpec};
use crate::domain::jobs::JobQueueError;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::job_queue::MpscJobQueue;
use crate::infrastructure::llm::registry::ProviderRegistry;
use crate::infrastructure::prompt_template_engine::PromptTemplateEngine;
use crate::infrastructure::MokaCache;

use super::context_assembler::ContextAssembler;
use super::fact_extraction::FactExtractor;
use super::job_handlers::standard_job_registry;
use super::persistence::PersistenceCoordinator;
use super::pipeline::PlanningPipeline;
use super::plan_generator::PlanGenerator;
use super::repository_factory::Repositories;

pub fn embedder_from_config(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbeddingClient::with_timeout(
            config.endpoint.clone(),
            config.model.clone(),
            config.dimension,
            Duration::from_secs(config.timeout_seconds),
        ))),
        "hash" => Ok(Arc::new(HashEmbeddingClient::new(config.dimension))),
        other => anyhow::bail!("Unsupported embedding provider: {}", other),
    }
}

pub struct PlanningRuntime {
    pub pipeline: Arc<PlanningPipeline>,
    pub memory: Arc<dyn MemoryService>,
    pub rag: Arc<RagManager>,
    pub extractor: Arc<FactExtractor>,
    pub jobs: Arc<MpscJobQueue>,
    pub event_bus: EventBus,
    workers: usize,
    lifecycle: lifeos_cortex::application::LifecycleSchedulerConfig,
}

impl PlanningRuntime {
    pub fn build(
        spec: &LifeOsConfigSpec,
        repositories: Repositories,
        registry: Arc<ProviderRegistry>,
        embedder: Arc<dyn EmbeddingProvider>,
        calendar: Arc<dyn CalendarSync>,
        event_bus: EventBus,
    ) -> anyhow::Result<Self> {
        let templates = Arc::new(PromptTemplateEngine::new()?);

        let rag = Arc::new(
            RagManager::new(spec.rag.clone(), embedder).with_event_bus(Arc::new(event_bus.clone())),
        );
        let memory: Arc<dyn MemoryService> = Arc::new(
            StandardMemoryService::new(repositories.memories.clone(), Arc::new(event_bus.clone()))
                .with_retriever(rag.clone()),
        );
        let jobs = Arc::new(MpscJobQueue::new(spec.jobs.queue_capacity, spec.jobs.max_attempts));

        let extractor = Arc::new(FactExtractor::new(
            registry.clone(),
            templates.clone(),
            memory.clone(),
            jobs.clone(),
            spec.generation.model_alias.clone(),
        ));

        let assembler = ContextAssembler::new(
            repositories.profiles.clone(),
            repositories.plans.clone(),
            memory.clone(),
            Arc::new(MokaCache::new(spec.cache.max_capacity)),
            &spec.generation,
            &spec.cache,
        );
        let generator = PlanGenerator::new(registry, templates, spec.generation.clone());
        let persistence = PersistenceCoordinator::new(
            repositories.plans.clone(),
            calendar,
            event_bus.clone(),
            &spec.persistence,
        );

        let pipeline = Arc::new(PlanningPipeline::new(
            assembler,
            generator,
            persistence,
            repositories.plans,
            memory.clone(),
            rag.clone(),
            jobs.clone(),
        ));

        Ok(Self {
            pipeline,
            memory,
            rag,
            extractor,
            jobs,
            event_bus,
            workers: spec.jobs.workers,
            lifecycle: spec.memory.lifecycle.clone(),
        })
    }

    /// Start the job workers. Only the first call succeeds.
    pub fn start_workers(&self) -> Result<Vec<JoinHandle<()>>, JobQueueError> {
        let registry = standard_job_registry(self.rag.clone(), self.extractor.clone(), self.memory.clone());
        self.jobs.start(registry, self.workers)
    }

    /// The nightly lifecycle sweep, ready to `start()`
    pub fn lifecycle_scheduler(&self) -> Arc<LifecycleScheduler> {
        Arc::new(LifecycleScheduler::new(self.memory.clone(), self.lifecycle.clone()))
    }

    /// Stop the workers once queued jobs have drained or `timeout` passed
    pub async fn shutdown(&self, timeout: Duration) {
        let drained = self.jobs.wait_idle(timeout).await;
        info!(drained, pending = self.jobs.pending(), "Stopping job workers");
        self.jobs.shutdown_token().cancel();
    }
}
