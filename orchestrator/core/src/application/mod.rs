// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services for the planning pipeline
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates the domain through the repository, LLM and
//!   job-queue ports

pub mod normalization;
pub mod constraints;
pub mod fallback;
pub mod self_healing;
pub mod history;
pub mod context_assembler;
pub mod plan_generator;
pub mod persistence;
pub mod fact_extraction;
pub mod job_handlers;
pub mod pipeline;
pub mod repository_factory;
pub mod runtime;

pub use context_assembler::{ContextAssembler, GenerationPayload};
pub use plan_generator::{GenerationError, PlanGenerator};
pub use persistence::{PersistenceCoordinator, PlanningError};
pub use self_healing::{HealingReport, SelfHealer};
pub use fact_extraction::{ExtractionError, ExtractionOutcome, FactExtractor};
pub use pipeline::PlanningPipeline;
pub use repository_factory::{create_repositories, Repositories};
pub use runtime::{embedder_from_config, PlanningRuntime};
