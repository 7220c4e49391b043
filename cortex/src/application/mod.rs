// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod rag_manager;
pub mod memory_service;
pub mod lifecycle_scheduler;

pub use rag_manager::{RagConfig, RagManager, RetrievalError};
pub use memory_service::{
    EventBus, IngestOutcome, LifecycleReport, MemoryError, MemoryService, PrioritizedMemory,
    StandardMemoryService,
};
pub use lifecycle_scheduler::{LifecycleScheduler, LifecycleSchedulerConfig};
