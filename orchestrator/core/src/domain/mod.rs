// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model for the planning bounded context
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Plans, tasks, profiles and the contracts the pipeline
//!   depends on (LLM, repositories, calendar, background jobs)

pub mod task;
pub mod plan;
pub mod profile;
pub mod draft;
pub mod events;
pub mod repository;
pub mod llm;
pub mod calendar;
pub mod jobs;
pub mod config;

pub use task::{ClockTime, EnergyLevel, Task, TaskCategory, TaskId, TaskStatus};
pub use plan::{progress_of, FailurePattern, Plan, PlanId, PlanStats, PlanStatus, PlanType};
pub use profile::{RoutineBlock, RoutineTemplate, UserId, UserProfile};
pub use draft::{DraftSource, DraftTask, GeneratedPlan, PlanDraft};
pub use events::PlanningEvent;
pub use repository::{PlanRepository, ProfileRepository, RepositoryError, TaskStatusChange};
pub use calendar::{CalendarError, CalendarSync};
pub use jobs::{Job, JobEnvelope, JobHandler, JobKind, JobQueue, JobQueueError};
pub use config::LifeOsConfigManifest;
