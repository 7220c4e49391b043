// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod db;
pub mod event_bus;
pub mod llm;
pub mod prompt_template_engine;
pub mod json_recovery;
pub mod cache;
pub mod calendar;
pub mod job_queue;

pub use cache::{KeyValueCache, MokaCache};
pub use calendar::{LoggingCalendarSync, NoopCalendarSync};
pub use db::Database;
pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver};
pub use job_queue::{JobRegistry, MpscJobQueue};
pub use prompt_template_engine::PromptTemplateEngine;
pub use repositories::{InMemoryPlanRepository, InMemoryProfileRepository};
