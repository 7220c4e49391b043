// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the LifeOS CLI

pub mod config;
pub mod daemon;
pub mod memory;
pub mod plan;
pub mod profile;
pub mod rag;
pub mod update;

pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::memory::MemoryCommand;
pub use self::plan::PlanCommand;
pub use self::profile::ProfileCommand;
pub use self::rag::RagCommand;
pub use self::update::UpdateCommand;
