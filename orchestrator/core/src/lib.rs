// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! LifeOS orchestrator core
//!
//! The planning pipeline (context assembly, generation with fallback,
//! self-healing persistence) and the infrastructure it runs on: LLM
//! providers, repositories, caches, the job queue and the event bus.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Planning bounded context, wired onto `lifeos-cortex`

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
