// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! LifeOS Cortex
//!
//! Long-term memory for the planner: a decaying, promotable memory store and
//! a vector retrieval manager over the user's "rules of life" corpus.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Memory lifecycle (decay, prune, promote, reinforce) and RAG retrieval

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
