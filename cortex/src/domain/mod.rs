// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model for the Cortex bounded context
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Memory records, retrieval results and cortex events

pub mod memory;
pub mod retrieval;
pub mod events;

pub use memory::*;
pub use retrieval::*;
pub use events::*;
