// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! LifeOS CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers, logging setup and service wiring for the
//!   `lifeos` binary

pub mod commands;
pub mod logging;
pub mod wiring;
