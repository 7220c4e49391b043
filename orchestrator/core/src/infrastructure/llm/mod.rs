// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain `LLMProvider` interface and a
// vendor HTTP API. The registry resolves model aliases to adapters.

pub mod openai;
pub mod ollama;
pub mod registry;

pub use ollama::OllamaAdapter;
pub use openai::OpenAIAdapter;
pub use registry::ProviderRegistry;
