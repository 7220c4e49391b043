// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for Cortex bounded context

pub mod repository;
pub mod memory_store;
pub mod postgres_memory;
pub mod embedding_client;
pub mod vector_index;
pub mod corpus;

pub use repository::MemoryRepository;
pub use memory_store::InMemoryMemoryRepository;
pub use postgres_memory::PostgresMemoryRepository;
pub use embedding_client::{EmbeddingError, EmbeddingProvider, HashEmbeddingClient, OllamaEmbeddingClient};
pub use vector_index::{FlatL2Index, IndexError};
pub use corpus::{CorpusError, JsonCorpusStore};
