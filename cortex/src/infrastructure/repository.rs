// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository interfaces for Cortex bounded context
//! Defines the contract for user memory storage

use async_trait::async_trait;
use anyhow::Result;
use crate::domain::{MemoryCategory, MemoryId, UserId, UserMemory};

/// Repository for storing and retrieving user memories
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Store a new memory
    async fn insert(&self, memory: &UserMemory) -> Result<()>;

    /// Update an existing memory (confidence, tier, access bookkeeping)
    async fn update(&self, memory: &UserMemory) -> Result<()>;

    /// Delete a memory (pruning)
    async fn delete(&self, id: MemoryId) -> Result<()>;

    /// Find a memory by its ID
    async fn find_by_id(&self, id: MemoryId) -> Result<Option<UserMemory>>;

    /// All memories of a user, any tier
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<UserMemory>>;

    /// Memories of a user in one category (reinforcement candidates)
    async fn find_by_category(
        &self,
        user_id: UserId,
        category: MemoryCategory,
    ) -> Result<Vec<UserMemory>>;

    /// Users that own at least one memory (lifecycle scheduling)
    async fn list_users(&self) -> Result<Vec<UserId>>;
}
