// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory memory store
//!
//! HashMap-backed [`MemoryRepository`] used for development, tests and
//! single-process deployments without a database.

use async_trait::async_trait;
use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{MemoryCategory, MemoryId, UserId, UserMemory};
use crate::infrastructure::repository::MemoryRepository;

#[derive(Clone, Default)]
pub struct InMemoryMemoryRepository {
    memories: Arc<RwLock<HashMap<MemoryId, UserMemory>>>,
}

impl InMemoryMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryRepository for InMemoryMemoryRepository {
    async fn insert(&self, memory: &UserMemory) -> Result<()> {
        let mut memories = self.memories.write().await;
        if memories.contains_key(&memory.id) {
            anyhow::bail!("Memory already exists: {:?}", memory.id);
        }
        memories.insert(memory.id, memory.clone());
        Ok(())
    }

    async fn update(&self, memory: &UserMemory) -> Result<()> {
        let mut memories = self.memories.write().await;
        match memories.get_mut(&memory.id) {
            Some(existing) => {
                *existing = memory.clone();
                Ok(())
            }
            None => anyhow::bail!("Memory not found: {:?}", memory.id),
        }
    }

    async fn delete(&self, id: MemoryId) -> Result<()> {
        let mut memories = self.memories.write().await;
        memories
            .remove(&id)
            .ok_or_else(|| anyhow::anyhow!("Memory not found: {:?}", id))?;
        Ok(())
    }

    async fn find_by_id(&self, id: MemoryId) -> Result<Option<UserMemory>> {
        let memories = self.memories.read().await;
        Ok(memories.get(&id).cloned())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<UserMemory>> {
        let memories = self.memories.read().await;
        let mut found: Vec<UserMemory> = memories
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.created_at);
        Ok(found)
    }

    async fn find_by_category(
        &self,
        user_id: UserId,
        category: MemoryCategory,
    ) -> Result<Vec<UserMemory>> {
        let memories = self.memories.read().await;
        let mut found: Vec<UserMemory> = memories
            .values()
            .filter(|m| m.user_id == user_id && m.category == category)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.created_at);
        Ok(found)
    }

    async fn list_users(&self) -> Result<Vec<UserId>> {
        let memories = self.memories.read().await;
        let users: BTreeSet<uuid::Uuid> = memories.values().map(|m| m.user_id.0).collect();
        Ok(users.into_iter().map(UserId).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_find_by_category() {
        let repo = InMemoryMemoryRepository::new();
        let user = UserId::new();
        let goal = UserMemory::new(user, "Run a marathon", MemoryCategory::Goal);
        let pref = UserMemory::new(user, "Likes mornings", MemoryCategory::Preference);
        repo.insert(&goal).await.unwrap();
        repo.insert(&pref).await.unwrap();

        let goals = repo.find_by_category(user, MemoryCategory::Goal).await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].text, "Run a marathon");
        assert_eq!(repo.find_by_user(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let repo = InMemoryMemoryRepository::new();
        let memory = UserMemory::new(UserId::new(), "x", MemoryCategory::Goal);
        repo.insert(&memory).await.unwrap();
        assert!(repo.insert(&memory).await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let repo = InMemoryMemoryRepository::new();
        let memory = UserMemory::new(UserId::new(), "x", MemoryCategory::Goal);
        assert!(repo.update(&memory).await.is_err());
        assert!(repo.delete(memory.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_users_is_distinct() {
        let repo = InMemoryMemoryRepository::new();
        let user = UserId::new();
        repo.insert(&UserMemory::new(user, "a", MemoryCategory::Goal)).await.unwrap();
        repo.insert(&UserMemory::new(user, "b", MemoryCategory::Goal)).await.unwrap();
        repo.insert(&UserMemory::new(UserId::new(), "c", MemoryCategory::Goal)).await.unwrap();

        assert_eq!(repo.list_users().await.unwrap().len(), 2);
    }
}
