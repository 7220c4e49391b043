// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # RagManager: vector retrieval over the rules-of-life corpus
//!
//! Owns the process-wide vector index and the durable JSON corpus it mirrors.
//! One instance is built at startup and shared behind an `Arc`. The index is
//! loaded lazily on first use, from the snapshot if present, otherwise by
//! embedding the corpus.
//!
//! ## Consistency
//!
//! - The live index sits behind a reader-favouring `RwLock<Arc<FlatL2Index>>`.
//!   Readers clone the `Arc` and search without holding the lock. Rebuilds
//!   and appends build a complete replacement first, then swap the pointer.
//! - Rebuilds and appends are serialised by an async mutex so two callers
//!   never race to publish different indexes.
//! - Every `add`/`query` compares the corpus size with the loaded index
//!   size. A larger corpus triggers a synchronous rebuild before serving.
//!
//! Query results are cached for `query_cache_ttl_seconds` with no write
//! invalidation.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use moka::sync::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::application::EventBus;
use crate::domain::{dedup_key, CorpusEntry, CortexEvent, RagHealth, RetrievalResult};
use crate::infrastructure::{
    CorpusError, EmbeddingError, EmbeddingProvider, FlatL2Index, IndexError, JsonCorpusStore,
};

/// Candidates fetched per requested result, leaving room for deduplication.
const OVERFETCH_FACTOR: usize = 4;

/// Concurrent embedding requests issued during a rebuild.
const REBUILD_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Durable corpus (JSON array of rules)
    #[serde(default = "default_corpus_path")]
    pub corpus_path: PathBuf,

    /// Vector index snapshot written after every rebuild/append
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Results returned when the caller does not ask for a specific k
    #[serde(default = "default_k")]
    pub default_k: usize,

    #[serde(default = "default_query_cache_ttl")]
    pub query_cache_ttl_seconds: u64,

    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: u64,
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("data/rag/data.json")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/rag/index.json")
}

fn default_k() -> usize {
    3
}

fn default_query_cache_ttl() -> u64 {
    600
}

fn default_query_cache_capacity() -> u64 {
    1_000
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            corpus_path: default_corpus_path(),
            index_path: default_index_path(),
            default_k: default_k(),
            query_cache_ttl_seconds: default_query_cache_ttl(),
            query_cache_capacity: default_query_cache_capacity(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Embedding backend failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Corpus unavailable: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),

    #[error("Cannot index empty text")]
    EmptyText,
}

pub struct RagManager {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    corpus: JsonCorpusStore,
    state: RwLock<Option<Arc<FlatL2Index>>>,
    write_lock: tokio::sync::Mutex<()>,
    query_cache: Cache<String, Arc<Vec<RetrievalResult>>>,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl RagManager {
    pub fn new(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let query_cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.query_cache_ttl_seconds))
            .max_capacity(config.query_cache_capacity)
            .build();
        Self {
            corpus: JsonCorpusStore::new(config.corpus_path.clone()),
            config,
            embedder,
            state: RwLock::new(None),
            write_lock: tokio::sync::Mutex::new(()),
            query_cache,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    fn current(&self) -> Option<Arc<FlatL2Index>> {
        self.state.read().clone()
    }

    fn install(&self, index: Arc<FlatL2Index>) {
        *self.state.write() = Some(index);
    }

    /// Index matching the corpus, loading or rebuilding it first if needed.
    async fn ensure_current(&self) -> Result<Arc<FlatL2Index>, RetrievalError> {
        let source_entries = self.corpus.count().await?;
        if let Some(index) = self.current() {
            if index.len() >= source_entries {
                return Ok(index);
            }
        }

        let _guard = self.write_lock.lock().await;

        // Another caller may have finished the rebuild while we waited.
        let entries = self.corpus.load().await?;
        if let Some(index) = self.current() {
            if index.len() >= entries.len() {
                return Ok(index);
            }
            info!(
                indexed_entries = index.len(),
                source_entries = entries.len(),
                "Vector index is stale, rebuilding"
            );
        } else if let Some(snapshot) = self.load_snapshot().await {
            if snapshot.len() >= entries.len() {
                let snapshot = Arc::new(snapshot);
                self.install(snapshot.clone());
                info!(indexed_entries = snapshot.len(), "Loaded vector index snapshot");
                return Ok(snapshot);
            }
            info!(
                indexed_entries = snapshot.len(),
                source_entries = entries.len(),
                "Vector index snapshot is stale, rebuilding"
            );
        }

        self.rebuild_from(entries).await
    }

    async fn load_snapshot(&self) -> Option<FlatL2Index> {
        match FlatL2Index::load(&self.config.index_path).await {
            Ok(Some(index)) if index.dimension() == self.embedder.dimension() => Some(index),
            Ok(Some(index)) => {
                warn!(
                    snapshot_dim = index.dimension(),
                    embedding_dim = self.embedder.dimension(),
                    "Discarding vector index snapshot built with a different embedding dimension"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Discarding unreadable vector index snapshot: {}", e);
                None
            }
        }
    }

    /// Caller must hold `write_lock`.
    async fn rebuild_from(
        &self,
        entries: Vec<CorpusEntry>,
    ) -> Result<Arc<FlatL2Index>, RetrievalError> {
        let started = Instant::now();
        let embedder = self.embedder.clone();

        let texts: Vec<String> = entries.iter().map(|entry| entry.text.clone()).collect();
        let vectors: Vec<Vec<f32>> = stream::iter(texts)
            .map(move |text| {
                let embedder = embedder.clone();
                async move { embedder.embed(&text).await }
            })
            .buffered(REBUILD_CONCURRENCY)
            .try_collect()
            .await
            .map_err(|e| {
                metrics::counter!("lifeos_retrieval_error_total", "stage" => "rebuild").increment(1);
                RetrievalError::from(e)
            })?;

        let mut index = FlatL2Index::new(self.embedder.dimension());
        for (entry, vector) in entries.into_iter().zip(vectors) {
            index.push(entry, vector)?;
        }

        let index = Arc::new(index);
        self.install(index.clone());

        if let Err(e) = index.save(&self.config.index_path).await {
            warn!("Failed to write vector index snapshot: {}", e);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::counter!("lifeos_rag_rebuild_total").increment(1);
        info!(indexed_entries = index.len(), duration_ms, "Vector index rebuilt");
        self.publish(CortexEvent::IndexRebuilt {
            indexed_entries: index.len(),
            duration_ms,
            timestamp: Utc::now(),
        })
        .await;

        Ok(index)
    }

    /// Force a full rebuild from the corpus.
    pub async fn rebuild(&self) -> Result<RagHealth, RetrievalError> {
        {
            let _guard = self.write_lock.lock().await;
            let entries = self.corpus.load().await?;
            self.rebuild_from(entries).await?;
        }
        Ok(self.health_check().await)
    }

    /// Persist a new entry and make it searchable. Returns the index size.
    pub async fn add(
        &self,
        text: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<usize, RetrievalError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RetrievalError::EmptyText);
        }

        self.ensure_current().await?;
        let vector = self.embedder.embed(text).await.map_err(|e| {
            metrics::counter!("lifeos_retrieval_error_total", "stage" => "add").increment(1);
            RetrievalError::from(e)
        })?;

        let _guard = self.write_lock.lock().await;
        let current = match self.current() {
            Some(index) => index,
            None => Arc::new(FlatL2Index::new(self.embedder.dimension())),
        };
        if vector.len() != current.dimension() {
            return Err(IndexError::Dimension {
                expected: current.dimension(),
                actual: vector.len(),
            }
            .into());
        }

        let entry = CorpusEntry::with_metadata(text, metadata);
        let source_entries = self.corpus.append(entry.clone()).await?;
        let next = Arc::new(current.with_entry(entry, vector)?);
        self.install(next.clone());

        if let Err(e) = next.save(&self.config.index_path).await {
            warn!("Failed to write vector index snapshot: {}", e);
        }
        if next.len() != source_entries {
            warn!(
                indexed_entries = next.len(),
                source_entries,
                "Corpus changed outside the manager, next access will rebuild"
            );
        }

        debug!(indexed_entries = next.len(), "Added entry to vector index");
        Ok(next.len())
    }

    /// Nearest rules for `text` across the whole corpus.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievalResult>, RetrievalError> {
        self.query_scoped(text, k, None).await
    }

    /// Nearest rules visible to `scope`: shared entries plus the scope's own.
    pub async fn query_scoped(
        &self,
        text: &str,
        k: usize,
        scope: Option<&str>,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let text = text.trim();
        if k == 0 || text.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.ensure_current().await?;

        let cache_key = query_cache_key(text, k, scope);
        if let Some(hit) = self.query_cache.get(&cache_key) {
            debug!("RAG query cache hit");
            return Ok(hit.as_ref().clone());
        }

        if index.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(text).await.map_err(|e| {
            metrics::counter!("lifeos_retrieval_error_total", "stage" => "query").increment(1);
            RetrievalError::from(e)
        })?;

        let candidates = index.search(&vector, k.saturating_mul(OVERFETCH_FACTOR), |entry| {
            entry.visible_to(scope)
        })?;

        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(k);
        for (position, distance) in candidates {
            let Some(entry) = index.entry(position) else {
                continue;
            };
            if !seen.insert(dedup_key(&entry.text)) {
                continue;
            }
            results.push(RetrievalResult::from_distance(
                entry.text.clone(),
                distance,
                results.len() + 1,
            ));
            if results.len() == k {
                break;
            }
        }

        self.query_cache.insert(cache_key, Arc::new(results.clone()));
        Ok(results)
    }

    /// Read-only diagnostic. Never loads or rebuilds the index.
    pub async fn health_check(&self) -> RagHealth {
        let source_entries = match self.corpus.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("RAG health check could not read corpus: {}", e);
                0
            }
        };
        let index = self.current();
        let indexed_entries = index.as_ref().map(|i| i.len()).unwrap_or(0);

        RagHealth {
            index_loaded: index.is_some(),
            indexed_entries,
            source_entries,
            index_stale: source_entries > indexed_entries,
            embedding_dim: index
                .as_ref()
                .map(|i| i.dimension())
                .unwrap_or_else(|| self.embedder.dimension()),
            index_file: self.config.index_path.display().to_string(),
        }
    }

    async fn publish(&self, event: CortexEvent) {
        if let Some(bus) = &self.event_bus {
            if let Err(e) = bus.publish(event).await {
                warn!("Failed to publish cortex event: {}", e);
            }
        }
    }
}

fn query_cache_key(text: &str, k: usize, scope: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(k.to_le_bytes());
    hasher.update(scope.unwrap_or("*").as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    format!("rag:query:{}", hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::HashEmbeddingClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingEmbedder {
        inner: HashEmbeddingClient,
        calls: AtomicUsize,
        offline: AtomicBool,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                inner: HashEmbeddingClient::new(64),
                calls: AtomicUsize::new(0),
                offline: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(EmbeddingError::Unavailable("connection refused".into()));
            }
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    fn config_in(dir: &std::path::Path) -> RagConfig {
        RagConfig {
            corpus_path: dir.join("data.json"),
            index_path: dir.join("index.json"),
            ..RagConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.default_k, 3);
        assert_eq!(config.query_cache_ttl_seconds, 600);
    }

    #[test]
    fn test_cache_key_depends_on_all_inputs() {
        let base = query_cache_key("sleep", 3, None);
        assert_ne!(base, query_cache_key("sleep", 4, None));
        assert_ne!(base, query_cache_key("sleep", 3, Some("u1")));
        assert_ne!(base, query_cache_key("rest", 3, None));
        assert!(base.starts_with("rag:query:"));
    }

    #[tokio::test]
    async fn test_health_check_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("data.json"), r#"["Sleep by 11pm"]"#)
            .await
            .unwrap();
        let embedder = Arc::new(CountingEmbedder::new());
        let manager = RagManager::new(config_in(dir.path()), embedder.clone());

        let health = manager.health_check().await;
        assert!(!health.index_loaded);
        assert_eq!(health.source_entries, 1);
        assert!(health.index_stale);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("data.json"),
            r#"["Sleep by 11pm", "Walk after lunch"]"#,
        )
        .await
        .unwrap();
        let embedder = Arc::new(CountingEmbedder::new());
        let manager = RagManager::new(config_in(dir.path()), embedder.clone());

        let first = manager.query("sleep early", 3).await.unwrap();
        let calls_after_first = embedder.calls.load(Ordering::SeqCst);
        let second = manager.query("sleep early", 3).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_add_fails_without_touching_corpus_when_embedder_down() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(CountingEmbedder::new());
        let manager = RagManager::new(config_in(dir.path()), embedder.clone());
        embedder.offline.store(true, Ordering::SeqCst);

        let result = manager.add("Stretch every morning", BTreeMap::new()).await;
        assert!(matches!(result, Err(RetrievalError::Embedding(_))));
        assert_eq!(manager.health_check().await.source_entries, 0);
    }

    #[tokio::test]
    async fn test_add_rejects_blank_text() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RagManager::new(config_in(dir.path()), Arc::new(CountingEmbedder::new()));
        assert!(matches!(
            manager.add("   ", BTreeMap::new()).await,
            Err(RetrievalError::EmptyText)
        ));
    }

    #[tokio::test]
    async fn test_snapshot_avoids_reembedding() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        {
            let manager = RagManager::new(config.clone(), Arc::new(CountingEmbedder::new()));
            manager.add("Sleep by 11pm", BTreeMap::new()).await.unwrap();
            manager.add("Walk after lunch", BTreeMap::new()).await.unwrap();
        }

        let embedder = Arc::new(CountingEmbedder::new());
        let manager = RagManager::new(config, embedder.clone());
        let results = manager.query("walk after lunch", 1).await.unwrap();

        assert_eq!(results[0].text, "Walk after lunch");
        // Only the query itself was embedded.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }
}
