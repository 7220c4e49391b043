// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Client
//!
//! Turns text into fixed-dimension vectors for the retrieval index.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Anti-corruption layer over the embedding backend
//!
//! Two implementations are provided:
//!
//! - [`OllamaEmbeddingClient`] calls `POST {endpoint}/api/embeddings` with
//!   `{model, prompt}` and reads back `{embedding}` (default model
//!   `nomic-embed-text`, 768 dimensions).
//! - [`HashEmbeddingClient`] is a deterministic, offline bag-of-words hasher.
//!   Texts sharing words land near each other, which is enough for local
//!   development and tests without a model server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding backend unreachable: {0}")]
    Unavailable(String),

    #[error("Embedding backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed embedding response: {0}")]
    Malformed(String),

    #[error("Expected {expected}-dimensional embedding, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("Cannot embed empty text")]
    EmptyInput,
}

/// Domain interface for embedding backends
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimension of the vectors this provider produces
    fn dimension(&self) -> usize;
}

/// Client for an Ollama embedding server
pub struct OllamaEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbeddingClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self::with_timeout(endpoint, model, dimension, Duration::from_secs(30))
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let url = format!("{}/api/embeddings", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Http { status, body });
        }

        let parsed: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        if parsed.embedding.len() != self.dimension {
            return Err(EmbeddingError::Dimension {
                expected: self.dimension,
                actual: parsed.embedding.len(),
            });
        }

        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic offline embedder
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let raw = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((raw % self.dimension as u64) as usize, sign)
    }
}

impl Default for HashEmbeddingClient {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedding_dimension() {
        let client = HashEmbeddingClient::new(384);
        let embedding = client.embed("test error message").await.unwrap();

        assert_eq!(embedding.len(), 384);
        assert_eq!(client.dimension(), 384);
    }

    #[tokio::test]
    async fn test_consistent_embeddings() {
        let client = HashEmbeddingClient::default();
        let emb1 = client.embed("same text").await.unwrap();
        let emb2 = client.embed("Same  TEXT!").await.unwrap();

        assert_eq!(emb1, emb2, "Same words should produce same embedding");
    }

    #[tokio::test]
    async fn test_hash_embedding_rejects_empty() {
        let client = HashEmbeddingClient::default();
        assert!(matches!(client.embed("   ").await, Err(EmbeddingError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_ollama_embedding_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "nomic-embed-text",
                "prompt": "eat more vegetables"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embedding":[0.1,0.2,0.3]}"#)
            .create_async()
            .await;

        let client = OllamaEmbeddingClient::new(server.url(), DEFAULT_EMBEDDING_MODEL, 3);
        let embedding = client.embed("eat more vegetables").await.unwrap();

        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ollama_dimension_mismatch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_body(r#"{"embedding":[0.1,0.2]}"#)
            .create_async()
            .await;

        let client = OllamaEmbeddingClient::new(server.url(), DEFAULT_EMBEDDING_MODEL, 3);
        let result = client.embed("hello").await;

        assert!(matches!(
            result,
            Err(EmbeddingError::Dimension { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_ollama_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/embeddings")
            .with_status(500)
            .with_body("model not loaded")
            .create_async()
            .await;

        let client = OllamaEmbeddingClient::new(server.url(), DEFAULT_EMBEDDING_MODEL, 3);
        assert!(matches!(
            client.embed("hello").await,
            Err(EmbeddingError::Http { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_ollama_unreachable() {
        let client = OllamaEmbeddingClient::with_timeout(
            "http://127.0.0.1:9",
            DEFAULT_EMBEDDING_MODEL,
            3,
            Duration::from_millis(200),
        );
        assert!(matches!(
            client.embed("hello").await,
            Err(EmbeddingError::Unavailable(_))
        ));
    }
}
