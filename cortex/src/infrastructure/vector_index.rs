// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Flat L2 vector index
//!
//! Exact nearest-neighbour search by Euclidean distance over every stored
//! vector. The corpus is small (a user's rules of life, their extracted
//! facts) so a brute-force scan beats maintaining an ANN structure.
//!
//! An index is an immutable value once built: [`FlatL2Index::with_entry`]
//! returns a new index rather than mutating `self`, which lets the RAG
//! manager publish replacements with a pointer swap.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::CorpusEntry;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Vector has dimension {actual}, index expects {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("Index snapshot I/O failed for {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Index snapshot is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedVector {
    entry: CorpusEntry,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatL2Index {
    dimension: usize,
    items: Vec<IndexedVector>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            items: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, entry: CorpusEntry, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.items.push(IndexedVector { entry, vector });
        Ok(())
    }

    /// Copy of this index with one more entry appended.
    pub fn with_entry(&self, entry: CorpusEntry, vector: Vec<f32>) -> Result<Self, IndexError> {
        let mut next = self.clone();
        next.push(entry, vector)?;
        Ok(next)
    }

    pub fn entry(&self, position: usize) -> Option<&CorpusEntry> {
        self.items.get(position).map(|item| &item.entry)
    }

    /// Positions and distances of the `k` closest entries accepted by `filter`,
    /// nearest first.
    pub fn search<F>(&self, query: &[f32], k: usize, filter: F) -> Result<Vec<(usize, f64)>, IndexError>
    where
        F: Fn(&CorpusEntry) -> bool,
    {
        if query.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(usize, f64)> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| filter(&item.entry))
            .map(|(position, item)| (position, l2_distance(query, &item.vector)))
            .collect();

        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    pub async fn save(&self, path: &Path) -> Result<(), IndexError> {
        let io_err = |e: std::io::Error| IndexError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        let bytes = serde_json::to_vec(self).map_err(|e| IndexError::Corrupt(e.to_string()))?;
        tokio::fs::write(path, bytes).await.map_err(io_err)
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub async fn load(path: &Path) -> Result<Option<Self>, IndexError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IndexError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        let index: Self =
            serde_json::from_slice(&bytes).map_err(|e| IndexError::Corrupt(e.to_string()))?;
        if let Some(bad) = index.items.iter().find(|item| item.vector.len() != index.dimension) {
            return Err(IndexError::Dimension {
                expected: index.dimension,
                actual: bad.vector.len(),
            });
        }
        Ok(Some(index))
    }
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
