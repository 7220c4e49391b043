// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Durable JSON corpus
//!
//! The corpus file is the source of truth the vector index is rebuilt from.
//! It holds a JSON array where each element is either a bare string or an
//! object `{ "text": ..., "source": ..., "metadata": {...} }`. Blank entries
//! are ignored on load.
//!
//! Appends use read, truncate, then write of the whole array under a mutex.
//! A reader therefore never sees the file with an extra element written
//! half-way.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::CorpusEntry;

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Corpus I/O failed for {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Corpus file {path} is not valid JSON: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Text(String),
    Entry(CorpusEntry),
}

impl From<StoredEntry> for CorpusEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Text(text) => CorpusEntry::new(text),
            StoredEntry::Entry(entry) => entry,
        }
    }
}

pub struct JsonCorpusStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonCorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, e: std::io::Error) -> CorpusError {
        CorpusError::Io {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }

    /// All entries, or an empty corpus when the file does not exist yet.
    pub async fn load(&self) -> Result<Vec<CorpusEntry>, CorpusError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        let stored: Vec<StoredEntry> =
            serde_json::from_slice(&bytes).map_err(|e| CorpusError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        Ok(stored
            .into_iter()
            .map(CorpusEntry::from)
            .filter(|entry| !entry.text.trim().is_empty())
            .collect())
    }

    pub async fn count(&self) -> Result<usize, CorpusError> {
        Ok(self.load().await?.len())
    }

    /// Append one entry and return the new corpus size.
    pub async fn append(&self, entry: CorpusEntry) -> Result<usize, CorpusError> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        entries.push(entry);

        let bytes = serde_json::to_vec_pretty(&entries).map_err(|e| CorpusError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_err(e))?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        file.write_all(&bytes).await.map_err(|e| self.io_err(e))?;
        file.sync_all().await.map_err(|e| self.io_err(e))?;

        Ok(entries.len())
    }
}
