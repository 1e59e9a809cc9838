//! Embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! The cache is consulted before calling a provider and written through on
//! misses, so rebuilding an index does not re-embed unchanged chunks.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clausematch_core::error::Result;
use clausematch_core::persist::{read_json, write_json_atomic};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct EmbeddingCache {
    path: Option<PathBuf>,
    entries: HashMap<(String, String), CacheEntry>,
    dirty: bool,
}

pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

impl EmbeddingCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the cache file at `path`; a missing file starts an empty cache.
    pub fn open(path: &Path) -> Result<Self> {
        let mut cache = Self { path: Some(path.to_path_buf()), ..Self::default() };
        if path.exists() {
            let stored: Vec<CacheEntry> = read_json(path)?;
            for e in stored {
                cache.entries.insert((e.content_hash.clone(), e.embedder_id.clone()), e);
            }
            tracing::debug!(path = %path.display(), entries = cache.entries.len(), "embedding cache loaded");
        }
        Ok(cache)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, embedder_id: &str, text: &str) -> Option<&[f32]> {
        self.entries
            .get(&(content_hash(text), embedder_id.to_string()))
            .map(|e| e.vector.as_slice())
    }

    pub fn put(&mut self, embedder_id: &str, text: &str, vector: Vec<f32>) {
        let content_hash = content_hash(text);
        let entry = CacheEntry {
            content_hash: content_hash.clone(),
            embedder_id: embedder_id.to_string(),
            vector,
            created_at: Utc::now(),
        };
        self.entries.insert((content_hash, embedder_id.to_string()), entry);
        self.dirty = true;
    }

    /// Persists the cache if it has a backing file and changed since loading.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        if !self.dirty {
            return Ok(());
        }
        let mut entries: Vec<&CacheEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| (&a.embedder_id, &a.content_hash).cmp(&(&b.embedder_id, &b.content_hash)));
        write_json_atomic(path, &entries)?;
        self.dirty = false;
        tracing::debug!(path = %path.display(), entries = entries.len(), "embedding cache saved");
        Ok(())
    }
}
