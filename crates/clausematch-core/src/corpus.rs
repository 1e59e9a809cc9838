//! Loading of standard-contract chunks and submitted contracts.
//!
//! Chunk files are JSON arrays produced by the ingestion pipeline. Field names
//! follow that pipeline (`id`, `parent_id`, `text_norm`, `text_raw`); the
//! canonical `Chunk` names are accepted as well.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{ArticleId, Chunk, ChunkId, ContractDocument};

#[derive(Debug, Deserialize)]
struct RawChunk {
    #[serde(alias = "id")]
    chunk_id: String,
    #[serde(alias = "parent_id")]
    article_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body_text: Option<String>,
    #[serde(default)]
    text_norm: Option<String>,
    #[serde(default)]
    text_raw: Option<String>,
    #[serde(default)]
    order_index: usize,
}

impl RawChunk {
    fn into_chunk(self) -> Option<Chunk> {
        let body = [self.body_text, self.text_norm, self.text_raw]
            .into_iter()
            .flatten()
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())?;
        Some(Chunk {
            chunk_id: self.chunk_id,
            article_id: self.article_id,
            title: self.title.trim().to_string(),
            body_text: body,
            order_index: self.order_index,
        })
    }
}

/// Article-level view over a corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleInfo {
    pub article_id: ArticleId,
    pub title: String,
    pub first_order_index: usize,
    pub chunk_ids: Vec<ChunkId>,
}

/// Immutable, read-only collection of chunks with article grouping.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    chunks: Vec<Chunk>,
    by_id: HashMap<ChunkId, usize>,
    articles: Vec<ArticleInfo>,
    article_pos: HashMap<ArticleId, usize>,
}

impl Corpus {
    pub fn from_chunks(mut chunks: Vec<Chunk>) -> Result<Self> {
        chunks.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.chunk_id.cmp(&b.chunk_id)));

        let mut by_id = HashMap::with_capacity(chunks.len());
        for (pos, chunk) in chunks.iter().enumerate() {
            if by_id.insert(chunk.chunk_id.clone(), pos).is_some() {
                return Err(Error::Operation(format!("duplicate chunk id '{}'", chunk.chunk_id)));
            }
        }

        let mut articles: Vec<ArticleInfo> = Vec::new();
        let mut article_pos: HashMap<ArticleId, usize> = HashMap::new();
        for chunk in &chunks {
            match article_pos.get(&chunk.article_id) {
                Some(&pos) => articles[pos].chunk_ids.push(chunk.chunk_id.clone()),
                None => {
                    article_pos.insert(chunk.article_id.clone(), articles.len());
                    articles.push(ArticleInfo {
                        article_id: chunk.article_id.clone(),
                        title: chunk.title.clone(),
                        first_order_index: chunk.order_index,
                        chunk_ids: vec![chunk.chunk_id.clone()],
                    });
                }
            }
        }

        Ok(Self { chunks, by_id, articles, article_pos })
    }

    /// Loads one JSON array file. Chunks without any body text are skipped.
    pub fn load_json(path: &Path) -> Result<Self> {
        let chunks = read_chunk_file(path)?;
        tracing::info!(path = %path.display(), chunks = chunks.len(), "loaded chunk file");
        Self::from_chunks(chunks)
    }

    /// Loads every `*.json` file under `dir`, in path order.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "json"))
            .map(|e| e.into_path())
            .collect();
        if files.is_empty() {
            return Err(Error::NotFound(format!("no chunk files under {}", dir.display())));
        }
        files.sort();
        let mut all = Vec::new();
        for file in &files {
            all.extend(read_chunk_file(file)?);
        }
        tracing::info!(dir = %dir.display(), files = files.len(), chunks = all.len(), "loaded chunk directory");
        Self::from_chunks(all)
    }

    /// Accepts either a single file or a directory of files.
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::load_dir(path)
        } else if path.is_file() {
            Self::load_json(path)
        } else {
            Err(Error::NotFound(format!("chunk source {}", path.display())))
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        self.by_id.get(chunk_id).map(|&pos| &self.chunks[pos])
    }

    /// Articles ordered by their first chunk's `order_index`.
    pub fn articles(&self) -> &[ArticleInfo] {
        &self.articles
    }

    pub fn article(&self, article_id: &str) -> Option<&ArticleInfo> {
        self.article_pos.get(article_id).map(|&pos| &self.articles[pos])
    }

    pub fn article_chunks(&self, article_id: &str) -> Vec<&Chunk> {
        self.article(article_id)
            .map(|a| a.chunk_ids.iter().filter_map(|id| self.chunk(id)).collect())
            .unwrap_or_default()
    }
}

fn read_chunk_file(path: &Path) -> Result<Vec<Chunk>> {
    let content = fs::read_to_string(path)?;
    let raw: Vec<RawChunk> = serde_json::from_str(&content)?;
    let total = raw.len();
    let chunks: Vec<Chunk> = raw.into_iter().filter_map(RawChunk::into_chunk).collect();
    if chunks.len() < total {
        tracing::warn!(path = %path.display(), skipped = total - chunks.len(), "skipped chunks without body text");
    }
    Ok(chunks)
}

/// Reads a submitted contract, filling in `clause-<number>` ids where absent.
pub fn load_contract(path: &Path) -> Result<ContractDocument> {
    let content = fs::read_to_string(path)?;
    let mut doc: ContractDocument = serde_json::from_str(&content)?;
    normalize_contract(&mut doc)?;
    Ok(doc)
}

pub fn normalize_contract(doc: &mut ContractDocument) -> Result<()> {
    let mut seen = HashSet::new();
    for clause in &mut doc.clauses {
        if clause.clause_id.trim().is_empty() {
            clause.clause_id = format!("clause-{}", clause.number);
        }
        if !seen.insert(clause.clause_id.clone()) {
            return Err(Error::InvalidConfig(format!(
                "duplicate clause id '{}' in contract {}",
                clause.clause_id, doc.contract_id
            )));
        }
    }
    Ok(())
}
