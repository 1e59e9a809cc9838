//! Exact inner-product index over L2-normalized vectors, one vector per chunk
//! per field. Every query scans all entries; results are deterministic.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use clausematch_core::error::{Error, Result};
use clausematch_core::persist::{read_json, write_json_atomic};
use clausematch_core::traits::{DenseIndex, Embedder};
use clausematch_core::types::{Chunk, ChunkId, Field, RawHit};

use crate::cache::EmbeddingCache;

const EMBED_BATCH: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    chunk_id: ChunkId,
    body: Vec<f32>,
    title: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatVectorIndex {
    embedder_id: String,
    dim: usize,
    entries: Vec<VectorEntry>,
}

impl FlatVectorIndex {
    /// Embeds every chunk body and every distinct title. Cached vectors are
    /// reused; misses are embedded and written back to `cache`.
    pub fn build(
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        cache: &mut EmbeddingCache,
        show_progress: bool,
    ) -> Result<Self> {
        let bodies: Vec<String> = chunks.iter().map(|c| c.body_text.clone()).collect();
        let mut titles: Vec<String> = chunks.iter().map(|c| c.title.clone()).filter(|t| !t.trim().is_empty()).collect();
        titles.sort();
        titles.dedup();

        let pb = if show_progress {
            let pb = ProgressBar::new((bodies.len() + titles.len()) as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} texts ({percent}%) {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let body_vecs = embed_cached(&bodies, embedder, cache, &pb)?;
        let title_vecs: BTreeMap<String, Vec<f32>> =
            titles.iter().cloned().zip(embed_cached(&titles, embedder, cache, &pb)?).collect();
        pb.finish_with_message("embedded");

        let entries = chunks
            .iter()
            .zip(body_vecs)
            .map(|(c, body)| VectorEntry {
                chunk_id: c.chunk_id.clone(),
                body,
                title: title_vecs.get(&c.title).cloned(),
            })
            .collect();

        tracing::info!(chunks = chunks.len(), titles = titles.len(), embedder = embedder.embedder_id(), "dense index built");
        Ok(Self { embedder_id: embedder.embedder_id().to_string(), dim: embedder.dim(), entries })
    }

    pub fn embedder_id(&self) -> &str {
        &self.embedder_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Loads a persisted index. A missing file or one built with a different
    /// embedder is `IndexUnavailable`.
    pub fn load(path: &Path, expected_embedder_id: &str) -> Result<Self> {
        if !path.exists() {
            return Err(Error::IndexUnavailable(format!("no dense index at {}", path.display())));
        }
        let index: Self = read_json(path)?;
        if index.embedder_id != expected_embedder_id {
            return Err(Error::IndexUnavailable(format!(
                "dense index {} was built with '{}', expected '{}'",
                path.display(),
                index.embedder_id,
                expected_embedder_id
            )));
        }
        if let Some(bad) = index.entries.iter().find(|e| e.body.len() != index.dim) {
            return Err(Error::IndexUnavailable(format!("vector for chunk '{}' has wrong dimension", bad.chunk_id)));
        }
        Ok(index)
    }
}

fn embed_cached(
    texts: &[String],
    embedder: &dyn Embedder,
    cache: &mut EmbeddingCache,
    pb: &ProgressBar,
) -> Result<Vec<Vec<f32>>> {
    let id = embedder.embedder_id().to_string();
    let mut out: Vec<Option<Vec<f32>>> = texts.iter().map(|t| cache.get(&id, t).map(<[f32]>::to_vec)).collect();
    let misses: Vec<usize> = out.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(i, _)| i).collect();
    pb.inc((texts.len() - misses.len()) as u64);
    if !misses.is_empty() {
        tracing::debug!(hits = texts.len() - misses.len(), misses = misses.len(), "embedding cache lookup");
    }

    for batch in misses.chunks(EMBED_BATCH) {
        let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
        let vectors = embedder.embed_batch(&batch_texts)?;
        if vectors.len() != batch.len() {
            return Err(Error::Operation(format!("embedder returned {} vectors for {} texts", vectors.len(), batch.len())));
        }
        for (&i, v) in batch.iter().zip(vectors) {
            if v.len() != embedder.dim() {
                return Err(Error::Operation(format!("embedder returned dim {}, expected {}", v.len(), embedder.dim())));
            }
            cache.put(&id, &texts[i], v.clone());
            out[i] = Some(v);
        }
        pb.inc(batch.len() as u64);
    }
    Ok(out.into_iter().flatten().collect())
}

fn rank_key(raw: f32) -> f32 {
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl DenseIndex for FlatVectorIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn search_vec(&self, field: Field, query_vec: &[f32], k: usize) -> Result<Vec<RawHit>> {
        if query_vec.len() != self.dim {
            return Err(Error::Operation(format!("query dim {} does not match index dim {}", query_vec.len(), self.dim)));
        }
        let mut hits: Vec<RawHit> = self
            .entries
            .iter()
            .filter_map(|e| {
                let v = match field {
                    Field::Body => Some(&e.body),
                    Field::Title => e.title.as_ref(),
                }?;
                Some(RawHit { chunk_id: e.chunk_id.clone(), raw: dot(v, query_vec) })
            })
            .collect();
        // Rank on the clamped cosine the dense channel reports, so the cut at
        // `k` agrees with the final (score desc, chunk_id asc) order.
        hits.sort_by(|a, b| rank_key(b.raw).total_cmp(&rank_key(a.raw)).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        hits.truncate(k);
        Ok(hits)
    }
}
