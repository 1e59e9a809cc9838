//! Channel adapters: turn raw backend output into normalized, ranked hits.

use std::borrow::Cow;
use std::sync::Arc;

use clausematch_core::config::SparseNormalization;
use clausematch_core::error::{Error, Result};
use clausematch_core::traits::{DenseIndex, Embedder, FieldQuery, ScoredIndex, SparseIndex};
use clausematch_core::types::{Channel, Field, RawHit, SearchHit};
use clausematch_core::Score;

const FLAT_EPSILON: f32 = 1e-9;

/// Score desc, then `chunk_id` asc.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| Score::cmp_desc(a.score, b.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
}

/// Cosine similarity floored at 0 and capped at 1.
pub fn normalize_dense(hits: Vec<RawHit>) -> Vec<SearchHit> {
    let mut out: Vec<SearchHit> = hits
        .into_iter()
        .map(|h| {
            let v = if h.raw.is_nan() { 0.0 } else { f64::from(h.raw).clamp(0.0, 1.0) };
            SearchHit { chunk_id: h.chunk_id, score: Score::new(v), channel: Channel::Dense }
        })
        .collect();
    sort_hits(&mut out);
    out
}

pub fn normalize_sparse(hits: Vec<RawHit>, mode: SparseNormalization) -> Vec<SearchHit> {
    let finite = |x: f32| if x.is_finite() { x } else { 0.0 };
    let max = hits.iter().map(|h| finite(h.raw)).fold(f32::MIN, f32::max);
    let min = hits.iter().map(|h| finite(h.raw)).fold(f32::MAX, f32::min);
    let mut out: Vec<SearchHit> = hits
        .into_iter()
        .map(|h| {
            let raw = finite(h.raw);
            let v = match mode {
                SparseNormalization::MinMax if max - min <= FLAT_EPSILON => 1.0,
                SparseNormalization::MinMax => f64::from((raw - min) / (max - min)),
                SparseNormalization::MaxRatio if max <= 0.0 => 0.0,
                SparseNormalization::MaxRatio => f64::from(raw / max),
            };
            SearchHit { chunk_id: h.chunk_id, score: Score::new(v.clamp(0.0, 1.0)), channel: Channel::Sparse }
        })
        .collect();
    sort_hits(&mut out);
    out
}

pub struct DenseScoredIndex {
    index: Arc<dyn DenseIndex>,
    embedder: Arc<dyn Embedder>,
}

impl DenseScoredIndex {
    pub fn new(index: Arc<dyn DenseIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }
}

impl ScoredIndex for DenseScoredIndex {
    fn channel(&self) -> Channel {
        Channel::Dense
    }

    fn search(&self, query: &FieldQuery<'_>, field: Field, top_k: usize) -> Result<Vec<SearchHit>> {
        let vector: Cow<'_, [f32]> = match query.embedding {
            Some(v) => Cow::Borrowed(v),
            None => {
                if query.text.trim().is_empty() {
                    return Err(Error::EmptyQuery);
                }
                let mut vs = self.embedder.embed_batch(&[query.text.to_string()])?;
                Cow::Owned(vs.pop().ok_or_else(|| Error::Operation("embedder returned no vector".into()))?)
            }
        };
        let raw = self.index.search_vec(field, &vector, top_k)?;
        Ok(normalize_dense(raw))
    }
}

pub struct SparseScoredIndex {
    index: Arc<dyn SparseIndex>,
    normalization: SparseNormalization,
}

impl SparseScoredIndex {
    pub fn new(index: Arc<dyn SparseIndex>, normalization: SparseNormalization) -> Self {
        Self { index, normalization }
    }
}

impl ScoredIndex for SparseScoredIndex {
    fn channel(&self) -> Channel {
        Channel::Sparse
    }

    fn search(&self, query: &FieldQuery<'_>, field: Field, top_k: usize) -> Result<Vec<SearchHit>> {
        if query.text.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }
        let raw = self.index.search(query.text, field, top_k)?;
        Ok(normalize_sparse(raw, self.normalization))
    }
}
