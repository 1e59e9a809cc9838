//! Field fusion (body/title within one channel) and channel fusion
//! (dense/sparse), both weighted sums over scores already in `[0, 1]`.

use std::collections::BTreeMap;

use clausematch_core::config::check_pair;
use clausematch_core::corpus::Corpus;
use clausematch_core::error::{Error, Result};
use clausematch_core::types::{ChunkId, ScoredCandidate, SearchHit};
use clausematch_core::Score;

/// Two non-negative weights summing to 1 (within 1e-3), stored renormalized
/// so fused scores never leave `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightPair {
    first: f64,
    second: f64,
}

impl WeightPair {
    pub fn new(first: f64, second: f64) -> Result<Self> {
        check_pair("fusion", first, second)?;
        let sum = first + second;
        Ok(Self { first: first / sum, second: second / sum })
    }

    pub fn first(&self) -> f64 {
        self.first
    }

    pub fn second(&self) -> f64 {
        self.second
    }

    const ONLY_FIRST: WeightPair = WeightPair { first: 1.0, second: 0.0 };
    const ONLY_SECOND: WeightPair = WeightPair { first: 0.0, second: 1.0 };
}

/// Outcome of one field search. `Skipped` means the query for that field
/// normalized to nothing; a search that ran and found nothing is `Ran(vec![])`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldHits {
    Skipped,
    Ran(Vec<SearchHit>),
}

impl FieldHits {
    /// Maps `EmptyQuery` to `Skipped`; every other error propagates.
    pub fn from_search(result: Result<Vec<SearchHit>>) -> Result<Self> {
        match result {
            Ok(hits) => Ok(Self::Ran(hits)),
            Err(Error::EmptyQuery) => Ok(Self::Skipped),
            Err(e) => Err(e),
        }
    }

    fn hits(&self) -> &[SearchHit] {
        match self {
            Self::Skipped => &[],
            Self::Ran(hits) => hits,
        }
    }
}

/// Per-chunk scores of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldScores {
    pub body: Score,
    pub title: Score,
    pub fused: Score,
}

impl FieldScores {
    const ZERO: FieldScores = FieldScores { body: Score::ZERO, title: Score::ZERO, fused: Score::ZERO };
}

pub type ChannelScores = BTreeMap<ChunkId, FieldScores>;

fn best_by_chunk(hits: &[SearchHit]) -> BTreeMap<&str, Score> {
    let mut out: BTreeMap<&str, Score> = BTreeMap::new();
    for h in hits {
        let slot = out.entry(h.chunk_id.as_str()).or_insert(Score::ZERO);
        if h.score > *slot {
            *slot = h.score;
        }
    }
    out
}

/// Weighted sum of one channel's body and title hits. A chunk missing from one
/// list scores 0 there. A skipped field hands its weight to the other field.
pub fn fuse_fields(body: &FieldHits, title: &FieldHits, weights: WeightPair) -> ChannelScores {
    let w = match (body, title) {
        (FieldHits::Skipped, FieldHits::Skipped) => return ChannelScores::new(),
        (FieldHits::Skipped, _) => WeightPair::ONLY_SECOND,
        (_, FieldHits::Skipped) => WeightPair::ONLY_FIRST,
        _ => weights,
    };
    let body_scores = best_by_chunk(body.hits());
    let title_scores = best_by_chunk(title.hits());

    let mut out = ChannelScores::new();
    for id in body_scores.keys().chain(title_scores.keys()) {
        if out.contains_key(*id) {
            continue;
        }
        let b = body_scores.get(id).copied().unwrap_or(Score::ZERO);
        let t = title_scores.get(id).copied().unwrap_or(Score::ZERO);
        let fused = Score::new(w.first * b.value() + w.second * t.value());
        out.insert((*id).to_string(), FieldScores { body: b, title: t, fused });
    }
    out
}

/// Weighted sum of the dense and sparse channels, truncated to `top_k`.
///
/// A channel with no results hands its whole weight to the other one, so a
/// query the sparse side cannot answer scores exactly as dense-only.
pub fn fuse_channels(
    dense: &ChannelScores,
    sparse: &ChannelScores,
    weights: WeightPair,
    corpus: &Corpus,
    top_k: usize,
) -> Vec<ScoredCandidate> {
    let w = match (dense.is_empty(), sparse.is_empty()) {
        (false, true) => {
            tracing::trace!("sparse channel empty; dense-only scoring");
            WeightPair::ONLY_FIRST
        }
        (true, false) => {
            tracing::trace!("dense channel empty; sparse-only scoring");
            WeightPair::ONLY_SECOND
        }
        _ => weights,
    };
    let mix = |d: Score, s: Score| Score::new(w.first * d.value() + w.second * s.value());

    let mut out: Vec<ScoredCandidate> = Vec::with_capacity(dense.len().max(sparse.len()));
    for id in dense.keys().chain(sparse.keys().filter(|k| !dense.contains_key(*k))) {
        let Some(chunk) = corpus.chunk(id) else {
            tracing::warn!(chunk_id = %id, "hit for chunk missing from corpus; dropped");
            continue;
        };
        let d = dense.get(id).copied().unwrap_or(FieldScores::ZERO);
        let s = sparse.get(id).copied().unwrap_or(FieldScores::ZERO);
        out.push(ScoredCandidate {
            chunk_id: id.clone(),
            article_id: chunk.article_id.clone(),
            body_score: mix(d.body, s.body),
            title_score: mix(d.title, s.title),
            dense_score: d.fused,
            sparse_score: s.fused,
            fused_score: mix(d.fused, s.fused),
        });
    }
    out.sort_by(|a, b| Score::cmp_desc(a.fused_score, b.fused_score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    out.truncate(top_k);
    out
}
