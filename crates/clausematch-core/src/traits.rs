//! Seams between the engine and its backends.
//!
//! Every trait here is `Send + Sync`: indexes are loaded once and shared
//! across retrieval threads without locks.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AdjudicationRequest, Channel, Field, RawHit, SearchHit, Verdict};

pub trait Embedder: Send + Sync {
    /// Stable identity of the model; cached vectors are keyed by it.
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    /// Returns one L2-normalized vector per input, in input order.
    /// Blank input yields `Error::EmptyQuery`.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Keyword backend. Raw scores are unnormalized BM25.
pub trait SparseIndex: Send + Sync {
    fn search(&self, query: &str, field: Field, k: usize) -> Result<Vec<RawHit>>;
}

/// Vector backend. Raw scores are cosine similarities.
pub trait DenseIndex: Send + Sync {
    fn dim(&self) -> usize;
    fn search_vec(&self, field: Field, query_vec: &[f32], k: usize) -> Result<Vec<RawHit>>;
}

/// Input for one field search. `embedding` lets callers reuse a vector they
/// already computed; backends that need one embed `text` otherwise.
#[derive(Debug, Clone, Copy)]
pub struct FieldQuery<'a> {
    pub text: &'a str,
    pub embedding: Option<&'a [f32]>,
}

impl<'a> FieldQuery<'a> {
    pub fn text(text: &'a str) -> Self {
        Self { text, embedding: None }
    }
}

/// One channel over one corpus, with scores normalized into `[0, 1]` and
/// ranked by score desc then `chunk_id` asc.
pub trait ScoredIndex: Send + Sync {
    fn channel(&self) -> Channel;
    fn search(&self, query: &FieldQuery<'_>, field: Field, top_k: usize) -> Result<Vec<SearchHit>>;
}

/// External oracle deciding which retrieved candidates really match a clause.
#[async_trait]
pub trait Adjudicator: Send + Sync {
    fn name(&self) -> &str;
    async fn adjudicate(&self, request: &AdjudicationRequest) -> Result<Vec<Verdict>>;
}
