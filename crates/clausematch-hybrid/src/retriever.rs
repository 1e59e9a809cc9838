use clausematch_core::config::EngineSettings;
use clausematch_core::error::Result;
use clausematch_core::traits::{FieldQuery, ScoredIndex};
use clausematch_core::types::{Field, Query, ScoredCandidate};

use crate::fusion::{fuse_channels, fuse_fields, ChannelScores, FieldHits, WeightPair};
use crate::registry::CorpusIndex;

/// Precomputed query vectors; `None` lets the dense channel embed the text.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryVectors<'a> {
    pub body: Option<&'a [f32]>,
    pub title: Option<&'a [f32]>,
}

/// Runs both channels over both fields and fuses the results.
#[derive(Debug, Clone)]
pub struct HybridRetriever {
    field_weights: WeightPair,
    channel_weights: WeightPair,
    per_field_top_k: usize,
    fused_top_k: usize,
}

impl HybridRetriever {
    pub fn new(field_weights: WeightPair, channel_weights: WeightPair, per_field_top_k: usize, fused_top_k: usize) -> Self {
        Self { field_weights, channel_weights, per_field_top_k, fused_top_k }
    }

    pub fn from_settings(settings: &EngineSettings) -> Result<Self> {
        let f = &settings.fusion;
        Ok(Self::new(
            WeightPair::new(f.body_weight, f.title_weight)?,
            WeightPair::new(f.dense_weight, f.sparse_weight)?,
            settings.retrieval.per_field_top_k,
            settings.retrieval.fused_top_k,
        ))
    }

    fn channel(&self, index: &dyn ScoredIndex, query: &Query, vectors: QueryVectors<'_>) -> Result<ChannelScores> {
        let body = FieldQuery { text: &query.body_query, embedding: vectors.body };
        let title = FieldQuery { text: &query.title_query, embedding: vectors.title };
        let body_hits = FieldHits::from_search(index.search(&body, Field::Body, self.per_field_top_k))?;
        let title_hits = FieldHits::from_search(index.search(&title, Field::Title, self.per_field_top_k))?;
        tracing::trace!(
            channel = ?index.channel(),
            body_skipped = matches!(body_hits, FieldHits::Skipped),
            title_skipped = matches!(title_hits, FieldHits::Skipped),
            "channel searched"
        );
        Ok(fuse_fields(&body_hits, &title_hits, self.field_weights))
    }

    /// Fused chunk candidates, ranked by `fused_score` desc then `chunk_id` asc.
    /// A query whose fields are all empty yields no candidates.
    pub fn retrieve(&self, index: &CorpusIndex, query: &Query, vectors: QueryVectors<'_>) -> Result<Vec<ScoredCandidate>> {
        let dense = self.channel(index.dense(), query, vectors)?;
        let sparse = self.channel(index.sparse(), query, QueryVectors::default())?;
        Ok(fuse_channels(&dense, &sparse, self.channel_weights, index.corpus(), self.fused_top_k))
    }
}
