//! Chunk → article reduction.

use std::collections::BTreeMap;

use clausematch_core::config::{check_pool_weights, AggregationSettings, PolicyKind};
use clausematch_core::corpus::Corpus;
use clausematch_core::error::Result;
use clausematch_core::types::{ArticleCandidate, ScoredCandidate};
use clausematch_core::Score;

#[derive(Debug, Clone, PartialEq)]
pub enum ReductionPolicy {
    /// Representative = best chunk.
    Top1,
    /// Weighted average of the best N chunks; weights are renormalized when an
    /// article has fewer than N chunks.
    WeightedPool(Vec<f64>),
}

impl ReductionPolicy {
    pub fn from_settings(settings: &AggregationSettings) -> Result<Self> {
        match settings.policy {
            PolicyKind::Top1 => Ok(Self::Top1),
            PolicyKind::WeightedPool => {
                check_pool_weights(&settings.pool_weights)?;
                Ok(Self::WeightedPool(settings.pool_weights.clone()))
            }
        }
    }

    /// `sorted` must be non-empty and ordered best first.
    fn reduce(&self, sorted: &[Score]) -> Score {
        match self {
            Self::Top1 => sorted.first().copied().unwrap_or(Score::ZERO),
            Self::WeightedPool(weights) => {
                let used = weights.iter().zip(sorted);
                let weight_sum: f64 = used.clone().map(|(w, _)| w).sum();
                if weight_sum <= 0.0 {
                    return Score::ZERO;
                }
                let total: f64 = used.map(|(w, s)| w * s.value()).sum();
                Score::new(total / weight_sum)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticleAggregator {
    policy: ReductionPolicy,
}

impl Default for ArticleAggregator {
    fn default() -> Self {
        Self { policy: ReductionPolicy::Top1 }
    }
}

impl ArticleAggregator {
    pub fn new(policy: ReductionPolicy) -> Self {
        Self { policy }
    }

    /// One candidate per article, ranked by representative score desc then
    /// `article_id` asc.
    pub fn aggregate(&self, candidates: &[ScoredCandidate], corpus: &Corpus) -> Vec<ArticleCandidate> {
        let mut groups: BTreeMap<&str, Vec<&ScoredCandidate>> = BTreeMap::new();
        for c in candidates {
            groups.entry(c.article_id.as_str()).or_default().push(c);
        }

        let mut out: Vec<ArticleCandidate> = groups
            .into_iter()
            .map(|(article_id, mut chunks)| {
                chunks.sort_by(|a, b| {
                    Score::cmp_desc(a.fused_score, b.fused_score).then_with(|| a.chunk_id.cmp(&b.chunk_id))
                });
                let scores: Vec<Score> = chunks.iter().map(|c| c.fused_score).collect();
                ArticleCandidate {
                    article_id: article_id.to_string(),
                    title: corpus.article(article_id).map(|a| a.title.clone()).unwrap_or_default(),
                    representative_score: self.policy.reduce(&scores),
                    supporting_chunks: chunks.into_iter().cloned().collect(),
                }
            })
            .collect();
        out.sort_by(|a, b| {
            Score::cmp_desc(a.representative_score, b.representative_score).then_with(|| a.article_id.cmp(&b.article_id))
        });
        out
    }
}

/// True when there is no candidate or the best one falls below `threshold`.
pub fn is_special(top: Option<Score>, threshold: f64) -> bool {
    top.map_or(true, |s| s.value() < threshold)
}
