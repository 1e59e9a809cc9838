//! Multi-query matching: one retrieval per sub-item, best article per
//! sub-item, then a clause-level mean over the sub-items that agree.

use std::collections::BTreeMap;

use clausematch_core::config::EngineSettings;
use clausematch_core::error::{Error, Result};
use clausematch_core::types::{ArticleId, ChunkId, Clause, Query, ScoredCandidate};
use clausematch_core::Score;

use crate::aggregate::{is_special, ArticleAggregator, ReductionPolicy};
use crate::normalize::SubItemNormalizer;
use crate::registry::CorpusIndex;
use crate::retriever::{HybridRetriever, QueryVectors};

/// The queries derived from one clause (or, during recheck, one article).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQueries {
    pub title: String,
    pub items: Vec<String>,
}

/// An article supported by one or more sub-items.
///
/// `score` is the mean of the supporting sub-items' best-article scores, so
/// it stays in `[0, 1]` no matter how many sub-items agree.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseCandidate {
    pub article_id: ArticleId,
    pub title: String,
    pub score: Score,
    pub supporting_sub_items: usize,
    pub matched_chunks: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub candidates: Vec<ClauseCandidate>,
    pub is_special: bool,
    pub queries_run: usize,
}

#[derive(Default)]
struct Group {
    title: String,
    scores: Vec<Score>,
    chunks: BTreeMap<ChunkId, ScoredCandidate>,
}

pub struct MultiQueryMatcher {
    retriever: HybridRetriever,
    aggregator: ArticleAggregator,
    normalizer: SubItemNormalizer,
}

impl MultiQueryMatcher {
    pub fn new(retriever: HybridRetriever, aggregator: ArticleAggregator) -> Result<Self> {
        Ok(Self { retriever, aggregator, normalizer: SubItemNormalizer::new()? })
    }

    pub fn from_settings(settings: &EngineSettings) -> Result<Self> {
        let retriever = HybridRetriever::from_settings(settings)?;
        let aggregator = ArticleAggregator::new(ReductionPolicy::from_settings(&settings.aggregation)?);
        Self::new(retriever, aggregator)
    }

    pub fn normalizer(&self) -> &SubItemNormalizer {
        &self.normalizer
    }

    /// Normalized sub-items of `clause`; a clause without sub-items is queried
    /// by its body text.
    pub fn sub_queries(&self, clause: &Clause) -> SubQueries {
        let mut items: Vec<String> = clause.sub_items.iter().filter_map(|s| self.normalizer.normalize(s)).collect();
        if items.is_empty() {
            items.extend(self.normalizer.normalize(&clause.text));
        }
        SubQueries { title: clause.title.trim().to_string(), items }
    }

    pub fn match_clause(&self, index: &CorpusIndex, clause: &Clause, threshold: f64) -> Result<MatchOutcome> {
        let queries = self.sub_queries(clause);
        let outcome = self.match_queries(index, &queries, threshold)?;
        tracing::debug!(
            clause_id = %clause.clause_id,
            sub_items = outcome.queries_run,
            candidates = outcome.candidates.len(),
            top = ?outcome.candidates.first().map(|c| (&c.article_id, c.score.value())),
            is_special = outcome.is_special,
            "clause retrieval done"
        );
        Ok(outcome)
    }

    pub fn match_queries(&self, index: &CorpusIndex, queries: &SubQueries, threshold: f64) -> Result<MatchOutcome> {
        if queries.items.is_empty() {
            return Ok(MatchOutcome { candidates: Vec::new(), is_special: true, queries_run: 0 });
        }

        let embedder = index.embedder();
        let body_vectors = embedder.embed_batch(&queries.items)?;
        if body_vectors.len() != queries.items.len() {
            return Err(Error::Operation(format!(
                "embedder returned {} vectors for {} sub-items",
                body_vectors.len(),
                queries.items.len()
            )));
        }
        // One title embedding per clause, shared by every sub-item.
        let title_vector = if queries.title.is_empty() {
            None
        } else {
            embedder.embed_batch(std::slice::from_ref(&queries.title))?.pop()
        };

        let mut groups: BTreeMap<ArticleId, Group> = BTreeMap::new();
        for (item, body_vec) in queries.items.iter().zip(&body_vectors) {
            let query = Query { body_query: item.clone(), title_query: queries.title.clone() };
            let vectors = QueryVectors { body: Some(body_vec), title: title_vector.as_deref() };
            let candidates = self.retriever.retrieve(index, &query, vectors)?;
            let Some(best) = self.aggregator.aggregate(&candidates, index.corpus()).into_iter().next() else {
                continue;
            };
            let group = groups.entry(best.article_id.clone()).or_default();
            group.title = best.title;
            group.scores.push(best.representative_score);
            for chunk in best.supporting_chunks {
                let keep_existing =
                    group.chunks.get(&chunk.chunk_id).is_some_and(|e| e.fused_score >= chunk.fused_score);
                if !keep_existing {
                    group.chunks.insert(chunk.chunk_id.clone(), chunk);
                }
            }
        }

        let mut candidates: Vec<ClauseCandidate> = groups
            .into_iter()
            .filter_map(|(article_id, group)| {
                let score = Score::mean(&group.scores)?;
                let mut matched_chunks: Vec<ScoredCandidate> = group.chunks.into_values().collect();
                matched_chunks.sort_by(|a, b| {
                    Score::cmp_desc(a.fused_score, b.fused_score).then_with(|| a.chunk_id.cmp(&b.chunk_id))
                });
                Some(ClauseCandidate {
                    article_id,
                    title: group.title,
                    score,
                    supporting_sub_items: group.scores.len(),
                    matched_chunks,
                })
            })
            .collect();
        rank_candidates(&mut candidates);

        // Best score, not the support-ranked first candidate.
        let best = candidates.iter().map(|c| c.score).max_by(|a, b| Score::cmp_desc(*b, *a));
        let special = is_special(best, threshold);
        Ok(MatchOutcome { candidates, is_special: special, queries_run: queries.items.len() })
    }
}

/// Supporting count desc, mean score desc, `article_id` asc.
pub fn rank_candidates(candidates: &mut [ClauseCandidate]) {
    candidates.sort_by(|a, b| {
        b.supporting_sub_items
            .cmp(&a.supporting_sub_items)
            .then_with(|| Score::cmp_desc(a.score, b.score))
            .then_with(|| a.article_id.cmp(&b.article_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(article: &str, score: f64, support: usize) -> ClauseCandidate {
        ClauseCandidate {
            article_id: article.into(),
            title: String::new(),
            score: Score::new(score),
            supporting_sub_items: support,
            matched_chunks: Vec::new(),
        }
    }

    #[test]
    fn support_count_outranks_single_high_score() {
        let mut c = vec![cand("Y", 0.99, 1), cand("X", 0.875, 4), cand("W", 0.875, 4)];
        rank_candidates(&mut c);
        let ids: Vec<&str> = c.iter().map(|c| c.article_id.as_str()).collect();
        assert_eq!(ids, ["W", "X", "Y"]);
    }
}
