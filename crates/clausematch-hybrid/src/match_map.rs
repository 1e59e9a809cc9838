//! Assembles the persisted `MatchMap` from per-clause results and recheck
//! recoveries.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use clausematch_core::corpus::{ArticleInfo, Corpus};
use clausematch_core::error::Result;
use clausematch_core::types::{
    ArticleId, ClauseId, ClauseMatchResult, ClauseStatus, ContractDocument, MappingEntry, MatchMap, MatchSource,
    MatchedArticle, UnmatchedArticle, UnmatchedClause, UnresolvedClause, UnresolvedReason,
};
use clausematch_core::Score;

#[derive(Debug, Clone)]
struct ClauseState {
    clause_id: ClauseId,
    clause_number: u32,
    matched: Vec<MatchedArticle>,
    is_special: bool,
    unresolved: Option<(UnresolvedReason, Vec<ArticleId>)>,
}

pub struct MatchMapBuilder<'a> {
    corpus: &'a Corpus,
    contract_id: String,
    contract_type: String,
    clauses: Vec<ClauseState>,
}

impl<'a> MatchMapBuilder<'a> {
    /// `results` must be in contract clause order.
    pub fn new(corpus: &'a Corpus, contract: &ContractDocument, results: &[ClauseMatchResult], min_confidence: f64) -> Self {
        let clauses = results
            .iter()
            .map(|r| {
                let matched = r
                    .verdicts
                    .iter()
                    .filter(|v| v.is_match && v.confidence.value() >= min_confidence)
                    .filter_map(|v| r.candidate_articles.iter().find(|c| c.article_id == v.article_id))
                    .map(|c| MatchedArticle { article_id: c.article_id.clone(), score: c.score, match_source: c.match_source })
                    .collect();
                let unresolved = match &r.status {
                    ClauseStatus::Unresolved(reason) => Some((
                        reason.clone(),
                        r.candidate_articles.iter().map(|c| c.article_id.clone()).collect(),
                    )),
                    _ => None,
                };
                ClauseState {
                    clause_id: r.clause_id.clone(),
                    clause_number: r.clause_number,
                    matched,
                    is_special: r.is_special,
                    unresolved,
                }
            })
            .collect();
        Self {
            corpus,
            contract_id: contract.contract_id.clone(),
            contract_type: contract.contract_type.clone(),
            clauses,
        }
    }

    fn matched_articles(&self) -> HashSet<&str> {
        self.clauses.iter().flat_map(|c| c.matched.iter().map(|m| m.article_id.as_str())).collect()
    }

    /// Standard articles with no accepted match, in document order. Articles
    /// that were only candidates of unresolved clauses are left out: their
    /// status is unknown, not a gap.
    pub fn unmatched_articles(&self) -> Vec<&'a ArticleInfo> {
        let matched = self.matched_articles();
        let pending: HashSet<&str> = self
            .clauses
            .iter()
            .filter_map(|c| c.unresolved.as_ref())
            .flat_map(|(_, ids)| ids.iter().map(String::as_str))
            .collect();
        self.corpus
            .articles()
            .iter()
            .filter(|a| !matched.contains(a.article_id.as_str()) && !pending.contains(a.article_id.as_str()))
            .collect()
    }

    pub fn is_unresolved(&self, clause_id: &str) -> bool {
        self.clauses.iter().any(|c| c.clause_id == clause_id && c.unresolved.is_some())
    }

    /// Records a match found by the recheck pass. Returns false when the clause
    /// is unknown or unresolved, or already maps to the article.
    pub fn record_recovered(&mut self, clause_id: &str, article_id: &str, score: Score) -> bool {
        let Some(state) = self.clauses.iter_mut().find(|c| c.clause_id == clause_id) else {
            return false;
        };
        if state.unresolved.is_some() || state.matched.iter().any(|m| m.article_id == article_id) {
            return false;
        }
        state.matched.push(MatchedArticle { article_id: article_id.to_string(), score, match_source: MatchSource::Recheck });
        tracing::info!(clause_id, article_id, score = score.value(), "recheck recovered match");
        true
    }

    pub fn build(self, created_at: DateTime<Utc>) -> Result<MatchMap> {
        let unmatched_articles = self
            .unmatched_articles()
            .into_iter()
            .map(|a| UnmatchedArticle { article_id: a.article_id.clone(), title: a.title.clone() })
            .collect();

        let mut mappings = Vec::new();
        let mut unmatched_clauses = Vec::new();
        let mut unresolved_clauses = Vec::new();
        for c in self.clauses {
            if let Some((reason, candidate_article_ids)) = c.unresolved {
                unresolved_clauses.push(UnresolvedClause {
                    clause_id: c.clause_id,
                    clause_number: c.clause_number,
                    reason,
                    candidate_article_ids,
                });
            } else if c.matched.is_empty() {
                unmatched_clauses.push(UnmatchedClause {
                    clause_id: c.clause_id,
                    clause_number: c.clause_number,
                    is_special: c.is_special,
                });
            } else {
                mappings.push(MappingEntry {
                    clause_id: c.clause_id,
                    clause_number: c.clause_number,
                    matched_articles: c.matched,
                });
            }
        }

        let mut map = MatchMap {
            contract_id: self.contract_id,
            contract_type: self.contract_type,
            mappings,
            unmatched_articles,
            unmatched_clauses,
            unresolved_clauses,
            created_at,
            version: String::new(),
        };
        map.version = compute_version(&map)?;
        Ok(map)
    }
}

#[derive(Serialize)]
struct VersionPayload<'m> {
    contract_id: &'m str,
    contract_type: &'m str,
    mappings: &'m [MappingEntry],
    unmatched_articles: &'m [UnmatchedArticle],
    unmatched_clauses: &'m [UnmatchedClause],
    unresolved_clauses: &'m [UnresolvedClause],
}

/// `v1-` plus 16 hex digits of blake3 over everything except `created_at`
/// and `version` itself.
pub fn compute_version(map: &MatchMap) -> Result<String> {
    let payload = VersionPayload {
        contract_id: &map.contract_id,
        contract_type: &map.contract_type,
        mappings: &map.mappings,
        unmatched_articles: &map.unmatched_articles,
        unmatched_clauses: &map.unmatched_clauses,
        unresolved_clauses: &map.unresolved_clauses,
    };
    let bytes = serde_json::to_vec(&payload)?;
    let hex = blake3::hash(&bytes).to_hex();
    Ok(format!("v1-{}", &hex.as_str()[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clausematch_core::types::{CandidateArticle, Chunk, Clause, Verdict};

    fn corpus() -> Corpus {
        let chunk = |id: &str, art: &str, i| Chunk {
            chunk_id: id.into(),
            article_id: art.into(),
            title: format!("title {art}"),
            body_text: "x".into(),
            order_index: i,
        };
        Corpus::from_chunks(vec![chunk("a1", "A", 0), chunk("b1", "B", 1), chunk("c1", "C", 2), chunk("d1", "D", 3)])
            .unwrap()
    }

    fn contract() -> ContractDocument {
        let clause = |n: u32| Clause {
            clause_id: format!("clause-{n}"),
            number: n,
            title: String::new(),
            text: String::new(),
            sub_items: Vec::new(),
        };
        ContractDocument { contract_id: "u1".into(), contract_type: "t".into(), clauses: vec![clause(1), clause(2), clause(3)] }
    }

    fn result(n: u32, cands: &[(&str, f64)], accepted: &[&str], status: ClauseStatus) -> ClauseMatchResult {
        ClauseMatchResult {
            clause_id: format!("clause-{n}"),
            clause_number: n,
            candidate_articles: cands
                .iter()
                .map(|(a, s)| CandidateArticle { article_id: (*a).into(), score: Score::new(*s), match_source: MatchSource::MultiQuery })
                .collect(),
            accepted: !accepted.is_empty(),
            confidence: Score::ZERO,
            rationale: String::new(),
            is_special: false,
            status,
            verdicts: cands
                .iter()
                .map(|(a, _)| Verdict {
                    article_id: (*a).into(),
                    is_match: accepted.contains(a),
                    confidence: Score::new(0.9),
                    rationale: String::new(),
                })
                .collect(),
        }
    }

    fn results() -> Vec<ClauseMatchResult> {
        vec![
            result(1, &[("A", 0.9)], &["A"], ClauseStatus::Matched),
            result(2, &[("B", 0.6)], &[], ClauseStatus::Unmatched),
            result(3, &[("C", 0.8)], &[], ClauseStatus::Unresolved(UnresolvedReason::Timeout)),
        ]
    }

    #[test]
    fn unresolved_candidates_are_not_gaps() {
        let corpus = corpus();
        let contract = contract();
        let results = results();
        let builder = MatchMapBuilder::new(&corpus, &contract, &results, 0.5);
        let ids: Vec<&str> = builder.unmatched_articles().iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(ids, ["B", "D"]);
    }

    #[test]
    fn recovered_article_leaves_unmatched_sets() {
        let corpus = corpus();
        let contract = contract();
        let results = results();
        let mut builder = MatchMapBuilder::new(&corpus, &contract, &results, 0.5);
        assert!(builder.record_recovered("clause-2", "D", Score::new(0.55)));
        assert!(!builder.record_recovered("clause-3", "B", Score::new(0.55)), "unresolved clause");
        assert!(!builder.record_recovered("clause-2", "D", Score::new(0.55)), "duplicate");

        let map = builder.build(Utc::now()).unwrap();
        assert_eq!(map.mappings.len(), 2);
        assert_eq!(map.mappings[1].matched_articles[0].match_source, MatchSource::Recheck);
        assert!(map.unmatched_clauses.is_empty());
        assert_eq!(map.unresolved_clauses.len(), 1);
        let unmatched: Vec<&str> = map.unmatched_articles.iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(unmatched, ["B"]);
        for m in &map.mappings {
            for a in &m.matched_articles {
                assert!(!unmatched.contains(&a.article_id.as_str()));
            }
        }
    }

    #[test]
    fn version_ignores_created_at() {
        let corpus = corpus();
        let contract = contract();
        let results = results();
        let a = MatchMapBuilder::new(&corpus, &contract, &results, 0.5).build(Utc::now()).unwrap();
        let b = MatchMapBuilder::new(&corpus, &contract, &results, 0.5)
            .build(Utc::now() + chrono::Duration::seconds(5))
            .unwrap();
        assert_eq!(a.version, b.version);
        assert!(a.version.starts_with("v1-") && a.version.len() == 19);

        let c = MatchMapBuilder::new(&corpus, &contract, &results, 0.95).build(Utc::now()).unwrap();
        assert_ne!(a.version, c.version);
    }
}
