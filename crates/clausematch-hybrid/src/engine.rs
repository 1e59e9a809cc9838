//! Engine facade: retrieval, adjudication, map assembly and recheck for one
//! submitted contract.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rayon::prelude::*;
use tokio::time::Instant;

use clausematch_core::config::{EngineSettings, SpecialRouting};
use clausematch_core::corpus::{normalize_contract, ArticleInfo, Corpus};
use clausematch_core::error::{Error, Result};
use clausematch_core::traits::Adjudicator;
use clausematch_core::types::{
    AdjudicationCandidate, AdjudicationRequest, CandidateArticle, Chunk, Clause, ClauseMatchResult, ClauseStatus,
    ContractDocument, MatchMap, MatchSource, UnresolvedReason, Verdict,
};
use clausematch_core::Score;
use clausematch_vector::EmbeddingCache;

use crate::adjudicate::{is_accepted, reconcile_verdicts, AdjudicationOutcome, AdjudicationRunner};
use crate::match_map::MatchMapBuilder;
use crate::matcher::{ClauseCandidate, MatchOutcome, MultiQueryMatcher, SubQueries};
use crate::registry::CorpusIndex;

/// Everything one run produces. `results` follow contract clause order.
#[derive(Debug, Clone)]
pub struct MatchRun {
    pub results: Vec<ClauseMatchResult>,
    pub map: MatchMap,
}

pub struct MatchEngine {
    settings: EngineSettings,
    matcher: Arc<MultiQueryMatcher>,
    runner: AdjudicationRunner,
    standard: Arc<CorpusIndex>,
}

enum Plan {
    Adjudicate(AdjudicationRequest),
    Decided(ClauseStatus),
}

impl MatchEngine {
    /// Fails with `InvalidWeights`/`InvalidConfig` before any work is done.
    pub fn new(settings: EngineSettings, standard: Arc<CorpusIndex>, adjudicator: Arc<dyn Adjudicator>) -> Result<Self> {
        settings.validate()?;
        let matcher = Arc::new(MultiQueryMatcher::from_settings(&settings)?);
        let runner = AdjudicationRunner::from_settings(adjudicator, &settings.adjudication);
        Ok(Self { settings, matcher, runner, standard })
    }

    /// Blank clause ids become `clause-<number>`; duplicate ids fail with
    /// `InvalidConfig` before retrieval starts.
    pub async fn match_contract(&self, contract: &ContractDocument) -> Result<MatchRun> {
        let mut normalized = contract.clone();
        normalize_contract(&mut normalized)?;
        let contract = &normalized;
        let deadline = self.settings.adjudication.run_deadline_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        tracing::info!(
            contract_id = %contract.contract_id,
            clauses = contract.clauses.len(),
            adjudicator = self.runner.adjudicator_name(),
            "matching contract"
        );

        let outcomes = self.retrieve_all(&contract.clauses).await?;
        let results = self.adjudicate_forward(&contract.clauses, outcomes, deadline).await;

        let min_confidence = self.settings.adjudication.min_confidence;
        let mut builder = MatchMapBuilder::new(self.standard.corpus(), contract, &results, min_confidence);
        if self.settings.matcher.recheck_enabled {
            self.recheck(contract, &mut builder, deadline).await?;
        }
        let map = builder.build(Utc::now())?;
        tracing::info!(
            contract_id = %map.contract_id,
            version = %map.version,
            mapped = map.mappings.len(),
            unmatched_clauses = map.unmatched_clauses.len(),
            unmatched_articles = map.unmatched_articles.len(),
            unresolved = map.unresolved_clauses.len(),
            "match map built"
        );
        Ok(MatchRun { results, map })
    }

    /// Retrieval for every clause on the blocking pool, parallel across clauses.
    async fn retrieve_all(&self, clauses: &[Clause]) -> Result<Vec<MatchOutcome>> {
        let matcher = Arc::clone(&self.matcher);
        let index = Arc::clone(&self.standard);
        let clauses = clauses.to_vec();
        let threshold = self.settings.matcher.special_threshold;
        tokio::task::spawn_blocking(move || {
            clauses.par_iter().map(|c| matcher.match_clause(&index, c, threshold)).collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::Operation(format!("retrieval task failed: {e}")))?
    }

    async fn adjudicate_forward(
        &self,
        clauses: &[Clause],
        outcomes: Vec<MatchOutcome>,
        deadline: Option<Instant>,
    ) -> Vec<ClauseMatchResult> {
        let max_candidates = self.settings.adjudication.max_candidates;
        let corpus = self.standard.corpus();

        let plans: Vec<Plan> = clauses
            .iter()
            .zip(&outcomes)
            .map(|(clause, outcome)| {
                if outcome.candidates.is_empty() {
                    Plan::Decided(ClauseStatus::Unmatched)
                } else if outcome.is_special && self.settings.matcher.special_routing == SpecialRouting::NovelContent {
                    Plan::Decided(ClauseStatus::Novel)
                } else {
                    let candidates = outcome
                        .candidates
                        .iter()
                        .take(max_candidates)
                        .map(|c| to_adjudication_candidate(c, corpus))
                        .collect();
                    Plan::Adjudicate(request_for(clause, candidates))
                }
            })
            .collect();

        let requests: Vec<AdjudicationRequest> = plans
            .iter()
            .filter_map(|p| match p {
                Plan::Adjudicate(r) => Some(r.clone()),
                Plan::Decided(_) => None,
            })
            .collect();
        let mut verdict_iter = self.runner.run(requests, deadline).await.into_iter();

        clauses
            .iter()
            .zip(outcomes)
            .zip(plans)
            .map(|((clause, outcome), plan)| {
                let candidate_articles = outcome
                    .candidates
                    .iter()
                    .map(|c| CandidateArticle { article_id: c.article_id.clone(), score: c.score, match_source: MatchSource::MultiQuery })
                    .collect();
                let (status, verdicts) = match plan {
                    Plan::Decided(status) => (status, Vec::new()),
                    Plan::Adjudicate(request) => match verdict_iter.next() {
                        Some(AdjudicationOutcome::Verdicts(raw)) => {
                            let verdicts = reconcile_verdicts(&request, raw);
                            let status = if verdicts.iter().any(|v| is_accepted(v, self.settings.adjudication.min_confidence)) {
                                ClauseStatus::Matched
                            } else {
                                ClauseStatus::Unmatched
                            };
                            (status, verdicts)
                        }
                        Some(AdjudicationOutcome::Unresolved(reason)) => (ClauseStatus::Unresolved(reason), Vec::new()),
                        None => (ClauseStatus::Unresolved(UnresolvedReason::Failure("missing outcome".into())), Vec::new()),
                    },
                };
                self.result_for(clause, outcome.is_special, candidate_articles, status, verdicts)
            })
            .collect()
    }

    fn result_for(
        &self,
        clause: &Clause,
        is_special: bool,
        candidate_articles: Vec<CandidateArticle>,
        status: ClauseStatus,
        verdicts: Vec<Verdict>,
    ) -> ClauseMatchResult {
        let min_confidence = self.settings.adjudication.min_confidence;
        let best_accepted = verdicts
            .iter()
            .filter(|v| is_accepted(v, min_confidence))
            .max_by(|a, b| a.confidence.value().total_cmp(&b.confidence.value()));
        let lead = best_accepted.or_else(|| verdicts.iter().max_by(|a, b| a.confidence.value().total_cmp(&b.confidence.value())));
        let result = ClauseMatchResult {
            clause_id: clause.clause_id.clone(),
            clause_number: clause.number,
            candidate_articles,
            accepted: best_accepted.is_some(),
            confidence: lead.map_or(Score::ZERO, |v| v.confidence),
            rationale: lead.map(|v| v.rationale.clone()).unwrap_or_default(),
            is_special,
            status,
            verdicts,
        };
        tracing::debug!(
            clause_id = %result.clause_id,
            status = ?result.status,
            accepted = result.accepted,
            is_special = result.is_special,
            "clause decided"
        );
        result
    }

    /// Re-examines every unmatched standard article against the whole
    /// submitted contract, with the lower recheck threshold.
    async fn recheck(&self, contract: &ContractDocument, builder: &mut MatchMapBuilder<'_>, deadline: Option<Instant>) -> Result<()> {
        let unmatched: Vec<ArticleInfo> = builder.unmatched_articles().into_iter().cloned().collect();
        if unmatched.is_empty() || contract.clauses.is_empty() {
            return Ok(());
        }
        let m = &self.settings.matcher;
        let (threshold, limit) = (m.recheck_threshold, m.recheck_candidates);
        let normalization = self.settings.retrieval.sparse_normalization;

        let contract_chunks = contract_chunks(&self.matcher, &contract.clauses);
        let matcher = Arc::clone(&self.matcher);
        let standard = Arc::clone(&self.standard);
        let index_name = format!("contract:{}", contract.contract_id);
        let articles = unmatched.clone();
        let found: Vec<(ArticleInfo, Vec<ClauseCandidate>)> = tokio::task::spawn_blocking(move || -> Result<_> {
            let corpus = Corpus::from_chunks(contract_chunks)?;
            let mut cache = EmbeddingCache::in_memory();
            let user_index =
                CorpusIndex::build_in_memory(index_name, corpus, Arc::clone(standard.embedder()), normalization, &mut cache)?;
            articles
                .into_par_iter()
                .map(|article| {
                    let queries = article_queries(&matcher, standard.corpus(), &article);
                    let outcome = matcher.match_queries(&user_index, &queries, threshold)?;
                    let hits: Vec<ClauseCandidate> =
                        outcome.candidates.into_iter().filter(|c| c.score.value() >= threshold).take(limit).collect();
                    Ok((article, hits))
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::Operation(format!("recheck task failed: {e}")))??;

        let corpus = self.standard.corpus();
        let mut pairs: Vec<(String, String, Score)> = Vec::new();
        let mut requests: Vec<AdjudicationRequest> = Vec::new();
        for (article, hits) in &found {
            for hit in hits {
                let clause_id = &hit.article_id;
                if builder.is_unresolved(clause_id) {
                    continue;
                }
                let Some(clause) = contract.clauses.iter().find(|c| &c.clause_id == clause_id) else {
                    continue;
                };
                let candidate = AdjudicationCandidate {
                    article_id: article.article_id.clone(),
                    title: article.title.clone(),
                    score: hit.score,
                    supporting_sub_items: hit.supporting_sub_items,
                    excerpts: corpus.article_chunks(&article.article_id).iter().map(|c| c.body_text.clone()).collect(),
                };
                pairs.push((clause.clause_id.clone(), article.article_id.clone(), hit.score));
                requests.push(request_for(clause, vec![candidate]));
            }
        }
        tracing::info!(unmatched = unmatched.len(), candidates = requests.len(), "recheck candidates found");
        if requests.is_empty() {
            return Ok(());
        }

        let outcomes = self.runner.run(requests.clone(), deadline).await;
        let min_confidence = self.settings.adjudication.min_confidence;
        for (((clause_id, article_id, score), request), outcome) in pairs.into_iter().zip(&requests).zip(outcomes) {
            match outcome {
                AdjudicationOutcome::Verdicts(raw) => {
                    let accepted = reconcile_verdicts(request, raw).iter().any(|v| is_accepted(v, min_confidence));
                    if accepted {
                        builder.record_recovered(&clause_id, &article_id, score);
                    }
                }
                AdjudicationOutcome::Unresolved(reason) => {
                    tracing::warn!(clause_id = %clause_id, article_id = %article_id, ?reason, "recheck adjudication unresolved");
                }
            }
        }
        Ok(())
    }
}

fn request_for(clause: &Clause, candidates: Vec<AdjudicationCandidate>) -> AdjudicationRequest {
    AdjudicationRequest {
        clause_id: clause.clause_id.clone(),
        clause_number: clause.number,
        clause_text: clause.full_text(),
        candidates,
    }
}

fn to_adjudication_candidate(candidate: &ClauseCandidate, corpus: &Corpus) -> AdjudicationCandidate {
    AdjudicationCandidate {
        article_id: candidate.article_id.clone(),
        title: candidate.title.clone(),
        score: candidate.score,
        supporting_sub_items: candidate.supporting_sub_items,
        excerpts: candidate
            .matched_chunks
            .iter()
            .filter_map(|c| corpus.chunk(&c.chunk_id))
            .map(|c| c.body_text.clone())
            .collect(),
    }
}

/// The submitted contract as a corpus: one chunk per normalized sub-item,
/// with the clause id standing in for the article id.
fn contract_chunks(matcher: &MultiQueryMatcher, clauses: &[Clause]) -> Vec<Chunk> {
    let mut order = 0usize;
    let mut chunks = Vec::new();
    for clause in clauses {
        for (idx, item) in matcher.sub_queries(clause).items.into_iter().enumerate() {
            chunks.push(Chunk {
                chunk_id: format!("{}#{}", clause.clause_id, idx),
                article_id: clause.clause_id.clone(),
                title: clause.title.trim().to_string(),
                body_text: item,
                order_index: order,
            });
            order += 1;
        }
    }
    chunks
}

fn article_queries(matcher: &MultiQueryMatcher, corpus: &Corpus, article: &ArticleInfo) -> SubQueries {
    let items = corpus
        .article_chunks(&article.article_id)
        .iter()
        .filter_map(|c| matcher.normalizer().normalize(&c.body_text))
        .collect();
    SubQueries { title: article.title.clone(), items }
}
