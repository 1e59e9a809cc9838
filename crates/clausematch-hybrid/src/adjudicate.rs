//! Adjudication runner: bounded concurrency, per-call timeout, retry, and a
//! run-level deadline. Output is in request order regardless of completion
//! order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use clausematch_core::config::AdjudicationSettings;
use clausematch_core::error::{Error, Result};
use clausematch_core::traits::Adjudicator;
use clausematch_core::types::{AdjudicationRequest, UnresolvedReason, Verdict};
use clausematch_core::Score;

use crate::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, PartialEq)]
pub enum AdjudicationOutcome {
    Verdicts(Vec<Verdict>),
    Unresolved(UnresolvedReason),
}

pub struct AdjudicationRunner {
    adjudicator: Arc<dyn Adjudicator>,
    policy: RetryPolicy,
    call_timeout: Duration,
    concurrency: usize,
}

impl AdjudicationRunner {
    pub fn new(adjudicator: Arc<dyn Adjudicator>, policy: RetryPolicy, call_timeout: Duration, concurrency: usize) -> Self {
        Self { adjudicator, policy, call_timeout, concurrency: concurrency.max(1) }
    }

    pub fn from_settings(adjudicator: Arc<dyn Adjudicator>, settings: &AdjudicationSettings) -> Self {
        Self::new(
            adjudicator,
            RetryPolicy::from_settings(settings),
            Duration::from_millis(settings.call_timeout_ms),
            settings.concurrency,
        )
    }

    pub fn adjudicator_name(&self) -> &str {
        self.adjudicator.name()
    }

    /// Adjudicates every request; a request still pending at `deadline` becomes
    /// `Unresolved(Deadline)`.
    pub async fn run(&self, requests: Vec<AdjudicationRequest>, deadline: Option<Instant>) -> Vec<AdjudicationOutcome> {
        let total = requests.len();
        let mut results: Vec<(usize, AdjudicationOutcome)> = stream::iter(requests.into_iter().enumerate())
            .map(|(i, request)| async move { (i, self.run_one(&request, deadline).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);
        let unresolved = results.iter().filter(|(_, o)| matches!(o, AdjudicationOutcome::Unresolved(_))).count();
        tracing::info!(adjudicator = self.adjudicator.name(), total, unresolved, "adjudication batch done");
        results.into_iter().map(|(_, o)| o).collect()
    }

    async fn run_one(&self, request: &AdjudicationRequest, deadline: Option<Instant>) -> AdjudicationOutcome {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::warn!(clause_id = %request.clause_id, "run deadline passed before adjudication");
            return AdjudicationOutcome::Unresolved(UnresolvedReason::Deadline);
        }
        let timeout_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX);
        let call = with_retry("adjudicate", &self.policy, || async move {
            match tokio::time::timeout(self.call_timeout, self.adjudicator.adjudicate(request)).await {
                Ok(result) => result,
                Err(_) => Err(Error::AdjudicationTimeout(timeout_ms)),
            }
        });
        let result = match deadline {
            Some(d) => match tokio::time::timeout_at(d, call).await {
                Ok(r) => r,
                Err(_) => {
                    tracing::warn!(clause_id = %request.clause_id, "run deadline reached during adjudication");
                    return AdjudicationOutcome::Unresolved(UnresolvedReason::Deadline);
                }
            },
            None => call.await,
        };
        match result {
            Ok(verdicts) => AdjudicationOutcome::Verdicts(verdicts),
            Err(Error::AdjudicationTimeout(_)) => {
                tracing::warn!(clause_id = %request.clause_id, "adjudication timed out; clause unresolved");
                AdjudicationOutcome::Unresolved(UnresolvedReason::Timeout)
            }
            Err(e) => {
                tracing::warn!(clause_id = %request.clause_id, error = %e, "adjudication failed; clause unresolved");
                AdjudicationOutcome::Unresolved(UnresolvedReason::Failure(e.to_string()))
            }
        }
    }
}

/// Aligns raw verdicts with the request: one verdict per candidate, in
/// candidate order. Verdicts naming unknown articles are dropped, duplicates
/// keep the first, and candidates without a verdict are rejected at 0.
pub fn reconcile_verdicts(request: &AdjudicationRequest, verdicts: Vec<Verdict>) -> Vec<Verdict> {
    let known: HashSet<&str> = request.candidates.iter().map(|c| c.article_id.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept: Vec<Verdict> = Vec::with_capacity(request.candidates.len());
    for v in verdicts {
        if !known.contains(v.article_id.as_str()) {
            tracing::debug!(clause_id = %request.clause_id, article_id = %v.article_id, "verdict for unknown article dropped");
            continue;
        }
        if seen.insert(v.article_id.clone()) {
            kept.push(v);
        }
    }
    request
        .candidates
        .iter()
        .map(|c| {
            kept.iter().find(|v| v.article_id == c.article_id).cloned().unwrap_or_else(|| Verdict {
                article_id: c.article_id.clone(),
                is_match: false,
                confidence: Score::ZERO,
                rationale: "no verdict returned".to_string(),
            })
        })
        .collect()
}

pub fn is_accepted(verdict: &Verdict, min_confidence: f64) -> bool {
    verdict.is_match && verdict.confidence.value() >= min_confidence
}

/// Offline adjudicator: accepts every candidate whose retrieval score reaches
/// `min_score`, with that score as confidence.
pub struct ScoreAdjudicator {
    min_score: f64,
}

impl ScoreAdjudicator {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }
}

#[async_trait]
impl Adjudicator for ScoreAdjudicator {
    fn name(&self) -> &str {
        "score-threshold"
    }

    async fn adjudicate(&self, request: &AdjudicationRequest) -> Result<Vec<Verdict>> {
        Ok(request
            .candidates
            .iter()
            .map(|c| {
                let is_match = c.score.value() >= self.min_score;
                Verdict {
                    article_id: c.article_id.clone(),
                    is_match,
                    confidence: c.score,
                    rationale: format!("retrieval score {} {} {:.2}", c.score, if is_match { ">=" } else { "<" }, self.min_score),
                }
            })
            .collect())
    }
}
