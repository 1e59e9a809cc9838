use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clausematch_core::config::{EngineSettings, SpecialRouting};
use clausematch_core::corpus::Corpus;
use clausematch_core::error::{Error, Result};
use clausematch_core::traits::{Adjudicator, FieldQuery, ScoredIndex};
use clausematch_core::types::{
    AdjudicationRequest, Channel, Chunk, Clause, ClauseStatus, ContractDocument, Field, MatchSource, SearchHit,
    UnresolvedReason, Verdict,
};
use clausematch_core::Score;
use clausematch_embed::HashingEmbedder;
use clausematch_hybrid::{CorpusIndex, MatchEngine, ScoreAdjudicator};

/// Body queries containing a key return the scripted hits; titles are never
/// matched.
struct ScriptedIndex {
    channel: Channel,
    hits: Vec<(&'static str, Vec<(&'static str, f64)>)>,
}

impl ScoredIndex for ScriptedIndex {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn search(&self, query: &FieldQuery<'_>, field: Field, top_k: usize) -> Result<Vec<SearchHit>> {
        if query.text.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }
        if field == Field::Title {
            return Ok(Vec::new());
        }
        let mut out: Vec<SearchHit> = self
            .hits
            .iter()
            .filter(|(key, _)| query.text.contains(key))
            .flat_map(|(_, hits)| hits.iter())
            .map(|(id, s)| SearchHit { chunk_id: (*id).into(), score: Score::new(*s), channel: self.channel })
            .collect();
        out.truncate(top_k);
        Ok(out)
    }
}

fn chunk(id: &str, article: &str, title: &str, body: &str, order: usize) -> Chunk {
    Chunk { chunk_id: id.into(), article_id: article.into(), title: title.into(), body_text: body.into(), order_index: order }
}

fn script() -> Vec<(&'static str, Vec<(&'static str, f64)>)> {
    vec![
        ("alpha", vec![("x1", 0.95)]),
        ("bravo", vec![("x2", 0.80)]),
        ("charlie", vec![("x1", 0.90)]),
        ("delta", vec![("x2", 0.85)]),
        ("echo", vec![("y1", 0.99)]),
        ("foxtrot", vec![("x1", 0.4)]),
        ("hotel", vec![("x2", 0.5)]),
    ]
}

fn standard_index(sparse_empty: bool) -> Arc<CorpusIndex> {
    let corpus = Corpus::from_chunks(vec![
        chunk("x1", "X", "", "purpose of processing", 0),
        chunk("x2", "X", "", "scope of processing", 1),
        chunk("y1", "Y", "", "retention period", 2),
        chunk("z1", "Z", "", "governing law and jurisdiction", 3),
    ])
    .unwrap();
    let dense = Arc::new(ScriptedIndex { channel: Channel::Dense, hits: script() });
    let sparse = Arc::new(ScriptedIndex { channel: Channel::Sparse, hits: if sparse_empty { Vec::new() } else { script() } });
    Arc::new(CorpusIndex::new("standard", corpus, dense, sparse, Arc::new(HashingEmbedder::new(1024))))
}

fn clause(n: u32, items: &[&str]) -> Clause {
    Clause {
        clause_id: format!("clause-{n}"),
        number: n,
        title: String::new(),
        text: items.join(" "),
        sub_items: items.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn contract(clauses: Vec<Clause>) -> ContractDocument {
    ContractDocument { contract_id: "user-1".into(), contract_type: "privacy".into(), clauses }
}

fn settings() -> EngineSettings {
    let mut s = EngineSettings::default();
    s.embedding.dim = 1024;
    s.matcher.recheck_enabled = false;
    s.adjudication.initial_backoff_ms = 1;
    s.adjudication.max_backoff_ms = 4;
    s
}

fn score_adjudicator() -> Arc<dyn Adjudicator> {
    Arc::new(ScoreAdjudicator::new(0.5))
}

/// Counts calls; fails the first `failures` calls for each clause.
struct ScriptedAdjudicator {
    calls: AtomicUsize,
    failures: usize,
    transient: bool,
    delay: Option<Duration>,
    seen: Mutex<HashMap<String, usize>>,
}

impl ScriptedAdjudicator {
    fn new(failures: usize, transient: bool, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), failures, transient, delay, seen: Mutex::new(HashMap::new()) })
    }
}

#[async_trait]
impl Adjudicator for ScriptedAdjudicator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn adjudicate(&self, request: &AdjudicationRequest) -> Result<Vec<Verdict>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let attempt = {
            let mut seen = self.seen.lock().unwrap();
            let n = seen.entry(request.clause_id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        if attempt <= self.failures {
            return Err(Error::adjudication("upstream 503", self.transient));
        }
        Ok(request
            .candidates
            .iter()
            .map(|c| Verdict { article_id: c.article_id.clone(), is_match: true, confidence: Score::new(0.9), rationale: "same obligation".into() })
            .collect())
    }
}

#[tokio::test]
async fn supporting_count_outranks_single_high_score() {
    let engine = MatchEngine::new(settings(), standard_index(false), score_adjudicator()).unwrap();
    let doc = contract(vec![clause(1, &["alpha terms", "bravo terms", "charlie terms", "delta terms", "echo terms"])]);
    let run = engine.match_contract(&doc).await.unwrap();

    let r = &run.results[0];
    let ids: Vec<&str> = r.candidate_articles.iter().map(|c| c.article_id.as_str()).collect();
    assert_eq!(ids, ["X", "Y"]);
    assert!((r.candidate_articles[0].score.value() - 0.875).abs() < 1e-9);
    assert!(!r.is_special);
    assert_eq!(r.status, ClauseStatus::Matched);
}

#[tokio::test]
async fn special_flag_uses_best_score_not_top_ranked() {
    let engine = MatchEngine::new(settings(), standard_index(false), score_adjudicator()).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["foxtrot terms", "hotel terms", "echo terms"])])).await.unwrap();

    let r = &run.results[0];
    let ids: Vec<&str> = r.candidate_articles.iter().map(|c| c.article_id.as_str()).collect();
    assert_eq!(ids, ["X", "Y"]);
    assert!((r.candidate_articles[0].score.value() - 0.45).abs() < 1e-9);
    assert!(!r.is_special);
}

#[tokio::test]
async fn special_clause_is_still_adjudicated_by_default() {
    let adjudicator = ScriptedAdjudicator::new(0, true, None);
    let engine = MatchEngine::new(settings(), standard_index(false), adjudicator.clone()).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["foxtrot terms"])])).await.unwrap();

    let r = &run.results[0];
    assert!(r.is_special);
    assert!((r.candidate_articles[0].score.value() - 0.4).abs() < 1e-9);
    assert_eq!(adjudicator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(r.status, ClauseStatus::Matched);
}

#[tokio::test]
async fn special_clause_routed_as_novel_content() {
    let mut s = settings();
    s.matcher.special_routing = SpecialRouting::NovelContent;
    let adjudicator = ScriptedAdjudicator::new(0, true, None);
    let engine = MatchEngine::new(s, standard_index(false), adjudicator.clone()).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["foxtrot terms"])])).await.unwrap();

    assert_eq!(run.results[0].status, ClauseStatus::Novel);
    assert_eq!(adjudicator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(run.map.unmatched_clauses.len(), 1);
    assert!(run.map.unmatched_clauses[0].is_special);
}

#[tokio::test]
async fn clause_without_candidates_is_unmatched_and_special() {
    let engine = MatchEngine::new(settings(), standard_index(false), score_adjudicator()).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["nothing relevant"])])).await.unwrap();

    let r = &run.results[0];
    assert!(r.candidate_articles.is_empty());
    assert!(r.is_special);
    assert_eq!(r.status, ClauseStatus::Unmatched);
    assert_eq!(run.map.unmatched_articles.len(), 3);
}

#[tokio::test]
async fn empty_sparse_channel_scores_dense_only() {
    let engine = MatchEngine::new(settings(), standard_index(true), score_adjudicator()).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["echo terms"])])).await.unwrap();
    assert!((run.results[0].candidate_articles[0].score.value() - 0.99).abs() < 1e-9);
}

#[tokio::test]
async fn repeated_runs_share_a_version() {
    let engine = MatchEngine::new(settings(), standard_index(false), score_adjudicator()).unwrap();
    let doc = contract(vec![clause(1, &["alpha terms", "echo terms"]), clause(2, &["foxtrot terms"])]);
    let a = engine.match_contract(&doc).await.unwrap();
    let b = engine.match_contract(&doc).await.unwrap();
    assert_eq!(a.map.version, b.map.version);
    assert_eq!(a.results, b.results);
}

#[tokio::test]
async fn results_follow_clause_order() {
    let engine = MatchEngine::new(settings(), standard_index(false), score_adjudicator()).unwrap();
    let doc = contract((1..=6).map(|n| clause(n, &["alpha terms"])).collect());
    let run = engine.match_contract(&doc).await.unwrap();
    let numbers: Vec<u32> = run.results.iter().map(|r| r.clause_number).collect();
    assert_eq!(numbers, [1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let adjudicator = ScriptedAdjudicator::new(2, true, None);
    let engine = MatchEngine::new(settings(), standard_index(false), adjudicator.clone()).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["alpha terms"])])).await.unwrap();
    assert_eq!(run.results[0].status, ClauseStatus::Matched);
    assert_eq!(adjudicator.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn permanent_failure_leaves_clause_unresolved() {
    let adjudicator = ScriptedAdjudicator::new(1, false, None);
    let engine = MatchEngine::new(settings(), standard_index(false), adjudicator.clone()).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["alpha terms"])])).await.unwrap();

    assert!(matches!(run.results[0].status, ClauseStatus::Unresolved(UnresolvedReason::Failure(_))));
    assert_eq!(adjudicator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.map.unresolved_clauses.len(), 1);
    assert_eq!(run.map.unresolved_clauses[0].candidate_article_ids, ["X"]);
    assert!(run.map.unmatched_articles.iter().all(|a| a.article_id != "X"));
}

#[tokio::test]
async fn slow_adjudicator_times_out() {
    let mut s = settings();
    s.adjudication.call_timeout_ms = 20;
    s.adjudication.max_attempts = 1;
    let adjudicator = ScriptedAdjudicator::new(0, true, Some(Duration::from_millis(500)));
    let engine = MatchEngine::new(s, standard_index(false), adjudicator).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["alpha terms"])])).await.unwrap();
    assert_eq!(run.results[0].status, ClauseStatus::Unresolved(UnresolvedReason::Timeout));
}

#[tokio::test]
async fn run_deadline_marks_pending_clauses() {
    let mut s = settings();
    s.adjudication.run_deadline_ms = Some(0);
    let engine = MatchEngine::new(s, standard_index(false), score_adjudicator()).unwrap();
    let run = engine.match_contract(&contract(vec![clause(1, &["alpha terms"]), clause(2, &["echo terms"])])).await.unwrap();
    for r in &run.results {
        assert_eq!(r.status, ClauseStatus::Unresolved(UnresolvedReason::Deadline));
    }
    assert!(run.map.mappings.is_empty());
}

#[tokio::test]
async fn recheck_recovers_unmatched_article() {
    let mut s = settings();
    s.matcher.recheck_enabled = true;
    let engine = MatchEngine::new(s, standard_index(false), score_adjudicator()).unwrap();
    let doc = contract(vec![
        clause(1, &["alpha terms"]),
        clause(2, &["1. governing law and jurisdiction"]),
    ]);
    let run = engine.match_contract(&doc).await.unwrap();

    assert_eq!(run.results[1].status, ClauseStatus::Unmatched);
    let recovered = run.map.mappings.iter().find(|m| m.clause_id == "clause-2").unwrap();
    assert_eq!(recovered.matched_articles[0].article_id, "Z");
    assert_eq!(recovered.matched_articles[0].match_source, MatchSource::Recheck);

    let unmatched: Vec<&str> = run.map.unmatched_articles.iter().map(|a| a.article_id.as_str()).collect();
    assert!(!unmatched.contains(&"Z"));
    for m in &run.map.mappings {
        for a in &m.matched_articles {
            assert!(!unmatched.contains(&a.article_id.as_str()));
        }
    }
}

#[tokio::test]
async fn blank_clause_ids_are_filled_before_recheck() {
    let mut s = settings();
    s.matcher.recheck_enabled = true;
    let engine = MatchEngine::new(s, standard_index(false), score_adjudicator()).unwrap();
    let mut doc = contract(vec![clause(1, &["alpha terms"]), clause(2, &["governing law and jurisdiction"])]);
    for c in &mut doc.clauses {
        c.clause_id = String::new();
    }
    let run = engine.match_contract(&doc).await.unwrap();

    let ids: Vec<&str> = run.results.iter().map(|r| r.clause_id.as_str()).collect();
    assert_eq!(ids, ["clause-1", "clause-2"]);
    assert!(run.map.mappings.iter().any(|m| m.clause_id == "clause-2"));
}

#[tokio::test]
async fn duplicate_clause_ids_are_rejected() {
    let engine = MatchEngine::new(settings(), standard_index(false), score_adjudicator()).unwrap();
    let mut doc = contract(vec![clause(1, &["alpha terms"]), clause(2, &["echo terms"])]);
    doc.clauses[1].clause_id = "clause-1".into();
    assert!(matches!(engine.match_contract(&doc).await, Err(Error::InvalidConfig(_))));
}

#[test]
fn invalid_weights_rejected_before_any_work() {
    let mut s = settings();
    s.fusion.body_weight = 0.9;
    assert!(matches!(MatchEngine::new(s, standard_index(false), score_adjudicator()), Err(Error::InvalidWeights(_))));
}
