//! Domain types shared by the retrieval backends and the matching engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::persist::{read_json, write_json_atomic};
use crate::score::Score;

pub type ChunkId = String;
pub type ArticleId = String;
pub type ClauseId = String;

/// Which text field of a chunk a query targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Body,
    Title,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Body => "body",
            Field::Title => "title",
        }
    }
}

/// Indicates which retrieval channel produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Dense,
    Sparse,
}

/// The atomic retrievable unit of a standard contract.
///
/// - `chunk_id`: unique within its corpus
/// - `article_id`: owning article; many chunks per article
/// - `title`: article title, shared by all chunks of the article
/// - `body_text`: the retrievable content
/// - `order_index`: position within the source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub article_id: ArticleId,
    pub title: String,
    pub body_text: String,
    pub order_index: usize,
}

/// One retrieval request derived from a single clause sub-item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub body_query: String,
    pub title_query: String,
}

/// Unnormalized backend output (cosine similarity or BM25).
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub chunk_id: ChunkId,
    pub raw: f32,
}

/// Normalized, ranked output of a `ScoredIndex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub score: Score,
    pub channel: Channel,
}

/// A chunk scored by both channels and both fields.
///
/// `body_score`/`title_score` are the channel-weighted field scores,
/// `dense_score`/`sparse_score` the field-weighted channel scores, and
/// `fused_score` the final hybrid score. `Score` guarantees every value is in
/// `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub chunk_id: ChunkId,
    pub article_id: ArticleId,
    pub body_score: Score,
    pub title_score: Score,
    pub dense_score: Score,
    pub sparse_score: Score,
    pub fused_score: Score,
}

/// One article's representative score for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleCandidate {
    pub article_id: ArticleId,
    pub title: String,
    pub representative_score: Score,
    pub supporting_chunks: Vec<ScoredCandidate>,
}

/// A clause of the submitted contract, already split into sub-items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    #[serde(default)]
    pub clause_id: ClauseId,
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "content")]
    pub sub_items: Vec<String>,
}

impl Clause {
    /// Clause text handed to the adjudicator: heading, body, then sub-items.
    pub fn full_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.sub_items.len() + 2);
        if !self.title.trim().is_empty() {
            lines.push(format!("Article {} ({})", self.number, self.title.trim()));
        }
        if !self.text.trim().is_empty() {
            lines.push(self.text.trim().to_string());
        }
        lines.extend(self.sub_items.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).map(String::from));
        lines.join("\n")
    }
}

/// A submitted contract as produced by the external parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDocument {
    pub contract_id: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(alias = "articles")]
    pub clauses: Vec<Clause>,
}

/// How a clause-level candidate was found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    MultiQuery,
    Recheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateArticle {
    pub article_id: ArticleId,
    pub score: Score,
    pub match_source: MatchSource,
}

/// One candidate as presented to the adjudicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjudicationCandidate {
    pub article_id: ArticleId,
    pub title: String,
    pub score: Score,
    pub supporting_sub_items: usize,
    pub excerpts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjudicationRequest {
    pub clause_id: ClauseId,
    pub clause_number: u32,
    pub clause_text: String,
    pub candidates: Vec<AdjudicationCandidate>,
}

/// The adjudicator's decision for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub article_id: ArticleId,
    pub is_match: bool,
    pub confidence: Score,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnresolvedReason {
    Timeout,
    Failure(String),
    Deadline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseStatus {
    /// At least one candidate accepted.
    Matched,
    /// Adjudicated (or no candidates); nothing accepted.
    Unmatched,
    /// Below the special threshold and routed to novel-content handling.
    Novel,
    /// Adjudication could not complete; not a verdict.
    Unresolved(UnresolvedReason),
}

/// Terminal object for one clause. Re-matching builds a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseMatchResult {
    pub clause_id: ClauseId,
    pub clause_number: u32,
    pub candidate_articles: Vec<CandidateArticle>,
    pub accepted: bool,
    pub confidence: Score,
    pub rationale: String,
    pub is_special: bool,
    pub status: ClauseStatus,
    pub verdicts: Vec<Verdict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedArticle {
    pub article_id: ArticleId,
    pub score: Score,
    pub match_source: MatchSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub clause_id: ClauseId,
    pub clause_number: u32,
    pub matched_articles: Vec<MatchedArticle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedArticle {
    pub article_id: ArticleId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedClause {
    pub clause_id: ClauseId,
    pub clause_number: u32,
    pub is_special: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedClause {
    pub clause_id: ClauseId,
    pub clause_number: u32,
    pub reason: UnresolvedReason,
    pub candidate_article_ids: Vec<ArticleId>,
}

/// The engine's sole persisted artifact. Supersedes any earlier map for the
/// same contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMap {
    pub contract_id: String,
    pub contract_type: String,
    pub mappings: Vec<MappingEntry>,
    pub unmatched_articles: Vec<UnmatchedArticle>,
    pub unmatched_clauses: Vec<UnmatchedClause>,
    pub unresolved_clauses: Vec<UnresolvedClause>,
    pub created_at: DateTime<Utc>,
    pub version: String,
}

impl MatchMap {
    /// Atomically replaces any map already at `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        read_json(path)
    }
}
