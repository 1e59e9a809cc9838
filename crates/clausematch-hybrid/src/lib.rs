//! clausematch-hybrid
//!
//! Field-aware hybrid retrieval over a standard-contract corpus, multi-query
//! clause matching, asynchronous adjudication and match-map assembly.
pub mod adjudicate;
pub mod aggregate;
pub mod engine;
pub mod fusion;
pub mod match_map;
pub mod matcher;
pub mod normalize;
pub mod registry;
pub mod retriever;
pub mod retry;
pub mod scored_index;

pub use adjudicate::{AdjudicationOutcome, AdjudicationRunner, ScoreAdjudicator};
pub use aggregate::{ArticleAggregator, ReductionPolicy};
pub use engine::{MatchEngine, MatchRun};
pub use matcher::{ClauseCandidate, MatchOutcome, MultiQueryMatcher, SubQueries};
pub use registry::{CorpusIndex, IndexRegistry};
pub use retriever::{HybridRetriever, QueryVectors};
