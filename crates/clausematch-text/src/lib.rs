//! clausematch-text
//!
//! Tantivy-backed keyword index over chunk `title` and `body` fields. Raw
//! BM25 scores come out unnormalized; the hybrid layer maps them into `[0, 1]`.
//! Korean particles are cut before indexing and querying (see [`korean`]).
pub mod index;
pub mod korean;
pub mod tantivy_utils;

pub use index::SparseTextIndex;
