//! Exact dense index and embedding cache.
pub mod cache;
pub mod flat;

pub use cache::EmbeddingCache;
pub use flat::FlatVectorIndex;
