//! Embedding providers: a deterministic hashing embedder for offline runs and
//! tests, and an OpenAI-compatible HTTP client.
use std::sync::Arc;

use anyhow::Result;
use clausematch_core::config::{EmbeddingProvider, EmbeddingSettings};
use clausematch_core::traits::Embedder;

pub mod hashing;
pub mod http;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;

/// L2-normalizes `v` in place. Zero vectors stay zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-6 {
        for x in v.iter_mut() { *x /= norm; }
    }
}

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if use_fake_embeddings() || settings.provider == EmbeddingProvider::Hashing {
        tracing::info!(dim = settings.dim, "using hashing embedder");
        return Ok(Arc::new(HashingEmbedder::new(settings.dim)));
    }
    tracing::info!(model = %settings.model, base_url = %settings.base_url, "using HTTP embedder");
    Ok(Arc::new(HttpEmbedder::from_settings(settings)?))
}
