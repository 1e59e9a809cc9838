use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use clausematch_core::error::{Error, Result};
use clausematch_core::traits::Embedder;

use crate::l2_normalize;

/// Bag-of-tokens feature hashing. Texts sharing words get positive cosine
/// similarity; identical texts get 1.0.
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hashing-xxh64-{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if self.dim == 0 {
            return Err(Error::InvalidConfig("hashing embedder needs a positive dimension".into()));
        }
        if text.trim().is_empty() { return Err(Error::EmptyQuery); }
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        l2_normalize(&mut v);
        Ok(v)
    }
}

impl Embedder for HashingEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}
