//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use clausematch_core::config::EmbeddingSettings;
use clausematch_core::error::{Error, Result};
use clausematch_core::traits::Embedder;

use crate::l2_normalize;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
    batch_size: usize,
    id: String,
}

impl HttpEmbedder {
    pub fn from_settings(settings: &EmbeddingSettings) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        let api_key = std::env::var(&settings.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %settings.api_key_env, "embedding API key not set; sending unauthenticated requests");
        }
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            dim: settings.dim,
            batch_size: settings.batch_size.max(1),
            id: format!("http-{}-{}", settings.model, settings.dim),
        })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest { model: &self.model, input: texts, dimensions: self.dim };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().map_err(|e| Error::Operation(format!("embedding request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(Error::Operation(format!("embedding API error {}: {}", status.as_u16(), text)));
        }
        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| Error::Operation(format!("invalid embedding response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(Error::Operation(format!(
                "embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        parsed
            .data
            .into_iter()
            .map(|mut d| {
                if d.embedding.len() != self.dim {
                    return Err(Error::Operation(format!(
                        "embedding dim {} does not match configured {}",
                        d.embedding.len(),
                        self.dim
                    )));
                }
                l2_normalize(&mut d.embedding);
                Ok(d.embedding)
            })
            .collect()
    }
}

impl Embedder for HttpEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::EmptyQuery);
        }
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!(batch = batch.len(), model = %self.model, "requesting embeddings");
            out.extend(self.embed_chunk(batch)?);
        }
        Ok(out)
    }
}
