use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`Config::load`] but looks for the TOML files under `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            other => tracing::debug!(env = other, "no environment-specific config file for RUST_ENV"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Typed engine settings, validated.
    pub fn settings(&self) -> anyhow::Result<EngineSettings> {
        let settings: EngineSettings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read engine settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

const WEIGHT_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub fusion: FusionSettings,
    pub retrieval: RetrievalSettings,
    pub aggregation: AggregationSettings,
    pub matcher: MatcherSettings,
    pub adjudication: AdjudicationSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub data: DataSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub body_weight: f64,
    pub title_weight: f64,
    pub dense_weight: f64,
    pub sparse_weight: f64,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self { body_weight: 0.7, title_weight: 0.3, dense_weight: 0.85, sparse_weight: 0.15 }
    }
}

/// How raw BM25 scores are mapped into `[0, 1]` per result list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseNormalization {
    /// `(s - min) / (max - min)`; every hit gets 1.0 when all scores are equal.
    #[default]
    MinMax,
    /// `s / max`.
    MaxRatio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub per_field_top_k: usize,
    pub fused_top_k: usize,
    pub sparse_normalization: SparseNormalization,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { per_field_top_k: 50, fused_top_k: 50, sparse_normalization: SparseNormalization::MinMax }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Top1,
    WeightedPool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    pub policy: PolicyKind,
    pub pool_weights: Vec<f64>,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self { policy: PolicyKind::Top1, pool_weights: vec![0.5, 0.3, 0.2] }
    }
}

/// What happens to a clause whose best candidate is below the special threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialRouting {
    /// Still adjudicated, as a low-confidence candidate list.
    #[default]
    Adjudicate,
    /// Skips adjudication; recorded as novel content.
    NovelContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSettings {
    pub special_threshold: f64,
    pub recheck_threshold: f64,
    pub recheck_candidates: usize,
    pub recheck_enabled: bool,
    pub special_routing: SpecialRouting,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            special_threshold: 0.7,
            recheck_threshold: 0.5,
            recheck_candidates: 3,
            recheck_enabled: true,
            special_routing: SpecialRouting::Adjudicate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationSettings {
    pub max_candidates: usize,
    pub min_confidence: f64,
    pub concurrency: usize,
    pub call_timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Whole-run budget; `None` disables the deadline.
    pub run_deadline_ms: Option<u64>,
}

impl Default for AdjudicationSettings {
    fn default() -> Self {
        Self {
            max_candidates: 5,
            min_confidence: 0.5,
            concurrency: 4,
            call_timeout_ms: 30_000,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            run_deadline_ms: Some(600_000),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    #[default]
    Hashing,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub dim: usize,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub batch_size: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dim: 1024,
            model: "text-embedding-3-large".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 64,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_excerpt_chars: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.1,
            max_excerpt_chars: 800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub chunks_path: String,
    pub index_dir: String,
    pub cache_path: String,
    pub output_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            chunks_path: "data/chunks.json".to_string(),
            index_dir: "data/indexes".to_string(),
            cache_path: "data/embedding_cache.json".to_string(),
            output_dir: "data/match_maps".to_string(),
        }
    }
}

impl DataSettings {
    /// Makes relative data paths relative to `base` (the config directory)
    /// instead of the working directory.
    pub fn anchor_to(&mut self, base: &Path) {
        for path in [&mut self.chunks_path, &mut self.index_dir, &mut self.cache_path, &mut self.output_dir] {
            *path = resolve_with_base(base, path.as_str()).to_string_lossy().into_owned();
        }
    }
}

impl EngineSettings {
    /// Startup-time checks. Weight problems are `InvalidWeights`, everything
    /// else is `InvalidConfig`.
    pub fn validate(&self) -> Result<()> {
        let f = &self.fusion;
        check_pair("body/title", f.body_weight, f.title_weight)?;
        check_pair("dense/sparse", f.dense_weight, f.sparse_weight)?;

        if self.aggregation.policy == PolicyKind::WeightedPool {
            check_pool_weights(&self.aggregation.pool_weights)?;
        }

        let m = &self.matcher;
        check_unit("matcher.special_threshold", m.special_threshold)?;
        check_unit("matcher.recheck_threshold", m.recheck_threshold)?;
        check_unit("adjudication.min_confidence", self.adjudication.min_confidence)?;

        let positive = [
            ("retrieval.per_field_top_k", self.retrieval.per_field_top_k),
            ("retrieval.fused_top_k", self.retrieval.fused_top_k),
            ("adjudication.max_candidates", self.adjudication.max_candidates),
            ("adjudication.concurrency", self.adjudication.concurrency),
            ("embedding.dim", self.embedding.dim),
            ("embedding.batch_size", self.embedding.batch_size),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{key} must be positive")));
            }
        }
        if self.adjudication.max_attempts == 0 {
            return Err(Error::InvalidConfig("adjudication.max_attempts must be positive".into()));
        }
        if self.adjudication.call_timeout_ms == 0 {
            return Err(Error::InvalidConfig("adjudication.call_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Checks a two-way weight split: non-negative, finite, summing to 1.
pub fn check_pair(name: &str, a: f64, b: f64) -> Result<()> {
    if !a.is_finite() || !b.is_finite() || a < 0.0 || b < 0.0 {
        return Err(Error::InvalidWeights(format!("{name} weights must be finite and non-negative, got {a}/{b}")));
    }
    if (a + b - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(Error::InvalidWeights(format!("{name} weights must sum to 1, got {}", a + b)));
    }
    Ok(())
}

/// Pool weights must be positive and strictly decreasing.
pub fn check_pool_weights(weights: &[f64]) -> Result<()> {
    if weights.is_empty() {
        return Err(Error::InvalidWeights("pool weights must not be empty".into()));
    }
    if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
        return Err(Error::InvalidWeights(format!("pool weights must be positive, got {weights:?}")));
    }
    if weights.windows(2).any(|w| w[1] >= w[0]) {
        return Err(Error::InvalidWeights(format!("pool weights must be strictly decreasing, got {weights:?}")));
    }
    Ok(())
}

fn check_unit(key: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidConfig(format!("{key} must be in [0, 1], got {value}")));
    }
    Ok(())
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
