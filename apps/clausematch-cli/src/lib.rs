//! Shared startup for the `clausematch` binaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use clausematch_core::config::{expand_path, Config, EngineSettings};
use clausematch_embed::get_default_embedder;
use clausematch_hybrid::{CorpusIndex, IndexRegistry};

pub const STANDARD_INDEX: &str = "standard";

/// Human-readable logs on stderr; `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

/// With an explicit `config_dir`, relative data paths are read from there.
pub fn load_settings(config_dir: Option<&Path>) -> Result<EngineSettings> {
    let config = match config_dir {
        Some(dir) => Config::load_from(dir),
        None => Config::load(),
    }
    .map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let mut settings = config.settings()?;
    if let Some(dir) = config_dir {
        settings.data.anchor_to(dir);
    }
    Ok(settings)
}

pub fn index_dir(settings: &EngineSettings) -> PathBuf {
    expand_path(&settings.data.index_dir)
}

/// Opens the persisted standard-corpus index and registers it.
pub fn open_registry(settings: &EngineSettings) -> Result<IndexRegistry> {
    let embedder = get_default_embedder(&settings.embedding)?;
    let dir = index_dir(settings);
    let index = CorpusIndex::open(STANDARD_INDEX, &dir, embedder, settings.retrieval.sparse_normalization)
        .with_context(|| format!("opening index at {} (run `clausematch index` first)", dir.display()))?;
    let mut registry = IndexRegistry::new();
    registry.register(index);
    Ok(registry)
}

pub fn standard_index(registry: &IndexRegistry) -> Result<Arc<CorpusIndex>> {
    Ok(registry.get(STANDARD_INDEX)?)
}
