//! Loaded indexes, built once at startup and shared by `Arc`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use clausematch_core::config::SparseNormalization;
use clausematch_core::corpus::Corpus;
use clausematch_core::error::{Error, Result};
use clausematch_core::persist::write_json_atomic;
use clausematch_core::traits::{DenseIndex, Embedder, ScoredIndex};
use clausematch_text::SparseTextIndex;
use clausematch_vector::{EmbeddingCache, FlatVectorIndex};

use crate::scored_index::{DenseScoredIndex, SparseScoredIndex};

const SPARSE_DIR: &str = "sparse";
const DENSE_FILE: &str = "dense.json";
const CHUNKS_FILE: &str = "chunks.json";

/// One corpus with both channels over it.
pub struct CorpusIndex {
    name: String,
    corpus: Corpus,
    dense: Arc<dyn ScoredIndex>,
    sparse: Arc<dyn ScoredIndex>,
    embedder: Arc<dyn Embedder>,
}

impl CorpusIndex {
    pub fn new(
        name: impl Into<String>,
        corpus: Corpus,
        dense: Arc<dyn ScoredIndex>,
        sparse: Arc<dyn ScoredIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self { name: name.into(), corpus, dense, sparse, embedder }
    }

    /// RAM-only indexes; used for the submitted contract during recheck.
    pub fn build_in_memory(
        name: impl Into<String>,
        corpus: Corpus,
        embedder: Arc<dyn Embedder>,
        normalization: SparseNormalization,
        cache: &mut EmbeddingCache,
    ) -> Result<Self> {
        let sparse = SparseTextIndex::build_in_ram(corpus.chunks())?;
        let dense = FlatVectorIndex::build(corpus.chunks(), embedder.as_ref(), cache, false)?;
        Ok(Self::assemble(name.into(), corpus, dense, sparse, embedder, normalization))
    }

    /// Builds both indexes under `dir`, replacing what was there, and keeps a
    /// copy of the chunks so [`CorpusIndex::open`] needs nothing else.
    pub fn build_on_disk(
        name: impl Into<String>,
        corpus: Corpus,
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        normalization: SparseNormalization,
        cache: &mut EmbeddingCache,
        show_progress: bool,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let sparse = SparseTextIndex::build_in_dir(&dir.join(SPARSE_DIR), corpus.chunks())?;
        let dense = FlatVectorIndex::build(corpus.chunks(), embedder.as_ref(), cache, show_progress)?;
        dense.save(&dir.join(DENSE_FILE))?;
        write_json_atomic(&dir.join(CHUNKS_FILE), &corpus.chunks())?;
        tracing::info!(dir = %dir.display(), chunks = corpus.len(), "corpus index written");
        Ok(Self::assemble(name.into(), corpus, dense, sparse, embedder, normalization))
    }

    pub fn open(
        name: impl Into<String>,
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        normalization: SparseNormalization,
    ) -> Result<Self> {
        let chunks_path = dir.join(CHUNKS_FILE);
        if !chunks_path.exists() {
            return Err(Error::IndexUnavailable(format!("no corpus index at {}", dir.display())));
        }
        let corpus = Corpus::load_json(&chunks_path)?;
        let sparse = SparseTextIndex::open_in_dir(&dir.join(SPARSE_DIR))?;
        let dense = FlatVectorIndex::load(&dir.join(DENSE_FILE), embedder.embedder_id())?;
        if dense.dim() != embedder.dim() {
            return Err(Error::IndexUnavailable(format!(
                "dense index at {} has dim {}, embedder produces {}",
                dir.display(),
                dense.dim(),
                embedder.dim()
            )));
        }
        if dense.len() != corpus.len() || sparse.num_docs() != corpus.len() as u64 {
            return Err(Error::IndexUnavailable(format!(
                "index at {} is out of sync: {} chunks, {} dense, {} sparse",
                dir.display(),
                corpus.len(),
                dense.len(),
                sparse.num_docs()
            )));
        }
        Ok(Self::assemble(name.into(), corpus, dense, sparse, embedder, normalization))
    }

    fn assemble(
        name: String,
        corpus: Corpus,
        dense: FlatVectorIndex,
        sparse: SparseTextIndex,
        embedder: Arc<dyn Embedder>,
        normalization: SparseNormalization,
    ) -> Self {
        let dense: Arc<dyn ScoredIndex> = Arc::new(DenseScoredIndex::new(Arc::new(dense), Arc::clone(&embedder)));
        let sparse: Arc<dyn ScoredIndex> = Arc::new(SparseScoredIndex::new(Arc::new(sparse), normalization));
        Self { name, corpus, dense, sparse, embedder }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn dense(&self) -> &dyn ScoredIndex {
        self.dense.as_ref()
    }

    pub fn sparse(&self) -> &dyn ScoredIndex {
        self.sparse.as_ref()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }
}

#[derive(Default)]
pub struct IndexRegistry {
    corpora: BTreeMap<String, Arc<CorpusIndex>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, index: CorpusIndex) -> Arc<CorpusIndex> {
        let index = Arc::new(index);
        tracing::info!(corpus = index.name(), chunks = index.corpus().len(), "corpus registered");
        self.corpora.insert(index.name().to_string(), Arc::clone(&index));
        index
    }

    pub fn get(&self, name: &str) -> Result<Arc<CorpusIndex>> {
        self.corpora
            .get(name)
            .cloned()
            .ok_or_else(|| Error::IndexUnavailable(format!("corpus '{name}' is not loaded")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clausematch_core::types::Chunk;
    use clausematch_embed::HashingEmbedder;
    use tempfile::TempDir;

    /// Claims the hashing embedder's id but a different width.
    struct Narrowed(HashingEmbedder);

    impl Embedder for Narrowed {
        fn embedder_id(&self) -> &str {
            self.0.embedder_id()
        }

        fn dim(&self) -> usize {
            self.0.dim() / 2
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.embed_batch(texts)
        }
    }

    fn corpus() -> Corpus {
        Corpus::from_chunks(vec![Chunk {
            chunk_id: "a1-1".into(),
            article_id: "a1".into(),
            title: "Purpose".into(),
            body_text: "purpose of processing personal data".into(),
            order_index: 0,
        }])
        .expect("corpus")
    }

    #[test]
    fn reopened_index_is_registered_by_name() {
        let tmp = TempDir::new().expect("tmp");
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let mut cache = EmbeddingCache::in_memory();
        CorpusIndex::build_on_disk("standard", corpus(), tmp.path(), Arc::clone(&embedder), SparseNormalization::MinMax, &mut cache, false)
            .expect("build");

        let mut registry = IndexRegistry::new();
        registry.register(CorpusIndex::open("standard", tmp.path(), embedder, SparseNormalization::MinMax).expect("open"));
        assert_eq!(registry.get("standard").expect("registered").corpus().len(), 1);
        assert!(matches!(registry.get("other"), Err(Error::IndexUnavailable(_))));
    }

    #[test]
    fn embedder_width_mismatch_is_unavailable() {
        let tmp = TempDir::new().expect("tmp");
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let mut cache = EmbeddingCache::in_memory();
        CorpusIndex::build_on_disk("standard", corpus(), tmp.path(), embedder, SparseNormalization::MinMax, &mut cache, false)
            .expect("build");

        let narrowed: Arc<dyn Embedder> = Arc::new(Narrowed(HashingEmbedder::new(64)));
        let err = CorpusIndex::open("standard", tmp.path(), narrowed, SparseNormalization::MinMax).err().expect("error");
        assert!(matches!(err, Error::IndexUnavailable(_)));
    }
}
