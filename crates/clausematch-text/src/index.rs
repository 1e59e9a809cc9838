use std::fmt::Display;
use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::query::BooleanQuery;
use tantivy::schema::{Field as TantivyField, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use clausematch_core::error::{Error, Result};
use clausematch_core::traits::SparseIndex;
use clausematch_core::types::{Chunk, Field, RawHit};

use crate::tantivy_utils::{build_schema, register_tokenizer, ARTICLE_ID, BODY, CHUNK_ID, TITLE};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Immutable BM25 index over one corpus. Built once, then only searched.
pub struct SparseTextIndex {
	index: Index,
	reader: IndexReader,
	chunk_id_field: TantivyField,
	title_field: TantivyField,
	body_field: TantivyField,
	num_docs: u64,
}

fn op_err(e: impl Display) -> Error {
	Error::Operation(e.to_string())
}

impl SparseTextIndex {
	/// In-memory index, used for the per-contract recheck corpus and in tests.
	pub fn build_in_ram(chunks: &[Chunk]) -> Result<Self> {
		let index = Index::create_in_ram(build_schema());
		register_tokenizer(&index);
		Self::write_chunks(&index, chunks)?;
		Self::from_index(index)
	}

	/// On-disk index. Any existing index in `index_dir` is replaced.
	pub fn build_in_dir(index_dir: &Path, chunks: &[Chunk]) -> Result<Self> {
		if index_dir.exists() { std::fs::remove_dir_all(index_dir)?; }
		std::fs::create_dir_all(index_dir)?;
		let index = Index::create_in_dir(index_dir, build_schema()).map_err(op_err)?;
		register_tokenizer(&index);
		Self::write_chunks(&index, chunks)?;
		Self::from_index(index)
	}

	pub fn open_in_dir(index_dir: &Path) -> Result<Self> {
		if !index_dir.exists() {
			return Err(Error::IndexUnavailable(format!("no sparse index at {}", index_dir.display())));
		}
		let index = Index::open_in_dir(index_dir)
			.map_err(|e| Error::IndexUnavailable(format!("{}: {}", index_dir.display(), e)))?;
		register_tokenizer(&index);
		Self::from_index(index)
	}

	fn write_chunks(index: &Index, chunks: &[Chunk]) -> Result<()> {
		let schema = index.schema();
		let chunk_id = schema.get_field(CHUNK_ID).map_err(op_err)?;
		let article_id = schema.get_field(ARTICLE_ID).map_err(op_err)?;
		let title = schema.get_field(TITLE).map_err(op_err)?;
		let body = schema.get_field(BODY).map_err(op_err)?;

		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(op_err)?;
		for c in chunks {
			writer
				.add_document(doc!(
					chunk_id => c.chunk_id.clone(),
					article_id => c.article_id.clone(),
					title => c.title.clone(),
					body => c.body_text.clone(),
				))
				.map_err(op_err)?;
		}
		writer.commit().map_err(op_err)?;
		tracing::debug!(chunks = chunks.len(), "sparse index committed");
		Ok(())
	}

	fn from_index(index: Index) -> Result<Self> {
		let schema = index.schema();
		let chunk_id_field = schema.get_field(CHUNK_ID).map_err(op_err)?;
		let title_field = schema.get_field(TITLE).map_err(op_err)?;
		let body_field = schema.get_field(BODY).map_err(op_err)?;
		let reader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(op_err)?;
		let num_docs = reader.searcher().num_docs();
		Ok(Self { index, reader, chunk_id_field, title_field, body_field, num_docs })
	}

	pub fn num_docs(&self) -> u64 {
		self.num_docs
	}

	fn field(&self, field: Field) -> TantivyField {
		match field {
			Field::Body => self.body_field,
			Field::Title => self.title_field,
		}
	}

	/// Runs `text` through the field's analyzer. Duplicate terms are dropped so a
	/// repeated word does not weigh twice.
	pub fn query_terms(&self, text: &str, field: Field) -> Result<Vec<Term>> {
		let tantivy_field = self.field(field);
		let mut analyzer = self.index.tokenizer_for_field(tantivy_field).map_err(op_err)?;
		let mut stream = analyzer.token_stream(text);
		let mut terms: Vec<Term> = Vec::new();
		while stream.advance() {
			let term = Term::from_field_text(tantivy_field, &stream.token().text);
			if !terms.contains(&term) { terms.push(term); }
		}
		Ok(terms)
	}
}

impl SparseIndex for SparseTextIndex {
	fn search(&self, query: &str, field: Field, k: usize) -> Result<Vec<RawHit>> {
		let terms = self.query_terms(query, field)?;
		if terms.is_empty() { return Err(Error::EmptyQuery); }
		if k == 0 { return Ok(Vec::new()); }

		let q = BooleanQuery::new_multiterms_query(terms);
		let searcher = self.reader.searcher();
		// TopDocs breaks ties by doc address; widen the window until every doc
		// tied with the k-th score is in it, then cut by chunk_id.
		let mut limit = k.saturating_add(1);
		let top_docs = loop {
			let top_docs = searcher.search(&q, &TopDocs::with_limit(limit)).map_err(op_err)?;
			let boundary_tied = top_docs.len() == limit && top_docs[limit - 1].0 >= top_docs[k - 1].0;
			if !boundary_tied { break top_docs; }
			limit = limit.saturating_mul(2);
		};
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(op_err)?;
			match doc.get_first(self.chunk_id_field).and_then(|v| v.as_str()) {
				Some(id) => hits.push(RawHit { chunk_id: id.to_string(), raw: score }),
				None => tracing::warn!(?addr, "sparse hit without stored chunk_id"),
			}
		}
		hits.sort_by(|a, b| b.raw.total_cmp(&a.raw).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
		hits.truncate(k);
		tracing::trace!(field = field.as_str(), hits = hits.len(), "sparse search");
		Ok(hits)
	}
}
