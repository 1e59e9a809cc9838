use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use crate::korean::KoreanParticleFilter;

pub const ANALYZER: &str = "text_with_stopwords";

pub const CHUNK_ID: &str = "chunk_id";
pub const ARTICLE_ID: &str = "article_id";
pub const TITLE: &str = "title";
pub const BODY: &str = "body";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field(CHUNK_ID, STRING | STORED);
	schema_builder.add_text_field(ARTICLE_ID, STRING | STORED);
	let indexing = TextFieldIndexing::default().set_tokenizer(ANALYZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(indexing).set_stored();
	schema_builder.add_text_field(TITLE, text_options.clone());
	schema_builder.add_text_field(BODY, text_options);
	schema_builder.build()
}

// English function words plus standalone Korean determiners and conjunctions.
// Applied after particle stripping, so "다음의" is dropped as "다음".
const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	"및","또는","등","그","이","저","각","위","다음",
];

pub fn analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(KoreanParticleFilter)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build()
}

pub fn register_tokenizer(index: &Index) {
	index.tokenizers().register(ANALYZER, analyzer());
}
