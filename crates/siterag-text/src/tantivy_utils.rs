//! Schema and analyzer shared by every Tantivy index siterag opens.
//!
//! One Tantivy document per chunk. Tenant and filter fields are raw
//! (`STRING`) terms so they can be used as mandatory clauses; the full
//! chunk is kept as a stored JSON payload.
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use siterag_core::error::{Error, Result};
use siterag_core::text::STOP_WORDS;

pub const TOKENIZER_NAME: &str = "text_with_stopwords";

#[derive(Debug, Clone, Copy)]
pub struct ChunkFields {
	pub chunk_id: Field,
	pub document_id: Field,
	/// `org_id` + `document_id`; the delete key, so equal document ids in
	/// different organizations never touch each other.
	pub doc_key: Field,
	pub org_id: Field,
	pub domain: Field,
	pub content_type: Field,
	pub crawl_id: Field,
	pub text: Field,
	pub payload: Field,
}

impl ChunkFields {
	pub fn from_schema(schema: &Schema) -> Result<Self> {
		let get = |name: &str| {
			schema.get_field(name).map_err(|e| Error::StoreUnavailable(format!("index schema is missing '{}': {}", name, e)))
		};
		Ok(Self {
			chunk_id: get("chunk_id")?,
			document_id: get("document_id")?,
			doc_key: get("doc_key")?,
			org_id: get("org_id")?,
			domain: get("domain")?,
			content_type: get("content_type")?,
			crawl_id: get("crawl_id")?,
			text: get("text")?,
			payload: get("payload")?,
		})
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("chunk_id", STRING | STORED);
	schema_builder.add_text_field("document_id", STRING | STORED);
	schema_builder.add_text_field("doc_key", STRING);
	schema_builder.add_text_field("org_id", STRING | STORED);
	schema_builder.add_text_field("domain", STRING);
	schema_builder.add_text_field("content_type", STRING);
	schema_builder.add_text_field("crawl_id", STRING);
	let text_field_indexing =
		TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field("text", text_options);
	schema_builder.add_text_field("payload", STORED);
	schema_builder.build()
}

pub fn doc_key(org_id: &str, document_id: &str) -> String {
	format!("{}\u{1f}{}", org_id, document_id)
}

pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}
