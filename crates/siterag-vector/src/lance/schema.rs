use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const DEFAULT_TABLE: &str = "chunks";

pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		// org_id + chunk_id, the merge key
		Field::new("row_key", DataType::Utf8, false),
		Field::new("chunk_id", DataType::Utf8, false),
		Field::new("document_id", DataType::Utf8, false),
		Field::new("org_id", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("start_char", DataType::Int64, false),
		Field::new("end_char", DataType::Int64, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("domain", DataType::Utf8, true),
		Field::new("content_type", DataType::Utf8, true),
		Field::new("crawl_id", DataType::Utf8, true),
		Field::new("metadata", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
