use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;
use lancedb::{connect, Connection, DistanceType};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use siterag_core::error::{Error, Result};
use siterag_core::traits::{validate_chunk_set, ContentStore};
use siterag_core::types::{Chunk, ContentFilters, Meta, Provenance, RetrievalResult, StoreStats};

use super::schema::build_chunk_schema;

fn unavailable(e: impl std::fmt::Display) -> Error {
	Error::StoreUnavailable(format!("lancedb: {}", e))
}

fn op_err(e: impl std::fmt::Display) -> Error {
	Error::Operation(format!("lancedb: {}", e))
}

fn sql_str(s: &str) -> String {
	format!("'{}'", s.replace('\'', "''"))
}

fn row_key(org_id: &str, chunk_id: &str) -> String {
	format!("{}\u{1f}{}", org_id, chunk_id)
}

fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::MalformedInput(format!("lancedb column '{}' missing", name)))
}

/// Content store over a LanceDB table. Scores are `1 - cosine distance`.
pub struct LanceStore {
	db: Connection,
	table_name: String,
	dim: usize,
}

impl LanceStore {
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let db = connect(uri).execute().await.map_err(unavailable)?;
		let store = Self { db, table_name: table_name.to_string(), dim };
		store.ensure_table().await?;
		info!("Opened LanceDB table '{}' at {}", table_name, uri);
		Ok(store)
	}

	async fn ensure_table(&self) -> Result<()> {
		let names = self.db.table_names().execute().await.map_err(unavailable)?;
		if names.contains(&self.table_name) {
			return Ok(());
		}
		let schema = build_chunk_schema(self.dim as i32);
		let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
		self.db.create_table(&self.table_name, Box::new(iter)).execute().await.map_err(unavailable)?;
		Ok(())
	}

	async fn table(&self) -> Result<Table> {
		self.db.open_table(&self.table_name).execute().await.map_err(unavailable)
	}

	fn scope_predicate(org_id: &str, filters: &ContentFilters) -> String {
		let mut clauses = vec![format!("org_id = {}", sql_str(org_id))];
		if let Some(domain) = &filters.domain {
			clauses.push(format!("domain = {}", sql_str(domain)));
		}
		if let Some(content_type) = &filters.content_type {
			clauses.push(format!("content_type = {}", sql_str(content_type)));
		}
		if let Some(crawl_id) = &filters.crawl_id {
			clauses.push(format!("crawl_id = {}", sql_str(crawl_id)));
		}
		clauses.join(" AND ")
	}

	fn to_batch(&self, chunks: &[Chunk]) -> Result<RecordBatch> {
		let mut metadata = Vec::with_capacity(chunks.len());
		for c in chunks {
			metadata.push(serde_json::to_string(&c.metadata).map_err(|e| Error::MalformedInput(e.to_string()))?);
		}
		let vectors: Vec<Option<Vec<Option<f32>>>> = chunks
			.iter()
			.map(|c| match c.embedding.as_deref() {
				Some(v) if v.len() == self.dim => Some(v.iter().map(|&x| Some(x)).collect()),
				Some(v) => {
					warn!("Chunk {} has a {}-dim embedding, table expects {}; stored without vector", c.id, v.len(), self.dim);
					None
				}
				None => None,
			})
			.collect();
		let opt_meta = |key: &str| chunks.iter().map(|c| c.meta(key).map(str::to_string)).collect::<Vec<Option<String>>>();
		RecordBatch::try_new(
			build_chunk_schema(self.dim as i32),
			vec![
				Arc::new(StringArray::from(chunks.iter().map(|c| row_key(&c.org_id, &c.id)).collect::<Vec<_>>())),
				Arc::new(StringArray::from(chunks.iter().map(|c| c.id.clone()).collect::<Vec<_>>())),
				Arc::new(StringArray::from(chunks.iter().map(|c| c.document_id.clone()).collect::<Vec<_>>())),
				Arc::new(StringArray::from(chunks.iter().map(|c| c.org_id.clone()).collect::<Vec<_>>())),
				Arc::new(Int32Array::from(chunks.iter().map(|c| c.chunk_index as i32).collect::<Vec<_>>())),
				Arc::new(Int64Array::from(chunks.iter().map(|c| c.start_char as i64).collect::<Vec<_>>())),
				Arc::new(Int64Array::from(chunks.iter().map(|c| c.end_char as i64).collect::<Vec<_>>())),
				Arc::new(StringArray::from(chunks.iter().map(|c| c.content.clone()).collect::<Vec<_>>())),
				Arc::new(StringArray::from(opt_meta("domain"))),
				Arc::new(StringArray::from(opt_meta("content_type"))),
				Arc::new(StringArray::from(opt_meta("crawl_id"))),
				Arc::new(StringArray::from(metadata)),
				Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), self.dim as i32)),
			],
		)
		.map_err(op_err)
	}

	/// Decode rows, paired with `_distance` when the batch came from a
	/// vector search.
	fn from_batch(batch: &RecordBatch) -> Result<Vec<(Chunk, Option<f32>)>> {
		let chunk_id = str_col(batch, "chunk_id")?;
		let document_id = str_col(batch, "document_id")?;
		let org_id = str_col(batch, "org_id")?;
		let content = str_col(batch, "content")?;
		let metadata = str_col(batch, "metadata")?;
		let missing = |name: &str| Error::MalformedInput(format!("lancedb column '{}' missing", name));
		let chunk_index = batch
			.column_by_name("chunk_index")
			.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
			.ok_or_else(|| missing("chunk_index"))?;
		let start_char = batch
			.column_by_name("start_char")
			.and_then(|c| c.as_any().downcast_ref::<Int64Array>())
			.ok_or_else(|| missing("start_char"))?;
		let end_char = batch
			.column_by_name("end_char")
			.and_then(|c| c.as_any().downcast_ref::<Int64Array>())
			.ok_or_else(|| missing("end_char"))?;
		let vector = batch.column_by_name("vector").and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());
		let distance = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

		let mut out = Vec::with_capacity(batch.num_rows());
		for i in 0..batch.num_rows() {
			let metadata: Meta = serde_json::from_str(metadata.value(i)).map_err(|e| Error::MalformedInput(e.to_string()))?;
			let embedding = vector.filter(|v| !v.is_null(i)).map(|v| v.value(i).as_primitive::<Float32Type>().values().to_vec());
			let chunk = Chunk {
				id: chunk_id.value(i).to_string(),
				document_id: document_id.value(i).to_string(),
				org_id: org_id.value(i).to_string(),
				chunk_index: chunk_index.value(i) as usize,
				content: content.value(i).to_string(),
				start_char: start_char.value(i) as usize,
				end_char: end_char.value(i) as usize,
				embedding,
				metadata,
			};
			out.push((chunk, distance.map(|d| d.value(i))));
		}
		Ok(out)
	}
}

#[async_trait]
impl ContentStore for LanceStore {
	async fn get_chunks_by_org(&self, org_id: &str, filters: &ContentFilters) -> Result<Vec<Chunk>> {
		let table = self.table().await?;
		let mut stream =
			table.query().only_if(Self::scope_predicate(org_id, filters)).execute().await.map_err(unavailable)?;
		let mut chunks = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(unavailable)? {
			chunks.extend(Self::from_batch(&batch)?.into_iter().map(|(c, _)| c));
		}
		chunks.sort_by(|a, b| a.document_id.cmp(&b.document_id).then(a.chunk_index.cmp(&b.chunk_index)));
		Ok(chunks)
	}

	async fn upsert_chunks(&self, document_id: &str, org_id: &str, chunks: Vec<Chunk>) -> Result<()> {
		validate_chunk_set(document_id, org_id, &chunks)?;
		let table = self.table().await?;
		let document_scope = format!("org_id = {} AND document_id = {}", sql_str(org_id), sql_str(document_id));
		if chunks.is_empty() {
			table.delete(&document_scope).await.map_err(op_err)?;
			return Ok(());
		}
		let batch = self.to_batch(&chunks)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		// one merge: upsert the new rows and drop the document's stale ones
		let mut merge = table.merge_insert(&["row_key"]);
		merge.when_matched_update_all(None).when_not_matched_insert_all().when_not_matched_by_source_delete(Some(document_scope));
		merge.execute(reader).await.map_err(op_err)?;
		debug!("Wrote {} chunks for document {} (org {})", chunks.len(), document_id, org_id);
		Ok(())
	}

	async fn search_lexical(
		&self,
		_org_id: &str,
		_query: &str,
		_limit: usize,
		_filters: &ContentFilters,
	) -> Result<Vec<RetrievalResult>> {
		Err(Error::Unsupported("lancedb store has no full-text index".to_string()))
	}

	async fn search_vector(
		&self,
		org_id: &str,
		query_embedding: &[f32],
		top_k: usize,
		filters: &ContentFilters,
	) -> Result<Vec<RetrievalResult>> {
		if top_k == 0 || query_embedding.len() != self.dim {
			debug!("Skipping vector search: top_k={} dim={} (table dim {})", top_k, query_embedding.len(), self.dim);
			return Ok(Vec::new());
		}
		let table = self.table().await?;
		let predicate = format!("{} AND vector IS NOT NULL", Self::scope_predicate(org_id, filters));
		let mut stream = table
			.vector_search(query_embedding.to_vec())
			.map_err(op_err)?
			.distance_type(DistanceType::Cosine)
			.only_if(predicate)
			.limit(top_k)
			.execute()
			.await
			.map_err(unavailable)?;
		let mut results = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(unavailable)? {
			for (chunk, distance) in Self::from_batch(&batch)? {
				let score = distance.map_or(0.0, |d| 1.0 - d);
				results.push(RetrievalResult::from_chunk(&chunk, score, Provenance::Vector));
			}
		}
		results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.identity().cmp(&b.identity())));
		Ok(results)
	}

	async fn delete_document(&self, document_id: &str, org_id: &str) -> Result<()> {
		let exists = self
			.get_chunks_by_org(org_id, &ContentFilters::default())
			.await?
			.iter()
			.any(|c| c.document_id == document_id);
		if !exists {
			return Err(Error::NotFound(format!("document '{}' in org '{}'", document_id, org_id)));
		}
		self.upsert_chunks(document_id, org_id, Vec::new()).await
	}

	async fn stats(&self, org_id: &str) -> Result<StoreStats> {
		let chunks = self.get_chunks_by_org(org_id, &ContentFilters::default()).await?;
		let documents: HashSet<&str> = chunks.iter().map(|c| c.document_id.as_str()).collect();
		Ok(StoreStats {
			documents: documents.len(),
			chunks: chunks.len(),
			embedded_chunks: chunks.iter().filter(|c| c.has_embedding()).count(),
		})
	}
}
