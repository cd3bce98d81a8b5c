use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info, warn};

use siterag_core::error::{Error, Result};
use siterag_core::text::query_terms;
use siterag_core::traits::{validate_chunk_set, ContentStore};
use siterag_core::types::{Chunk, ContentFilters, Provenance, RetrievalResult, StoreStats};

use crate::tantivy_utils::{build_schema, doc_key, register_tokenizer, ChunkFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

fn op_err(e: impl std::fmt::Display) -> Error {
	Error::Operation(format!("tantivy: {}", e))
}

fn unavailable(e: impl std::fmt::Display) -> Error {
	Error::StoreUnavailable(format!("tantivy: {}", e))
}

/// Content store backed by a Tantivy index, ranked with BM25.
///
/// Vector search is not supported here; the vector strategy falls back to
/// scanning the stored embeddings.
pub struct TantivyStore {
	index: Index,
	reader: IndexReader,
	writer: Arc<Mutex<IndexWriter>>,
	fields: ChunkFields,
}

impl TantivyStore {
	pub fn in_ram() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	pub fn open_or_create(index_dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(index_dir).map_err(unavailable)?;
		let directory = MmapDirectory::open(index_dir).map_err(unavailable)?;
		let index = Index::open_or_create(directory, build_schema()).map_err(unavailable)?;
		info!("Opened Tantivy index at {}", index_dir.display());
		Self::from_index(index)
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = ChunkFields::from_schema(&index.schema())?;
		// single thread: one segment per commit keeps small upserts cheap
		let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(unavailable)?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(unavailable)?;
		Ok(Self { index, reader, writer: Arc::new(Mutex::new(writer)), fields })
	}

	fn to_document(&self, chunk: &Chunk) -> Result<TantivyDocument> {
		let payload = serde_json::to_string(chunk).map_err(|e| Error::MalformedInput(format!("chunk '{}': {}", chunk.id, e)))?;
		let mut doc = TantivyDocument::default();
		doc.add_text(self.fields.chunk_id, &chunk.id);
		doc.add_text(self.fields.document_id, &chunk.document_id);
		doc.add_text(self.fields.doc_key, doc_key(&chunk.org_id, &chunk.document_id));
		doc.add_text(self.fields.org_id, &chunk.org_id);
		for (field, key) in [(self.fields.domain, "domain"), (self.fields.content_type, "content_type"), (self.fields.crawl_id, "crawl_id")] {
			if let Some(value) = chunk.meta(key) {
				doc.add_text(field, value);
			}
		}
		doc.add_text(self.fields.text, &chunk.content);
		doc.add_text(self.fields.payload, payload);
		Ok(doc)
	}

	fn load_chunk(&self, searcher: &Searcher, addr: DocAddress) -> Result<Chunk> {
		let doc: TantivyDocument = searcher.doc(addr).map_err(op_err)?;
		let payload = doc
			.get_first(self.fields.payload)
			.and_then(|v| v.as_str())
			.ok_or_else(|| Error::MalformedInput("indexed chunk has no payload".to_string()))?;
		serde_json::from_str(payload).map_err(|e| Error::MalformedInput(format!("stored chunk payload: {}", e)))
	}

	/// Mandatory clauses: the tenant, then any requested filters. They score
	/// zero so BM25 ranking comes from the text clause alone.
	fn scope_clauses(&self, org_id: &str, filters: &ContentFilters) -> Vec<(Occur, Box<dyn Query>)> {
		let must = |field: Field, value: &str| -> (Occur, Box<dyn Query>) {
			let term = TermQuery::new(Term::from_field_text(field, value), IndexRecordOption::Basic);
			(Occur::Must, Box::new(ConstScoreQuery::new(Box::new(term), 0.0)))
		};
		let mut clauses = vec![must(self.fields.org_id, org_id)];
		if let Some(domain) = &filters.domain {
			clauses.push(must(self.fields.domain, domain));
		}
		if let Some(content_type) = &filters.content_type {
			clauses.push(must(self.fields.content_type, content_type));
		}
		if let Some(crawl_id) = &filters.crawl_id {
			clauses.push(must(self.fields.crawl_id, crawl_id));
		}
		clauses
	}

	/// Swap a document's chunk set on the blocking pool; commit and reload
	/// do file I/O.
	async fn replace(&self, org_id: &str, document_id: &str, docs: Vec<TantivyDocument>) -> Result<()> {
		let key = Term::from_field_text(self.fields.doc_key, &doc_key(org_id, document_id));
		let writer = Arc::clone(&self.writer);
		let reader = self.reader.clone();
		tokio::task::spawn_blocking(move || commit_replacement(&writer, &reader, key, docs))
			.await
			.map_err(|e| Error::Operation(format!("tantivy writer task: {}", e)))?
	}
}

/// Delete + add + commit as one unit; on failure the writer is rolled back
/// so readers keep seeing the previous chunk set.
fn commit_replacement(writer: &Mutex<IndexWriter>, reader: &IndexReader, key: Term, docs: Vec<TantivyDocument>) -> Result<()> {
	let mut writer = writer.lock().map_err(|_| Error::StoreUnavailable("tantivy writer lock poisoned".to_string()))?;
	let result = (|| -> tantivy::Result<()> {
		writer.delete_term(key);
		for doc in docs {
			writer.add_document(doc)?;
		}
		writer.commit()?;
		Ok(())
	})();
	if let Err(e) = result {
		if let Err(rollback) = writer.rollback() {
			warn!("Tantivy rollback failed: {}", rollback);
		}
		return Err(op_err(e));
	}
	drop(writer);
	reader.reload().map_err(op_err)
}

#[async_trait]
impl ContentStore for TantivyStore {
	async fn get_chunks_by_org(&self, org_id: &str, filters: &ContentFilters) -> Result<Vec<Chunk>> {
		let searcher = self.reader.searcher();
		let query = BooleanQuery::new(self.scope_clauses(org_id, filters));
		let addrs = searcher.search(&query, &DocSetCollector).map_err(unavailable)?;
		let mut chunks = addrs.into_iter().map(|addr| self.load_chunk(&searcher, addr)).collect::<Result<Vec<_>>>()?;
		chunks.sort_by(|a, b| a.document_id.cmp(&b.document_id).then(a.chunk_index.cmp(&b.chunk_index)));
		Ok(chunks)
	}

	async fn upsert_chunks(&self, document_id: &str, org_id: &str, chunks: Vec<Chunk>) -> Result<()> {
		validate_chunk_set(document_id, org_id, &chunks)?;
		let docs = chunks.iter().map(|c| self.to_document(c)).collect::<Result<Vec<_>>>()?;
		let count = docs.len();
		self.replace(org_id, document_id, docs).await?;
		debug!("Indexed {} chunks for document {} (org {})", count, document_id, org_id);
		Ok(())
	}

	async fn search_lexical(
		&self,
		org_id: &str,
		query: &str,
		limit: usize,
		filters: &ContentFilters,
	) -> Result<Vec<RetrievalResult>> {
		let terms = query_terms(query);
		if limit == 0 || terms.is_empty() {
			return Ok(Vec::new());
		}
		let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
		let (text_query, errors) = parser.parse_query_lenient(&terms.join(" "));
		if !errors.is_empty() {
			debug!("Lenient query parse dropped {} clauses", errors.len());
		}
		let mut clauses = self.scope_clauses(org_id, filters);
		clauses.push((Occur::Must, text_query));
		let query = BooleanQuery::new(clauses);

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(limit)).map_err(unavailable)?;
		let mut results = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let chunk = self.load_chunk(&searcher, addr)?;
			results.push(RetrievalResult::from_chunk(&chunk, score, Provenance::Lexical));
		}
		// BM25 ties come back in segment order; make them deterministic
		results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.identity().cmp(&b.identity())));
		Ok(results)
	}

	async fn search_vector(
		&self,
		_org_id: &str,
		_query_embedding: &[f32],
		_top_k: usize,
		_filters: &ContentFilters,
	) -> Result<Vec<RetrievalResult>> {
		Err(Error::Unsupported("tantivy store has no vector index".to_string()))
	}

	async fn delete_document(&self, document_id: &str, org_id: &str) -> Result<()> {
		let filters = ContentFilters::default();
		let exists = self.get_chunks_by_org(org_id, &filters).await?.iter().any(|c| c.document_id == document_id);
		if !exists {
			return Err(Error::NotFound(format!("document '{}' in org '{}'", document_id, org_id)));
		}
		self.replace(org_id, document_id, Vec::new()).await
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
