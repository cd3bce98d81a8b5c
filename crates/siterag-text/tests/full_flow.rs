use std::sync::Arc;

use chrono::Utc;
use siterag_core::chunker::{Chunker, ChunkingConfig};
use siterag_core::traits::ContentStore;
use siterag_core::types::{Chunk, ContentFilters, Document, Meta, Provenance};
use siterag_core::{Error, MemoryStore};
use siterag_text::{LexicalSearchStrategy, TantivyStore};
use tempfile::TempDir;

fn chunk(org: &str, doc: &str, idx: usize, content: &str, domain: &str) -> Chunk {
	let mut metadata = Meta::new();
	metadata.insert("domain".to_string(), domain.to_string());
	metadata.insert("content_type".to_string(), "article".to_string());
	Chunk {
		id: format!("{}:{}", doc, idx),
		document_id: doc.to_string(),
		org_id: org.to_string(),
		chunk_index: idx,
		content: content.to_string(),
		start_char: 0,
		end_char: content.chars().count(),
		embedding: None,
		metadata,
	}
}

/// chunk 1 mentions only "marketing", chunk 2 both query words, chunk 3 neither
fn scenario_chunks(org: &str) -> Vec<Chunk> {
	vec![
		chunk(org, "doc", 1, "Our marketing team meets on Mondays to plan.", "a.com"),
		chunk(org, "doc", 2, "A marketing strategy that grows revenue each quarter.", "a.com"),
		chunk(org, "doc", 3, "The office kitchen is closed for repairs today.", "a.com"),
	]
}

async fn seeded(store: Arc<dyn ContentStore>) -> LexicalSearchStrategy {
	store.upsert_chunks("doc", "org-a", scenario_chunks("org-a")).await.expect("upsert");
	LexicalSearchStrategy::new(store)
}

#[tokio::test]
async fn scenario_lexical_fallback_orders_by_matched_terms() {
	let strategy = seeded(Arc::new(MemoryStore::new())).await;
	let hits = strategy.search("marketing strategy", 10, "org-a", &ContentFilters::default()).await.unwrap();
	let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
	assert_eq!(ids, vec!["doc:2", "doc:1"]);
	assert!(hits.iter().all(|h| h.provenance == Provenance::Lexical));
}

#[tokio::test]
async fn stop_word_queries_scan_on_every_backend() {
	let memory = seeded(Arc::new(MemoryStore::new())).await;
	let tantivy = seeded(Arc::new(TantivyStore::in_ram().unwrap())).await;
	let filters = ContentFilters::default();
	let from_memory = memory.search("on to", 10, "org-a", &filters).await.unwrap();
	let from_tantivy = tantivy.search("on to", 10, "org-a", &filters).await.unwrap();
	let ids: Vec<&str> = from_tantivy.iter().map(|h| h.chunk_id.as_str()).collect();
	assert_eq!(ids, vec!["doc:1"]);
	assert_eq!(from_memory, from_tantivy);
}

#[tokio::test]
async fn tantivy_bm25_ranks_full_match_first() {
	let strategy = seeded(Arc::new(TantivyStore::in_ram().unwrap())).await;
	let hits = strategy.search("marketing strategy", 10, "org-a", &ContentFilters::default()).await.unwrap();
	let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
	assert_eq!(ids, vec!["doc:2", "doc:1"]);
	assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn tantivy_search_is_tenant_scoped() {
	let store = Arc::new(TantivyStore::in_ram().unwrap());
	store.upsert_chunks("doc", "org-a", scenario_chunks("org-a")).await.unwrap();
	// same document id and an even better match in another tenant
	store
		.upsert_chunks("doc", "org-b", vec![chunk("org-b", "doc", 1, "marketing strategy marketing strategy", "a.com")])
		.await
		.unwrap();

	let hits = store.search_lexical("org-a", "marketing strategy", 10, &ContentFilters::default()).await.unwrap();
	assert_eq!(hits.len(), 2);
	assert!(hits.iter().all(|h| h.org_id == "org-a"));
	assert_eq!(store.get_chunks_by_org("org-b", &ContentFilters::default()).await.unwrap().len(), 1);
	assert!(store.search_lexical("org-c", "marketing", 10, &ContentFilters::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn tantivy_filters_are_mandatory_clauses() {
	let store = TantivyStore::in_ram().unwrap();
	store
		.upsert_chunks(
			"doc",
			"org-a",
			vec![chunk("org-a", "doc", 0, "pricing for teams", "a.com"), chunk("org-a", "doc", 1, "pricing for schools", "b.com")],
		)
		.await
		.unwrap();
	let filters = ContentFilters { domain: Some("b.com".into()), ..Default::default() };
	let hits = store.search_lexical("org-a", "pricing", 10, &filters).await.unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].chunk_id, "doc:1");
	let filters = ContentFilters { crawl_id: Some("crawl-9".into()), ..Default::default() };
	assert!(store.search_lexical("org-a", "pricing", 10, &filters).await.unwrap().is_empty());
}

#[tokio::test]
async fn tantivy_upsert_replaces_and_delete_removes() {
	let store = TantivyStore::in_ram().unwrap();
	store.upsert_chunks("doc", "org-a", scenario_chunks("org-a")).await.unwrap();
	store.upsert_chunks("doc", "org-a", vec![chunk("org-a", "doc", 0, "fresh content only", "a.com")]).await.unwrap();
	let chunks = store.get_chunks_by_org("org-a", &ContentFilters::default()).await.unwrap();
	assert_eq!(chunks.len(), 1);
	assert_eq!(chunks[0].content, "fresh content only");
	assert!(store.search_lexical("org-a", "marketing", 10, &ContentFilters::default()).await.unwrap().is_empty());

	store.delete_document("doc", "org-a").await.unwrap();
	assert_eq!(store.stats("org-a").await.unwrap().chunks, 0);
	assert!(matches!(store.delete_document("doc", "org-a").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn tantivy_index_persists_on_disk() {
	let tmp = TempDir::new().unwrap();
	let doc = Document {
		id: "guide".into(),
		org_id: "org-a".into(),
		domain: "docs.example.com".into(),
		url: "https://docs.example.com/guide".into(),
		title: "Guide".into(),
		text: "Install the agent. Configure the firewall. Restart the service.".into(),
		content_type: "docs".into(),
		extracted_at: Utc::now(),
		crawl_id: None,
		processed: false,
	};
	let chunks = Chunker::new(ChunkingConfig { chunk_size: 6, chunk_overlap: 3, respect_sentence_boundaries: true }).chunk_document(&doc);
	{
		let store = TantivyStore::open_or_create(tmp.path()).unwrap();
		store.upsert_chunks("guide", "org-a", chunks.clone()).await.unwrap();
	}
	let store = TantivyStore::open_or_create(tmp.path()).unwrap();
	assert_eq!(store.get_chunks_by_org("org-a", &ContentFilters::default()).await.unwrap(), chunks);
	let hits = store.search_lexical("org-a", "firewall", 5, &ContentFilters::default()).await.unwrap();
	assert!(!hits.is_empty());
	assert!(hits[0].content.contains("firewall"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_upserts_all_commit() {
	let store = Arc::new(TantivyStore::in_ram().unwrap());
	let mut tasks = Vec::new();
	for i in 0..8 {
		let store = store.clone();
		let doc = format!("doc-{}", i);
		tasks.push(tokio::spawn(async move {
			let chunks = vec![chunk("org-a", &doc, 0, "Quarterly revenue grew again.", "a.com")];
			store.upsert_chunks(&doc, "org-a", chunks).await
		}));
	}
	for task in tasks {
		task.await.unwrap().unwrap();
	}
	let stats = store.stats("org-a").await.unwrap();
	assert_eq!((stats.documents, stats.chunks), (8, 8));
	store.delete_document("doc-3", "org-a").await.unwrap();
	assert_eq!(store.stats("org-a").await.unwrap().documents, 7);
}

#[tokio::test]
async fn tantivy_vector_search_is_unsupported() {
	let store = TantivyStore::in_ram().unwrap();
	let err = store.search_vector("org-a", &[1.0, 0.0], 5, &ContentFilters::default()).await;
	assert!(matches!(err, Err(Error::Unsupported(_))));
}

#[tokio::test]
async fn missing_org_is_rejected_and_empty_query_is_empty() {
	let strategy = seeded(Arc::new(MemoryStore::new())).await;
	assert!(matches!(strategy.search("x", 5, "", &ContentFilters::default()).await, Err(Error::InvalidConfig(_))));
	assert!(strategy.search("   ", 5, "org-a", &ContentFilters::default()).await.unwrap().is_empty());
}
