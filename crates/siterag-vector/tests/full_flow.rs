use async_trait::async_trait;
use std::sync::Arc;

use siterag_core::config::EmbeddingConfig;
use siterag_core::error::{Error, Result};
use siterag_core::traits::{ContentStore, Embedder};
use siterag_core::types::{Chunk, ContentFilters, Meta, Provenance, RetrievalResult, StoreStats};
use siterag_core::MemoryStore;
use siterag_embed::{EmbeddingProvider, HashEmbedder};
use siterag_vector::VectorSearchStrategy;

const DIM: usize = 128;

fn provider() -> Arc<EmbeddingProvider> {
    Arc::new(EmbeddingProvider::new(Arc::new(HashEmbedder::new(DIM)), &EmbeddingConfig::default()))
}

fn chunk(org: &str, idx: usize, content: &str, domain: &str, p: &EmbeddingProvider) -> Chunk {
    let mut metadata = Meta::new();
    metadata.insert("domain".to_string(), domain.to_string());
    Chunk {
        id: format!("doc:{}", idx),
        document_id: "doc".to_string(),
        org_id: org.to_string(),
        chunk_index: idx,
        content: content.to_string(),
        start_char: 0,
        end_char: content.chars().count(),
        embedding: p.embed(content),
        metadata,
    }
}

async fn seeded_store(p: &EmbeddingProvider) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_chunks(
            "doc",
            "org-a",
            vec![
                chunk("org-a", 0, "refund policy for annual plans", "a.com", p),
                chunk("org-a", 1, "office parking and visitor badges", "a.com", p),
                chunk("org-a", 2, "refund requests are answered within a week", "b.com", p),
            ],
        )
        .await
        .unwrap();
    store.upsert_chunks("doc", "org-b", vec![chunk("org-b", 0, "refund policy for annual plans", "a.com", p)]).await.unwrap();
    store
}

/// Delegates reads, but has no vector index.
struct ScanOnly(Arc<MemoryStore>);

#[async_trait]
impl ContentStore for ScanOnly {
    async fn get_chunks_by_org(&self, org_id: &str, filters: &ContentFilters) -> Result<Vec<Chunk>> {
        self.0.get_chunks_by_org(org_id, filters).await
    }
    async fn upsert_chunks(&self, document_id: &str, org_id: &str, chunks: Vec<Chunk>) -> Result<()> {
        self.0.upsert_chunks(document_id, org_id, chunks).await
    }
    async fn search_lexical(&self, _: &str, _: &str, _: usize, _: &ContentFilters) -> Result<Vec<RetrievalResult>> {
        Err(Error::Unsupported("scan only".into()))
    }
    async fn search_vector(&self, _: &str, _: &[f32], _: usize, _: &ContentFilters) -> Result<Vec<RetrievalResult>> {
        Err(Error::Unsupported("scan only".into()))
    }
    async fn delete_document(&self, document_id: &str, org_id: &str) -> Result<()> {
        self.0.delete_document(document_id, org_id).await
    }
    async fn stats(&self, org_id: &str) -> Result<StoreStats> {
        self.0.stats(org_id).await
    }
}

#[tokio::test]
async fn vector_search_ranks_related_chunks_first() {
    let p = provider();
    let strategy = VectorSearchStrategy::new(seeded_store(&p).await, p.clone());
    let hits = strategy.search("refund policy", 3, "org-a", &ContentFilters::default()).await.unwrap();
    assert_eq!(hits[0].chunk_id, "doc:0");
    assert!(hits.iter().all(|h| h.org_id == "org-a" && h.provenance == Provenance::Vector));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn unsupported_store_falls_back_to_scan_with_same_ranking() {
    let p = provider();
    let memory = seeded_store(&p).await;
    let native = VectorSearchStrategy::new(memory.clone(), p.clone());
    let scan = VectorSearchStrategy::new(Arc::new(ScanOnly(memory)), p.clone());
    let filters = ContentFilters::default();
    assert_eq!(
        native.search("refund requests", 3, "org-a", &filters).await.unwrap(),
        scan.search("refund requests", 3, "org-a", &filters).await.unwrap()
    );
}

#[tokio::test]
async fn filters_and_tenant_scope_apply() {
    let p = provider();
    let strategy = VectorSearchStrategy::new(Arc::new(ScanOnly(seeded_store(&p).await)), p.clone());
    let filters = ContentFilters { domain: Some("b.com".into()), ..Default::default() };
    let hits = strategy.search("refund", 10, "org-a", &filters).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, "doc:2");
    assert!(strategy.search("refund", 10, "org-c", &ContentFilters::default()).await.unwrap().is_empty());
}

struct Offline;

impl Embedder for Offline {
    fn dim(&self) -> usize {
        DIM
    }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model not loaded")
    }
}

#[tokio::test]
async fn unavailable_embedder_is_reported() {
    let offline = Arc::new(EmbeddingProvider::new(Arc::new(Offline), &EmbeddingConfig::default()));
    let strategy = VectorSearchStrategy::new(Arc::new(MemoryStore::new()), offline);
    let err = strategy.search("anything", 5, "org-a", &ContentFilters::default()).await;
    assert!(matches!(err, Err(Error::EmbeddingUnavailable(_))));
    assert!(matches!(strategy.search("x", 5, " ", &ContentFilters::default()).await, Err(Error::InvalidConfig(_))));
}
