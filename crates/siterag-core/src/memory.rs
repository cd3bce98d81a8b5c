//! In-memory content store.
//!
//! Backs tests and small deployments. It has no full-text index, so
//! lexical retrieval over it goes through the keyword-scan fallback of the
//! lexical strategy; vector search is brute-force cosine.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::similarity::{by_score_desc, cosine_similarity};
use crate::traits::{validate_chunk_set, ContentStore};
use crate::types::{Chunk, ContentFilters, Provenance, RetrievalResult, StoreStats};

/// Keyed by `(org_id, document_id)`.
type DocumentMap = HashMap<(String, String), Vec<Chunk>>;

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<DocumentMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&DocumentMap) -> T) -> Result<T> {
        let guard = self.documents.read().map_err(|_| Error::StoreUnavailable("memory store lock poisoned".to_string()))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut DocumentMap) -> T) -> Result<T> {
        let mut guard =
            self.documents.write().map_err(|_| Error::StoreUnavailable("memory store lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_chunks_by_org(&self, org_id: &str, filters: &ContentFilters) -> Result<Vec<Chunk>> {
        let mut chunks = self.read(|docs| {
            docs.iter()
                .filter(|((org, _), _)| org == org_id)
                .flat_map(|(_, chunks)| chunks.iter().filter(|c| filters.matches(c)).cloned())
                .collect::<Vec<_>>()
        })?;
        chunks.sort_by(|a, b| a.document_id.cmp(&b.document_id).then(a.chunk_index.cmp(&b.chunk_index)));
        Ok(chunks)
    }

    async fn upsert_chunks(&self, document_id: &str, org_id: &str, chunks: Vec<Chunk>) -> Result<()> {
        validate_chunk_set(document_id, org_id, &chunks)?;
        let count = chunks.len();
        self.write(|docs| {
            let key = (org_id.to_string(), document_id.to_string());
            if chunks.is_empty() {
                docs.remove(&key);
            } else {
                docs.insert(key, chunks);
            }
        })?;
        debug!("Upserted {} chunks for document {} (org {})", count, document_id, org_id);
        Ok(())
    }

    async fn search_lexical(
        &self,
        _org_id: &str,
        _query: &str,
        _limit: usize,
        _filters: &ContentFilters,
    ) -> Result<Vec<RetrievalResult>> {
        Err(Error::Unsupported("memory store has no full-text index".to_string()))
    }

    async fn search_vector(
        &self,
        org_id: &str,
        query_embedding: &[f32],
        top_k: usize,
        filters: &ContentFilters,
    ) -> Result<Vec<RetrievalResult>> {
        if top_k == 0 || query_embedding.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored = self.read(|docs| {
            docs.iter()
                .filter(|((org, _), _)| org == org_id)
                .flat_map(|(_, chunks)| chunks.iter())
                .filter(|c| filters.matches(c))
                .filter_map(|c| {
                    let embedding = c.embedding.as_deref()?;
                    (embedding.len() == query_embedding.len())
                        .then(|| RetrievalResult::from_chunk(c, cosine_similarity(query_embedding, embedding), Provenance::Vector))
                })
                .collect::<Vec<_>>()
        })?;
        scored.sort_by(|a, b| by_score_desc(a.score, b.score).then_with(|| a.identity().cmp(&b.identity())));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_document(&self, document_id: &str, org_id: &str) -> Result<()> {
        let removed = self.write(|docs| docs.remove(&(org_id.to_string(), document_id.to_string())))?;
        if removed.is_none() {
            return Err(Error::NotFound(format!("document '{}' in org '{}'", document_id, org_id)));
        }
        Ok(())
    }

    async fn stats(&self, org_id: &str) -> Result<StoreStats> {
        self.read(|docs| {
            let mut stats = StoreStats::default();
            let mut seen = HashSet::new();
            for ((org, doc), chunks) in docs.iter() {
                if org != org_id {
                    continue;
                }
                seen.insert(doc.as_str());
                stats.chunks += chunks.len();
                stats.embedded_chunks += chunks.iter().filter(|c| c.has_embedding()).count();
            }
            stats.documents = seen.len();
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Meta;

    fn chunk(doc: &str, org: &str, idx: usize, domain: &str, embedding: Option<Vec<f32>>) -> Chunk {
        let mut metadata = Meta::new();
        metadata.insert("domain".to_string(), domain.to_string());
        Chunk {
            id: format!("{}:{}", doc, idx),
            document_id: doc.to_string(),
            org_id: org.to_string(),
            chunk_index: idx,
            content: format!("chunk {} of {}", idx, doc),
            start_char: 0,
            end_char: 10,
            embedding,
            metadata,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_the_chunk_set() {
        let store = MemoryStore::new();
        store
            .upsert_chunks("d1", "org", vec![chunk("d1", "org", 0, "a.com", None), chunk("d1", "org", 1, "a.com", None)])
            .await
            .unwrap();
        store.upsert_chunks("d1", "org", vec![chunk("d1", "org", 0, "a.com", None)]).await.unwrap();
        let all = store.get_chunks_by_org("org", &ContentFilters::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(store.stats("org").await.unwrap().documents, 1);
    }

    #[tokio::test]
    async fn upsert_rejects_foreign_chunks() {
        let store = MemoryStore::new();
        let err = store.upsert_chunks("d1", "org-a", vec![chunk("d1", "org-b", 0, "a.com", None)]).await;
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn reads_are_tenant_scoped_and_filtered() {
        let store = MemoryStore::new();
        store.upsert_chunks("d1", "org-a", vec![chunk("d1", "org-a", 0, "a.com", None)]).await.unwrap();
        store.upsert_chunks("d2", "org-a", vec![chunk("d2", "org-a", 0, "b.com", None)]).await.unwrap();
        store.upsert_chunks("d1", "org-b", vec![chunk("d1", "org-b", 0, "a.com", None)]).await.unwrap();

        let a = store.get_chunks_by_org("org-a", &ContentFilters::default()).await.unwrap();
        assert_eq!(a.iter().map(|c| c.document_id.as_str()).collect::<Vec<_>>(), vec!["d1", "d2"]);
        assert!(a.iter().all(|c| c.org_id == "org-a"));

        let f = ContentFilters { domain: Some("b.com".into()), ..Default::default() };
        let b = store.get_chunks_by_org("org-a", &f).await.unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].document_id, "d2");
        assert!(store.get_chunks_by_org("org-c", &ContentFilters::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vector_search_is_brute_force_cosine() {
        let store = MemoryStore::new();
        store
            .upsert_chunks(
                "d1",
                "org",
                vec![
                    chunk("d1", "org", 0, "a.com", Some(vec![1.0, 0.0, 0.0])),
                    chunk("d1", "org", 1, "a.com", Some(vec![0.0, 1.0, 0.0])),
                    chunk("d1", "org", 2, "a.com", None),
                    chunk("d1", "org", 3, "a.com", Some(vec![1.0, 0.0])),
                ],
            )
            .await
            .unwrap();
        let hits = store.search_vector("org", &[1.0, 0.0, 0.0], 5, &ContentFilters::default()).await.unwrap();
        assert_eq!(hits.len(), 2, "missing and mismatched embeddings are skipped");
        assert_eq!(hits[0].chunk_id, "d1:0");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(hits[0].provenance, Provenance::Vector);
        assert!(store.search_vector("other", &[1.0, 0.0, 0.0], 5, &ContentFilters::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lexical_search_is_unsupported() {
        let store = MemoryStore::new();
        let err = store.search_lexical("org", "anything", 5, &ContentFilters::default()).await;
        assert!(matches!(err, Err(Error::Unsupported(_))));
    }

    #[tokio::test]
    async fn delete_is_tenant_scoped() {
        let store = MemoryStore::new();
        store.upsert_chunks("d1", "org-a", vec![chunk("d1", "org-a", 0, "a.com", Some(vec![1.0]))]).await.unwrap();
        assert!(matches!(store.delete_document("d1", "org-b").await, Err(Error::NotFound(_))));
        assert_eq!(store.stats("org-a").await.unwrap().embedded_chunks, 1);
        store.delete_document("d1", "org-a").await.unwrap();
        assert_eq!(store.stats("org-a").await.unwrap(), StoreStats::default());
    }
}
