use std::sync::Arc;
use tracing::debug;

use siterag_core::error::{Error, Result};
use siterag_core::similarity::{by_score_desc, cosine_similarity};
use siterag_core::traits::ContentStore;
use siterag_core::types::{Chunk, ContentFilters, Provenance, RetrievalResult};
use siterag_embed::EmbeddingProvider;

/// Nearest-neighbour retrieval over chunk embeddings.
///
/// The query is embedded with the same provider used at ingest time. Stores
/// without a vector index are scanned with brute-force cosine similarity.
#[derive(Clone)]
pub struct VectorSearchStrategy {
    store: Arc<dyn ContentStore>,
    provider: Arc<EmbeddingProvider>,
}

impl VectorSearchStrategy {
    pub fn new(store: Arc<dyn ContentStore>, provider: Arc<EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn search(&self, query: &str, limit: usize, org_id: &str, filters: &ContentFilters) -> Result<Vec<RetrievalResult>> {
        if org_id.trim().is_empty() {
            return Err(Error::InvalidConfig("org_id is required".to_string()));
        }
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let provider = self.provider.clone();
        let text = query.to_string();
        let embedding = tokio::task::spawn_blocking(move || provider.embed(&text))
            .await
            .map_err(|e| Error::Operation(format!("embedding task failed: {}", e)))?
            .ok_or_else(|| Error::EmbeddingUnavailable("query could not be embedded".to_string()))?;
        self.search_with_embedding(&embedding, limit, org_id, filters).await
    }

    pub async fn search_with_embedding(
        &self,
        embedding: &[f32],
        limit: usize,
        org_id: &str,
        filters: &ContentFilters,
    ) -> Result<Vec<RetrievalResult>> {
        match self.store.search_vector(org_id, embedding, limit, filters).await {
            Err(Error::Unsupported(reason)) => {
                debug!("Vector search unsupported ({}); scanning embeddings for org {}", reason, org_id);
                let chunks = self.store.get_chunks_by_org(org_id, filters).await?;
                Ok(similarity_scan(embedding, &chunks, limit))
            }
            other => other,
        }
    }
}

/// Rank chunks by cosine similarity to `embedding`, ties by identity.
/// Chunks without an embedding, or with one of another dimension, are
/// skipped.
pub fn similarity_scan(embedding: &[f32], chunks: &[Chunk], limit: usize) -> Vec<RetrievalResult> {
    let mut scored: Vec<RetrievalResult> = chunks
        .iter()
        .filter_map(|c| {
            let v = c.embedding.as_deref().filter(|v| v.len() == embedding.len())?;
            Some(RetrievalResult::from_chunk(c, cosine_similarity(embedding, v), Provenance::Vector))
        })
        .collect();
    scored.sort_by(|a, b| by_score_desc(a.score, b.score).then_with(|| a.identity().cmp(&b.identity())));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use siterag_core::types::Meta;

    fn chunk(idx: usize, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: format!("doc:{}", idx),
            document_id: "doc".to_string(),
            org_id: "org".to_string(),
            chunk_index: idx,
            content: format!("chunk {}", idx),
            start_char: 0,
            end_char: 7,
            embedding,
            metadata: Meta::new(),
        }
    }

    #[test]
    fn scan_ranks_by_cosine_and_skips_unusable_vectors() {
        let chunks = vec![
            chunk(0, Some(vec![0.0, 1.0])),
            chunk(1, Some(vec![1.0, 0.1])),
            chunk(2, None),
            chunk(3, Some(vec![1.0, 0.0, 0.0])),
            chunk(4, Some(vec![0.0, 1.0])),
        ];
        let hits = similarity_scan(&[1.0, 0.0], &chunks, 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["doc:1", "doc:0", "doc:4"]);
        assert_eq!(similarity_scan(&[1.0, 0.0], &chunks, 1).len(), 1);
    }
}
