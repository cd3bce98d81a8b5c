use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, ContentFilters, RetrievalResult, StoreStats};

/// Maps text to fixed-dimension dense vectors. Implementations must be
/// deterministic for identical input and model version.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Persistence seam for chunks. Every read is scoped to one organization
/// and the scope is applied inside the store query, never afterwards.
///
/// Writes replace a document's full chunk set so readers never observe a
/// partially written document.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All chunks of the tenant matching `filters`, ordered by
    /// `(document_id, chunk_index)`.
    async fn get_chunks_by_org(&self, org_id: &str, filters: &ContentFilters) -> Result<Vec<Chunk>>;

    /// Replace the chunk set of `document_id` with `chunks`.
    async fn upsert_chunks(&self, document_id: &str, org_id: &str, chunks: Vec<Chunk>) -> Result<()>;

    /// Full-text ranked search. Stores without a full-text index return
    /// `Error::Unsupported`.
    async fn search_lexical(
        &self,
        org_id: &str,
        query: &str,
        limit: usize,
        filters: &ContentFilters,
    ) -> Result<Vec<RetrievalResult>>;

    /// Nearest-neighbour search over chunk embeddings, similarity
    /// descending. Stores without a vector index return `Error::Unsupported`.
    async fn search_vector(
        &self,
        org_id: &str,
        query_embedding: &[f32],
        top_k: usize,
        filters: &ContentFilters,
    ) -> Result<Vec<RetrievalResult>>;

    async fn delete_document(&self, document_id: &str, org_id: &str) -> Result<()>;

    async fn stats(&self, org_id: &str) -> Result<StoreStats>;
}

/// Checks the write contract shared by all stores: every chunk belongs to
/// the document and tenant it is written under.
pub fn validate_chunk_set(document_id: &str, org_id: &str, chunks: &[Chunk]) -> Result<()> {
    if org_id.trim().is_empty() {
        return Err(crate::error::Error::InvalidConfig("org_id is required".to_string()));
    }
    for c in chunks {
        if c.document_id != document_id || c.org_id != org_id {
            return Err(crate::error::Error::InvalidConfig(format!(
                "chunk '{}' belongs to document '{}' / org '{}', not '{}' / '{}'",
                c.id, c.document_id, c.org_id, document_id, org_id
            )));
        }
    }
    Ok(())
}
