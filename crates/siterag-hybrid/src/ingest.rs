//! Write path: chunk, decorate, embed and replace a document's chunk set.
//!
//! Retrieval never writes; everything that mutates the store goes through
//! the [`Ingestor`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use siterag_core::error::{Error, Result};
use siterag_core::traits::ContentStore;
use siterag_core::types::{Chunk, ContentFilters, Document};
use siterag_core::{Chunker, ChunkingConfig};
use siterag_embed::EmbeddingProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks: usize,
    pub embedded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub documents_updated: usize,
    pub chunks_embedded: usize,
    /// Chunks that still have no embedding after the pass.
    pub chunks_missing: usize,
}

pub struct Ingestor {
    store: Arc<dyn ContentStore>,
    provider: Arc<EmbeddingProvider>,
    chunker: Chunker,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ContentStore>, provider: Arc<EmbeddingProvider>, chunking: ChunkingConfig) -> Self {
        Self { store, provider, chunker: Chunker::new(chunking) }
    }

    /// Chunk `document`, attach whatever embeddings the provider can
    /// produce, and replace the document's chunks in the store.
    pub async fn process_document(&self, document: &Document) -> Result<IngestReport> {
        if document.org_id.trim().is_empty() {
            return Err(Error::InvalidConfig(format!("document '{}' has no org_id", document.id)));
        }
        let mut chunks = self.chunker.chunk_document(document);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embedded = attach(&mut chunks, self.embed(texts).await?);
        if embedded < chunks.len() {
            warn!("Document {}: {} of {} chunks stored without an embedding", document.id, chunks.len() - embedded, chunks.len());
        }

        let report = IngestReport { document_id: document.id.clone(), chunks: chunks.len(), embedded };
        self.store.upsert_chunks(&document.id, &document.org_id, chunks).await?;
        debug!("Ingested document {} ({} chunks, {} embedded)", document.id, report.chunks, report.embedded);
        Ok(report)
    }

    /// Embed every chunk of `org_id` that has no embedding yet. Documents
    /// are rewritten whole, with their other chunks unchanged.
    pub async fn backfill_embeddings(&self, org_id: &str) -> Result<BackfillReport> {
        if org_id.trim().is_empty() {
            return Err(Error::InvalidConfig("org_id is required".to_string()));
        }
        let mut by_document: BTreeMap<String, Vec<Chunk>> = BTreeMap::new();
        for chunk in self.store.get_chunks_by_org(org_id, &ContentFilters::default()).await? {
            by_document.entry(chunk.document_id.clone()).or_default().push(chunk);
        }

        let mut report = BackfillReport::default();
        for (document_id, mut chunks) in by_document {
            let pending: Vec<usize> = (0..chunks.len()).filter(|&i| !chunks[i].has_embedding()).collect();
            if pending.is_empty() {
                continue;
            }
            let texts: Vec<String> = pending.iter().map(|&i| chunks[i].content.clone()).collect();
            let mut embedded = 0;
            for (&i, vector) in pending.iter().zip(self.embed(texts).await?) {
                if let Some(v) = vector {
                    chunks[i].embedding = Some(v);
                    embedded += 1;
                }
            }
            report.chunks_missing += pending.len() - embedded;
            if embedded == 0 {
                continue;
            }
            self.store.upsert_chunks(&document_id, org_id, chunks).await?;
            report.documents_updated += 1;
            report.chunks_embedded += embedded;
        }
        info!(
            "Backfill for org {}: {} chunks embedded across {} documents, {} still missing",
            org_id, report.chunks_embedded, report.documents_updated, report.chunks_missing
        );
        Ok(report)
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || provider.embed_batch(&texts))
            .await
            .map_err(|e| Error::Operation(format!("embedding task failed: {}", e)))
    }
}

fn attach(chunks: &mut [Chunk], vectors: Vec<Option<Vec<f32>>>) -> usize {
    let mut embedded = 0;
    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        if vector.is_some() {
            embedded += 1;
        }
        chunk.embedding = vector;
    }
    embedded
}
