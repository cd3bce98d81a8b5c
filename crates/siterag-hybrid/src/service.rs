use std::sync::Arc;
use tracing::{debug, info};

use siterag_core::config::RetrievalConfig;
use siterag_core::error::{Error, Result};
use siterag_core::traits::ContentStore;
use siterag_core::types::{RetrievalResponse, RetrievalStats, RetrievedChunk, SearchFilter};
use siterag_embed::EmbeddingProvider;

use crate::retriever::HybridRetriever;

/// Read-only entry point for downstream generation.
///
/// Holds an immutable [`RetrievalConfig`]; nothing here writes to the
/// store, so calls are idempotent and may run concurrently.
pub struct RetrievalService {
    retriever: HybridRetriever,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn ContentStore>, provider: Arc<EmbeddingProvider>, config: RetrievalConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Retrieval service ready (weights lexical {} / vector {}, rerank {})",
            config.lexical_weight, config.vector_weight, config.rerank.enabled
        );
        Ok(Self { retriever: HybridRetriever::new(store, provider, config) })
    }

    pub fn from_retriever(retriever: HybridRetriever) -> Result<Self> {
        retriever.config().validate()?;
        Ok(Self { retriever })
    }

    pub fn config(&self) -> &RetrievalConfig {
        self.retriever.config()
    }

    /// A search filter for `org_id` carrying the configured default `top_k`.
    pub fn filter_for(&self, org_id: impl Into<String>) -> SearchFilter {
        SearchFilter::new(org_id).with_top_k(self.config().default_top_k)
    }

    /// Retrieve and rank chunks for `query` within `filter.org_id`.
    ///
    /// Errors only for a missing org id or an out-of-range `top_k`. An org
    /// without content, or a blank query, yields an empty successful
    /// response; strategy failures are reported in `retrieval_stats`.
    pub async fn retrieve_and_rank(&self, query: &str, filter: &SearchFilter) -> Result<RetrievalResponse> {
        if filter.org_id.trim().is_empty() {
            return Err(Error::InvalidConfig("org_id is required for retrieval".to_string()));
        }
        let max_top_k = self.config().max_top_k;
        if filter.top_k == 0 || filter.top_k > max_top_k {
            return Err(Error::InvalidConfig(format!("top_k must be within 1..={}, got {}", max_top_k, filter.top_k)));
        }
        if query.trim().is_empty() {
            debug!("Blank query for org {}; nothing to retrieve", filter.org_id);
            return Ok(RetrievalResponse {
                results: Vec::new(),
                retrieval_stats: RetrievalStats::empty(&filter.org_id, filter.strategy),
            });
        }

        let outcome = self.retriever.retrieve(query, filter).await;
        let max_chars = self.config().max_content_chars;
        Ok(RetrievalResponse {
            results: outcome.results.iter().map(|r| RetrievedChunk::from_result(r, max_chars)).collect(),
            retrieval_stats: outcome.stats,
        })
    }
}
