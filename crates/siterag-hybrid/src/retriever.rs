use std::sync::Arc;
use tracing::{debug, warn};

use siterag_core::config::RetrievalConfig;
use siterag_core::error::{Error, Result};
use siterag_core::traits::ContentStore;
use siterag_core::types::{RetrievalResult, RetrievalStats, SearchFilter, StrategyMode};
use siterag_embed::EmbeddingProvider;
use siterag_text::LexicalSearchStrategy;
use siterag_vector::VectorSearchStrategy;

use crate::fusion::{fuse, FusionWeights};
use crate::rerank::{apply_rerank, Reranker, TermProximityReranker};
use crate::strategy::SearchStrategy;

/// Ranked results of one query plus the statistics reported with them.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub results: Vec<RetrievalResult>,
    pub stats: RetrievalStats,
}

/// Runs the strategies a query asks for, fuses their candidates and
/// optionally reranks the head of the fused list.
///
/// Every strategy runs under its own timeout. A failed or timed-out
/// strategy degrades the query instead of failing it; only when every
/// strategy that ran has failed is the outcome marked unsuccessful.
pub struct HybridRetriever {
    lexical: SearchStrategy,
    vector: SearchStrategy,
    weights: FusionWeights,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn ContentStore>, provider: Arc<EmbeddingProvider>, config: RetrievalConfig) -> Self {
        let reranker: Option<Arc<dyn Reranker>> =
            config.rerank.enabled.then(|| Arc::new(TermProximityReranker) as Arc<dyn Reranker>);
        Self {
            lexical: SearchStrategy::Lexical(LexicalSearchStrategy::new(store.clone())),
            vector: SearchStrategy::Vector(VectorSearchStrategy::new(store, provider)),
            weights: FusionWeights::from_config(&config),
            reranker,
            config,
        }
    }

    /// Use `reranker` for every query, regardless of `rerank.enabled`.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to `filter.top_k` results for `query` within
    /// `filter.org_id`. Never fails; failures are reported in the stats.
    pub async fn retrieve(&self, query: &str, filter: &SearchFilter) -> RetrievalOutcome {
        let mode = filter.strategy;
        let limit = self.config.candidates_for(filter.top_k);
        debug!("Retrieving for org {} (mode {}, top_k {}, {} candidates per strategy)", filter.org_id, mode, filter.top_k, limit);

        let runs: Vec<(&SearchStrategy, Result<Vec<RetrievalResult>>)> = match mode {
            StrategyMode::Lexical => vec![(&self.lexical, self.run(&self.lexical, query, limit, filter).await)],
            StrategyMode::Vector => vec![(&self.vector, self.run(&self.vector, query, limit, filter).await)],
            StrategyMode::Hybrid => {
                let (lexical, vector) = tokio::join!(
                    self.run(&self.lexical, query, limit, filter),
                    self.run(&self.vector, query, limit, filter)
                );
                vec![(&self.lexical, lexical), (&self.vector, vector)]
            }
        };

        let mut stats = RetrievalStats::empty(&filter.org_id, mode);
        let mut failures: Vec<String> = Vec::new();
        let mut lexical_hits = Vec::new();
        let mut vector_hits = Vec::new();
        let attempted = runs.len();
        for (strategy, outcome) in runs {
            match outcome {
                Ok(hits) => match strategy {
                    SearchStrategy::Lexical(_) => lexical_hits = hits,
                    SearchStrategy::Vector(_) => vector_hits = hits,
                },
                Err(e) => {
                    warn!(kind = e.kind(), "{} search failed for org {}: {}", strategy.name(), filter.org_id, e);
                    failures.push(format!("{} [{}]: {}", strategy.name(), e.kind(), e));
                    stats.degraded.push(strategy.name().to_string());
                }
            }
        }

        if failures.len() == attempted {
            stats.search_successful = false;
            stats.error = Some(failures.join("; "));
            stats.degraded.clear();
            return RetrievalOutcome { results: Vec::new(), stats };
        }

        let mut results = fuse(lexical_hits, vector_hits, self.weights);
        stats.total_found = results.len();
        if let Some(reranker) = &self.reranker {
            let (reranked, applied) = apply_rerank(reranker.as_ref(), query, results, &self.config.rerank);
            results = reranked;
            stats.reranked = applied;
        }
        results.truncate(filter.top_k);
        stats.returned = results.len();
        debug!("Org {}: {} candidates, returning {}", filter.org_id, stats.total_found, stats.returned);
        RetrievalOutcome { results, stats }
    }

    async fn run(&self, strategy: &SearchStrategy, query: &str, limit: usize, filter: &SearchFilter) -> Result<Vec<RetrievalResult>> {
        let timeout = self.config.strategy_timeout();
        match tokio::time::timeout(timeout, strategy.search(query, limit, &filter.org_id, &filter.filters)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}
