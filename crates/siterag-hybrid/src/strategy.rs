use siterag_core::error::Result;
use siterag_core::types::{ContentFilters, Provenance, RetrievalResult};
use siterag_text::LexicalSearchStrategy;
use siterag_vector::VectorSearchStrategy;

/// The retrieval strategies the hybrid retriever can run. Both answer the
/// same `search(query, limit, org_id, filters)` contract.
#[derive(Clone)]
pub enum SearchStrategy {
    Lexical(LexicalSearchStrategy),
    Vector(VectorSearchStrategy),
}

impl SearchStrategy {
    pub fn name(&self) -> &'static str {
        self.provenance().as_str()
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            SearchStrategy::Lexical(_) => Provenance::Lexical,
            SearchStrategy::Vector(_) => Provenance::Vector,
        }
    }

    pub async fn search(&self, query: &str, limit: usize, org_id: &str, filters: &ContentFilters) -> Result<Vec<RetrievalResult>> {
        match self {
            SearchStrategy::Lexical(s) => s.search(query, limit, org_id, filters).await,
            SearchStrategy::Vector(s) => s.search(query, limit, org_id, filters).await,
        }
    }
}
