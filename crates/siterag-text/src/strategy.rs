use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use siterag_core::error::{Error, Result};
use siterag_core::text::{only_stop_words, query_terms};
use siterag_core::traits::ContentStore;
use siterag_core::types::{Chunk, ContentFilters, Provenance, RetrievalResult};

/// Full-text retrieval over a [`ContentStore`].
///
/// Uses the store's ranked index when it has one. Stores that answer
/// `Unsupported` are scanned instead: a chunk qualifies when it contains
/// any query term, and scores the fraction of query terms it contains.
/// Queries made only of stop words are always scanned, since the index
/// analyzer strips every term.
#[derive(Clone)]
pub struct LexicalSearchStrategy {
	store: Arc<dyn ContentStore>,
}

impl LexicalSearchStrategy {
	pub fn new(store: Arc<dyn ContentStore>) -> Self {
		Self { store }
	}

	pub async fn search(&self, query: &str, limit: usize, org_id: &str, filters: &ContentFilters) -> Result<Vec<RetrievalResult>> {
		if org_id.trim().is_empty() {
			return Err(Error::InvalidConfig("org_id is required".to_string()));
		}
		if query.trim().is_empty() || limit == 0 {
			return Ok(Vec::new());
		}
		if only_stop_words(query) {
			debug!("Query has only stop words; scanning chunks for org {}", org_id);
			return self.scan(query, limit, org_id, filters).await;
		}
		match self.store.search_lexical(org_id, query, limit, filters).await {
			Err(Error::Unsupported(reason)) => {
				debug!("Full-text search unsupported ({}); scanning chunks for org {}", reason, org_id);
				self.scan(query, limit, org_id, filters).await
			}
			other => other,
		}
	}

	async fn scan(&self, query: &str, limit: usize, org_id: &str, filters: &ContentFilters) -> Result<Vec<RetrievalResult>> {
		let chunks = self.store.get_chunks_by_org(org_id, filters).await?;
		Ok(keyword_scan(query, &chunks, limit))
	}
}

/// Rank `chunks` by how many distinct query terms they contain.
///
/// Ties on matched terms go to the longer chunk, then to chunk identity.
pub fn keyword_scan(query: &str, chunks: &[Chunk], limit: usize) -> Vec<RetrievalResult> {
	let terms = query_terms(query);
	if terms.is_empty() {
		return Vec::new();
	}
	let mut matched: Vec<(usize, &Chunk)> = chunks
		.iter()
		.filter_map(|chunk| {
			let tokens: HashSet<String> = chunk
				.content
				.split(|c: char| !c.is_alphanumeric())
				.filter(|t| !t.is_empty())
				.map(str::to_lowercase)
				.collect();
			let hits = terms.iter().filter(|t| tokens.contains(t.as_str())).count();
			(hits > 0).then_some((hits, chunk))
		})
		.collect();
	matched.sort_by(|(ha, a), (hb, b)| {
		hb.cmp(ha)
			.then_with(|| b.content.chars().count().cmp(&a.content.chars().count()))
			.then_with(|| a.identity().cmp(&b.identity()))
	});
	matched
		.into_iter()
		.take(limit)
		.map(|(hits, chunk)| RetrievalResult::from_chunk(chunk, hits as f32 / terms.len() as f32, Provenance::Lexical))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use siterag_core::types::Meta;

	fn chunk(idx: usize, content: &str) -> Chunk {
		Chunk {
			id: format!("doc:{}", idx),
			document_id: "doc".to_string(),
			org_id: "org".to_string(),
			chunk_index: idx,
			content: content.to_string(),
			start_char: 0,
			end_char: content.chars().count(),
			embedding: None,
			metadata: Meta::new(),
		}
	}

	#[test]
	fn scan_orders_by_matched_terms_then_length() {
		let chunks = vec![
			chunk(1, "Marketing basics."),
			chunk(2, "A marketing strategy for spring."),
			chunk(3, "Nothing relevant here."),
			chunk(4, "Marketing, explained at length for everyone."),
		];
		let hits = keyword_scan("marketing strategy", &chunks, 10);
		let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
		assert_eq!(ids, vec!["doc:2", "doc:4", "doc:1"]);
		assert_eq!(hits[0].score, 1.0);
		assert_eq!(hits[1].score, 0.5);
	}

	#[test]
	fn scan_respects_limit_and_empty_terms() {
		let chunks = vec![chunk(1, "alpha"), chunk(2, "alpha beta")];
		assert_eq!(keyword_scan("alpha", &chunks, 1).len(), 1);
		assert!(keyword_scan(" ?! ", &chunks, 5).is_empty());
	}
}
