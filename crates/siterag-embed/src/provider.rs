//! Embedding provider: truncation, content-hash cache and null-on-failure.
//!
//! The same provider embeds chunk bodies at ingest time and queries at
//! retrieval time, so both sides share truncation and model. Failures never
//! surface as errors; callers get `None` and treat the text as having no
//! embedding.

use moka::sync::Cache;
use std::sync::Arc;
use tracing::{debug, warn};

use siterag_core::config::EmbeddingConfig;
use siterag_core::traits::Embedder;

fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

pub struct EmbeddingProvider {
    embedder: Arc<dyn Embedder>,
    max_chars: usize,
    /// Keyed by the blake3 hash of the truncated input; `None` when
    /// `cache_capacity` is 0.
    cache: Option<Cache<String, Vec<f32>>>,
}

impl EmbeddingProvider {
    pub fn new(embedder: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        let cache = (config.cache_capacity > 0).then(|| Cache::builder().max_capacity(config.cache_capacity as u64).build());
        Self { embedder, max_chars: config.max_chars, cache }
    }

    pub fn dim(&self) -> usize {
        self.embedder.dim()
    }

    /// Embed one text. `None` for empty input or when the embedder fails.
    pub fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_batch(&[text.to_string()]).pop().flatten()
    }

    /// Embed many texts; the output is aligned with `texts`. Cached inputs
    /// are not re-embedded and a failing batch yields `None` for every miss.
    pub fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, String, String)> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            let input = self.truncate(text);
            let key = hash_content(&input);
            match self.cache.as_ref().and_then(|c| c.get(&key)) {
                Some(hit) => out[i] = Some(hit),
                None => misses.push((i, input, key)),
            }
        }
        if misses.is_empty() {
            return out;
        }
        debug!("Embedding {} texts ({} cached)", misses.len(), texts.len() - misses.len());

        let inputs: Vec<String> = misses.iter().map(|(_, input, _)| input.clone()).collect();
        let vectors = match self.embedder.embed_batch(&inputs) {
            Ok(v) if v.len() == inputs.len() => v,
            Ok(v) => {
                warn!("Embedder returned {} vectors for {} inputs; treating as unavailable", v.len(), inputs.len());
                return out;
            }
            Err(e) => {
                warn!("Embedding failed, continuing without vectors: {}", e);
                return out;
            }
        };

        let dim = self.dim();
        for ((i, _, key), vector) in misses.into_iter().zip(vectors) {
            if vector.len() != dim {
                warn!("Embedding has dimension {} (expected {}); dropped", vector.len(), dim);
                continue;
            }
            if let Some(cache) = &self.cache {
                cache.insert(key, vector.clone());
            }
            out[i] = Some(vector);
        }
        out
    }

    fn truncate(&self, text: &str) -> String {
        if self.max_chars == 0 {
            return text.to_string();
        }
        text.chars().take(self.max_chars).collect()
    }
}
