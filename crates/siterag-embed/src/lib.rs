//! Embedders for siterag.
//!
//! - [`HashEmbedder`]: deterministic feature hashing, always available
//! - `EmbeddingModel`: BGE-M3 through candle (feature `model`)
//! - [`EmbeddingProvider`]: the wrapper retrieval and ingestion use
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use siterag_core::config::EmbeddingConfig;
use siterag_core::traits::Embedder;

pub mod hash;
pub mod provider;

#[cfg(feature = "model")]
pub mod encode;
#[cfg(feature = "model")]
pub mod model;
#[cfg(feature = "model")]
pub mod pool;

pub use hash::HashEmbedder;
#[cfg(feature = "model")]
pub use model::EmbeddingModel;
#[cfg(feature = "model")]
pub use pool::sentence_embeddings;
pub use provider::EmbeddingProvider;

/// Dimension of the hashing embedder when it stands in for BGE-M3.
pub const DEFAULT_DIM: usize = 1024;

fn fake_requested(config: &EmbeddingConfig) -> bool {
    config.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// The hashing embedder when requested (`embedding.use_fake` or
/// `APP_USE_FAKE_EMBEDDINGS=1`) or when built without `model`; BGE-M3
/// otherwise.
pub fn get_default_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if fake_requested(config) {
        info!("Using hashing embedder (dim {})", DEFAULT_DIM);
        return Ok(Arc::new(HashEmbedder::new(DEFAULT_DIM)));
    }
    #[cfg(feature = "model")]
    {
        Ok(Arc::new(EmbeddingModel::new(config.model_dir.as_deref())?))
    }
    #[cfg(not(feature = "model"))]
    {
        tracing::warn!("Built without the `model` feature; falling back to the hashing embedder");
        Ok(Arc::new(HashEmbedder::new(DEFAULT_DIM)))
    }
}
