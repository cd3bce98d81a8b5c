//! Vector retrieval for siterag.
//!
//! [`VectorSearchStrategy`] works against any content store; with the
//! `lance` feature a LanceDB-backed store with native ANN search is
//! available as well.
pub mod strategy;

#[cfg(feature = "lance")]
pub mod lance;

#[cfg(feature = "lance")]
pub use lance::{LanceStore, DEFAULT_TABLE};
pub use strategy::{similarity_scan, VectorSearchStrategy};
