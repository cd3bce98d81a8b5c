//! siterag-text
//!
//! Tantivy-backed content store and the lexical retrieval strategy. See
//! `store` for the index layout and `strategy` for the scan fallback used
//! with stores that have no full-text index.
pub mod tantivy_utils;
pub mod store;
pub mod strategy;

pub use store::TantivyStore;
pub use strategy::{keyword_scan, LexicalSearchStrategy};
