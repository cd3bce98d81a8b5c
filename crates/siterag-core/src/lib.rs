//! Shared domain types, chunking and configuration for siterag.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod memory;
pub mod similarity;
pub mod text;
pub mod traits;
pub mod types;

pub use chunker::{Chunker, ChunkingConfig, TextChunk};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use traits::{ContentStore, Embedder};
pub use types::*;
