//! Hybrid retrieval for siterag: strategy selection, score fusion,
//! reranking, the [`RetrievalService`] facade and the ingestion pipeline.
pub mod fusion;
pub mod ingest;
pub mod rerank;
pub mod retriever;
pub mod service;
pub mod strategy;

pub use fusion::{fuse, min_max_normalize, FusionWeights};
pub use ingest::{BackfillReport, IngestReport, Ingestor};
pub use rerank::{apply_rerank, Reranker, TermProximityReranker};
pub use retriever::{HybridRetriever, RetrievalOutcome};
pub use service::RetrievalService;
pub use strategy::SearchStrategy;
