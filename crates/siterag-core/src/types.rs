//! Domain types shared by the chunker, the content stores and the retrieval path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

pub const DEFAULT_TOP_K: usize = 5;

/// An extracted page or article, as handed over by the crawler.
///
/// Immutable once stored except for `processed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub org_id: String,
    pub domain: String,
    pub url: String,
    pub title: String,
    pub text: String,
    pub content_type: String,
    pub extracted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_id: Option<String>,
    #[serde(default)]
    pub processed: bool,
}

/// A bounded span of a document's text; the unit of retrieval.
///
/// - `id`: `"{document_id}:{chunk_index}"` when produced by the chunker
/// - `org_id`: denormalized tenant for tenant-scoped queries
/// - `start_char`/`end_char`: character offsets into the parent text
/// - `embedding`: attached in a second pass, may be missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: String,
    pub org_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub start_char: usize,
    pub end_char: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Meta,
}

impl Chunk {
    /// Identity used for de-duplication: the chunk id, or
    /// `(document_id, chunk_index)` when the id is absent.
    pub fn identity(&self) -> String {
        chunk_identity(&self.id, &self.document_id, self.chunk_index)
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|v| !v.is_empty())
    }
}

fn chunk_identity(id: &str, document_id: &str, chunk_index: usize) -> String {
    if id.is_empty() {
        format!("{}#{}", document_id, chunk_index)
    } else {
        id.to_string()
    }
}

/// Which component produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Lexical,
    Vector,
    Fused,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Lexical => "lexical",
            Provenance::Vector => "vector",
            Provenance::Fused => "fused",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-component scores carried alongside the final score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub lexical: Option<f32>,
    pub vector: Option<f32>,
    pub rerank: Option<f32>,
}

/// A transient per-query hit. `score` is higher-is-better; within one list
/// scores are comparable, across strategies only after fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: ChunkId,
    pub content_id: String,
    pub chunk_index: usize,
    pub org_id: String,
    pub content: String,
    pub score: f32,
    pub provenance: Provenance,
    #[serde(default)]
    pub scores: ScoreBreakdown,
    #[serde(default)]
    pub metadata: Meta,
}

impl RetrievalResult {
    pub fn from_chunk(chunk: &Chunk, score: f32, provenance: Provenance) -> Self {
        let mut scores = ScoreBreakdown::default();
        match provenance {
            Provenance::Lexical => scores.lexical = Some(score),
            Provenance::Vector => scores.vector = Some(score),
            Provenance::Fused => {}
        }
        Self {
            chunk_id: chunk.id.clone(),
            content_id: chunk.document_id.clone(),
            chunk_index: chunk.chunk_index,
            org_id: chunk.org_id.clone(),
            content: chunk.content.clone(),
            score,
            provenance,
            scores,
            metadata: chunk.metadata.clone(),
        }
    }

    pub fn identity(&self) -> String {
        chunk_identity(&self.chunk_id, &self.content_id, self.chunk_index)
    }
}

/// Optional narrowing applied on top of the mandatory tenant scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_id: Option<String>,
}

impl ContentFilters {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        fn ok(want: &Option<String>, have: Option<&str>) -> bool {
            match want {
                Some(w) => have == Some(w.as_str()),
                None => true,
            }
        }
        ok(&self.domain, chunk.meta("domain"))
            && ok(&self.content_type, chunk.meta("content_type"))
            && ok(&self.crawl_id, chunk.meta("crawl_id"))
    }
}

/// Retrieval strategy selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    Lexical,
    Vector,
    #[default]
    Hybrid,
}

impl StrategyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyMode::Lexical => "lexical",
            StrategyMode::Vector => "vector",
            StrategyMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lexical" | "text" | "keyword" => Ok(StrategyMode::Lexical),
            "vector" | "semantic" => Ok(StrategyMode::Vector),
            "hybrid" => Ok(StrategyMode::Hybrid),
            other => Err(Error::InvalidConfig(format!("unknown strategy '{}'", other))),
        }
    }
}

/// Immutable query-time configuration. `org_id` is mandatory and is never
/// defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub org_id: String,
    #[serde(default)]
    pub filters: ContentFilters,
    pub top_k: usize,
    #[serde(default)]
    pub strategy: StrategyMode,
}

impl SearchFilter {
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            filters: ContentFilters::default(),
            top_k: DEFAULT_TOP_K,
            strategy: StrategyMode::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyMode) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.filters.domain = Some(domain.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.filters.content_type = Some(content_type.into());
        self
    }

    pub fn with_crawl_id(mut self, crawl_id: impl Into<String>) -> Self {
        self.filters.crawl_id = Some(crawl_id.into());
        self
    }
}

/// Per-query retrieval statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub total_found: usize,
    pub returned: usize,
    pub strategy_used: StrategyMode,
    pub org_id: String,
    pub search_successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Strategies that failed or timed out while others still answered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
    #[serde(default)]
    pub reranked: bool,
}

impl RetrievalStats {
    pub fn empty(org_id: &str, strategy: StrategyMode) -> Self {
        Self {
            total_found: 0,
            returned: 0,
            strategy_used: strategy,
            org_id: org_id.to_string(),
            search_successful: true,
            error: None,
            degraded: Vec::new(),
            reranked: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub chunk_id: ChunkId,
    pub content_id: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub org_id: String,
    pub score: f32,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// Caller-facing view of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: ResultMetadata,
}

impl RetrievedChunk {
    pub fn from_result(result: &RetrievalResult, max_chars: usize) -> Self {
        let meta = |key: &str| result.metadata.get(key).cloned();
        Self {
            content: truncate_chars(&result.content, max_chars),
            metadata: ResultMetadata {
                chunk_id: result.chunk_id.clone(),
                content_id: result.content_id.clone(),
                chunk_index: result.chunk_index,
                domain: meta("domain"),
                title: meta("title"),
                url: meta("url"),
                org_id: result.org_id.clone(),
                score: result.score,
                provenance: result.provenance,
                rerank_score: result.scores.rerank,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub results: Vec<RetrievedChunk>,
    pub retrieval_stats: RetrievalStats,
}

/// Per-tenant store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
}

/// Truncate to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
