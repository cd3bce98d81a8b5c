//! # siterag
//!
//! Command-line front end for the retrieval subsystem.
//!
//! - `siterag ingest <DIR> --org <ID>`: chunk, embed and index a directory
//! - `siterag query <TEXT> --org <ID>`: retrieve and rank chunks
//! - `siterag backfill --org <ID>`: embed chunks stored without a vector
//! - `siterag stats --org <ID>`: document and chunk counters
//!
//! Settings come from `config.toml`, `config.<RUST_ENV>.toml` and `APP_*`
//! environment variables. `--store lance` switches from the Tantivy index
//! to a LanceDB table (build with `--features lance`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use siterag_core::config::{Config, Settings};
use siterag_core::data_processor::DocumentLoader;
use siterag_core::traits::ContentStore;
use siterag_core::types::{SearchFilter, StrategyMode};
use siterag_embed::{get_default_embedder, EmbeddingProvider};
use siterag_hybrid::{Ingestor, RetrievalService};
use siterag_text::TantivyStore;

#[derive(Parser)]
#[command(name = "siterag")]
#[command(about = "Chunk, index and search crawled web content")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG is ignored)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Content store backend
    #[arg(long, value_enum, global = true, default_value_t = StoreKind::Tantivy)]
    store: StoreKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    /// Tantivy BM25 index under `data.index_dir`
    Tantivy,
    /// LanceDB table under `data.lancedb_dir` with native vector search
    Lance,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest .json/.txt/.md documents from a directory
    Ingest {
        dir: PathBuf,

        #[arg(long)]
        org: String,

        /// Only ingest the first N files
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Retrieve and rank chunks for a query
    Query {
        text: String,

        #[arg(long)]
        org: String,

        /// lexical, vector or hybrid
        #[arg(long, default_value = "hybrid")]
        strategy: StrategyMode,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[arg(long)]
        domain: Option<String>,

        #[arg(long)]
        content_type: Option<String>,

        #[arg(long)]
        crawl_id: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Embed stored chunks that have no embedding yet
    Backfill {
        #[arg(long)]
        org: String,
    },

    /// Show store counters for an organization
    Stats {
        #[arg(long)]
        org: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Store and embedding provider shared by every command.
struct Backend {
    store: Arc<dyn ContentStore>,
    provider: Arc<EmbeddingProvider>,
}

impl Backend {
    async fn open(settings: &Settings, kind: StoreKind) -> Result<Self> {
        let embedder = get_default_embedder(&settings.embedding)?;
        let provider = Arc::new(EmbeddingProvider::new(embedder, &settings.embedding));
        let store: Arc<dyn ContentStore> = match kind {
            StoreKind::Tantivy => {
                let index_dir = settings.data.index_path();
                let store = TantivyStore::open_or_create(&index_dir)
                    .with_context(|| format!("Failed to open index at {}", index_dir.display()))?;
                Arc::new(store)
            }
            StoreKind::Lance => open_lance(settings, provider.dim()).await?,
        };
        Ok(Self { store, provider })
    }
}

#[cfg(feature = "lance")]
async fn open_lance(settings: &Settings, dim: usize) -> Result<Arc<dyn ContentStore>> {
    use siterag_vector::{LanceStore, DEFAULT_TABLE};

    let dir = settings.data.lancedb_path();
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let store = LanceStore::open(&dir.to_string_lossy(), DEFAULT_TABLE, dim)
        .await
        .with_context(|| format!("Failed to open LanceDB at {}", dir.display()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "lance"))]
async fn open_lance(_settings: &Settings, _dim: usize) -> Result<Arc<dyn ContentStore>> {
    anyhow::bail!("this build has no LanceDB support; rebuild with `--features lance`")
}

async fn ingest(settings: &Settings, backend: Backend, dir: PathBuf, org: &str, limit: Option<usize>) -> Result<()> {
    let loader = DocumentLoader::new(org);
    let documents = loader.load_directory_limited(&dir, limit.unwrap_or(usize::MAX))?;
    if documents.is_empty() {
        println!("No documents found under {}", dir.display());
        return Ok(());
    }
    let ingestor = Ingestor::new(backend.store, backend.provider, settings.chunking.clone());

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );
    let (mut chunks, mut embedded, mut failed) = (0, 0, 0);
    for document in &documents {
        pb.set_message(document.id.clone());
        match ingestor.process_document(document).await {
            Ok(report) => {
                chunks += report.chunks;
                embedded += report.embedded;
            }
            Err(e) => {
                warn!("Failed to ingest {}: {}", document.id, e);
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("Ingest finished for org {}", org);
    println!("Ingested {} documents ({} chunks, {} embedded)", documents.len() - failed, chunks, embedded);
    if failed > 0 {
        println!("{} documents failed; see the log for details", failed);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn query(
    settings: Settings,
    backend: Backend,
    text: &str,
    org: String,
    strategy: StrategyMode,
    top_k: Option<usize>,
    domain: Option<String>,
    content_type: Option<String>,
    crawl_id: Option<String>,
    json: bool,
) -> Result<()> {
    let service = RetrievalService::new(backend.store, backend.provider, settings.retrieval)?;
    let mut filter = service.filter_for(org).with_strategy(strategy);
    if let Some(k) = top_k {
        filter = filter.with_top_k(k);
    }
    filter.filters.domain = domain;
    filter.filters.content_type = content_type;
    filter.filters.crawl_id = crawl_id;

    let response = service.retrieve_and_rank(text, &filter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let stats = &response.retrieval_stats;
    if !stats.search_successful {
        println!("Search failed: {}", stats.error.as_deref().unwrap_or("unknown error"));
        return Ok(());
    }
    println!("{} of {} results ({} search, org {})", stats.returned, stats.total_found, stats.strategy_used, stats.org_id);
    if !stats.degraded.is_empty() {
        println!("Degraded: {} unavailable", stats.degraded.join(", "));
    }
    for (i, r) in response.results.iter().enumerate() {
        let m = &r.metadata;
        println!("\n{}. {} [{} {:.3}]", i + 1, m.title.as_deref().unwrap_or(&m.content_id), m.provenance, m.score);
        if let Some(url) = &m.url {
            println!("   {}", url);
        }
        println!("   {}", r.content.replace('\n', " "));
    }
    Ok(())
}

async fn backfill(settings: &Settings, backend: Backend, org: &str) -> Result<()> {
    let ingestor = Ingestor::new(backend.store, backend.provider, settings.chunking.clone());
    let report = ingestor.backfill_embeddings(org).await?;
    println!(
        "Embedded {} chunks across {} documents ({} still missing)",
        report.chunks_embedded, report.documents_updated, report.chunks_missing
    );
    Ok(())
}

async fn stats(backend: Backend, org: &str) -> Result<()> {
    let stats = backend.store.stats(org).await?;
    println!("Organization: {}", org);
    println!("Documents:    {}", stats.documents);
    println!("Chunks:       {}", stats.chunks);
    println!("Embedded:     {}", stats.embedded_chunks);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = Config::load()
        .and_then(|c| c.settings())
        .map_err(|e| {
            eprintln!("Error loading config: {}", e);
            e
        })?;

    let backend = Backend::open(&settings, cli.store).await?;

    match cli.command {
        Commands::Ingest { dir, org, limit } => ingest(&settings, backend, dir, &org, limit).await,
        Commands::Query { text, org, strategy, top_k, domain, content_type, crawl_id, json } => {
            query(settings, backend, &text, org, strategy, top_k, domain, content_type, crawl_id, json).await
        }
        Commands::Backfill { org } => backfill(&settings, backend, &org).await,
        Commands::Stats { org } => stats(backend, &org).await,
    }
}
