//! # docrag CLI
//!
//! The `docrag` binary drives the full pipeline: register and crawl a
//! documentation site, chunk its captured pages, embed the chunks, and
//! query the corpus.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag init` | Create the SQLite database and run schema migrations |
//! | `docrag sources` | List registered sources and their crawl progress |
//! | `docrag crawl <url>` | Discover and scrape a documentation site |
//! | `docrag chunk` | Chunk all captured-but-unprocessed pages |
//! | `docrag embed pending` | Embed chunks that have no vector yet |
//! | `docrag embed rebuild` | Clear and regenerate all embeddings |
//! | `docrag retrieve "<query>"` | Rank chunks against a query |
//! | `docrag ask "<query>"` | Generate a grounded answer for a query |
//! | `docrag serve` | Start the HTTP API server |

mod answer;
mod blobstore;
mod chunker;
mod config;
mod crawl;
mod db;
mod embed_cmd;
mod embedding;
mod frontier;
mod harvest;
mod headings;
mod markdown;
mod migrate;
mod models;
mod process;
mod provider;
mod ratelimit;
mod reader;
mod retrieve;
mod server;
mod sitemap;
mod sources;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// docrag — documentation-site ingestion and retrieval-augmented
/// answering.
#[derive(Parser)]
#[command(
    name = "docrag",
    about = "docrag — crawl documentation sites, chunk and embed their pages, answer queries against them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (sources, urls, pages, chunks). Idempotent.
    Init,

    /// List registered sources and their crawl progress.
    Sources,

    /// Discover and scrape a documentation site.
    ///
    /// Registers the root URL as a source (idempotently), discovers
    /// page URLs via the sitemap — falling back to link harvesting —
    /// and captures every not-yet-scraped page under the configured
    /// request budget.
    Crawl {
        /// Root URL of the documentation site.
        url: String,

        /// Display name for the source (defaults to the host).
        #[arg(long)]
        name: Option<String>,
    },

    /// Chunk all captured pages that have not been processed yet.
    ///
    /// Pages are split into overlapping windows, annotated with their
    /// heading path and code flag, and stamped `processed_at` so they
    /// are never re-chunked.
    Chunk,

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Rank chunks against a query and print them with provenance.
    Retrieve {
        /// The query string.
        query: String,

        /// Maximum number of chunks to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Generate a grounded answer for a query.
    Ask {
        /// The question to answer.
        query: String,
    },

    /// Start the HTTP API server.
    Serve,
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that have no embedding yet.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docrag=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Crawl { url, name } => {
            let report = crawl::run_crawl(&cfg, &url, name).await?;
            println!("crawl {}", url);
            println!("  discovered: {} urls", report.discovered);
            println!("  scraped: {}", report.scraped);
            println!("  failed: {}", report.failed);
            for failure in &report.failures {
                println!("    ! {}", failure);
            }
            println!("ok");
        }
        Commands::Chunk => {
            let report = process::run_chunk_pages(&cfg).await?;
            println!("chunk");
            println!("  pages processed: {}", report.succeeded);
            println!("  pages skipped: {}", report.skipped);
            println!("  pages failed: {}", report.failed);
            println!("ok");
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit } => {
                let report = embed_cmd::run_embed_pending(&cfg, limit).await?;
                println!("embed pending");
                println!("  embedded: {}", report.succeeded);
                println!("  failed: {}", report.failed);
                println!("ok");
            }
            EmbedAction::Rebuild => {
                let report = embed_cmd::run_embed_rebuild(&cfg).await?;
                println!("embed rebuild");
                println!("  embedded: {}", report.succeeded);
                println!("  failed: {}", report.failed);
                println!("ok");
            }
        },
        Commands::Retrieve { query, limit } => {
            retrieve::run_retrieve(&cfg, &query, limit).await?;
        }
        Commands::Ask { query } => {
            answer::run_ask(&cfg, &query).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
