//! # docrag
//!
//! Documentation-site ingestion and retrieval-augmented answering.
//!
//! docrag turns a seed URL into a deduplicated, scrape-once frontier of
//! pages, captures and chunks each page with heading-path metadata,
//! embeds the chunks, and ranks them by vector similarity to ground
//! answers to natural-language queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │   Frontier   │──▶│   Chunker     │──▶│  SQLite    │
//! │ sitemap/links│   │ windows+paths │   │ vectors    │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │   CLI    │       │   HTTP    │
//!                    │ (docrag) │       │  (axum)   │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docrag init                          # create database
//! docrag crawl https://docs.example.com
//! docrag chunk                         # split captured pages
//! docrag embed pending                 # generate embeddings
//! docrag retrieve "how do I authenticate"
//! docrag serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`frontier`] | URL crawl-state machine |
//! | [`sitemap`] | Sitemap discovery |
//! | [`harvest`] | Link-harvesting discovery |
//! | [`crawl`] | Crawl orchestration |
//! | [`ratelimit`] | Fixed-window fetch budget |
//! | [`headings`] | Heading-path indexing |
//! | [`chunker`] | Chunk splitting and annotation |
//! | [`process`] | Page → chunk batches |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retrieve`] | Vector-similarity retrieval |
//! | [`answer`] | Grounded answer generation |
//! | [`blobstore`] | Raw payload storage |
//! | [`server`] | HTTP API server |

pub mod answer;
pub mod blobstore;
pub mod chunker;
pub mod config;
pub mod crawl;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod frontier;
pub mod harvest;
pub mod headings;
pub mod markdown;
pub mod migrate;
pub mod models;
pub mod process;
pub mod provider;
pub mod ratelimit;
pub mod reader;
pub mod retrieve;
pub mod server;
pub mod sitemap;
pub mod sources;
