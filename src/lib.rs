//! # MemeDoc
//!
//! Meme template tracking: pull candidate images from social sources,
//! fingerprint them with perceptual hashes, and watch templates spread.
//!
//! MemeDoc runs a bounded-concurrency ingestion pipeline (network fetch,
//! CPU extraction on a blocking worker pool, batched dedup persistence)
//! into SQLite, then applies the pattern engine from `memedoc-core` to
//! the stored history.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────────┐   ┌──────────┐
//! │  Scrapers   │──▶│    Pipeline      │──▶│  SQLite   │
//! │ (manifest)  │   │ fetch+hash+dedup │   │ records   │
//! └─────────────┘   └─────────────────┘   └────┬─────┘
//!                                              │
//!                                              ▼
//!                                      ┌──────────────┐
//!                                      │ PatternEngine │
//!                                      │ trends/similar│
//!                                      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! memedoc init
//! memedoc sources
//! memedoc ingest reddit --topic programming --limit 200
//! memedoc patterns --window-hours 24
//! memedoc similar reddit t3_abc123
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Per-item fetch/extraction failures |
//! | [`scraper`] | Source scraper trait, manifest scraper, registry |
//! | [`fetch`] | HTTP media fetcher |
//! | [`imagehash`] | Perceptual hashes and layout detection |
//! | [`extract`] | Feature extraction on the blocking pool |
//! | [`pipeline`] | Concurrent ingestion with dedup persistence |
//! | [`sqlite_store`] | SQLite fingerprint store |
//! | [`trends`] | Emerging patterns, similarity, template evolution |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod imagehash;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod scraper;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod trends;
