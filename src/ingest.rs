//! `memedoc ingest`: discover items from one source and run them through
//! the pipeline into the SQLite store.
//!
//! Each invocation builds its own HTTP fetcher and pipeline; both are
//! dropped when the command returns.

use anyhow::{bail, Context, Result};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::extract::ImageHashExtractor;
use crate::fetch::HttpFetcher;
use crate::pipeline::{BatchResult, IngestionPipeline, MAX_GATE_PERMITS};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};
use crate::scraper::{discover_items, ScraperRegistry};
use crate::sqlite_store::SqliteStore;

/// Options for one `memedoc ingest` call.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub source: String,
    pub topic: String,
    pub limit: usize,
    /// Overrides `pipeline.concurrency`.
    pub concurrency: Option<usize>,
    pub dry_run: bool,
    pub progress: ProgressMode,
}

pub async fn run_ingest(config: &Config, opts: &IngestOptions) -> Result<Option<BatchResult>> {
    let registry = ScraperRegistry::from_config(config)?;
    let Some(scraper) = registry.get(&opts.source) else {
        let available = registry.names().join(", ");
        bail!(
            "Unknown or disabled source: '{}'. Available: {}",
            opts.source,
            if available.is_empty() { "(none)" } else { available.as_str() }
        );
    };

    let concurrency = match opts.concurrency {
        Some(n) if n > MAX_GATE_PERMITS => {
            bail!("--concurrency must be <= {}", MAX_GATE_PERMITS)
        }
        Some(n) => NonZeroUsize::new(n).context("--concurrency must be >= 1")?,
        None => config.concurrency()?,
    };

    let reporter: Arc<dyn IngestProgressReporter> = Arc::from(opts.progress.reporter());
    reporter.report(IngestProgressEvent::Discovering {
        source: opts.source.clone(),
    });

    if !scraper
        .authenticate()
        .await
        .with_context(|| format!("Failed to authenticate source '{}'", opts.source))?
    {
        bail!("Source '{}' refused authentication", opts.source);
    }

    let items = discover_items(scraper, &opts.topic, opts.limit).await;
    info!(
        source = opts.source.as_str(),
        topic = opts.topic.as_str(),
        items = items.len(),
        "Discovered media items"
    );

    if opts.dry_run {
        println!("ingest {} (dry-run)", opts.source);
        println!("  topic: {}", opts.topic);
        println!("  media items found: {}", items.len());
        return Ok(None);
    }

    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let extractor = Arc::new(ImageHashExtractor::new(config.extract.min_dimension));
    let fetcher = HttpFetcher::new(&config.fetch, concurrency.get())?;
    let pipeline = IngestionPipeline::new(
        store,
        extractor,
        config.pipeline.workers,
        config.pipeline.bulk_fallback,
    )?
    .with_progress(opts.source.clone(), reporter);

    let result = pipeline.run(&fetcher, &items, concurrency).await;
    print_batch(&opts.source, &result);

    pool.close().await;
    Ok(Some(result))
}

fn print_batch(source: &str, result: &BatchResult) {
    println!("ingest {}", source);
    println!("  items: {}", result.total);
    println!("  fingerprinted: {}", result.successful);
    println!("  new records: {}", result.new_records);
    if result.fetch_failures > 0 {
        println!("  fetch failures: {}", result.fetch_failures);
    }
    if result.extraction_failures > 0 {
        println!("  extraction failures: {}", result.extraction_failures);
    }
    if result.used_fallback {
        println!(
            "  bulk write failed; per-record fallback used ({} lost)",
            result.persist_failures
        );
    } else if result.persist_failures > 0 {
        println!("  records not persisted: {}", result.persist_failures);
    }
    println!(
        "  elapsed: {:.2}s ({:.1} items/s)",
        result.elapsed.as_secs_f64(),
        result.throughput
    );
    println!("ok");
}
