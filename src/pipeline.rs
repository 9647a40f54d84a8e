//! Concurrent ingestion: download, fingerprint, and persist a batch.
//!
//! # Flow
//!
//! ```text
//! items ──▶ fetch (≤ concurrency) ──▶ extract (≤ workers, blocking pool) ──┐
//!                                                                          ▼
//!                             BatchResult ◀── persist once (bulk, then per-record fallback)
//! ```
//!
//! Every item settles into an [`ItemOutcome`]; a failing item never stops
//! the others. The download permit is released before extraction starts,
//! so extraction of one item overlaps downloads of the next. Both gates
//! are created per run and dropped with it; the store's `(source,
//! item_id)` key is the only thing shared between runs.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use memedoc_core::models::{ContentItem, FingerprintRecord};
use memedoc_core::store::FingerprintStore;

use crate::config::BulkFallback;
use crate::error::{ExtractError, FetchError, ItemFailure, PipelineError};
use crate::extract::{extract_blocking, FeatureExtractor};
use crate::fetch::Fetcher;
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress};

/// How a single item settled.
#[derive(Debug)]
pub enum ItemOutcome {
    Extracted(FingerprintRecord),
    Failed {
        source: String,
        item_id: String,
        failure: ItemFailure,
    },
}

/// Summary of one [`IngestionPipeline::run`].
///
/// `new_records <= successful <= total` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    /// Items that produced a fingerprint record.
    pub successful: usize,
    /// Records whose key was not in the store before this run.
    pub new_records: usize,
    pub fetch_failures: usize,
    pub extraction_failures: usize,
    /// Records lost because both the bulk write and their fallback write failed.
    pub persist_failures: usize,
    /// Whether the bulk write failed and per-record writes were attempted.
    pub used_fallback: bool,
    pub elapsed: Duration,
    /// Items per second over the whole run.
    pub throughput: f64,
}

impl BatchResult {
    fn empty(elapsed: Duration) -> Self {
        Self {
            total: 0,
            successful: 0,
            new_records: 0,
            fetch_failures: 0,
            extraction_failures: 0,
            persist_failures: 0,
            used_fallback: false,
            elapsed,
            throughput: 0.0,
        }
    }
}

fn throughput(total: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        total as f64 / secs
    } else {
        0.0
    }
}

/// Result of the persistence step.
struct Persisted {
    new_records: usize,
    failures: usize,
    used_fallback: bool,
}

/// Largest accepted value for both the download and the extraction gate.
pub const MAX_GATE_PERMITS: usize = Semaphore::MAX_PERMITS;

/// Turns batches of [`ContentItem`]s into stored [`FingerprintRecord`]s.
pub struct IngestionPipeline {
    store: Arc<dyn FingerprintStore>,
    extractor: Arc<dyn FeatureExtractor>,
    workers: usize,
    bulk_fallback: BulkFallback,
    label: String,
    reporter: Arc<dyn IngestProgressReporter>,
}

impl IngestionPipeline {
    /// Build a pipeline with an extraction pool of `workers` slots.
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        extractor: Arc<dyn FeatureExtractor>,
        workers: usize,
        bulk_fallback: BulkFallback,
    ) -> Result<Self, PipelineError> {
        if workers == 0 {
            return Err(PipelineError::Configuration(
                "pipeline.workers must be >= 1".to_string(),
            ));
        }
        if workers > MAX_GATE_PERMITS {
            return Err(PipelineError::Configuration(format!(
                "pipeline.workers must be <= {}",
                MAX_GATE_PERMITS
            )));
        }
        Ok(Self {
            store,
            extractor,
            workers,
            bulk_fallback,
            label: "batch".to_string(),
            reporter: Arc::new(NoProgress),
        })
    }

    /// Report progress for this pipeline's runs under `label`.
    pub fn with_progress(
        mut self,
        label: impl Into<String>,
        reporter: Arc<dyn IngestProgressReporter>,
    ) -> Self {
        self.label = label.into();
        self.reporter = reporter;
        self
    }

    /// Fetch, fingerprint and persist `items`, with at most `concurrency`
    /// downloads in flight through `fetcher`. `concurrency` is clamped to
    /// [`MAX_GATE_PERMITS`].
    ///
    /// Never fails: per-item and persistence failures are counted in the
    /// returned [`BatchResult`].
    pub async fn run(
        &self,
        fetcher: &dyn Fetcher,
        items: &[ContentItem],
        concurrency: NonZeroUsize,
    ) -> BatchResult {
        let started = Instant::now();
        if items.is_empty() {
            return BatchResult::empty(started.elapsed());
        }

        let total = items.len();
        let concurrency = concurrency.get().min(MAX_GATE_PERMITS);
        let fetch_gate = Semaphore::new(concurrency);
        let cpu_gate = Semaphore::new(self.workers);
        let settled = AtomicU64::new(0);

        info!(
            source = self.label.as_str(),
            total,
            concurrency,
            workers = self.workers,
            "Starting batch"
        );

        let outcomes: Vec<ItemOutcome> = stream::iter(items.iter().map(|item| {
            let fetch_gate = &fetch_gate;
            let cpu_gate = &cpu_gate;
            let settled = &settled;
            async move {
                let outcome = self.process_item(fetcher, item, fetch_gate, cpu_gate).await;
                let n = settled.fetch_add(1, Ordering::Relaxed) + 1;
                self.reporter.report(IngestProgressEvent::Processing {
                    source: self.label.clone(),
                    n,
                    total: total as u64,
                });
                outcome
            }
        }))
        .buffer_unordered(concurrency.saturating_add(self.workers))
        .collect()
        .await;

        let mut records = Vec::with_capacity(outcomes.len());
        let mut fetch_failures = 0;
        let mut extraction_failures = 0;
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Extracted(record) => records.push(record),
                ItemOutcome::Failed {
                    source,
                    item_id,
                    failure,
                } => {
                    warn!(
                        source = source.as_str(),
                        item_id = item_id.as_str(),
                        error = %failure,
                        "Item failed"
                    );
                    match failure {
                        ItemFailure::Fetch(_) => fetch_failures += 1,
                        ItemFailure::Extraction(_) => extraction_failures += 1,
                    }
                }
            }
        }

        let successful = records.len();
        let persisted = self.persist(&records).await;

        let elapsed = started.elapsed();
        let result = BatchResult {
            total,
            successful,
            new_records: persisted.new_records.min(successful),
            fetch_failures,
            extraction_failures,
            persist_failures: persisted.failures,
            used_fallback: persisted.used_fallback,
            elapsed,
            throughput: throughput(total, elapsed),
        };

        info!(
            source = self.label.as_str(),
            total = result.total,
            successful = result.successful,
            new = result.new_records,
            fetch_failures = result.fetch_failures,
            extraction_failures = result.extraction_failures,
            used_fallback = result.used_fallback,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch complete"
        );
        result
    }

    async fn process_item(
        &self,
        fetcher: &dyn Fetcher,
        item: &ContentItem,
        fetch_gate: &Semaphore,
        cpu_gate: &Semaphore,
    ) -> ItemOutcome {
        let failed = |failure: ItemFailure| ItemOutcome::Failed {
            source: item.source.clone(),
            item_id: item.item_id.clone(),
            failure,
        };

        let bytes = {
            let _permit = match fetch_gate.acquire().await {
                Ok(permit) => permit,
                Err(_) => return failed(FetchError::Network("fetch gate closed".into()).into()),
            };
            match fetcher.fetch(&item.media_url).await {
                Ok(bytes) => bytes,
                Err(e) => return failed(e.into()),
            }
        };

        let media_sha256 = format!("{:x}", Sha256::digest(&bytes));
        debug!(
            source = item.source.as_str(),
            item_id = item.item_id.as_str(),
            bytes = bytes.len(),
            "Downloaded media"
        );

        let fingerprint = {
            let _permit = match cpu_gate.acquire().await {
                Ok(permit) => permit,
                Err(_) => return failed(ExtractError::Fault("worker pool closed".into()).into()),
            };
            match extract_blocking(self.extractor.clone(), bytes).await {
                Ok(fp) => fp,
                Err(e) => return failed(e.into()),
            }
        };

        let mut record = FingerprintRecord::from_item(item, fingerprint);
        record.media_sha256 = Some(media_sha256);
        ItemOutcome::Extracted(record)
    }

    async fn persist(&self, records: &[FingerprintRecord]) -> Persisted {
        if records.is_empty() {
            return Persisted {
                new_records: 0,
                failures: 0,
                used_fallback: false,
            };
        }

        self.reporter.report(IngestProgressEvent::Persisting {
            source: self.label.clone(),
            records: records.len() as u64,
        });

        let bulk_error = match self.store.bulk_upsert(records).await {
            Ok(new) => {
                return Persisted {
                    new_records: new as usize,
                    failures: 0,
                    used_fallback: false,
                }
            }
            Err(e) => e,
        };

        if self.bulk_fallback == BulkFallback::Disabled {
            error!(
                records = records.len(),
                error = %bulk_error,
                "Bulk write failed and fallback is disabled; batch not persisted"
            );
            return Persisted {
                new_records: 0,
                failures: records.len(),
                used_fallback: false,
            };
        }

        warn!(
            records = records.len(),
            error = %bulk_error,
            "Bulk write failed, falling back to per-record inserts"
        );

        let mut new_records = 0;
        let mut failures = 0;
        for record in records {
            match self.store.insert_if_absent(record).await {
                Ok(Some(_)) => new_records += 1,
                Ok(None) => {}
                Err(e) => {
                    failures += 1;
                    warn!(
                        source = record.source.as_str(),
                        item_id = record.item_id.as_str(),
                        error = %e,
                        "Per-record insert failed"
                    );
                }
            }
        }

        Persisted {
            new_records,
            failures,
            used_fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_handles_zero_elapsed() {
        assert_eq!(throughput(10, Duration::ZERO), 0.0);
        assert_eq!(throughput(10, Duration::from_secs(2)), 5.0);
    }

    #[test]
    fn worker_pool_size_is_bounded() {
        let build = |workers| {
            IngestionPipeline::new(
                Arc::new(memedoc_core::store::memory::InMemoryStore::new()),
                Arc::new(crate::extract::ImageHashExtractor::default()),
                workers,
                BulkFallback::PerRecord,
            )
        };
        assert!(matches!(build(0), Err(PipelineError::Configuration(_))));
        assert!(matches!(
            build(MAX_GATE_PERMITS + 1),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            build(usize::MAX),
            Err(PipelineError::Configuration(_))
        ));
        assert!(build(MAX_GATE_PERMITS).is_ok());
    }
}
