//! Storage abstraction for fingerprint history.
//!
//! The [`FingerprintStore`] trait is everything the ingestion pipeline and
//! the pattern engine need from persistence: a deduplicating bulk write,
//! a per-record fallback write, and a handful of read paths. `(source,
//! item_id)` is the deduplication key; writing a record whose key already
//! exists is a no-op, not an error.
//!
//! Implementations must be `Send + Sync` so a single store can be shared
//! by every task of an ingest run.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{FingerprintRecord, LayoutTag};

/// Failure raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the write.
    #[error("store rejected write: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Record count and average score for one layout tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutCount {
    pub layout: LayoutTag,
    pub count: u64,
    /// Mean over records that carry a score; `None` when none do.
    pub avg_score: Option<f64>,
}

/// Summary returned by [`FingerprintStore::aggregate_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total: u64,
    /// Highest-scoring records, best first.
    pub top: Vec<FingerprintRecord>,
    /// Per-layout breakdown, most common layout first.
    pub layouts: Vec<LayoutCount>,
}

/// Deduplicating persistence for [`FingerprintRecord`]s.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`bulk_upsert`](FingerprintStore::bulk_upsert) | Write a batch, skipping known keys |
/// | [`insert_if_absent`](FingerprintStore::insert_if_absent) | Write one record, skipping a known key |
/// | [`query_recent`](FingerprintStore::query_recent) | Records created in the last N hours |
/// | [`aggregate_stats`](FingerprintStore::aggregate_stats) | Totals, top-N and layout breakdown |
/// | [`get`](FingerprintStore::get) | Point lookup by key |
/// | [`records_for_template`](FingerprintStore::records_for_template) | Full history of one template |
/// | [`all_records`](FingerprintStore::all_records) | Every stored record |
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Persist `records` in one operation and return how many were new.
    ///
    /// Records whose key already exists (in the store or earlier in the
    /// same batch) are skipped. Either the whole batch is applied or none
    /// of it is.
    async fn bulk_upsert(&self, records: &[FingerprintRecord]) -> StoreResult<u64>;

    /// Persist one record. Returns the stored record, or `None` when its
    /// key was already present.
    async fn insert_if_absent(
        &self,
        record: &FingerprintRecord,
    ) -> StoreResult<Option<FingerprintRecord>>;

    /// Records created within the last `hours`, oldest first.
    ///
    /// Records without a creation time are not returned.
    async fn query_recent(&self, hours: f64) -> StoreResult<Vec<FingerprintRecord>>;

    async fn aggregate_stats(&self, top_n: usize) -> StoreResult<AggregateStats>;

    async fn get(&self, source: &str, item_id: &str) -> StoreResult<Option<FingerprintRecord>>;

    /// Every record whose template hash equals `template_hash`, oldest first.
    async fn records_for_template(
        &self,
        template_hash: &str,
    ) -> StoreResult<Vec<FingerprintRecord>>;

    async fn all_records(&self) -> StoreResult<Vec<FingerprintRecord>>;
}
