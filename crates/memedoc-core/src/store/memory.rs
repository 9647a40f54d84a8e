//! In-memory [`FingerprintStore`] for tests and dry runs.
//!
//! Records live in insertion order in a `Vec` behind a single
//! `std::sync::RwLock`, with a key index for deduplication. Nothing is
//! persisted across process restarts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{FingerprintRecord, LayoutTag};
use crate::patterns::window_start;

use super::{AggregateStats, FingerprintStore, LayoutCount, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    records: Vec<FingerprintRecord>,
    keys: HashMap<(String, String), usize>,
}

impl Inner {
    fn contains(&self, record: &FingerprintRecord) -> bool {
        self.keys
            .contains_key(&(record.source.clone(), record.item_id.clone()))
    }

    fn push(&mut self, record: FingerprintRecord) {
        let key = (record.source.clone(), record.item_id.clone());
        self.keys.insert(key, self.records.len());
        self.records.push(record);
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

fn oldest_first(records: &mut [FingerprintRecord]) {
    records.sort_by_key(|r| r.created_at);
}

#[async_trait]
impl FingerprintStore for InMemoryStore {
    async fn bulk_upsert(&self, records: &[FingerprintRecord]) -> StoreResult<u64> {
        let mut inner = self.write()?;
        let mut new = 0u64;
        for record in records {
            if !inner.contains(record) {
                inner.push(record.clone());
                new += 1;
            }
        }
        Ok(new)
    }

    async fn insert_if_absent(
        &self,
        record: &FingerprintRecord,
    ) -> StoreResult<Option<FingerprintRecord>> {
        let mut inner = self.write()?;
        if inner.contains(record) {
            return Ok(None);
        }
        inner.push(record.clone());
        Ok(Some(record.clone()))
    }

    async fn query_recent(&self, hours: f64) -> StoreResult<Vec<FingerprintRecord>> {
        let cutoff = window_start(Utc::now(), hours);
        let inner = self.read()?;
        let mut out: Vec<FingerprintRecord> = inner
            .records
            .iter()
            .filter(|r| r.created_at.is_some_and(|at| at >= cutoff))
            .cloned()
            .collect();
        oldest_first(&mut out);
        Ok(out)
    }

    async fn aggregate_stats(&self, top_n: usize) -> StoreResult<AggregateStats> {
        let inner = self.read()?;

        let mut top: Vec<FingerprintRecord> = inner.records.clone();
        top.sort_by(|a, b| b.score.cmp(&a.score));
        top.truncate(top_n);

        let mut by_layout: BTreeMap<&'static str, (LayoutTag, u64, i128, u64)> = BTreeMap::new();
        for record in &inner.records {
            let layout = record.fingerprint.layout;
            let entry = by_layout.entry(layout.as_str()).or_insert((layout, 0, 0, 0));
            entry.1 += 1;
            if let Some(score) = record.score {
                entry.2 += i128::from(score);
                entry.3 += 1;
            }
        }
        let mut layouts: Vec<LayoutCount> = by_layout
            .into_values()
            .map(|(layout, count, score_sum, scored)| LayoutCount {
                layout,
                count,
                avg_score: (scored > 0).then(|| score_sum as f64 / scored as f64),
            })
            .collect();
        layouts.sort_by(|a, b| b.count.cmp(&a.count));

        Ok(AggregateStats {
            total: inner.records.len() as u64,
            top,
            layouts,
        })
    }

    async fn get(&self, source: &str, item_id: &str) -> StoreResult<Option<FingerprintRecord>> {
        let inner = self.read()?;
        Ok(inner
            .keys
            .get(&(source.to_string(), item_id.to_string()))
            .map(|&i| inner.records[i].clone()))
    }

    async fn records_for_template(
        &self,
        template_hash: &str,
    ) -> StoreResult<Vec<FingerprintRecord>> {
        let wanted = template_hash.trim().to_ascii_lowercase();
        let inner = self.read()?;
        let mut out: Vec<FingerprintRecord> = inner
            .records
            .iter()
            .filter(|r| r.template_hash() == Some(wanted.as_str()))
            .cloned()
            .collect();
        oldest_first(&mut out);
        Ok(out)
    }

    async fn all_records(&self) -> StoreResult<Vec<FingerprintRecord>> {
        Ok(self.read()?.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fingerprint, HashKind};
    use chrono::Duration;

    fn rec(source: &str, id: &str, score: i64, hours_ago: i64, layout: LayoutTag) -> FingerprintRecord {
        FingerprintRecord {
            source: source.into(),
            item_id: id.into(),
            title: format!("{source}/{id}"),
            media_url: format!("https://example.com/{id}.png"),
            author: None,
            score: Some(score),
            created_at: Some(Utc::now() - Duration::hours(hours_ago)),
            media_sha256: None,
            fingerprint: Fingerprint::new(layout).with_hash(HashKind::Perceptual, format!("{id:0>16}")),
        }
    }

    #[tokio::test]
    async fn test_bulk_upsert_counts_only_new_keys() {
        let store = InMemoryStore::new();
        let batch = vec![
            rec("reddit", "1", 10, 1, LayoutTag::Top),
            rec("reddit", "2", 20, 1, LayoutTag::Top),
            rec("reddit", "1", 99, 1, LayoutTag::Top),
        ];
        assert_eq!(store.bulk_upsert(&batch).await.unwrap(), 2);
        assert_eq!(store.bulk_upsert(&batch).await.unwrap(), 0);
        assert_eq!(store.len(), 2);

        let kept = store.get("reddit", "1").await.unwrap().unwrap();
        assert_eq!(kept.score, Some(10));
    }

    #[tokio::test]
    async fn test_same_id_different_source_is_distinct() {
        let store = InMemoryStore::new();
        let batch = vec![
            rec("reddit", "1", 10, 1, LayoutTag::Top),
            rec("tiktok", "1", 10, 1, LayoutTag::Top),
        ];
        assert_eq!(store.bulk_upsert(&batch).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_if_absent() {
        let store = InMemoryStore::new();
        let r = rec("reddit", "1", 10, 1, LayoutTag::Top);
        assert!(store.insert_if_absent(&r).await.unwrap().is_some());
        assert!(store.insert_if_absent(&r).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_recent_excludes_old_and_undated() {
        let store = InMemoryStore::new();
        let mut undated = rec("reddit", "u", 1, 0, LayoutTag::Top);
        undated.created_at = None;
        store
            .bulk_upsert(&[
                rec("reddit", "new", 1, 2, LayoutTag::Top),
                rec("reddit", "old", 1, 100, LayoutTag::Top),
                rec("reddit", "newer", 1, 1, LayoutTag::Top),
                undated,
            ])
            .await
            .unwrap();
        let ids: Vec<String> = store
            .query_recent(48.0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.item_id)
            .collect();
        assert_eq!(ids, vec!["new", "newer"]);
    }

    #[tokio::test]
    async fn test_aggregate_stats() {
        let store = InMemoryStore::new();
        store
            .bulk_upsert(&[
                rec("reddit", "a", 10, 1, LayoutTag::Top),
                rec("reddit", "b", 30, 1, LayoutTag::Top),
                rec("reddit", "c", 50, 1, LayoutTag::Bottom),
            ])
            .await
            .unwrap();
        let stats = store.aggregate_stats(2).await.unwrap();
        assert_eq!(stats.total, 3);
        let top: Vec<&str> = stats.top.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(top, vec!["c", "b"]);
        assert_eq!(stats.layouts[0].layout, LayoutTag::Top);
        assert_eq!(stats.layouts[0].count, 2);
        assert_eq!(stats.layouts[0].avg_score, Some(20.0));
    }

    #[tokio::test]
    async fn test_query_recent_with_unbounded_window() {
        let store = InMemoryStore::new();
        store
            .bulk_upsert(&[
                rec("reddit", "old", 1, 100_000, LayoutTag::Top),
                rec("reddit", "new", 1, 1, LayoutTag::Top),
            ])
            .await
            .unwrap();
        assert_eq!(store.query_recent(1e10).await.unwrap().len(), 2);
        assert_eq!(store.query_recent(f64::MAX).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_layout_average_with_extreme_scores() {
        let store = InMemoryStore::new();
        store
            .bulk_upsert(&[
                rec("reddit", "a", i64::MAX, 1, LayoutTag::Top),
                rec("reddit", "b", i64::MAX, 1, LayoutTag::Top),
            ])
            .await
            .unwrap();
        let stats = store.aggregate_stats(1).await.unwrap();
        assert_eq!(stats.layouts[0].avg_score, Some(i64::MAX as f64));
    }

    #[tokio::test]
    async fn test_records_for_template_matches_case_insensitively() {
        let store = InMemoryStore::new();
        let mut a = rec("reddit", "a", 1, 5, LayoutTag::Top);
        a.fingerprint.insert(HashKind::Perceptual, "ABCDEF0123456789");
        let mut b = rec("tiktok", "b", 1, 1, LayoutTag::Top);
        b.fingerprint.insert(HashKind::Perceptual, "abcdef0123456789");
        store.bulk_upsert(&[b, a]).await.unwrap();
        let history = store.records_for_template("ABCDEF0123456789").await.unwrap();
        let ids: Vec<&str> = history.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
