//! SQLite-backed [`FingerprintStore`] implementation.
//!
//! Each hash kind has its own column, so the template index is a plain
//! index on `phash`. Timestamps are stored as Unix seconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

use memedoc_core::models::{Fingerprint, FingerprintRecord, HashKind, LayoutTag};
use memedoc_core::patterns::window_start;
use memedoc_core::store::{AggregateStats, FingerprintStore, LayoutCount, StoreError, StoreResult};

const COLUMNS: &str = "source, item_id, title, media_url, author, score, created_at, \
                       media_sha256, phash, dhash, whash, colorhash, layout";

const INSERT_IF_ABSENT: &str = r#"
    INSERT INTO fingerprints (id, source, item_id, title, media_url, author, score,
                              created_at, media_sha256, phash, dhash, whash, colorhash,
                              layout, ingested_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(source, item_id) DO NOTHING
"#;

/// SQLite implementation of the [`FingerprintStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) => StoreError::Rejected(db.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn insert_query(record: &FingerprintRecord) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let fp = &record.fingerprint;
    sqlx::query(INSERT_IF_ABSENT)
        .bind(Uuid::new_v4().to_string())
        .bind(&record.source)
        .bind(&record.item_id)
        .bind(&record.title)
        .bind(&record.media_url)
        .bind(&record.author)
        .bind(record.score)
        .bind(record.created_at.map(|t| t.timestamp()))
        .bind(&record.media_sha256)
        .bind(fp.get(HashKind::Perceptual))
        .bind(fp.get(HashKind::Difference))
        .bind(fp.get(HashKind::Wavelet))
        .bind(fp.get(HashKind::Color))
        .bind(fp.layout.as_str())
        .bind(Utc::now().timestamp())
}

fn row_to_record(row: &SqliteRow) -> StoreResult<FingerprintRecord> {
    let get_err = |e: sqlx::Error| StoreError::Unavailable(format!("malformed row: {e}"));

    let layout: String = row.try_get("layout").map_err(get_err)?;
    let mut fingerprint = Fingerprint::new(layout.parse().unwrap_or(LayoutTag::Unknown));
    for kind in HashKind::ALL {
        let value: Option<String> = row.try_get(kind.as_str()).map_err(get_err)?;
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            fingerprint.insert(kind, value);
        }
    }

    let created_at: Option<i64> = row.try_get("created_at").map_err(get_err)?;
    Ok(FingerprintRecord {
        source: row.try_get("source").map_err(get_err)?,
        item_id: row.try_get("item_id").map_err(get_err)?,
        title: row.try_get("title").map_err(get_err)?,
        media_url: row.try_get("media_url").map_err(get_err)?,
        author: row.try_get("author").map_err(get_err)?,
        score: row.try_get("score").map_err(get_err)?,
        created_at: created_at.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        media_sha256: row.try_get("media_sha256").map_err(get_err)?,
        fingerprint,
    })
}

fn rows_to_records(rows: &[SqliteRow]) -> StoreResult<Vec<FingerprintRecord>> {
    rows.iter().map(row_to_record).collect()
}

#[async_trait]
impl FingerprintStore for SqliteStore {
    async fn bulk_upsert(&self, records: &[FingerprintRecord]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut new = 0u64;
        for record in records {
            let result = insert_query(record)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
            new += result.rows_affected();
        }
        tx.commit().await.map_err(store_err)?;
        Ok(new)
    }

    async fn insert_if_absent(
        &self,
        record: &FingerprintRecord,
    ) -> StoreResult<Option<FingerprintRecord>> {
        let result = insert_query(record)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok((result.rows_affected() > 0).then(|| record.clone()))
    }

    async fn query_recent(&self, hours: f64) -> StoreResult<Vec<FingerprintRecord>> {
        let cutoff = window_start(Utc::now(), hours).timestamp();
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM fingerprints \
             WHERE created_at IS NOT NULL AND created_at >= ? \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows_to_records(&rows)
    }

    async fn aggregate_stats(&self, top_n: usize) -> StoreResult<AggregateStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fingerprints")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;

        let top_rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM fingerprints \
             ORDER BY score IS NULL, score DESC, rowid ASC LIMIT ?"
        ))
        .bind(top_n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let layout_rows = sqlx::query(
            r#"
            SELECT layout, COUNT(*) AS count, AVG(score) AS avg_score
            FROM fingerprints
            GROUP BY layout
            ORDER BY count DESC, layout ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let layouts = layout_rows
            .iter()
            .map(|row| {
                let layout: String = row.get("layout");
                let count: i64 = row.get("count");
                LayoutCount {
                    layout: layout.parse().unwrap_or(LayoutTag::Unknown),
                    count: count as u64,
                    avg_score: row.get("avg_score"),
                }
            })
            .collect();

        Ok(AggregateStats {
            total: total as u64,
            top: rows_to_records(&top_rows)?,
            layouts,
        })
    }

    async fn get(&self, source: &str, item_id: &str) -> StoreResult<Option<FingerprintRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM fingerprints WHERE source = ? AND item_id = ?"
        ))
        .bind(source)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn records_for_template(
        &self,
        template_hash: &str,
    ) -> StoreResult<Vec<FingerprintRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM fingerprints WHERE phash = ? \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(template_hash.trim().to_ascii_lowercase())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows_to_records(&rows)
    }

    async fn all_records(&self) -> StoreResult<Vec<FingerprintRecord>> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM fingerprints ORDER BY rowid ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows_to_records(&rows)
    }
}
