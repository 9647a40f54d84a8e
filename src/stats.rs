//! Database statistics and health overview.
//!
//! Provides a quick summary of what's stored: fingerprint counts, the
//! highest-scoring records, the layout breakdown, and per-source totals.
//! Used by `memedoc stats` to confirm that ingest runs are landing.

use anyhow::Result;
use sqlx::Row;

use memedoc_core::store::FingerprintStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Per-source breakdown of record counts.
struct SourceStats {
    source: String,
    records: i64,
    templates: i64,
    last_ingest_ts: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, top_n: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let stats = store.aggregate_stats(top_n).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("MemeDoc — Database Stats");
    println!("========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Fingerprints:  {}", stats.total);

    let source_rows = sqlx::query(
        r#"
        SELECT
            source,
            COUNT(*) AS records,
            COUNT(DISTINCT phash) AS templates,
            MAX(ingested_at) AS last_ingest
        FROM fingerprints
        GROUP BY source
        ORDER BY records DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            records: row.get("records"),
            templates: row.get("templates"),
            last_ingest_ts: row.get("last_ingest"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<24} {:>8} {:>10}   {}",
            "SOURCE", "RECORDS", "TEMPLATES", "LAST INGEST"
        );
        println!("  {}", "-".repeat(64));
        for s in &source_stats {
            let ingest_display = match s.last_ingest_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>8} {:>10}   {}",
                s.source, s.records, s.templates, ingest_display
            );
        }
    }

    if !stats.layouts.is_empty() {
        println!();
        println!("  By layout:");
        println!("  {:<20} {:>8} {:>12}", "LAYOUT", "RECORDS", "AVG SCORE");
        println!("  {}", "-".repeat(42));
        for l in &stats.layouts {
            let avg = l
                .avg_score
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<20} {:>8} {:>12}", l.layout.as_str(), l.count, avg);
        }
    }

    if !stats.top.is_empty() {
        println!();
        println!("  Top {} by score:", stats.top.len());
        for r in &stats.top {
            let score = r
                .score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:>8}  {}/{}  {}", score, r.source, r.item_id, r.title);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
