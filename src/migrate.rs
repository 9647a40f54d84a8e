use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One row per (source, item_id); hashes are lower-case hex.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fingerprints (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            item_id TEXT NOT NULL,
            title TEXT NOT NULL,
            media_url TEXT NOT NULL,
            author TEXT,
            score INTEGER,
            created_at INTEGER,
            media_sha256 TEXT,
            phash TEXT,
            dhash TEXT,
            whash TEXT,
            colorhash TEXT,
            layout TEXT NOT NULL DEFAULT 'unknown',
            ingested_at INTEGER NOT NULL,
            UNIQUE(source, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fingerprints_created_at ON fingerprints(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_score ON fingerprints(score DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_phash ON fingerprints(phash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_source ON fingerprints(source)")
        .execute(pool)
        .await?;

    Ok(())
}
