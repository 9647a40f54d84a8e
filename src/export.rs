//! Export stored fingerprints as JSON.
//!
//! Produces a single document holding every record, oldest ingest first,
//! suitable for feeding another MemeDoc instance or an offline notebook.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use memedoc_core::models::FingerprintRecord;
use memedoc_core::store::FingerprintStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Serialize)]
struct ExportData {
    exported_at: i64,
    count: usize,
    records: Vec<FingerprintRecord>,
}

/// Serialize every record in `store` as pretty-printed JSON.
pub async fn export_json(store: &dyn FingerprintStore) -> Result<String> {
    let records = store.all_records().await?;
    let data = ExportData {
        exported_at: chrono::Utc::now().timestamp(),
        count: records.len(),
        records,
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

/// Export all fingerprints as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let json = export_json(&store).await;
    pool.close().await;
    let json = json?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported fingerprints to {}", path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
