//! Pattern reporting over stored history.
//!
//! Backs `memedoc patterns`, `memedoc similar` and `memedoc evolution`.
//! The `*_in` functions take any [`FingerprintStore`] and return
//! structured data; the `run_*` functions open the configured SQLite
//! store and print.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;

use memedoc_core::fingerprint::find_similar_fingerprints;
use memedoc_core::models::FingerprintRecord;
use memedoc_core::patterns::{EmergingPattern, PatternEngine, PatternPolicy, TemplateEvolution};
use memedoc_core::store::FingerprintStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// One row of `memedoc similar` output.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarResult {
    pub source: String,
    pub item_id: String,
    pub title: String,
    pub media_url: String,
    pub layout: String,
    pub similarity: f64,
}

/// Emerging templates among records from the last `window_hours`.
pub async fn emerging_patterns_in(
    store: &dyn FingerprintStore,
    policy: PatternPolicy,
    window_hours: f64,
) -> Result<Vec<EmergingPattern>> {
    if !(window_hours.is_finite() && window_hours > 0.0) {
        return Ok(Vec::new());
    }
    let records = store.query_recent(window_hours).await?;
    let engine = PatternEngine::new(policy);
    Ok(engine.detect_emerging_patterns_at(&records, window_hours, Utc::now()))
}

/// Stored records most similar to `(source, item_id)`, best first.
///
/// The target itself is never part of the result.
pub async fn similar_in(
    store: &dyn FingerprintStore,
    source: &str,
    item_id: &str,
    threshold: f64,
    limit: usize,
) -> Result<Vec<SimilarResult>> {
    let Some(target) = store.get(source, item_id).await? else {
        bail!("no fingerprint stored for {}/{}", source, item_id);
    };
    let candidates: Vec<FingerprintRecord> = store
        .all_records()
        .await?
        .into_iter()
        .filter(|r| r.key() != target.key())
        .collect();

    Ok(find_similar_fingerprints(&target, &candidates, threshold)
        .into_iter()
        .take(limit)
        .map(|m| SimilarResult {
            source: m.record.source.clone(),
            item_id: m.record.item_id.clone(),
            title: m.record.title.clone(),
            media_url: m.record.media_url.clone(),
            layout: m.record.fingerprint.layout.to_string(),
            similarity: m.similarity,
        })
        .collect())
}

/// Lifecycle summary for one template hash.
pub async fn evolution_in(
    store: &dyn FingerprintStore,
    template_hash: &str,
) -> Result<Option<TemplateEvolution>> {
    let history = store.records_for_template(template_hash).await?;
    let hash = template_hash.trim().to_ascii_lowercase();
    Ok(PatternEngine::default().template_evolution(&history, &hash, Utc::now()))
}

pub async fn run_patterns(config: &Config, window_hours: Option<f64>, json: bool) -> Result<()> {
    let window = window_hours.unwrap_or(config.patterns.window_hours);
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let patterns = emerging_patterns_in(&store, config.patterns.policy(), window).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&patterns)?);
        return Ok(());
    }

    if patterns.is_empty() {
        println!("No emerging patterns in the last {}h.", window);
        return Ok(());
    }

    println!(
        "{:<18} {:>8} {:>5}  {:<30} {:<24} NEXT",
        "TEMPLATE", "MOMENTUM", "SEEN", "SEQUENCE", "SOURCES"
    );
    println!("{}", "-".repeat(100));
    for p in &patterns {
        println!(
            "{:<18} {:>8.3} {:>5}  {:<30} {:<24} {} ({:.0}%)",
            p.template_hash,
            p.momentum_score,
            p.record_count,
            p.sequence,
            p.sources.join(","),
            p.prediction.next_source,
            p.prediction.confidence * 100.0
        );
    }
    Ok(())
}

pub async fn run_similar(
    config: &Config,
    source: &str,
    item_id: &str,
    threshold: Option<f64>,
    limit: usize,
) -> Result<()> {
    let threshold = threshold.unwrap_or(config.patterns.similarity_threshold);
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let results = similar_in(&store, source, item_id, threshold, limit).await;
    pool.close().await;
    let results = results?;

    if results.is_empty() {
        println!("No similar fingerprints above {:.2}.", threshold);
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}/{}  {}  ({})",
            i + 1,
            r.similarity,
            r.source,
            r.item_id,
            r.title,
            r.layout
        );
        println!("    {}", r.media_url);
    }
    Ok(())
}

pub async fn run_evolution(config: &Config, template_hash: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let evolution = evolution_in(&store, template_hash).await;
    pool.close().await;

    let Some(evo) = evolution? else {
        bail!("template not found: {}", template_hash);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&evo)?);
        return Ok(());
    }

    let first_seen = evo
        .original
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("template {}", evo.template_hash);
    println!(
        "  original: {}/{} ({})",
        evo.original.source, evo.original.item_id, first_seen
    );
    println!("  variations: {}", evo.variations);
    println!("  sources reached: {}", evo.sources_reached);
    println!("  peak score: {}", evo.peak_score);
    println!("  lifecycle: {:?}", evo.lifecycle);
    Ok(())
}
