//! Discovery sources.
//!
//! A [`SourceScraper`] knows how to find candidate [`ContentItem`]s on one
//! platform. Scrapers are collected in a [`ScraperRegistry`] that callers
//! build explicitly (usually with [`ScraperRegistry::from_config`]) and
//! pass to whatever needs it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            ScraperRegistry               │
//! │  ┌──────────────┐   ┌─────────────────┐  │
//! │  │  Manifest    │   │  Custom (Rust)  │  │
//! │  │  JSON feeds  │   │  SourceScraper  │  │
//! │  └──────────────┘   └─────────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     discover_items() → IngestionPipeline::run()
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

use memedoc_core::models::ContentItem;

use crate::config::{Config, SourceConfig};

/// File extensions treated as still images.
const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Topic that disables tag filtering.
pub const ALL_TOPICS: &str = "all";

// ═══════════════════════════════════════════════════════════════════════
// Scraper Trait
// ═══════════════════════════════════════════════════════════════════════

/// Request budget a source tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_day: 1000,
        }
    }
}

/// Result of [`SourceScraper::health_check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub detail: String,
}

/// A platform that can be searched for meme candidates.
///
/// # Lifecycle
///
/// 1. The scraper is registered via [`ScraperRegistry::register`].
/// 2. [`authenticate`](SourceScraper::authenticate) is called before the
///    first discovery.
/// 3. [`discover`](SourceScraper::discover) returns candidates; the caller
///    keeps only those passing [`is_media_item`](SourceScraper::is_media_item).
#[async_trait]
pub trait SourceScraper: Send + Sync {
    /// Registry name, matching the `[sources.<name>]` table.
    fn name(&self) -> &str;

    /// Establish whatever session the source needs. `Ok(false)` means the
    /// source is reachable but refused us.
    async fn authenticate(&self) -> Result<bool>;

    /// Up to `limit` items about `topic`.
    async fn discover(&self, topic: &str, limit: usize) -> Result<Vec<ContentItem>>;

    /// Full detail for one item, or `None` when the source does not know it.
    async fn get_item_detail(&self, item_id: &str) -> Result<Option<ContentItem>>;

    /// Whether `item` points at media the extractor can fingerprint.
    fn is_media_item(&self, item: &ContentItem) -> bool {
        is_image_url(&item.media_url)
    }

    async fn health_check(&self) -> HealthStatus {
        match self.authenticate().await {
            Ok(true) => HealthStatus {
                healthy: true,
                detail: "OK".to_string(),
            },
            Ok(false) => HealthStatus {
                healthy: false,
                detail: "authentication refused".to_string(),
            },
            Err(e) => HealthStatus {
                healthy: false,
                detail: e.to_string(),
            },
        }
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits::default()
    }
}

/// `http(s)` URL whose path ends in a known image extension.
pub fn is_image_url(url: &str) -> bool {
    let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
    else {
        return false;
    };
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    match path.rsplit_once('.') {
        Some((before, ext)) if before.contains('/') && !ext.contains('/') => MEDIA_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// Run one discovery call, never failing.
///
/// Scraper errors are logged and produce an empty list; non-media items
/// are dropped.
pub async fn discover_items(
    scraper: &dyn SourceScraper,
    topic: &str,
    limit: usize,
) -> Vec<ContentItem> {
    match scraper.discover(topic, limit).await {
        Ok(items) => {
            let found = items.len();
            let media: Vec<ContentItem> = items
                .into_iter()
                .filter(|item| scraper.is_media_item(item))
                .collect();
            debug!(
                source = scraper.name(),
                topic,
                found,
                media = media.len(),
                "Discovery finished"
            );
            media
        }
        Err(e) => {
            warn!(source = scraper.name(), topic, error = %e, "Discovery failed");
            Vec::new()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Manifest Scraper
// ═══════════════════════════════════════════════════════════════════════

/// Reads candidates from a local JSON array of [`ContentItem`]s.
///
/// Useful for replaying exported feeds and for offline runs. The manifest
/// is re-read on every call so edits are picked up without a restart.
pub struct ManifestScraper {
    name: String,
    path: PathBuf,
    limits: RateLimits,
}

impl ManifestScraper {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, limits: RateLimits) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            limits,
        }
    }

    pub fn from_config(name: &str, config: &SourceConfig) -> Result<Self> {
        let path = config
            .path
            .clone()
            .with_context(|| format!("sources.{}.path is required", name))?;
        Ok(Self::new(
            name,
            path,
            RateLimits {
                per_minute: config.rate_limit,
                per_day: config.daily_limit,
            },
        ))
    }

    async fn load(&self) -> Result<Vec<ContentItem>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read manifest: {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid manifest JSON: {}", self.path.display()))
    }
}

fn matches_topic(item: &ContentItem, topic: &str) -> bool {
    let topic = topic.trim();
    topic.is_empty()
        || topic.eq_ignore_ascii_case(ALL_TOPICS)
        || item.tags.iter().any(|t| t.eq_ignore_ascii_case(topic))
}

#[async_trait]
impl SourceScraper for ManifestScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }

    async fn discover(&self, topic: &str, limit: usize) -> Result<Vec<ContentItem>> {
        let cap = limit.min(self.limits.per_day as usize);
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|item| matches_topic(item, topic))
            .take(cap)
            .collect())
    }

    async fn get_item_detail(&self, item_id: &str) -> Result<Option<ContentItem>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|item| item.item_id == item_id))
    }

    fn rate_limits(&self) -> RateLimits {
        self.limits
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Named collection of scrapers.
#[derive(Default)]
pub struct ScraperRegistry {
    scrapers: Vec<Box<dyn SourceScraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from every enabled `[sources.*]` table.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for (name, source) in config.sources.iter().filter(|(_, s)| s.enabled) {
            match source.kind.as_str() {
                "manifest" => registry.register(Box::new(ManifestScraper::from_config(name, source)?)),
                other => anyhow::bail!("Unknown source kind for sources.{}: '{}'", name, other),
            }
        }
        Ok(registry)
    }

    /// Add a scraper. A later registration replaces an earlier one with
    /// the same name.
    pub fn register(&mut self, scraper: Box<dyn SourceScraper>) {
        self.scrapers.retain(|s| s.name() != scraper.name());
        self.scrapers.push(scraper);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SourceScraper> {
        self.scrapers
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.scrapers.iter().map(|s| s.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SourceScraper> {
        self.scrapers.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("feed.json");
        let json = r#"[
            {"source": "reddit", "item_id": "r1", "title": "drake", "score": 100,
             "media_url": "https://i.example.com/r1.png", "created_at": "2024-05-01T10:00:00Z",
             "tags": ["Funny"]},
            {"source": "reddit", "item_id": "r2", "title": "text post", "score": 5,
             "media_url": "https://example.com/comments/r2", "created_at": "2024-05-01T11:00:00Z",
             "tags": ["funny"]},
            {"source": "tiktok", "item_id": "t1", "title": "cat", "score": 900,
             "media_url": "https://cdn.example.com/t1.JPG?w=200", "created_at": "2024-05-01T12:00:00Z",
             "tags": ["cats"]}
        ]"#;
        std::fs::write(&path, json).unwrap();
        path
    }

    struct Broken;

    #[async_trait]
    impl SourceScraper for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn authenticate(&self) -> Result<bool> {
            anyhow::bail!("no route to host")
        }
        async fn discover(&self, _topic: &str, _limit: usize) -> Result<Vec<ContentItem>> {
            anyhow::bail!("no route to host")
        }
        async fn get_item_detail(&self, _item_id: &str) -> Result<Option<ContentItem>> {
            Ok(None)
        }
    }

    #[test]
    fn image_url_detection() {
        assert!(is_image_url("https://i.example.com/a.png"));
        assert!(is_image_url("http://x.test/dir/a.JPEG?size=large"));
        assert!(!is_image_url("https://example.com/comments/abc"));
        assert!(!is_image_url("ftp://example.com/a.png"));
        assert!(!is_image_url("https://example.com"));
        assert!(!is_image_url("https://example.png"));
    }

    #[tokio::test]
    async fn manifest_filters_by_topic_and_media() {
        let dir = TempDir::new().unwrap();
        let scraper = ManifestScraper::new("memes", write_manifest(&dir), RateLimits::default());

        let funny = discover_items(&scraper, "funny", 10).await;
        let ids: Vec<&str> = funny.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["r1"]);

        let all = discover_items(&scraper, "all", 10).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn daily_limit_caps_discovery() {
        let dir = TempDir::new().unwrap();
        let limits = RateLimits {
            per_minute: 60,
            per_day: 1,
        };
        let scraper = ManifestScraper::new("memes", write_manifest(&dir), limits);
        assert_eq!(scraper.discover("all", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn item_detail_lookup() {
        let dir = TempDir::new().unwrap();
        let scraper = ManifestScraper::new("memes", write_manifest(&dir), RateLimits::default());
        let item = scraper.get_item_detail("t1").await.unwrap().unwrap();
        assert_eq!(item.source, "tiktok");
        assert!(scraper.get_item_detail("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_manifest_is_unhealthy() {
        let scraper = ManifestScraper::new("memes", "/nonexistent/feed.json", RateLimits::default());
        assert!(!scraper.health_check().await.healthy);
        assert!(discover_items(&scraper, "all", 10).await.is_empty());
    }

    #[tokio::test]
    async fn discovery_errors_yield_empty() {
        assert!(discover_items(&Broken, "all", 5).await.is_empty());
        let health = Broken.health_check().await;
        assert!(!health.healthy);
        assert!(health.detail.contains("no route"));
    }

    #[test]
    fn registry_replaces_by_name() {
        let mut registry = ScraperRegistry::new();
        registry.register(Box::new(Broken));
        registry.register(Box::new(ManifestScraper::new("memes", "a.json", RateLimits::default())));
        registry.register(Box::new(Broken));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["memes", "broken"]);
        assert!(registry.get("memes").is_some());
        assert!(registry.get("nope").is_none());
    }
}
