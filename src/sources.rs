use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::scraper::{RateLimits, ScraperRegistry};

/// Status row for one configured source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub healthy: bool,
    pub detail: String,
    pub limits: RateLimits,
}

/// Check every `[sources.*]` table. Disabled sources are reported but
/// never contacted.
pub async fn get_sources(config: &Config) -> Result<Vec<SourceStatus>> {
    let registry = ScraperRegistry::from_config(config)?;
    let mut statuses = Vec::with_capacity(config.sources.len());

    for (name, source) in &config.sources {
        let limits = RateLimits {
            per_minute: source.rate_limit,
            per_day: source.daily_limit,
        };
        let (healthy, detail) = match registry.get(name) {
            Some(scraper) => {
                let health = scraper.health_check().await;
                (health.healthy, health.detail)
            }
            None => (false, "DISABLED".to_string()),
        };
        statuses.push(SourceStatus {
            name: name.clone(),
            kind: source.kind.clone(),
            enabled: source.enabled,
            healthy,
            detail,
            limits,
        });
    }

    Ok(statuses)
}

pub async fn list_sources(config: &Config) -> Result<()> {
    let statuses = get_sources(config).await?;

    if statuses.is_empty() {
        println!("No sources configured. Add a [sources.<name>] table to the config.");
        return Ok(());
    }

    println!(
        "{:<16} {:<10} {:<8} {:>9}  {:<24}",
        "SOURCE", "KIND", "HEALTHY", "LIMITS", "STATUS"
    );
    for s in &statuses {
        println!(
            "{:<16} {:<10} {:<8} {:>9}  {:<24}",
            s.name,
            s.kind,
            s.healthy,
            format!("{}/{}", s.limits.per_minute, s.limits.per_day),
            s.detail
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[tokio::test]
    async fn reports_health_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("feed.json");
        std::fs::write(&manifest, "[]").unwrap();

        let toml = format!(
            r#"
            [db]
            path = "{db}"

            [sources.local]
            kind = "manifest"
            path = "{manifest}"

            [sources.gone]
            kind = "manifest"
            path = "{missing}"

            [sources.off]
            kind = "manifest"
            path = "{manifest}"
            enabled = false
            "#,
            db = dir.path().join("m.sqlite").display(),
            manifest = manifest.display(),
            missing = dir.path().join("missing.json").display(),
        );
        let config = parse_config(&toml).unwrap();
        let statuses = get_sources(&config).await.unwrap();

        let by_name = |n: &str| statuses.iter().find(|s| s.name == n).unwrap();
        assert!(by_name("local").healthy);
        assert!(!by_name("gone").healthy);
        assert!(!by_name("off").enabled);
        assert_eq!(by_name("off").detail, "DISABLED");
    }
}
