//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] rejects values the pipeline or the pattern engine
//! cannot run with, so commands can trust a loaded [`Config`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::MAX_GATE_PERMITS;
use memedoc_core::patterns::{
    default_predictions, default_sequences, PatternPolicy, PredictionRule, SequenceRule,
    DEFAULT_DECAY_HOURS, DEFAULT_MOMENTUM_CAP, DEFAULT_MOMENTUM_THRESHOLD, DEFAULT_WINDOW_HOURS,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub patterns: PatternsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// What the pipeline does when the single bulk write fails.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BulkFallback {
    /// Retry each record individually with an insert-if-absent write.
    #[default]
    PerRecord,
    /// Give up on the batch; nothing from it is persisted.
    Disabled,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Maximum simultaneous downloads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Size of the extraction worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub bulk_fallback: BulkFallback,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            workers: default_workers(),
            bulk_fallback: BulkFallback::default(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}
fn default_workers() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Largest media body accepted, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "MemeDoc/1.0".to_string()
}
fn default_max_bytes() -> u64 {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// Images narrower or shorter than this are rejected.
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_dimension: default_min_dimension(),
        }
    }
}

fn default_min_dimension() -> u32 {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatternsConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: f64,
    #[serde(default = "default_momentum_threshold")]
    pub momentum_threshold: f64,
    #[serde(default = "default_momentum_cap")]
    pub momentum_cap: f64,
    #[serde(default = "default_decay_hours")]
    pub decay_hours: f64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Replaces the built-in sequence names when present.
    #[serde(default)]
    pub sequences: Option<Vec<SequenceRule>>,
    /// Replaces the built-in prediction rules when present.
    #[serde(default)]
    pub predictions: Option<Vec<PredictionRule>>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            momentum_threshold: default_momentum_threshold(),
            momentum_cap: default_momentum_cap(),
            decay_hours: default_decay_hours(),
            similarity_threshold: default_similarity_threshold(),
            sequences: None,
            predictions: None,
        }
    }
}

impl PatternsConfig {
    pub fn policy(&self) -> PatternPolicy {
        PatternPolicy {
            momentum_threshold: self.momentum_threshold,
            momentum_cap: self.momentum_cap,
            decay_hours: self.decay_hours,
            sequences: self.sequences.clone().unwrap_or_else(default_sequences),
            predictions: self.predictions.clone().unwrap_or_else(default_predictions),
        }
    }
}

fn default_window_hours() -> f64 {
    DEFAULT_WINDOW_HOURS
}
fn default_momentum_threshold() -> f64 {
    DEFAULT_MOMENTUM_THRESHOLD
}
fn default_momentum_cap() -> f64 {
    DEFAULT_MOMENTUM_CAP
}
fn default_decay_hours() -> f64 {
    DEFAULT_DECAY_HOURS
}
fn default_similarity_threshold() -> f64 {
    5.0
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One `[sources.<name>]` table.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: String,
    /// Manifest file for `kind = "manifest"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Requests per minute the source tolerates.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Items per day the source tolerates.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

fn default_source_kind() -> String {
    "manifest".to_string()
}
fn default_enabled() -> bool {
    true
}
fn default_rate_limit() -> u32 {
    60
}
fn default_daily_limit() -> u32 {
    1000
}

impl Config {
    pub fn concurrency(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.pipeline.concurrency)
            .context("pipeline.concurrency must be >= 1")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate pipeline
    if config.pipeline.concurrency == 0 {
        bail!("pipeline.concurrency must be >= 1");
    }
    if config.pipeline.workers == 0 {
        bail!("pipeline.workers must be >= 1");
    }
    if config.pipeline.concurrency > MAX_GATE_PERMITS {
        bail!("pipeline.concurrency must be <= {}", MAX_GATE_PERMITS);
    }
    if config.pipeline.workers > MAX_GATE_PERMITS {
        bail!("pipeline.workers must be <= {}", MAX_GATE_PERMITS);
    }

    // Validate fetch
    if config.fetch.timeout_secs == 0 || config.fetch.connect_timeout_secs == 0 {
        bail!("fetch timeouts must be > 0 seconds");
    }
    if config.fetch.max_bytes == 0 {
        bail!("fetch.max_bytes must be > 0");
    }
    if config.fetch.user_agent.trim().is_empty() {
        bail!("fetch.user_agent must not be empty");
    }

    // Validate patterns
    let p = &config.patterns;
    if !(p.window_hours.is_finite() && p.window_hours > 0.0) {
        bail!("patterns.window_hours must be > 0");
    }
    if !(p.momentum_threshold.is_finite() && p.momentum_threshold >= 0.0) {
        bail!("patterns.momentum_threshold must be >= 0");
    }
    if !(p.momentum_cap.is_finite() && p.momentum_cap > 0.0) {
        bail!("patterns.momentum_cap must be > 0");
    }
    if !(p.decay_hours.is_finite() && p.decay_hours > 0.0) {
        bail!("patterns.decay_hours must be > 0");
    }
    if !p.similarity_threshold.is_finite() {
        bail!("patterns.similarity_threshold must be a finite number");
    }
    for rule in p.predictions.iter().flatten() {
        if !(0.0..=1.0).contains(&rule.confidence) {
            bail!(
                "patterns.predictions: confidence for '{}' -> '{}' must be in [0.0, 1.0]",
                rule.when_present,
                rule.next
            );
        }
    }
    for rule in p.sequences.iter().flatten() {
        if rule.sources.is_empty() {
            bail!("patterns.sequences: '{}' must list at least one source", rule.name);
        }
    }

    // Validate sources
    for (name, source) in &config.sources {
        match source.kind.as_str() {
            "manifest" => {
                if source.path.is_none() {
                    bail!("sources.{}.path is required for kind 'manifest'", name);
                }
            }
            other => bail!(
                "Unknown source kind for sources.{}: '{}'. Must be manifest.",
                name,
                other
            ),
        }
    }

    Ok(config)
}
