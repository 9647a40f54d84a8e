//! Cross-source propagation detection.
//!
//! The [`PatternEngine`] groups fingerprint history by template hash,
//! scores each group with a time-decayed momentum metric, and reports the
//! groups that are spreading fast enough to count as *emerging*. For each
//! emerging template it also names the spread sequence and predicts the
//! next source the template is likely to reach.
//!
//! # Momentum
//!
//! For a cluster of `n ≥ 2` records observed at detection instant `now`:
//!
//! ```text
//! w_i       = exp(−age_hours_i / decay_hours)
//! weighted  = Σ score_i · w_i / Σ w_i            (0 when Σ w_i = 0)
//! breadth   = 0.3 · distinct_sources
//! velocity  = n / max(span_hours, 1)
//! momentum  = min(weighted / 1000 + breadth + velocity, cap)
//! ```
//!
//! Momentum is always recomputed from the records handed in; nothing is
//! cached between runs because the decay term depends on `now`.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FingerprintRecord;

/// Momentum a cluster must exceed to be reported as emerging.
pub const DEFAULT_MOMENTUM_THRESHOLD: f64 = 0.7;
/// Upper bound on any cluster's momentum.
pub const DEFAULT_MOMENTUM_CAP: f64 = 5.0;
/// Half-life-like decay constant for the popularity weighting, in hours.
pub const DEFAULT_DECAY_HOURS: f64 = 24.0;
/// Default detection window, in hours.
pub const DEFAULT_WINDOW_HOURS: f64 = 48.0;
/// Bonus per distinct source observed in a cluster.
pub const SOURCE_BREADTH_WEIGHT: f64 = 0.3;
/// Divisor applied to the weighted popularity score.
pub const SCORE_SCALE: f64 = 1000.0;
/// Smallest cluster that is scored at all.
pub const MIN_CLUSTER_SIZE: usize = 2;

/// Label for sequences that match no named rule.
pub const CUSTOM_SEQUENCE: &str = "custom_sequence";
/// Predicted source when no prediction rule applies.
pub const UNKNOWN_SOURCE: &str = "unknown";
/// Confidence attached to an `unknown` prediction.
pub const FALLBACK_CONFIDENCE: f64 = 0.1;

/// Names an exact, ordered list of distinct sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRule {
    pub name: String,
    pub sources: Vec<String>,
}

/// "If `when_present` has seen the template and `next` has not, predict
/// `next` with `confidence`."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRule {
    pub when_present: String,
    pub next: String,
    pub confidence: f64,
}

/// Tunable policy for the pattern engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPolicy {
    pub momentum_threshold: f64,
    pub momentum_cap: f64,
    pub decay_hours: f64,
    /// Evaluated in order; first exact match names the sequence.
    pub sequences: Vec<SequenceRule>,
    /// Evaluated top-down; first applicable rule wins.
    pub predictions: Vec<PredictionRule>,
}

impl Default for PatternPolicy {
    fn default() -> Self {
        Self {
            momentum_threshold: DEFAULT_MOMENTUM_THRESHOLD,
            momentum_cap: DEFAULT_MOMENTUM_CAP,
            decay_hours: DEFAULT_DECAY_HOURS,
            sequences: default_sequences(),
            predictions: default_predictions(),
        }
    }
}

pub fn default_sequences() -> Vec<SequenceRule> {
    let rule = |name: &str, sources: &[&str]| SequenceRule {
        name: name.to_string(),
        sources: sources.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        rule("reddit_to_tiktok_migration", &["reddit", "tiktok"]),
        rule("tiktok_to_instagram_expansion", &["tiktok", "instagram"]),
        rule("full_viral_sequence", &["reddit", "tiktok", "instagram"]),
    ]
}

pub fn default_predictions() -> Vec<PredictionRule> {
    vec![
        PredictionRule {
            when_present: "reddit".to_string(),
            next: "tiktok".to_string(),
            confidence: 0.7,
        },
        PredictionRule {
            when_present: "tiktok".to_string(),
            next: "instagram".to_string(),
            confidence: 0.6,
        },
    ]
}

/// Where a template is predicted to show up next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub next_source: String,
    pub confidence: f64,
}

/// One row of detection output.
#[derive(Debug, Clone, Serialize)]
pub struct EmergingPattern {
    pub template_hash: String,
    pub momentum_score: f64,
    /// Distinct sources, sorted.
    pub sources: Vec<String>,
    pub cross_source: bool,
    pub sequence: String,
    pub prediction: Prediction,
    pub first_seen: DateTime<Utc>,
    pub record_count: usize,
}

/// Lifecycle stage reported by [`PatternEngine::template_evolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// Fewer than three sightings so far.
    Emerging,
    /// Still collecting sightings, most popular ones are recent.
    Spreading,
    /// The most popular sighting is behind us.
    Peaked,
    /// Nothing new for a while.
    Dormant,
}

/// Hours without a new sighting after which a template counts as dormant.
pub const DORMANT_AFTER_HOURS: i64 = 72;

/// How a single template has travelled over its whole history.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateEvolution {
    pub template_hash: String,
    pub original: FingerprintRecord,
    pub variations: usize,
    pub sources_reached: usize,
    pub peak_score: i64,
    pub lifecycle: LifecycleStage,
}

/// A usable observation: a record with every field the scorer needs.
#[derive(Debug, Clone, Copy)]
struct Sighting<'a> {
    source: &'a str,
    score: i64,
    at: DateTime<Utc>,
}

impl<'a> Sighting<'a> {
    fn from_record(record: &'a FingerprintRecord) -> Option<(&'a str, Self)> {
        let hash = record.template_hash()?;
        Some((
            hash,
            Self {
                source: &record.source,
                score: record.score?,
                at: record.created_at?,
            },
        ))
    }
}

/// Records sharing one template hash inside the detection window.
struct TemplateCluster<'a> {
    template_hash: &'a str,
    sightings: Vec<Sighting<'a>>,
}

impl<'a> TemplateCluster<'a> {
    fn sources(&self) -> BTreeSet<&'a str> {
        self.sightings.iter().map(|s| s.source).collect()
    }

    fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.sightings.iter().map(|s| s.at).min()
    }

    /// Distinct sources in order of their first appearance in time.
    fn source_sequence(&self) -> Vec<&'a str> {
        let mut ordered = self.sightings.clone();
        ordered.sort_by_key(|s| s.at);
        let mut seen = BTreeSet::new();
        ordered
            .into_iter()
            .filter(|s| seen.insert(s.source))
            .map(|s| s.source)
            .collect()
    }
}

/// Scores and ranks template clusters.
#[derive(Debug, Clone, Default)]
pub struct PatternEngine {
    policy: PatternPolicy,
}

impl PatternEngine {
    pub fn new(policy: PatternPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PatternPolicy {
        &self.policy
    }

    /// Detect emerging templates among `records` as of now.
    pub fn detect_emerging_patterns(
        &self,
        records: &[FingerprintRecord],
        window_hours: f64,
    ) -> Vec<EmergingPattern> {
        self.detect_emerging_patterns_at(records, window_hours, Utc::now())
    }

    /// Detect emerging templates among `records` as of `now`.
    ///
    /// Records missing a timestamp, score or template hash are skipped, as
    /// are records older than `window_hours`. Output is sorted by momentum
    /// descending; equal scores keep first-seen grouping order.
    pub fn detect_emerging_patterns_at(
        &self,
        records: &[FingerprintRecord],
        window_hours: f64,
        now: DateTime<Utc>,
    ) -> Vec<EmergingPattern> {
        if !window_hours.is_finite() || window_hours <= 0.0 {
            return Vec::new();
        }
        let cutoff = window_start(now, window_hours);

        let mut clusters: Vec<TemplateCluster<'_>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for record in records {
            let Some((hash, sighting)) = Sighting::from_record(record) else {
                continue;
            };
            if sighting.at < cutoff {
                continue;
            }
            let slot = *index.entry(hash).or_insert_with(|| {
                clusters.push(TemplateCluster {
                    template_hash: hash,
                    sightings: Vec::new(),
                });
                clusters.len() - 1
            });
            clusters[slot].sightings.push(sighting);
        }

        let mut emerging: Vec<EmergingPattern> = clusters
            .iter()
            .filter(|c| c.sightings.len() >= MIN_CLUSTER_SIZE)
            .filter_map(|cluster| {
                let momentum = self.score_sightings(&cluster.sightings, now);
                if momentum <= self.policy.momentum_threshold {
                    return None;
                }
                let sources = cluster.sources();
                Some(EmergingPattern {
                    template_hash: cluster.template_hash.to_string(),
                    momentum_score: momentum,
                    cross_source: sources.len() > 1,
                    sequence: self.classify_sequence(&cluster.source_sequence()),
                    prediction: self.predict_next_source(&sources),
                    sources: sources.iter().map(|s| s.to_string()).collect(),
                    first_seen: cluster.first_seen()?,
                    record_count: cluster.sightings.len(),
                })
            })
            .collect();

        emerging.sort_by(|a, b| {
            b.momentum_score
                .partial_cmp(&a.momentum_score)
                .unwrap_or(Ordering::Equal)
        });
        emerging
    }

    /// Momentum of one cluster of records as of `now`.
    ///
    /// Records missing a timestamp or score are ignored. Fewer than
    /// [`MIN_CLUSTER_SIZE`] usable records score zero.
    pub fn momentum(&self, records: &[&FingerprintRecord], now: DateTime<Utc>) -> f64 {
        let sightings: Vec<Sighting<'_>> = records
            .iter()
            .filter_map(|r| {
                Some(Sighting {
                    source: &r.source,
                    score: r.score?,
                    at: r.created_at?,
                })
            })
            .collect();
        self.score_sightings(&sightings, now)
    }

    fn score_sightings(&self, sightings: &[Sighting<'_>], now: DateTime<Utc>) -> f64 {
        if sightings.len() < MIN_CLUSTER_SIZE {
            return 0.0;
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for s in sightings {
            // Future-dated records count as brand new rather than over-weighted.
            let age_hours = hours_between(s.at, now).max(0.0);
            let weight = (-age_hours / self.policy.decay_hours).exp();
            weighted_sum += s.score as f64 * weight;
            weight_total += weight;
        }
        let weighted_score = if weight_total == 0.0 {
            0.0
        } else {
            weighted_sum / weight_total
        };

        let distinct: BTreeSet<&str> = sightings.iter().map(|s| s.source).collect();
        let breadth_bonus = SOURCE_BREADTH_WEIGHT * distinct.len() as f64;

        let earliest = sightings.iter().map(|s| s.at).min().unwrap_or(now);
        let latest = sightings.iter().map(|s| s.at).max().unwrap_or(now);
        let span_hours = hours_between(earliest, latest);
        let velocity_bonus = sightings.len() as f64 / span_hours.max(1.0);

        (weighted_score / SCORE_SCALE + breadth_bonus + velocity_bonus)
            .min(self.policy.momentum_cap)
    }

    /// Name the chronological distinct-source sequence, or
    /// [`CUSTOM_SEQUENCE`] when no rule matches exactly.
    pub fn classify_sequence(&self, ordered_sources: &[&str]) -> String {
        self.policy
            .sequences
            .iter()
            .find(|rule| {
                rule.sources
                    .iter()
                    .map(String::as_str)
                    .eq(ordered_sources.iter().copied())
            })
            .map(|rule| rule.name.clone())
            .unwrap_or_else(|| CUSTOM_SEQUENCE.to_string())
    }

    /// Apply the prediction rules top-down to a cluster's source set.
    pub fn predict_next_source(&self, sources: &BTreeSet<&str>) -> Prediction {
        self.policy
            .predictions
            .iter()
            .find(|rule| {
                sources.contains(rule.when_present.as_str()) && !sources.contains(rule.next.as_str())
            })
            .map(|rule| Prediction {
                next_source: rule.next.clone(),
                confidence: rule.confidence,
            })
            .unwrap_or_else(|| Prediction {
                next_source: UNKNOWN_SOURCE.to_string(),
                confidence: FALLBACK_CONFIDENCE,
            })
    }

    /// Summarise the full history of one template.
    ///
    /// Returns `None` when no record with a timestamp carries `template_hash`.
    pub fn template_evolution(
        &self,
        records: &[FingerprintRecord],
        template_hash: &str,
        now: DateTime<Utc>,
    ) -> Option<TemplateEvolution> {
        let mut history: Vec<&FingerprintRecord> = records
            .iter()
            .filter(|r| r.template_hash() == Some(template_hash) && r.created_at.is_some())
            .collect();
        history.sort_by_key(|r| r.created_at);

        let original = *history.first()?;
        let latest_at = history.last()?.created_at?;
        let sources: BTreeSet<&str> = history.iter().map(|r| r.source.as_str()).collect();

        let (peak_index, peak_score) = history
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.score.map(|s| (i, s)))
            .fold(None, |best: Option<(usize, i64)>, (i, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((i, s)),
            })
            .unwrap_or((history.len() - 1, 0));

        let lifecycle = if now - latest_at > Duration::hours(DORMANT_AFTER_HOURS) {
            LifecycleStage::Dormant
        } else if history.len() < 3 {
            LifecycleStage::Emerging
        } else if peak_index < history.len() / 2 {
            LifecycleStage::Peaked
        } else {
            LifecycleStage::Spreading
        };

        Some(TemplateEvolution {
            template_hash: template_hash.to_string(),
            original: original.clone(),
            variations: history.len(),
            sources_reached: sources.len(),
            peak_score,
            lifecycle,
        })
    }
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

/// Earliest instant inside a window of `hours` ending at `now`.
///
/// Windows reaching past the representable date range have no lower
/// bound and yield [`DateTime::<Utc>::MIN_UTC`].
pub fn window_start(now: DateTime<Utc>, hours: f64) -> DateTime<Utc> {
    let millis = hours * 3_600_000.0;
    if !(millis.is_finite() && millis < i64::MAX as f64) {
        return DateTime::<Utc>::MIN_UTC;
    }
    Duration::try_milliseconds(millis as i64)
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
