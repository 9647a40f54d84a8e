//! Fingerprint comparison: Hamming distance over hex hashes and the
//! multi-hash similarity search.
//!
//! # Similarity
//!
//! For every hash kind present in both fingerprints:
//!
//! ```text
//! contribution = (bit_width − hamming(a, b)) / bit_width
//! ```
//!
//! The contributions are summed and a bonus of `1.0` is added when the
//! layout tags match exactly. Identical fingerprints therefore score
//! `shared_kinds + 1`.

use std::cmp::Ordering;

use serde::Serialize;

use crate::models::{Fingerprint, FingerprintRecord, HashKind};

/// Bonus added when two fingerprints share the same layout tag.
pub const LAYOUT_MATCH_BONUS: f64 = 1.0;

/// Bit-difference count between two equal-length hex strings.
///
/// Returns `None` when either string is not valid hex or the lengths
/// differ.
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    let mut distance = 0u32;
    for (ca, cb) in a.chars().zip(b.chars()) {
        let na = ca.to_digit(16)?;
        let nb = cb.to_digit(16)?;
        distance += (na ^ nb).count_ones();
    }
    Some(distance)
}

/// Similarity contribution of a single hash kind, in `[0, 1]`.
fn hash_similarity(kind: HashKind, a: &str, b: &str) -> Option<f64> {
    let width = kind.bit_width();
    let distance = hamming_distance(a, b)?.min(width);
    Some(f64::from(width - distance) / f64::from(width))
}

/// Composite similarity between two fingerprints.
///
/// Hash kinds that are missing on either side, malformed, or of mismatched
/// length contribute nothing.
pub fn similarity(target: &Fingerprint, candidate: &Fingerprint) -> f64 {
    let mut score: f64 = target
        .hashes
        .iter()
        .filter_map(|(kind, value)| {
            let other = candidate.get(*kind)?;
            hash_similarity(*kind, value, other)
        })
        .sum();

    if target.layout == candidate.layout {
        score += LAYOUT_MATCH_BONUS;
    }
    score
}

/// A candidate that cleared the similarity threshold.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarMatch<'a> {
    pub record: &'a FingerprintRecord,
    pub similarity: f64,
}

/// Rank `candidates` by similarity to `target`.
///
/// Only candidates scoring strictly above `threshold` are returned, sorted
/// by similarity descending. Ties keep candidate order.
pub fn find_similar_fingerprints<'a>(
    target: &FingerprintRecord,
    candidates: &'a [FingerprintRecord],
    threshold: f64,
) -> Vec<SimilarMatch<'a>> {
    let mut matches: Vec<SimilarMatch<'a>> = candidates
        .iter()
        .filter_map(|candidate| {
            let score = similarity(&target.fingerprint, &candidate.fingerprint);
            (score > threshold).then_some(SimilarMatch {
                record: candidate,
                similarity: score,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    matches
}
