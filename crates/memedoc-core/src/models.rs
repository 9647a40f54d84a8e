//! Core data models shared by the ingestion pipeline and the pattern engine.
//!
//! A [`ContentItem`] is what a discovery source hands over. Once its media
//! has been fingerprinted it becomes a [`FingerprintRecord`], which is the
//! unit the store persists and the pattern engine reads back.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One discovered unit of content, as produced by a discovery source.
///
/// `(source, item_id)` is the natural key. The pipeline never mutates an
/// item; enrichment produces a [`FingerprintRecord`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub source: String,
    pub item_id: String,
    pub title: String,
    pub media_url: String,
    /// Popularity score reported by the source. May be negative.
    pub score: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ContentItem {
    pub fn key(&self) -> (&str, &str) {
        (&self.source, &self.item_id)
    }
}

/// The perceptual hash families carried by a [`Fingerprint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HashKind {
    #[serde(rename = "phash")]
    Perceptual,
    #[serde(rename = "dhash")]
    Difference,
    #[serde(rename = "whash")]
    Wavelet,
    #[serde(rename = "colorhash")]
    Color,
}

impl HashKind {
    pub const ALL: [HashKind; 4] = [
        HashKind::Perceptual,
        HashKind::Difference,
        HashKind::Wavelet,
        HashKind::Color,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Perceptual => "phash",
            HashKind::Difference => "dhash",
            HashKind::Wavelet => "whash",
            HashKind::Color => "colorhash",
        }
    }

    /// Number of bits in a hash of this kind.
    pub fn bit_width(&self) -> u32 {
        64
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse structural layout of the text regions in an image.
///
/// Parsing never fails: anything outside the known set becomes
/// [`LayoutTag::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayoutTag {
    NoText,
    SingleText,
    Top,
    Middle,
    Bottom,
    TopMiddle,
    TopBottom,
    MiddleBottom,
    TopMiddleBottom,
    Scattered,
    #[default]
    Unknown,
}

impl LayoutTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutTag::NoText => "no_text",
            LayoutTag::SingleText => "single_text",
            LayoutTag::Top => "top",
            LayoutTag::Middle => "middle",
            LayoutTag::Bottom => "bottom",
            LayoutTag::TopMiddle => "top_middle",
            LayoutTag::TopBottom => "top_bottom",
            LayoutTag::MiddleBottom => "middle_bottom",
            LayoutTag::TopMiddleBottom => "top_middle_bottom",
            LayoutTag::Scattered => "scattered",
            LayoutTag::Unknown => "unknown",
        }
    }

    /// Build a tag from which vertical bands contain text regions.
    pub fn from_bands(top: bool, middle: bool, bottom: bool) -> Self {
        match (top, middle, bottom) {
            (true, false, false) => LayoutTag::Top,
            (false, true, false) => LayoutTag::Middle,
            (false, false, true) => LayoutTag::Bottom,
            (true, true, false) => LayoutTag::TopMiddle,
            (true, false, true) => LayoutTag::TopBottom,
            (false, true, true) => LayoutTag::MiddleBottom,
            (true, true, true) => LayoutTag::TopMiddleBottom,
            (false, false, false) => LayoutTag::Scattered,
        }
    }
}

impl FromStr for LayoutTag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "no_text" => LayoutTag::NoText,
            "single_text" => LayoutTag::SingleText,
            "top" => LayoutTag::Top,
            "middle" => LayoutTag::Middle,
            "bottom" => LayoutTag::Bottom,
            "top_middle" => LayoutTag::TopMiddle,
            "top_bottom" => LayoutTag::TopBottom,
            "middle_bottom" => LayoutTag::MiddleBottom,
            "top_middle_bottom" => LayoutTag::TopMiddleBottom,
            "scattered" => LayoutTag::Scattered,
            _ => LayoutTag::Unknown,
        })
    }
}

impl fmt::Display for LayoutTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LayoutTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LayoutTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}

/// Hash strings plus the layout tag extracted from one piece of media.
///
/// Hash values are stored lower-cased, so two fingerprints compare equal
/// regardless of the hex case or the order their hashes were inserted in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hashes: BTreeMap<HashKind, String>,
    pub layout: LayoutTag,
}

impl Fingerprint {
    pub fn new(layout: LayoutTag) -> Self {
        Self {
            hashes: BTreeMap::new(),
            layout,
        }
    }

    /// Builder-style insert of one hash value.
    pub fn with_hash(mut self, kind: HashKind, value: impl AsRef<str>) -> Self {
        self.insert(kind, value);
        self
    }

    pub fn insert(&mut self, kind: HashKind, value: impl AsRef<str>) {
        self.hashes
            .insert(kind, value.as_ref().trim().to_ascii_lowercase());
    }

    pub fn get(&self, kind: HashKind) -> Option<&str> {
        self.hashes.get(&kind).map(String::as_str)
    }
}

/// A content item enriched with its extracted fingerprint.
///
/// `score` and `created_at` are optional because history read back from a
/// store may be incomplete; records built by the pipeline always carry both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub source: String,
    pub item_id: String,
    pub title: String,
    pub media_url: String,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    /// SHA-256 of the downloaded media bytes, when known.
    pub media_sha256: Option<String>,
    pub fingerprint: Fingerprint,
}

impl FingerprintRecord {
    pub fn from_item(item: &ContentItem, fingerprint: Fingerprint) -> Self {
        Self {
            source: item.source.clone(),
            item_id: item.item_id.clone(),
            title: item.title.clone(),
            media_url: item.media_url.clone(),
            author: item.author.clone(),
            score: Some(item.score),
            created_at: Some(item.created_at),
            media_sha256: None,
            fingerprint,
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.source, &self.item_id)
    }

    /// The hash used to group records into template clusters (the pHash).
    pub fn template_hash(&self) -> Option<&str> {
        self.fingerprint
            .get(HashKind::Perceptual)
            .filter(|h| !h.is_empty())
    }
}
