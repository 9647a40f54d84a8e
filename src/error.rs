//! Typed failures for the ingestion path.
//!
//! Per-item failures ([`FetchError`], [`ExtractError`]) are absorbed into
//! [`BatchResult`](crate::pipeline::BatchResult) counters; only
//! [`PipelineError`] escapes to the caller, and only at construction time.

use thiserror::Error;

/// A media download that did not yield usable bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("empty response body")]
    EmptyBody,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Bytes that could not be turned into a fingerprint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("could not decode image: {0}")]
    Decode(String),

    #[error("image {width}x{height} is below the {min}px minimum")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error("extractor fault: {0}")]
    Fault(String),
}

/// Why one item produced no record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),
}

/// Failures that stop a pipeline from being built at all.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
