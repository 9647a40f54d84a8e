//! Feature extraction: media bytes in, [`Fingerprint`] out.
//!
//! [`FeatureExtractor`] is synchronous and CPU-bound; async callers must
//! run it on the blocking pool (see [`extract_blocking`]). Every failure
//! comes back as an [`ExtractError`]; a panic inside an extractor is
//! caught at the blocking-task boundary and reported as
//! [`ExtractError::Fault`].

use std::io::Cursor;
use std::sync::Arc;

use image::{GenericImageView, ImageReader};

use memedoc_core::models::Fingerprint;

use crate::error::{ExtractError, ItemFailure};
use crate::fetch::Fetcher;
use crate::imagehash;

/// Computes a fingerprint from raw media bytes.
pub trait FeatureExtractor: Send + Sync {
    fn extract_from_bytes(&self, bytes: &[u8]) -> Result<Fingerprint, ExtractError>;
}

/// Default extractor backed by the `image` crate and [`imagehash`].
#[derive(Debug, Clone)]
pub struct ImageHashExtractor {
    min_dimension: u32,
}

impl ImageHashExtractor {
    pub fn new(min_dimension: u32) -> Self {
        Self { min_dimension }
    }
}

impl Default for ImageHashExtractor {
    fn default() -> Self {
        Self::new(8)
    }
}

impl FeatureExtractor for ImageHashExtractor {
    fn extract_from_bytes(&self, bytes: &[u8]) -> Result<Fingerprint, ExtractError> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ExtractError::Decode(format!("Failed to read image: {e}")))?
            .decode()
            .map_err(|e| ExtractError::Decode(e.to_string()))?;

        let (width, height) = img.dimensions();
        if width < self.min_dimension || height < self.min_dimension {
            return Err(ExtractError::TooSmall {
                width,
                height,
                min: self.min_dimension,
            });
        }

        Ok(imagehash::fingerprint_image(&img))
    }
}

/// Run `extractor` over `bytes` on the blocking thread pool.
pub async fn extract_blocking(
    extractor: Arc<dyn FeatureExtractor>,
    bytes: Vec<u8>,
) -> Result<Fingerprint, ExtractError> {
    tokio::task::spawn_blocking(move || extractor.extract_from_bytes(&bytes))
        .await
        .map_err(|e| ExtractError::Fault(e.to_string()))?
}

/// Download `url` and fingerprint the result.
pub async fn extract_from_url(
    fetcher: &dyn Fetcher,
    extractor: Arc<dyn FeatureExtractor>,
    url: &str,
) -> Result<Fingerprint, ItemFailure> {
    let bytes = fetcher.fetch(url).await?;
    Ok(extract_blocking(extractor, bytes).await?)
}
