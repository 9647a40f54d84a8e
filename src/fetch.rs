//! Media download.
//!
//! [`Fetcher`] is the seam between the pipeline and the network. The
//! production [`HttpFetcher`] wraps one `reqwest::Client`; an ingest run
//! builds its own fetcher so the connection pool lives exactly as long as
//! the run.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;

use crate::config::FetchConfig;
use crate::error::{FetchError, PipelineError};

/// Downloads the raw bytes behind a media URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `reqwest`-backed fetcher with timeouts, a User-Agent and a body cap.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Build a fetcher whose idle pool holds at most `pool_size`
    /// connections per host.
    pub fn new(config: &FetchConfig, pool_size: usize) -> Result<Self, PipelineError> {
        if config.max_bytes == 0 {
            return Err(PipelineError::Configuration(
                "fetch.max_bytes must be > 0".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(pool_size)
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let limit = self.max_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(body)
    }
}
