//! Metadata retrieval.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error returned by a [`MetadataFetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The location cannot be fetched.
    #[error("cannot fetch {0}")]
    Unsupported(String),

    /// The fetch did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Retrieves metadata documents.
#[async_trait]
pub trait MetadataFetcher: Send + Sync + Debug {
    /// Returns the document at `location`.
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches metadata over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        if !(location.starts_with("https://") || location.starts_with("http://")) {
            return Err(FetchError::Unsupported(location.to_string()));
        }
        tracing::debug!(location = %location, "fetching metadata");
        let response = self.client.get(location).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// A fetcher that never finds anything, for registries managed by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetch;

#[async_trait]
impl MetadataFetcher for NoFetch {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Unsupported(location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_http_locations_are_refused() {
        let fetcher = HttpMetadataFetcher::new(Duration::from_secs(1)).unwrap();
        let result = fetcher.fetch("urn:example:entity").await;
        assert!(matches!(result, Err(FetchError::Unsupported(_))));
    }

    #[tokio::test]
    async fn no_fetch_always_fails() {
        assert!(NoFetch.fetch("https://idp.example.org").await.is_err());
    }
}
