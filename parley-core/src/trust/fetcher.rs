//! CRL fetching
//!
//! The fetcher is injected so tests can serve CRLs from memory.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::error::TrustError;
use crate::http::check_status;

/// Maximum CRL size accepted from a distribution point (10 MB).
pub const MAX_CRL_SIZE: u64 = 10 * 1024 * 1024;

/// Retrieves DER-encoded CRLs by URL.
#[async_trait]
pub trait CrlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TrustError>;
}

/// Fetches CRLs over HTTP(S).
pub struct HttpCrlFetcher {
    client: Client,
    max_size: u64,
}

impl HttpCrlFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TrustError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Parley/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrustError::CrlFetch {
                url: String::new(),
                reason: format!("HTTP client setup failed: {}", e),
            })?;

        Ok(HttpCrlFetcher {
            client,
            max_size: MAX_CRL_SIZE,
        })
    }
}

#[async_trait]
impl CrlFetcher for HttpCrlFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TrustError> {
        let fetch_error = |reason: String| TrustError::CrlFetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        check_status(response.status(), &[StatusCode::OK])
            .map_err(|e| fetch_error(e.to_string()))?;

        // Check content length before downloading
        if let Some(len) = response.content_length() {
            if len > self.max_size {
                return Err(fetch_error(format!("CRL too large: {} bytes", len)));
            }
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        // Content-Length may be missing
        if data.len() as u64 > self.max_size {
            return Err(fetch_error(format!("CRL too large: {} bytes", data.len())));
        }

        Ok(data.to_vec())
    }
}
