//! HTTP fetch of a feed's raw bytes. A single GET with a fixed client
//! timeout — no retries, no backoff, no conditional headers — the worker's
//! invalid path covers a failed fetch by pushing the feed's next attempt out
//! rather than retrying inline.

use crate::config::FETCH_TIMEOUT;
use crate::error::{AggregatorError, Result};
use reqwest::Client;
use tracing::debug;

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Fetches `url`'s body. An empty URL or any transport/status error maps
    /// to `AggregatorError::Fetch` (spec §4.6 step 2).
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.is_empty() {
            return Err(AggregatorError::Fetch("empty url".to_string()));
        }

        debug!(url, "fetching feed");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AggregatorError::Fetch(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| AggregatorError::Fetch(e.to_string()))?;

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| AggregatorError::Fetch(e.to_string()))
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}
