//! HTTP fetching of remote media bytes.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::COOKIE;

/// Fetches raw bytes from a URL, optionally authenticated with a cookie
/// header. The pipeline depends on this seam so tests can run without a
/// network.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, cookie: Option<&str>) -> Result<Vec<u8>>;
}

/// reqwest-backed fetcher used in production.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout. Media files can
    /// be large, so callers should allow generous timeouts.
    pub fn new(timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, cookie: Option<&str>) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Fetch of {} failed with status {}", url, status);
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        Ok(bytes.to_vec())
    }
}
