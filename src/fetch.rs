//! Rate-limited retrieval of upstream content

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::FETCH_TIMEOUT;
use crate::ratelimit::{RateLimitError, RateLimiter};

const USER_AGENT: &str = concat!("ebuild-autoupdate/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Rate limit: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Response body and the content type the server declared
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedContent {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches `url` with extra request `headers`
    async fn fetch(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<FetchedContent, FetchError>;
}

/// HTTP fetcher that waits on the target host's bucket before every request
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

impl HttpFetcher {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::new(),
            limiter,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<FetchedContent, FetchError> {
        self.limiter.wait_http_for_url(&self.cancel, url).await?;
        debug!("Fetching {}", url);

        let mut request = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .header(reqwest::header::USER_AGENT, USER_AGENT);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        debug!("Fetched {} bytes from {}", body.len(), url);

        Ok(FetchedContent { body, content_type })
    }
}
