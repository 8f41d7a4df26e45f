//! Admission control for LLM calls and per-host HTTP requests

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{HTTP_REFILL_INTERVAL, LLM_REFILL_INTERVAL};
use crate::ratelimit::bucket::{Reservation, TokenBucket};
use crate::ratelimit::error::RateLimitError;

const BURST: u32 = 1;

/// One global LLM bucket plus one lazily created bucket per remote host.
///
/// Shared by `Arc` between all workers of a run.
#[derive(Debug)]
pub struct RateLimiter {
    llm: Arc<TokenBucket>,
    hosts: Mutex<HashMap<String, Arc<TokenBucket>>>,
    http_interval: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// LLM: one request per 12 s. HTTP: one request per 6 s per host.
    pub fn new() -> Self {
        Self::with_intervals(LLM_REFILL_INTERVAL, HTTP_REFILL_INTERVAL)
    }

    pub fn with_intervals(llm_interval: Duration, http_interval: Duration) -> Self {
        Self {
            llm: Arc::new(TokenBucket::new(llm_interval, BURST)),
            hosts: Mutex::new(HashMap::new()),
            http_interval,
        }
    }

    pub fn llm_interval(&self) -> Duration {
        self.llm.interval()
    }

    pub fn http_interval(&self) -> Duration {
        self.http_interval
    }

    /// Bucket for `host`, created on first use. The map lock is released before returning.
    fn host_bucket(&self, host: &str) -> Arc<TokenBucket> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(hosts.entry(host.to_string()).or_insert_with(|| {
            debug!("Creating rate limit bucket for host {}", host);
            Arc::new(TokenBucket::new(self.http_interval, BURST))
        }))
    }

    pub fn allow_llm(&self) -> bool {
        self.llm.try_acquire()
    }

    pub fn allow_http(&self, host: &str) -> bool {
        self.host_bucket(host).try_acquire()
    }

    pub fn reserve_llm(&self) -> Result<Reservation, RateLimitError> {
        self.llm.reserve()
    }

    pub fn reserve_http(&self, host: &str) -> Result<Reservation, RateLimitError> {
        self.host_bucket(host).reserve()
    }

    /// Blocks until the LLM bucket admits a request or `cancel` fires
    pub async fn wait_llm(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        self.llm.wait(cancel).await
    }

    /// Blocks until `host`'s bucket admits a request or `cancel` fires
    pub async fn wait_http(&self, cancel: &CancellationToken, host: &str) -> Result<(), RateLimitError> {
        let bucket = self.host_bucket(host);
        bucket.wait(cancel).await
    }

    /// Like [`wait_http`](Self::wait_http) with the host taken from `url`.
    ///
    /// An unparsable URL is used verbatim as the bucket key.
    pub async fn wait_http_for_url(&self, cancel: &CancellationToken, url: &str) -> Result<(), RateLimitError> {
        let host = host_of(url);
        self.wait_http(cancel, &host).await
    }

    /// Number of hosts with a bucket
    pub fn domain_count(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops all host buckets and refills the LLM bucket
    pub fn reset(&self) {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.llm.reset();
    }
}

/// Host component of a URL, or the input itself when it does not parse
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
