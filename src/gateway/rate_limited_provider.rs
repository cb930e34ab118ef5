// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport shared by all configured providers. Enforces a minimum
//! spacing between requests across the whole process, retries rate-limit
//! rejections with exponential backoff, and counts every call.

use crate::metrics::BotMetrics;
use ethers::providers::{Http, HttpClientError, JsonRpcClient, Provider};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::{ParseError, Url};

const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Token bucket with one token: a single lock on the last request time gives
/// the minimum inter-call spacing of `1000 / rps` ms. One limiter is shared
/// by every provider so the budget is global, not per endpoint.
pub struct RateLimiter {
    min_delay: Duration,
    last_request: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let min_delay = Duration::from_millis(1000 / u64::from(requests_per_second.max(1)));
        Self {
            min_delay,
            last_request: Mutex::new(Instant::now() - min_delay),
        }
    }

    pub async fn acquire(&self) {
        let mut last_request = self.last_request.lock().await;
        let elapsed = Instant::now().saturating_duration_since(*last_request);
        if elapsed < self.min_delay {
            tokio::time::sleep(self.min_delay - elapsed).await;
        }
        *last_request = Instant::now();
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }
}

#[derive(Clone)]
pub struct RateLimitedHttpProvider {
    inner: Http,
    provider_name: String,
    limiter: Arc<RateLimiter>,
    metrics: Arc<BotMetrics>,
}

impl Debug for RateLimitedHttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedHttpProvider")
            .field("provider_name", &self.provider_name)
            .field("min_delay", &self.limiter.min_delay())
            .finish()
    }
}

#[async_trait::async_trait]
impl JsonRpcClient for RateLimitedHttpProvider {
    type Error = HttpClientError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, HttpClientError> {
        self.limiter.acquire().await;

        self.metrics
            .eth_rpc_queries
            .with_label_values(&[&self.provider_name, method])
            .inc();

        let mut result = self.inner.request(method, &params).await;
        let mut retry_count = 0;

        while retry_count < MAX_RATE_LIMIT_RETRIES {
            // Some providers answer rate limits with a non-standard JSON-RPC
            // body that surfaces as a deserialization error, so the message is
            // inspected rather than the error kind.
            let is_rate_limit = match &result {
                Err(e) => {
                    let error_str = format!("{:?}", e).to_lowercase();
                    error_str.contains("rate limit")
                        || error_str.contains("429")
                        || error_str.contains("too many requests")
                        || error_str.contains("quota exceeded")
                        || error_str.contains("-32005")
                }
                Ok(_) => false,
            };

            if !is_rate_limit {
                break;
            }

            let backoff_duration = Duration::from_secs(1 << retry_count);
            tracing::warn!(
                "[{}] Rate limited on {}, retrying after {:?} (attempt {}/{})",
                self.provider_name,
                method,
                backoff_duration,
                retry_count + 1,
                MAX_RATE_LIMIT_RETRIES
            );
            tokio::time::sleep(backoff_duration).await;
            self.limiter.acquire().await;

            result = self.inner.request(method, &params).await;
            retry_count += 1;
        }

        if result.is_err() {
            self.metrics
                .eth_rpc_errors
                .with_label_values(&[&self.provider_name, method])
                .inc();
        }
        result
    }
}

impl RateLimitedHttpProvider {
    pub fn new(
        url: impl Into<Url>,
        provider_name: &str,
        limiter: Arc<RateLimiter>,
        metrics: Arc<BotMetrics>,
    ) -> Self {
        Self {
            inner: Http::new(url),
            provider_name: provider_name.to_string(),
            limiter,
            metrics,
        }
    }
}

pub fn new_rate_limited_provider(
    url: &str,
    provider_name: &str,
    limiter: Arc<RateLimiter>,
    metrics: Arc<BotMetrics>,
) -> Result<Provider<RateLimitedHttpProvider>, ParseError> {
    let http_provider =
        RateLimitedHttpProvider::new(Url::parse(url)?, provider_name, limiter, metrics);
    Ok(Provider::new(http_provider))
}
