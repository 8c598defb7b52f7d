//! Rate-Limited HTTP Client for the processing service
//!
//! Every request waits for a permit from a process-wide limiter so that
//! many concurrent poll loops cannot exceed the service's request budget.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ProcessingSettings;
use crate::providers::traits::{JobServiceError, JobServiceResult};

/// Rate-limited HTTP client for API requests
#[derive(Clone)]
pub struct RateLimitedClient {
    /// Inner HTTP client
    client: Client,

    /// Shared by all clones, so the budget is global to the process
    limiter: Arc<DefaultDirectRateLimiter>,

    /// Configured rate limit
    rate_limit_per_minute: u32,
}

impl RateLimitedClient {
    /// Create a client from the processing settings
    pub fn new(settings: &ProcessingSettings) -> JobServiceResult<Self> {
        let rate = NonZeroU32::new(settings.rate_limit_per_minute).unwrap_or(nonzero!(1u32));
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rate)));

        let mut headers = HeaderMap::new();
        if let Some(token) = settings.api_token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| JobServiceError::Endpoint("API token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .default_headers(headers)
            .user_agent(concat!("cutout-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(RateLimitedClient {
            client,
            limiter,
            rate_limit_per_minute: rate.get(),
        })
    }

    pub fn rate_limit_per_minute(&self) -> u32 {
        self.rate_limit_per_minute
    }

    /// Build a GET request
    pub fn get(&self, url: &str) -> RateLimitedRequestBuilder<'_> {
        RateLimitedRequestBuilder {
            client: self,
            builder: self.client.get(url),
        }
    }

    /// Build a POST request
    pub fn post(&self, url: &str) -> RateLimitedRequestBuilder<'_> {
        RateLimitedRequestBuilder {
            client: self,
            builder: self.client.post(url),
        }
    }

    /// Wait for a permit and execute. Any status is returned as-is; the
    /// caller decides what counts as success.
    async fn execute(&self, builder: RequestBuilder) -> JobServiceResult<Response> {
        self.limiter.until_ready().await;

        let response = builder.send().await?;
        debug!(status = response.status().as_u16(), url = %response.url(), "Processing service responded");

        Ok(response)
    }
}

/// Request builder wrapper that enforces rate limiting
pub struct RateLimitedRequestBuilder<'a> {
    client: &'a RateLimitedClient,
    builder: RequestBuilder,
}

impl<'a> RateLimitedRequestBuilder<'a> {
    /// Add JSON body to the request
    pub fn json<T: serde::Serialize + ?Sized>(mut self, json: &T) -> Self {
        self.builder = self.builder.json(json);
        self
    }

    /// Send the request (waits for rate limit)
    pub async fn send(self) -> JobServiceResult<Response> {
        self.client.execute(self.builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_client_creation() {
        let settings = ProcessingSettings {
            rate_limit_per_minute: 120,
            ..ProcessingSettings::default()
        };
        let client = RateLimitedClient::new(&settings).unwrap();
        assert_eq!(client.rate_limit_per_minute(), 120);
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let settings = ProcessingSettings {
            rate_limit_per_minute: 0,
            api_token: Some("secret".to_string()),
            ..ProcessingSettings::default()
        };
        let client = RateLimitedClient::new(&settings).unwrap();
        assert_eq!(client.rate_limit_per_minute(), 1);
    }
}
