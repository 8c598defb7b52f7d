//! HTTP client for the background-removal job service
//!
//! - `POST {base}/jobs` with `{image}` answers 201 `{id, status, input}`
//! - `GET {base}/jobs/{id}` answers 200 `{id, status, output?, error?}`
//! - any other status carries `{detail}`

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::config::ProcessingSettings;
use crate::providers::http_client::RateLimitedClient;
use crate::providers::traits::{
    CreateJobRequest, ErrorBody, JobResource, JobService, JobServiceError, JobServiceResult,
};

/// Processing service client
pub struct HttpJobService {
    client: RateLimitedClient,
    base_url: Url,
}

impl HttpJobService {
    pub fn new(settings: &ProcessingSettings) -> JobServiceResult<Self> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| JobServiceError::Endpoint(format!("{}: {}", settings.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(JobServiceError::Endpoint(settings.base_url.clone()));
        }

        let client = RateLimitedClient::new(settings)?;
        info!(
            base_url = %base_url,
            rate_limit_per_minute = client.rate_limit_per_minute(),
            "Processing service client configured"
        );

        Ok(HttpJobService { client, base_url })
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> JobServiceResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| JobServiceError::Endpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Turn a non-success response into an error carrying the service detail
    async fn api_error(response: Response) -> JobServiceError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    body.clone()
                }
            });

        JobServiceError::Api {
            status: status.as_u16(),
            detail,
        }
    }

    async fn parse(response: Response) -> JobServiceResult<JobResource> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(500).collect();
            JobServiceError::Parse(format!("JSON parse error: {} - Body: {}", e, preview))
        })
    }
}

#[async_trait]
impl JobService for HttpJobService {
    fn name(&self) -> &str {
        "http"
    }

    async fn create_job(&self, image: &str) -> JobServiceResult<JobResource> {
        let url = self.endpoint(&["jobs"])?;
        debug!(url = %url, "Creating job");

        let response = self.client
            .post(url.as_str())
            .json(&CreateJobRequest { image })
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(Self::api_error(response).await);
        }
        Self::parse(response).await
    }

    async fn fetch_job(&self, id: &str) -> JobServiceResult<JobResource> {
        let url = self.endpoint(&["jobs", id])?;

        let response = self.client.get(url.as_str()).send().await?;

        if response.status() != StatusCode::OK {
            return Err(Self::api_error(response).await);
        }
        Self::parse(response).await
    }
}
