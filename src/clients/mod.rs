/// External API clients module
use crate::errors::{ApiError, ApiResult};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Anything that can hand back raw TLE catalog text
pub trait TleSource: Send + Sync {
    fn fetch_text(&self) -> impl Future<Output = ApiResult<String>> + Send;
}

/// HTTP client wrapper with common configuration
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent("iss-pass-predictor/1.0")
            .build()?;
        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

/// CelesTrak-style plain text TLE endpoint
pub struct TleClient {
    http_client: HttpClient,
    base_url: String,
    timeout: Duration,
}

impl TleClient {
    pub fn new(base_url: String, timeout: Duration) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new(timeout)?,
            base_url,
            timeout,
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whole-request timeout applied to every download
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl TleSource for TleClient {
    /// Fetch the multi-line TLE catalog
    async fn fetch_text(&self) -> ApiResult<String> {
        let resp = self
            .http_client
            .get_client()
            .get(&self.base_url)
            .send()
            .await?
            .error_for_status()?;

        let text = resp.text().await?;
        debug!(bytes = text.len(), url = %self.base_url, "TLE catalog downloaded");

        if text.trim().is_empty() {
            return Err(ApiError::Upstream(format!(
                "empty TLE response from {}",
                self.base_url
            )));
        }

        Ok(text)
    }
}
