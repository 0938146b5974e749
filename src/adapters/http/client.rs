//! Venue HTTP Client - Paced, Retrying REST Client
//!
//! Wraps reqwest with request pacing, bounded concurrency, retries, and
//! HMAC authentication for every venue REST interaction.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::{
    VenueAuth, HEADER_KEY, HEADER_PASSPHRASE, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};

/// Configuration for the venue HTTP client.
#[derive(Debug, Clone)]
pub struct VenueClientConfig {
    /// Base URL for the venue API.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Minimum spacing between requests.
    pub min_request_interval: Duration,
    /// Maximum concurrent requests.
    pub max_concurrent: usize,
    /// Maximum retries on transient errors.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub retry_base_delay: Duration,
}

impl Default for VenueClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_millis(1_500),
            max_concurrent: 4,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

/// Paced HTTP client for a venue REST API.
pub struct VenueHttpClient {
    /// Underlying HTTP client.
    http: Client,
    /// Request signer; unsigned when absent.
    auth: Option<Arc<VenueAuth>>,
    /// Client configuration.
    config: VenueClientConfig,
    /// Concurrency limiter.
    semaphore: Arc<Semaphore>,
    /// Request pacing.
    pacer: DefaultDirectRateLimiter,
}

impl VenueHttpClient {
    /// Create a new venue client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or the pacing
    /// interval is zero.
    pub fn new(auth: Option<Arc<VenueAuth>>, config: VenueClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(5)
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::with_period(config.min_request_interval)
            .context("min_request_interval must be non-zero")?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            http,
            auth,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            pacer: RateLimiter::direct(quota),
            config,
        })
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.config.base_url, path);
        let request = self.http.get(&url);
        let response = self.execute_with_retry(request, "GET", path, "").await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode GET {path}"))
    }

    /// POST a JSON body to `path` and decode the JSON response.
    pub async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_string(body).context("Failed to encode request body")?;
        let url = format!("{}{}", self.config.base_url, path);
        let request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body.clone());
        let response = self.execute_with_retry(request, "POST", path, &body).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode POST {path}"))
    }

    /// Execute request with pacing, authentication, and retries.
    async fn execute_with_retry(
        &self,
        request: RequestBuilder,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<Response> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .context("Semaphore closed")?;

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis(), "Retrying request");
                sleep(delay).await;
            }

            self.pacer.until_ready().await;

            let mut req = request.try_clone().context("Failed to clone request")?;
            if let Some(auth) = &self.auth {
                let headers = auth.headers(method, path, body);
                req = req
                    .header(HEADER_KEY, headers.key)
                    .header(HEADER_PASSPHRASE, headers.passphrase)
                    .header(HEADER_TIMESTAMP, headers.timestamp)
                    .header(HEADER_SIGNATURE, headers.signature);
            }

            match req.send().await {
                Ok(response) => match response.status() {
                    status if status.is_success() => return Ok(response),
                    StatusCode::TOO_MANY_REQUESTS => {
                        warn!(path, "Rate limited by venue, backing off");
                        sleep(Duration::from_secs(2)).await;
                        last_error = Some(anyhow::anyhow!("Rate limited"));
                    }
                    status if status.is_server_error() => {
                        warn!(status = %status, path, "Server error, retrying");
                        last_error = Some(anyhow::anyhow!("Server error: {status}"));
                    }
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        return Err(anyhow::anyhow!("Venue error {status} on {path}: {body}"));
                    }
                },
                Err(e) => {
                    warn!(error = %e, attempt, path, "Request failed");
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        assert!(VenueHttpClient::new(None, VenueClientConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_pacing_interval_rejected() {
        let config = VenueClientConfig {
            min_request_interval: Duration::ZERO,
            ..VenueClientConfig::default()
        };
        let err = VenueHttpClient::new(None, config).err().unwrap();
        assert!(err.to_string().contains("non-zero"));
    }
}
