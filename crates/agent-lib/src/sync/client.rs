//! HTTP delivery of compressed metric payloads
//!
//! This module provides:
//! - A [`Transport`] seam over the HTTP client so delivery can be tested
//!   without a network
//! - A reqwest-backed transport with a per-request timeout
//! - [`DeliveryClient`], which posts one payload under a [`RetryPolicy`]

use super::RetryPolicy;
use crate::error::DeliveryError;
use crate::payload::CONTENT_ENCODING;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, CONTENT_ENCODING as CONTENT_ENCODING_HEADER, CONTENT_TYPE,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// New Relic Metric API (US region)
pub const DEFAULT_METRIC_API_URL: &str = "https://metric-api.newrelic.com/metric/v1";

/// Header carrying the license key
pub const API_KEY_HEADER: &str = "api-key";

/// Status and body of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends a single POST request; no retries at this level
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, endpoint: &str, headers: &HeaderMap, body: Vec<u8>)
        -> Result<HttpResponse>;
}

/// Production transport over a shared reqwest client
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        endpoint: &str,
        headers: &HeaderMap,
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        let response = self
            .client
            .post(endpoint)
            .headers(headers.clone())
            .body(body)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}

/// Statuses the ingestion API uses to acknowledge a payload
pub fn is_success(status: u16) -> bool {
    status == 200 || status == 202
}

/// Headers sent with every payload
pub fn delivery_headers(license_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        CONTENT_ENCODING_HEADER,
        HeaderValue::from_static(CONTENT_ENCODING),
    );

    let mut api_key =
        HeaderValue::from_str(license_key).context("License key is not a valid header value")?;
    api_key.set_sensitive(true);
    headers.insert(API_KEY_HEADER, api_key);

    Ok(headers)
}

/// A payload the endpoint accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
    pub body: Vec<u8>,
    pub attempts: u32,
}

/// Configuration for the delivery client
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Ingestion endpoint URL
    pub endpoint: String,
    /// Per-request timeout for the default HTTP transport
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_METRIC_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::legacy(),
        }
    }
}

/// Posts payloads to the ingestion endpoint with bounded retries
pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    endpoint: String,
    headers: HeaderMap,
    policy: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
        headers: HeaderMap,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            headers,
            policy,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Post one payload
    ///
    /// Returns on the first 200/202. Any other status or a transport error
    /// counts as a failed attempt; once the policy is exhausted the error
    /// describes the final attempt.
    pub async fn post(&self, payload: &[u8]) -> Result<Delivered, DeliveryError> {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            let failure = match self
                .transport
                .post(&self.endpoint, &self.headers, payload.to_vec())
                .await
            {
                Ok(response) if is_success(response.status) => {
                    debug!(
                        status = response.status,
                        attempts = attempt,
                        bytes = payload.len(),
                        "Metrics payload accepted"
                    );
                    return Ok(Delivered {
                        status: response.status,
                        body: response.body,
                        attempts: attempt,
                    });
                }
                Ok(response) => {
                    warn!(
                        attempt = attempt,
                        status = response.status,
                        "Metrics endpoint returned non-success status"
                    );
                    DeliveryError::Rejected {
                        status: response.status,
                        body: response.body,
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "Metrics delivery attempt failed");
                    DeliveryError::Transport {
                        message: format!("{:#}", e),
                        attempts: attempt,
                    }
                }
            };

            if attempt >= max_attempts {
                return Err(failure);
            }

            attempt += 1;
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Builder for [`DeliveryClient`]
pub struct DeliveryClientBuilder {
    config: DeliveryConfig,
    license_key: Option<String>,
    transport: Option<Arc<dyn Transport>>,
}

impl DeliveryClientBuilder {
    pub fn new() -> Self {
        Self {
            config: DeliveryConfig::default(),
            license_key: None,
            transport: None,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn license_key(mut self, key: impl Into<String>) -> Self {
        self.license_key = Some(key.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Use a custom transport instead of the reqwest one
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<DeliveryClient> {
        let license_key = self
            .license_key
            .ok_or_else(|| anyhow::anyhow!("license_key is required"))?;
        let headers = delivery_headers(&license_key)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.request_timeout)?),
        };

        Ok(DeliveryClient::new(
            transport,
            self.config.endpoint,
            headers,
            self.config.retry,
        ))
    }
}

impl Default for DeliveryClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
