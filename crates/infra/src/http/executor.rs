//! HTTP request execution with class-aware timeouts and retry.
//!
//! Every outbound request goes through [`RequestExecutor::send`], which
//! applies the timeout recommended by the network monitor for the request's
//! operation class, retries transient failures with jittered exponential
//! backoff, and honors `Retry-After` hints up to a configured cap.

use std::sync::Arc;
use std::time::Duration;

use perch_core::network::NetworkMonitor;
use perch_domain::config::RetryConfig;
use perch_domain::errors::{PerchError, Result};
use perch_domain::types::OperationClass;
use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::errors::InfraError;

/// HTTP executor shared by the API adapters.
#[derive(Clone)]
pub struct RequestExecutor {
    client: ReqwestClient,
    monitor: Arc<NetworkMonitor>,
    config: RetryConfig,
}

impl RequestExecutor {
    /// Build an executor over a fresh reqwest client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying TLS backend cannot be initialized.
    pub fn new(monitor: Arc<NetworkMonitor>, config: RetryConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
            .user_agent(concat!("perch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| PerchError::from(InfraError::from(err)))?;

        Ok(Self { client, monitor, config })
    }

    /// Underlying reqwest client for building requests to pass to
    /// [`send`](Self::send).
    pub fn client(&self) -> &ReqwestClient {
        &self.client
    }

    /// Network monitor consulted for timeouts and retry budgets.
    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Execute the request with retry semantics for its operation class.
    ///
    /// Transport failures and retryable statuses (408, 429, 5xx variants)
    /// are retried within the budget the monitor recommends for current
    /// conditions. Definitive statuses, 401 included, come back on the first
    /// response so callers can react without burning retries.
    ///
    /// # Errors
    ///
    /// Returns `PerchError::Network` when the transport fails on the final
    /// attempt, or `PerchError::Internal` for non-cloneable request bodies.
    pub async fn send(&self, builder: RequestBuilder, class: OperationClass) -> Result<Response> {
        let profile = self.monitor.retry_profile(class);
        let attempts = profile.max_attempts.min(self.config.max_attempts).max(1);
        let base_delay =
            profile.base_delay.max(Duration::from_millis(self.config.base_delay_ms));

        for attempt in 1..=attempts {
            let cloned = builder.try_clone().ok_or_else(|| {
                PerchError::Internal(
                    "request body cannot be cloned; buffer the body to enable retries".into(),
                )
            })?;

            let timeout = self.monitor.recommended_timeout(class);
            let request = cloned
                .timeout(timeout)
                .build()
                .map_err(|err| PerchError::from(InfraError::from(err)))?;

            let method = request.method().clone();
            let url = request.url().clone();
            debug!(attempt, %method, %url, timeout_ms = timeout.as_millis() as u64, "sending http request");

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt, %method, %url, %status, "received http response");

                    if is_retryable_status(status) && attempt < attempts {
                        let delay =
                            self.retry_delay(base_delay, attempt, retry_after(&response));
                        warn!(%status, delay_ms = delay.as_millis() as u64, "retrying after retryable status");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt, %method, %url, error = %err, "http request failed");

                    if attempt < attempts && is_retryable_transport(&err) {
                        let delay = self.retry_delay(base_delay, attempt, None);
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(InfraError::from(err).into());
                }
            }
        }

        Err(PerchError::Internal(
            "request executor exhausted retries without producing a result".into(),
        ))
    }

    /// Delay before the next attempt; a `Retry-After` hint wins over the
    /// exponential schedule but never exceeds the cap.
    fn retry_delay(
        &self,
        base_delay: Duration,
        completed_attempts: u32,
        hinted: Option<Duration>,
    ) -> Duration {
        if let Some(hinted) = hinted {
            return hinted.min(Duration::from_secs(self.config.retry_after_cap_secs));
        }

        let shift = completed_attempts.saturating_sub(1).min(8);
        let exponential = base_delay.saturating_mul(1u32 << shift);
        let capped = exponential.min(Duration::from_secs(self.config.max_delay_secs));

        let jitter = rand::thread_rng()
            .gen_range((1.0 - self.config.jitter_factor)..=(1.0 + self.config.jitter_factor));
        capped.mul_f64(jitter)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Parse a delta-seconds `Retry-After` header value.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
