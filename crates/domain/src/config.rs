//! Configuration structs for the authentication and posting core
//!
//! Every section carries sensible defaults and a `validate()` method;
//! `PerchConfig::validate` is run once at orchestrator construction so
//! invalid settings fail fast instead of surfacing mid-flow.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALLBACK_PATH, DEFAULT_CALLBACK_TIMEOUT_SECS, DEFAULT_DRAIN_INTERVAL_SECS,
    DEFAULT_IDLE_PROBE_SECS, DEFAULT_MONTHLY_POST_LIMIT, DEFAULT_PROBE_INTERVAL_SECS,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_REFRESH_MARGIN_SECS, OFFLINE_AFTER_FAILURES,
    PROBE_TIMEOUT_SECS, QUALITY_SAMPLE_WINDOW, QUEUE_MAX_AGE_DAYS, QUEUE_MAX_ATTEMPTS,
    RATE_WINDOW_DAYS, REFRESH_BACKOFF_BASE_SECS, REFRESH_BACKOFF_MAX_SECS, RETRY_AFTER_CAP_SECS,
    RETRY_BASE_DELAY_MS, RETRY_JITTER_FACTOR, RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_SECS,
};
use crate::errors::{PerchError, Result};

/// OAuth provider endpoints and client registration
///
/// Defaults target the X API v2 shape; every endpoint is overridable for
/// providers with the same OAuth 2.0 + PKCE contract (or for test servers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Public client identifier issued at app registration
    pub client_id: String,
    /// Authorization endpoint the user's browser is sent to
    pub authorize_url: String,
    /// Token endpoint for code exchange and refresh
    pub token_url: String,
    /// Revocation endpoint used on disconnect
    pub revoke_url: String,
    /// Base URL for authenticated API calls
    pub api_base_url: String,
    /// Scopes requested during authorization
    pub scopes: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            authorize_url: "https://x.com/i/oauth2/authorize".to_string(),
            token_url: "https://api.x.com/2/oauth2/token".to_string(),
            revoke_url: "https://api.x.com/2/oauth2/revoke".to_string(),
            api_base_url: "https://api.x.com".to_string(),
            scopes: vec![
                "tweet.read".to_string(),
                "tweet.write".to_string(),
                "users.read".to_string(),
                "offline.access".to_string(),
            ],
        }
    }
}

impl ProviderConfig {
    /// Validate endpoint and registration settings.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(PerchError::Config("client_id must not be empty".to_string()));
        }
        for (name, value) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("revoke_url", &self.revoke_url),
            ("api_base_url", &self.api_base_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(PerchError::Config(format!("{name} must be an http(s) URL")));
            }
        }
        if self.scopes.is_empty() {
            return Err(PerchError::Config("at least one scope is required".to_string()));
        }
        Ok(())
    }
}

/// Loopback callback listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Ports tried in order before falling back to an OS-assigned one
    pub preferred_ports: Vec<u16>,
    /// Path the provider redirects back to
    pub callback_path: String,
    /// How long to wait for the redirect before giving up
    pub wait_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            preferred_ports: vec![8080, 8081, 8082],
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            wait_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
        }
    }
}

impl ListenerConfig {
    /// Validate listener settings.
    pub fn validate(&self) -> Result<()> {
        if !self.callback_path.starts_with('/') {
            return Err(PerchError::Config("callback_path must start with '/'".to_string()));
        }
        if self.wait_timeout_secs == 0 {
            return Err(PerchError::Config("wait_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Request executor retry/backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt ceiling including the first try
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Backoff cap in seconds
    pub max_delay_secs: u64,
    /// Fractional jitter applied to each delay (0.0 disables, for tests)
    pub jitter_factor: f64,
    /// Longest server-supplied `retry-after` honored, in seconds
    pub retry_after_cap_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay_ms: RETRY_BASE_DELAY_MS,
            max_delay_secs: RETRY_MAX_DELAY_SECS,
            jitter_factor: RETRY_JITTER_FACTOR,
            retry_after_cap_secs: RETRY_AFTER_CAP_SECS,
        }
    }
}

impl RetryConfig {
    /// Validate retry settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(PerchError::Config("max_attempts must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(PerchError::Config("jitter_factor must be within 0.0..=1.0".to_string()));
        }
        if self.base_delay_ms == 0 {
            return Err(PerchError::Config("base_delay_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Token lifecycle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Refresh this many seconds before expiry
    pub refresh_margin_secs: i64,
    /// Idle period after which a live probe precedes critical operations
    pub idle_probe_secs: i64,
    /// First retry delay after a recoverable refresh failure, in seconds
    pub refresh_backoff_base_secs: u64,
    /// Refresh retry backoff cap in seconds
    pub refresh_backoff_max_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            idle_probe_secs: DEFAULT_IDLE_PROBE_SECS,
            refresh_backoff_base_secs: REFRESH_BACKOFF_BASE_SECS,
            refresh_backoff_max_secs: REFRESH_BACKOFF_MAX_SECS,
        }
    }
}

impl LifecycleConfig {
    /// Validate lifecycle settings.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_margin_secs <= 0 {
            return Err(PerchError::Config("refresh_margin_secs must be positive".to_string()));
        }
        if self.idle_probe_secs <= 0 {
            return Err(PerchError::Config("idle_probe_secs must be positive".to_string()));
        }
        if self.refresh_backoff_base_secs == 0
            || self.refresh_backoff_base_secs > self.refresh_backoff_max_secs
        {
            return Err(PerchError::Config(
                "refresh backoff base must be positive and no greater than the cap".to_string(),
            ));
        }
        Ok(())
    }
}

/// Offline post queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum retained entries; the oldest is evicted beyond this
    pub capacity: usize,
    /// Delivery attempts before an entry is dropped
    pub max_attempts: u32,
    /// Entry age bound in days
    pub max_age_days: i64,
    /// Background drain cadence in seconds
    pub drain_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            max_attempts: QUEUE_MAX_ATTEMPTS,
            max_age_days: QUEUE_MAX_AGE_DAYS,
            drain_interval_secs: DEFAULT_DRAIN_INTERVAL_SECS,
        }
    }
}

impl QueueConfig {
    /// Validate queue settings.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PerchError::Config("queue capacity must be greater than 0".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(PerchError::Config("queue max_attempts must be positive".to_string()));
        }
        if self.max_age_days <= 0 {
            return Err(PerchError::Config("queue max_age_days must be positive".to_string()));
        }
        Ok(())
    }
}

/// Local posting quota settings (advisory; the server stays authoritative)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Posts allowed per rolling window
    pub monthly_limit: u32,
    /// Window length in days
    pub window_days: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { monthly_limit: DEFAULT_MONTHLY_POST_LIMIT, window_days: RATE_WINDOW_DAYS }
    }
}

impl RateLimitConfig {
    /// Validate quota settings.
    pub fn validate(&self) -> Result<()> {
        if self.monthly_limit == 0 {
            return Err(PerchError::Config("monthly_limit must be greater than 0".to_string()));
        }
        if self.window_days <= 0 {
            return Err(PerchError::Config("window_days must be positive".to_string()));
        }
        Ok(())
    }
}

/// Connectivity probe settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probe cadence in seconds
    pub interval_secs: u64,
    /// Per-probe timeout in seconds
    pub timeout_secs: u64,
    /// Latency samples considered for quality classification
    pub sample_window: usize,
    /// Consecutive failures before quality drops to `None`
    pub offline_after_failures: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            timeout_secs: PROBE_TIMEOUT_SECS,
            sample_window: QUALITY_SAMPLE_WINDOW,
            offline_after_failures: OFFLINE_AFTER_FAILURES,
        }
    }
}

impl ProbeConfig {
    /// Validate probe settings.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 || self.timeout_secs == 0 {
            return Err(PerchError::Config("probe intervals must be positive".to_string()));
        }
        if self.sample_window == 0 {
            return Err(PerchError::Config("sample_window must be greater than 0".to_string()));
        }
        if self.offline_after_failures == 0 {
            return Err(PerchError::Config(
                "offline_after_failures must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aggregate configuration for the whole core
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerchConfig {
    pub provider: ProviderConfig,
    pub listener: ListenerConfig,
    pub retry: RetryConfig,
    pub lifecycle: LifecycleConfig,
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
    pub probe: ProbeConfig,
}

impl PerchConfig {
    /// Build a config for the given client registration, defaults elsewhere.
    #[must_use]
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            provider: ProviderConfig { client_id: client_id.into(), ..ProviderConfig::default() },
            ..Self::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;
        self.listener.validate()?;
        self.retry.validate()?;
        self.lifecycle.validate()?;
        self.queue.validate()?;
        self.rate_limit.validate()?;
        self.probe.validate()?;
        Ok(())
    }
}
