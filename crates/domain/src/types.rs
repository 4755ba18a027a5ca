//! Common data types used throughout the application

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    QUEUE_RETRY_BASE_SECS, QUEUE_RETRY_MAX_SECS, RATE_WINDOW_DAYS, TIMEOUT_AUTHENTICATION_SECS,
    TIMEOUT_GENERAL_SECS, TIMEOUT_POSTING_SECS, TIMEOUT_REFRESH_SECS,
};

/// Published authentication state, exactly one value live at a time
///
/// `Authenticated` carries the identity resolved via a live verification
/// call after token exchange, never assumed from the token response alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum AuthState {
    Disconnected,
    Authenticating,
    Authenticated(UserIdentity),
    Refreshing,
    Error(String),
}

/// Connectivity classification derived from latency probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    None,
    Poor,
    Fair,
    Good,
    Excellent,
}

/// Category of an outbound operation, selecting its baseline timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Authentication,
    Posting,
    Refresh,
    General,
}

impl OperationClass {
    /// Baseline timeout for this class; the network monitor relaxes it
    /// under degraded quality.
    #[must_use]
    pub const fn base_timeout(self) -> Duration {
        match self {
            Self::Authentication => Duration::from_secs(TIMEOUT_AUTHENTICATION_SECS),
            Self::Posting => Duration::from_secs(TIMEOUT_POSTING_SECS),
            Self::Refresh => Duration::from_secs(TIMEOUT_REFRESH_SECS),
            Self::General => Duration::from_secs(TIMEOUT_GENERAL_SECS),
        }
    }
}

/// Raw token response from the provider's token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Durable credential record owned by the token store
///
/// `expires_at` is derived from `issued_at + expires_in` at grant time and
/// never recomputed from ambient wall clock; after long idle periods the
/// record is re-validated by a live probe instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl TokenRecord {
    /// Build a record from a fresh grant issued at `issued_at`.
    #[must_use]
    pub fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            issued_at,
            expires_at: issued_at + chrono::Duration::seconds(grant.expires_in),
            scope: grant.scope,
        }
    }

    /// Build the successor record after a refresh. Providers may omit the
    /// refresh token on renewal; the previous one is kept in that case.
    #[must_use]
    pub fn renewed(&self, grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        let previous_refresh = self.refresh_token.clone();
        let mut next = Self::from_grant(grant, issued_at);
        if next.refresh_token.is_none() {
            next.refresh_token = previous_refresh;
        }
        next
    }

    /// Whether the access token has passed its expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the token expires within `margin_secs` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        now + chrono::Duration::seconds(margin_secs) >= self.expires_at
    }

    /// Seconds until expiry (negative once expired).
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

/// A post held for later delivery
///
/// The `id` is the hex SHA-256 of the text, which makes the queue
/// content-addressed: enqueueing identical text twice yields one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPost {
    pub id: String,
    pub text: String,
    pub enqueued_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub requires_reauth: bool,
}

impl QueuedPost {
    /// Create a new entry, immediately eligible for delivery.
    #[must_use]
    pub fn new(text: impl Into<String>, now: DateTime<Utc>) -> Self {
        let text = text.into();
        Self {
            id: Self::content_id(&text),
            text,
            enqueued_at: now,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: now,
            requires_reauth: false,
        }
    }

    /// Deduplication key for a post body.
    #[must_use]
    pub fn content_id(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        hex::encode(digest)
    }

    /// Whether this entry is due for a delivery attempt.
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.requires_reauth && self.next_attempt_at <= now
    }

    /// Record a failed attempt and schedule the next one.
    ///
    /// The per-entry backoff doubles from the base delay up to the cap;
    /// `retry_at` overrides the schedule when the failure carried an explicit
    /// reset time (server rate limit).
    pub fn schedule_retry(
        &mut self,
        now: DateTime<Utc>,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) {
        self.attempt_count += 1;
        self.last_error = Some(error.to_string());
        self.next_attempt_at = retry_at.unwrap_or_else(|| {
            let exponent = self.attempt_count.saturating_sub(1).min(16);
            let delay = QUEUE_RETRY_BASE_SECS.saturating_mul(1_i64 << exponent);
            now + chrono::Duration::seconds(delay.min(QUEUE_RETRY_MAX_SECS))
        });
    }

    /// Whether the entry has exceeded its attempt or age bound.
    #[must_use]
    pub fn exceeded_bounds(&self, now: DateTime<Utc>, max_attempts: u32, max_age_days: i64) -> bool {
        self.attempt_count >= max_attempts
            || now - self.enqueued_at > chrono::Duration::days(max_age_days)
    }
}

/// Local view of the posting quota window (advisory; server is
/// authoritative)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub window_start: DateTime<Utc>,
    pub limit: u32,
    pub used: u32,
    pub resets_at: DateTime<Utc>,
}

impl RateLimitWindow {
    /// Open a fresh rolling window starting at `now`.
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>, limit: u32) -> Self {
        Self {
            window_start: now,
            limit,
            used: 0,
            resets_at: now + chrono::Duration::days(RATE_WINDOW_DAYS),
        }
    }

    /// Remaining local allowance.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Server-reported quota data parsed from rate-limit response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

/// Identity resolved via a live verification call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    pub display_name: String,
}

/// Confirmation of a delivered post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub id: String,
    pub text: String,
    pub posted_at: DateTime<Utc>,
}

/// Caller-visible result of a post operation
///
/// A post either went out (receipt attached) or was parked in the queue;
/// unresolved pending states are never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PostOutcome {
    Sent(PostReceipt),
    Queued { id: String },
}

/// Result of one queue drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrainOutcome {
    pub sent: usize,
    pub remaining: usize,
}
