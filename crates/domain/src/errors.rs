//! Error types used throughout the application
//!
//! The taxonomy separates failures the caller can act on (authorization,
//! token, validation) from failures the core handles internally (network
//! blips, retryable API statuses, rate limiting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for perch
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum PerchError {
    #[error("Authorization error: {0}")]
    Authorization(AuthorizationError),

    #[error("Token error: {0}")]
    Token(TokenError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("Rate limited until {resets_at}")]
    RateLimit { resets_at: DateTime<Utc> },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures of the interactive authorization round
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum AuthorizationError {
    /// Returned `state` did not match the issued nonce; the code is never
    /// exchanged in this case.
    #[error("state parameter mismatch")]
    StateMismatch,

    /// Provider redirected back with an `error` parameter (user denied,
    /// provider-side failure).
    #[error("authorization denied: {0}")]
    Denied(String),

    /// No callback arrived within the configured window.
    #[error("timed out waiting for authorization callback")]
    Timeout,

    /// Loopback listener could not bind any candidate port.
    #[error("failed to bind callback listener: {0}")]
    ListenerBind(String),

    /// An authorization round is already outstanding.
    #[error("an authorization attempt is already in progress")]
    AttemptInProgress,
}

/// Failures of credential acquisition and renewal
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum TokenError {
    /// No token record exists (never authenticated, or disconnected).
    #[error("no stored credentials")]
    Missing,

    /// Access token expired and could not be renewed in time.
    #[error("access token expired")]
    Expired,

    /// The provider rejected the refresh token; full reauthorization is
    /// required.
    #[error("refresh rejected: {0}")]
    RefreshRejected(String),

    /// Token material failed to parse or validate.
    #[error("malformed token data: {0}")]
    Malformed(String),
}

impl PerchError {
    /// Whether this failure is transient and worth retrying (or queueing a
    /// post for) without new credentials or caller intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimit { .. } => true,
            Self::Api { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            Self::Token(TokenError::Expired) => true,
            _ => false,
        }
    }

    /// Whether recovery requires a full interactive reauthorization rather
    /// than a refresh or retry.
    #[must_use]
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::Token(TokenError::RefreshRejected(_) | TokenError::Missing)
                | Self::Authorization(AuthorizationError::StateMismatch)
        )
    }
}

impl From<AuthorizationError> for PerchError {
    fn from(err: AuthorizationError) -> Self {
        Self::Authorization(err)
    }
}

impl From<TokenError> for PerchError {
    fn from(err: TokenError) -> Self {
        Self::Token(err)
    }
}

/// Result type alias for perch operations
pub type Result<T> = std::result::Result<T, PerchError>;

#[cfg(test)]
mod tests {
    //! Unit tests for domain error classification.
    use chrono::Utc;

    use super::*;

    /// Validates `is_retryable` behavior across the status taxonomy.
    ///
    /// Assertions:
    /// - Retryable statuses (408, 429, 5xx) and transport failures report
    ///   retryable.
    /// - Non-retryable client statuses (400, 401, 403, 404, 409, 422) do not.
    #[test]
    fn retryable_classification_by_status() {
        for status in [408_u16, 429, 500, 502, 503, 504] {
            let err = PerchError::Api { status, detail: String::new() };
            assert!(err.is_retryable(), "expected {status} to be retryable");
        }
        for status in [400_u16, 401, 403, 404, 409, 422] {
            let err = PerchError::Api { status, detail: String::new() };
            assert!(!err.is_retryable(), "expected {status} to not be retryable");
        }
        assert!(PerchError::Network("connection reset".into()).is_retryable());
        assert!(PerchError::RateLimit { resets_at: Utc::now() }.is_retryable());
        assert!(!PerchError::Validation("too long".into()).is_retryable());
    }

    /// Validates `requires_reauth` behavior for terminal credential failures.
    ///
    /// Assertions:
    /// - Refresh rejection and missing credentials demand reauthorization.
    /// - Expired-but-refreshable tokens do not.
    #[test]
    fn reauth_classification() {
        assert!(PerchError::Token(TokenError::RefreshRejected("invalid_grant".into()))
            .requires_reauth());
        assert!(PerchError::Token(TokenError::Missing).requires_reauth());
        assert!(PerchError::Authorization(AuthorizationError::StateMismatch).requires_reauth());
        assert!(!PerchError::Token(TokenError::Expired).requires_reauth());
        assert!(!PerchError::Network("dns".into()).requires_reauth());
    }

    /// Validates the serde tagging scheme survives a round trip.
    ///
    /// Assertions:
    /// - Serialized form carries `type`/`detail` tags.
    /// - Deserialization restores the same variant.
    #[test]
    fn serde_round_trip() {
        let err = PerchError::Api { status: 503, detail: "upstream".into() };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\""));
        let back: PerchError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
