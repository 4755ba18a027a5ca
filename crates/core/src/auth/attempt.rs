//! One in-flight authorization attempt
//!
//! Bundles the PKCE triple with the redirect URI it was issued for, builds
//! the authorization URL, and validates the state echoed back in the
//! callback. The orchestrator enforces that at most one attempt is live.

use chrono::{DateTime, Utc};
use perch_domain::config::ProviderConfig;
use perch_domain::errors::AuthorizationError;
use perch_domain::{PerchError, Result};
use url::Url;

use super::pkce::{validate_state, PkceChallenge};

/// PKCE material and context for a single authorization attempt
///
/// Dropped wholesale on any failure; verifier and state are never reused.
#[derive(Debug, Clone)]
pub struct AuthorizationAttempt {
    /// The verifier/challenge/state triple for this attempt
    pub challenge: PkceChallenge,
    /// Exact redirect URI used in the authorization request
    pub redirect_uri: String,
    /// When the attempt started
    pub created_at: DateTime<Utc>,
}

impl AuthorizationAttempt {
    /// Start a new attempt with fresh PKCE material.
    ///
    /// # Errors
    /// Returns an error if the OS entropy source fails.
    pub fn begin(redirect_uri: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            challenge: PkceChallenge::generate()?,
            redirect_uri: redirect_uri.into(),
            created_at: now,
        })
    }

    /// Build the authorization URL the user's browser is sent to.
    ///
    /// # Errors
    /// Returns `PerchError::Config` when the configured authorize endpoint
    /// is not a parseable URL.
    pub fn authorization_url(&self, provider: &ProviderConfig) -> Result<String> {
        let mut url = Url::parse(&provider.authorize_url)
            .map_err(|e| PerchError::Config(format!("invalid authorize_url: {e}")))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &provider.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &provider.scopes.join(" "))
            .append_pair("state", &self.challenge.state)
            .append_pair("code_challenge", &self.challenge.code_challenge)
            .append_pair("code_challenge_method", self.challenge.challenge_method());

        Ok(url.into())
    }

    /// Check the state echoed by the provider against the issued one.
    ///
    /// # Errors
    /// Returns `AuthorizationError::StateMismatch` on any difference; the
    /// caller must abandon the attempt without exchanging the code.
    pub fn validate_callback_state(&self, returned_state: &str) -> Result<()> {
        if validate_state(&self.challenge.state, returned_state) {
            Ok(())
        } else {
            Err(AuthorizationError::StateMismatch.into())
        }
    }
}
