//! PKCE (Proof Key for Code Exchange) material for OAuth 2.0
//!
//! Implements RFC 7636 for authorization without a client secret, the only
//! safe shape for a desktop client. All values are single-use: a fresh
//! verifier/challenge/state triple is generated per authorization attempt.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use perch_domain::{PerchError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Challenge method sent alongside the code challenge (always SHA-256)
pub const CHALLENGE_METHOD: &str = "S256";

fn random_urlsafe_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| PerchError::Internal(format!("entropy source failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a cryptographically secure code verifier
///
/// Returns a URL-safe base64 encoding of 32 random bytes (43 characters).
/// Per RFC 7636, verifiers must be 43-128 characters long.
///
/// # Errors
/// Returns an error if the OS entropy source fails (extremely rare).
pub fn generate_code_verifier() -> Result<String> {
    random_urlsafe_token()
}

/// Generate the code challenge for a verifier
///
/// Per RFC 7636, the challenge is BASE64URL(SHA256(ASCII(code_verifier))).
/// Deterministic: the same verifier always yields the same challenge.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a random state token for CSRF protection
///
/// # Errors
/// Returns an error if the OS entropy source fails (extremely rare).
pub fn generate_state() -> Result<String> {
    random_urlsafe_token()
}

/// Check that the state returned in the callback matches the one issued
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    expected == actual
}

/// PKCE challenge triple for one authorization attempt
///
/// The verifier stays local until token exchange; the challenge and state
/// travel in the authorization request.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Random secret (43 chars base64url), sent only at token exchange
    pub code_verifier: String,
    /// SHA-256 hash of the verifier (base64url), sent in the auth request
    pub code_challenge: String,
    /// Random CSRF token; must round-trip unchanged through the provider
    pub state: String,
}

impl PkceChallenge {
    /// Generate a fresh triple from the OS CSPRNG.
    ///
    /// # Errors
    /// Returns an error if the OS entropy source fails (extremely rare).
    pub fn generate() -> Result<Self> {
        let code_verifier = generate_code_verifier()?;
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state()?;

        Ok(Self { code_verifier, code_challenge, state })
    }

    /// The challenge method parameter value (always `"S256"`).
    #[must_use]
    pub const fn challenge_method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for PKCE material generation.
    use std::collections::HashSet;

    use super::*;

    /// Validates `PkceChallenge::generate` output shape.
    ///
    /// Assertions:
    /// - Verifier length is within the RFC 7636 43-128 range.
    /// - Challenge and state are non-empty.
    #[test]
    fn generated_challenge_shape() {
        let challenge = PkceChallenge::generate().expect("generation failed");

        assert!(challenge.code_verifier.len() >= 43);
        assert!(challenge.code_verifier.len() <= 128);
        assert!(!challenge.code_challenge.is_empty());
        assert!(!challenge.state.is_empty());
        assert_eq!(challenge.challenge_method(), "S256");
    }

    /// Validates verifier and state uniqueness across 10,000 generations.
    #[test]
    fn verifiers_and_states_unique_across_many_generations() {
        let mut verifiers = HashSet::new();
        let mut states = HashSet::new();

        for _ in 0..10_000 {
            let challenge = PkceChallenge::generate().expect("generation failed");
            assert!(verifiers.insert(challenge.code_verifier), "verifier collision");
            assert!(states.insert(challenge.state), "state collision");
        }
    }

    /// Validates the base64url-no-pad alphabet of every generated value.
    #[test]
    fn values_use_urlsafe_alphabet() {
        let challenge = PkceChallenge::generate().expect("generation failed");

        for value in [&challenge.code_verifier, &challenge.code_challenge, &challenge.state] {
            assert!(!value.contains('='));
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
        }
    }

    /// Validates the challenge computation against the RFC 7636 appendix B
    /// test vector.
    #[test]
    fn challenge_matches_rfc_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            generate_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    /// Validates the challenge is a pure function of the verifier.
    #[test]
    fn challenge_deterministic_for_verifier() {
        let challenge = PkceChallenge::generate().expect("generation failed");
        assert_eq!(
            challenge.code_challenge,
            generate_code_challenge(&challenge.code_verifier)
        );
    }

    /// Validates state comparison semantics.
    #[test]
    fn state_validation() {
        assert!(validate_state("abc", "abc"));
        assert!(!validate_state("abc", "abd"));
        assert!(!validate_state("abc", ""));
    }
}
