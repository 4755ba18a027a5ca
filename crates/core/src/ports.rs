//! Trait seams between core logic and the outside world
//!
//! These traits enable dependency injection and testing by abstracting
//! external collaborators (OAuth provider, social API, credential storage,
//! queue persistence, browser launching). `perch-infra` supplies the real
//! implementations; the `testing` module supplies in-memory doubles.

use async_trait::async_trait;
use perch_domain::types::{
    PostReceipt, QueuedPost, RateLimitSnapshot, TokenGrant, TokenRecord, UserIdentity,
};
use perch_domain::Result;

/// Result of a successful post delivery, including any rate-limit quota
/// data the server attached to the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDelivery {
    pub receipt: PostReceipt,
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// Trait for OAuth token endpoint operations
///
/// Covers the three token-endpoint calls of the authorization-code + PKCE
/// flow. The caller owns PKCE material and state validation; implementations
/// only speak the wire protocol.
#[async_trait]
pub trait OAuthApi: Send + Sync {
    /// Exchange an authorization code for a token grant.
    ///
    /// `redirect_uri` must be exactly the value used in the authorization
    /// request, per RFC 6749 §4.1.3.
    ///
    /// # Errors
    /// Returns an error if the exchange is rejected or transport fails.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant>;

    /// Obtain a new grant from a refresh token.
    ///
    /// # Errors
    /// Returns `TokenError::RefreshRejected` when the provider permanently
    /// rejects the refresh token; network and server errors otherwise.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// Revoke a token at the provider.
    ///
    /// # Errors
    /// Returns an error if revocation is rejected or transport fails.
    async fn revoke(&self, token: &str) -> Result<()>;
}

/// Trait for authenticated social API operations
#[async_trait]
pub trait SocialApi: Send + Sync {
    /// Resolve the identity behind an access token via a live call.
    ///
    /// # Errors
    /// Returns `Api { status: 401, .. }` for a dead token; other classified
    /// errors for transport or server failures.
    async fn verify_identity(&self, access_token: &str) -> Result<UserIdentity>;

    /// Publish a post.
    ///
    /// # Errors
    /// Returns classified errors; `Api { status: 401, .. }` signals the
    /// caller to refresh and retry once.
    async fn create_post(&self, access_token: &str, text: &str) -> Result<PostDelivery>;
}

/// Trait for durable credential storage
///
/// The token lifecycle manager is the only writer. Implementations must not
/// log token values.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist the record, replacing any previous one.
    ///
    /// # Errors
    /// Returns `PerchError::Store` if the backend rejects the write.
    async fn store(&self, record: &TokenRecord) -> Result<()>;

    /// Load the stored record, `None` when nothing is stored.
    ///
    /// # Errors
    /// Returns `PerchError::Store` only for backend failures, not absence.
    async fn load(&self) -> Result<Option<TokenRecord>>;

    /// Remove the stored record. Succeeds when nothing is stored.
    ///
    /// # Errors
    /// Returns `PerchError::Store` if the backend rejects the deletion.
    async fn clear(&self) -> Result<()>;
}

/// Trait for post queue persistence
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load the persisted queue, empty when nothing was saved yet.
    ///
    /// # Errors
    /// Returns `PerchError::Store` for backend failures.
    async fn load(&self) -> Result<Vec<QueuedPost>>;

    /// Persist the full queue state.
    ///
    /// # Errors
    /// Returns `PerchError::Store` for backend failures.
    async fn save(&self, posts: &[QueuedPost]) -> Result<()>;
}

/// Trait for handing an authorization URL to the user's browser
pub trait UrlOpener: Send + Sync {
    /// Open the URL in the system browser (or equivalent).
    ///
    /// # Errors
    /// Returns `PerchError::Platform` when the browser cannot be launched.
    fn open(&self, url: &str) -> Result<()>;
}
