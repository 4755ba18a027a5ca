//! # Perch Core
//!
//! Pure authentication and posting logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - PKCE challenge generation and the authorization attempt state machine
//! - Token lifecycle management (refresh, single-flight, invalidation)
//! - The offline post queue and rate-limit tracking
//! - Network quality classification
//! - Port interfaces (traits) for HTTP, credential, and queue adapters
//!
//! ## Architecture Principles
//! - Only depends on `perch-domain`
//! - No HTTP, keychain, or platform code
//! - All external dependencies via traits
//! - Deterministic under test via the [`Clock`](time::Clock) abstraction

pub mod auth;
pub mod network;
pub mod ports;
pub mod queue;
pub mod ratelimit;
pub mod time;
pub mod tokens;

// Mock adapters for consumers' tests
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export specific items to avoid ambiguity
pub use auth::{AuthorizationAttempt, PkceChallenge};
pub use network::{NetworkMonitor, RetryProfile};
pub use ports::{CredentialStore, OAuthApi, PostDelivery, QueueStore, SocialApi, UrlOpener};
pub use queue::{EnqueueOutcome, PostQueue};
pub use ratelimit::{Admission, RateLimitTracker};
pub use time::{Clock, MockClock, SystemClock};
pub use tokens::{TokenLifecycle, TokenPhase};
