//! # Perch Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - HTTP adapters for the OAuth and social APIs
//! - The retrying request executor and latency probe
//! - The loopback callback server for the authorization redirect
//! - Keychain credential storage and JSON queue persistence
//! - The `AuthOrchestrator` tying the whole stack together
//!
//! ## Architecture
//! - Implements traits defined in `perch-core`
//! - Depends on `perch-domain` and `perch-core`
//! - Contains all "impure" code (network, keychain, filesystem, browser)

pub mod api;
pub mod browser;
pub mod callback;
pub mod credentials;
pub mod errors;
pub mod http;
pub mod orchestrator;
pub mod probe;
pub mod queue_store;

// Re-export commonly used items
pub use api::{HttpOAuthApi, HttpSocialApi};
pub use browser::SystemUrlOpener;
pub use callback::{CallbackOutcome, CallbackServer};
pub use credentials::KeyringCredentialStore;
pub use errors::InfraError;
pub use http::RequestExecutor;
pub use orchestrator::{AuthOrchestrator, OrchestratorParts};
pub use probe::LatencyProbe;
pub use queue_store::JsonQueueStore;
