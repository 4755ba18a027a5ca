//! In-memory doubles for the port traits
//!
//! Programmable results, call counting, and stored-state inspection for
//! behavioral tests. Every double defaults to a successful happy path;
//! push scripted results to exercise failure branches.

// Mocks favor simple shapes over documented errors - return types say it all
#![allow(clippy::missing_errors_doc)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use perch_domain::types::{
    PostReceipt, QueuedPost, RateLimitSnapshot, TokenGrant, TokenRecord, UserIdentity,
};
use perch_domain::{PerchError, Result};
use tokio::sync::{Mutex, RwLock};

use crate::ports::{CredentialStore, OAuthApi, PostDelivery, QueueStore, SocialApi, UrlOpener};

fn numbered_grant(n: usize) -> TokenGrant {
    TokenGrant {
        access_token: format!("refreshed-access-{n}"),
        token_type: "bearer".to_string(),
        expires_in: 7200,
        refresh_token: Some(format!("rotated-refresh-{n}")),
        scope: None,
    }
}

/// Mock OAuth token-endpoint client
///
/// Defaults: `exchange_code` yields a fixed grant, `refresh` yields
/// numbered grants (`refreshed-access-1`, ...), `revoke` succeeds. Push
/// scripted results to override the next call(s).
#[derive(Debug, Default)]
pub struct MockOAuthApi {
    exchange_results: Mutex<VecDeque<Result<TokenGrant>>>,
    refresh_results: Mutex<VecDeque<Result<TokenGrant>>>,
    revoke_results: Mutex<VecDeque<Result<()>>>,
    refresh_delay: parking_lot::Mutex<Option<std::time::Duration>>,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
}

impl MockOAuthApi {
    /// Create a mock with default happy-path behavior.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `exchange_code` outcome.
    pub async fn push_exchange_result(&self, result: Result<TokenGrant>) {
        self.exchange_results.lock().await.push_back(result);
    }

    /// Script the next `refresh` outcome.
    pub async fn push_refresh_result(&self, result: Result<TokenGrant>) {
        self.refresh_results.lock().await.push_back(result);
    }

    /// Script the next `revoke` outcome.
    pub async fn push_revoke_result(&self, result: Result<()>) {
        self.revoke_results.lock().await.push_back(result);
    }

    /// Delay every `refresh` call, to widen concurrency windows in tests.
    pub fn set_refresh_delay(&self, delay: std::time::Duration) {
        *self.refresh_delay.lock() = Some(delay);
    }

    /// Number of `exchange_code` calls so far.
    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    /// Number of `refresh` calls so far.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of `revoke` calls so far.
    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthApi for MockOAuthApi {
    async fn exchange_code(
        &self,
        _code: &str,
        _code_verifier: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        match self.exchange_results.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(TokenGrant {
                access_token: "exchanged-access".to_string(),
                token_type: "bearer".to_string(),
                expires_in: 7200,
                refresh_token: Some("exchanged-refresh".to_string()),
                scope: Some("tweet.read tweet.write users.read offline.access".to_string()),
            }),
        }
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.refresh_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.refresh_results.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(numbered_grant(call)),
        }
    }

    async fn revoke(&self, _token: &str) -> Result<()> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.revoke_results.lock().await.pop_front().unwrap_or(Ok(()))
    }
}

/// Default identity returned by [`MockSocialApi`]
#[must_use]
pub fn test_identity() -> UserIdentity {
    UserIdentity {
        id: "1000".to_string(),
        username: "perch_user".to_string(),
        display_name: "Perch User".to_string(),
    }
}

/// Mock social API
///
/// Records every post attempt (token + text) for inspection. Defaults to
/// verifying as [`test_identity`] and accepting posts with numbered ids.
#[derive(Debug, Default)]
pub struct MockSocialApi {
    verify_results: Mutex<VecDeque<Result<UserIdentity>>>,
    post_results: Mutex<VecDeque<Result<PostDelivery>>>,
    posted: Mutex<Vec<(String, String)>>,
    rate_limit: parking_lot::Mutex<Option<RateLimitSnapshot>>,
    verify_delay: parking_lot::Mutex<Option<std::time::Duration>>,
    verify_calls: AtomicUsize,
    post_calls: AtomicUsize,
}

impl MockSocialApi {
    /// Create a mock with default happy-path behavior.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `verify_identity` outcome.
    pub async fn push_verify_result(&self, result: Result<UserIdentity>) {
        self.verify_results.lock().await.push_back(result);
    }

    /// Script the next `create_post` outcome.
    pub async fn push_post_result(&self, result: Result<PostDelivery>) {
        self.post_results.lock().await.push_back(result);
    }

    /// Attach a rate-limit snapshot to default post responses.
    pub fn set_rate_limit(&self, snapshot: RateLimitSnapshot) {
        *self.rate_limit.lock() = Some(snapshot);
    }

    /// Delay every `verify_identity` call, to widen concurrency windows in
    /// tests.
    pub fn set_verify_delay(&self, delay: std::time::Duration) {
        *self.verify_delay.lock() = Some(delay);
    }

    /// Every `(access_token, text)` pair sent so far.
    pub async fn posted(&self) -> Vec<(String, String)> {
        self.posted.lock().await.clone()
    }

    /// Number of `verify_identity` calls so far.
    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_post` calls so far.
    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocialApi for MockSocialApi {
    async fn verify_identity(&self, _access_token: &str) -> Result<UserIdentity> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.verify_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.verify_results.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(test_identity()),
        }
    }

    async fn create_post(&self, access_token: &str, text: &str) -> Result<PostDelivery> {
        let call = self.post_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.posted.lock().await.push((access_token.to_string(), text.to_string()));
        match self.post_results.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(PostDelivery {
                receipt: PostReceipt {
                    id: format!("post-{call}"),
                    text: text.to_string(),
                    posted_at: Utc::now(),
                },
                rate_limit: *self.rate_limit.lock(),
            }),
        }
    }
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MockCredentialStore {
    record: RwLock<Option<TokenRecord>>,
    failing: AtomicBool,
    store_calls: AtomicUsize,
}

impl MockCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a `Store` error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Currently stored record.
    pub async fn stored(&self) -> Option<TokenRecord> {
        self.record.read().await.clone()
    }

    /// Number of `store` calls so far.
    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PerchError::Store("simulated credential store failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn store(&self, record: &TokenRecord) -> Result<()> {
        self.check()?;
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<TokenRecord>> {
        self.check()?;
        Ok(self.record.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        *self.record.write().await = None;
        Ok(())
    }
}

/// In-memory queue store
#[derive(Debug, Default)]
pub struct MockQueueStore {
    saved: RwLock<Vec<QueuedPost>>,
    failing: AtomicBool,
    save_calls: AtomicUsize,
}

impl MockQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, as if a previous run persisted these.
    pub async fn seed(&self, posts: Vec<QueuedPost>) {
        *self.saved.write().await = posts;
    }

    /// Make every operation fail with a `Store` error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Currently persisted snapshot.
    pub async fn contents(&self) -> Vec<QueuedPost> {
        self.saved.read().await.clone()
    }

    /// Number of `save` calls so far.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PerchError::Store("simulated queue store failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueStore for MockQueueStore {
    async fn load(&self) -> Result<Vec<QueuedPost>> {
        self.check()?;
        Ok(self.saved.read().await.clone())
    }

    async fn save(&self, posts: &[QueuedPost]) -> Result<()> {
        self.check()?;
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        *self.saved.write().await = posts.to_vec();
        Ok(())
    }
}

/// URL opener that records instead of launching a browser
#[derive(Debug, Default)]
pub struct RecordingUrlOpener {
    opened: parking_lot::Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingUrlOpener {
    /// Create a recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail with a `Platform` error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every URL opened so far.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl UrlOpener for RecordingUrlOpener {
    fn open(&self, url: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PerchError::Platform("simulated browser launch failure".to_string()));
        }
        self.opened.lock().push(url.to_string());
        Ok(())
    }
}
