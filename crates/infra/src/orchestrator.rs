//! Top-level authentication and posting orchestration.
//!
//! `AuthOrchestrator` composes the token lifecycle, post queue, rate limit
//! tracker, and network monitor behind one public surface. It is constructed
//! once at startup and shared by handle; there is no process-wide singleton.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use perch_core::{
    Admission, AuthorizationAttempt, Clock, CredentialStore, NetworkMonitor, OAuthApi,
    PostDelivery, PostQueue, QueueStore, RateLimitTracker, SocialApi, SystemClock, TokenLifecycle,
    TokenPhase, UrlOpener,
};
use perch_domain::constants::MAX_POST_CHARS;
use perch_domain::{
    AuthState, AuthorizationError, ConnectionQuality, DrainOutcome, OperationClass, PerchConfig,
    PerchError, PostOutcome, RateLimitSnapshot, Result, TokenError, TokenRecord, UserIdentity,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{HttpOAuthApi, HttpSocialApi};
use crate::browser::SystemUrlOpener;
use crate::callback::{CallbackOutcome, CallbackServer};
use crate::credentials::KeyringCredentialStore;
use crate::http::RequestExecutor;
use crate::probe::LatencyProbe;
use crate::queue_store::JsonQueueStore;

/// Handles for the orchestrator's long-running tasks.
#[derive(Default)]
struct BackgroundTasks {
    auto_refresh: Option<JoinHandle<()>>,
    probe: Option<JoinHandle<()>>,
    drain: Option<JoinHandle<()>>,
    startup_verify: Option<JoinHandle<()>>,
    phase_bridge: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    fn abort_all(&mut self) {
        for handle in [
            self.auto_refresh.take(),
            self.probe.take(),
            self.drain.take(),
            self.startup_verify.take(),
            self.phase_bridge.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// Collaborators the orchestrator is assembled from.
///
/// Production wiring comes from [`AuthOrchestrator::production`]; tests
/// inject mock ports through this struct directly.
pub struct OrchestratorParts {
    pub oauth: Arc<dyn OAuthApi>,
    pub social: Arc<dyn SocialApi>,
    pub credentials: Arc<dyn CredentialStore>,
    pub queue_store: Arc<dyn QueueStore>,
    pub opener: Arc<dyn UrlOpener>,
    pub monitor: Arc<NetworkMonitor>,
    /// HTTP client for the background latency probe; `None` disables it.
    pub probe_client: Option<reqwest::Client>,
}

/// State machine over the whole authentication and posting surface.
///
/// Public operations: [`authenticate`](Self::authenticate),
/// [`post`](Self::post), [`drain_queue`](Self::drain_queue),
/// [`disconnect`](Self::disconnect). Observability: a watch channel of
/// [`AuthState`] transitions and one of queue depth. Call
/// [`initialize`](Self::initialize) once after construction and
/// [`shutdown`](Self::shutdown) before dropping the last handle, since the
/// background tasks each hold a handle to the orchestrator.
pub struct AuthOrchestrator<C: Clock = SystemClock> {
    clock: C,
    config: PerchConfig,
    oauth: Arc<dyn OAuthApi>,
    social: Arc<dyn SocialApi>,
    opener: Arc<dyn UrlOpener>,
    queue_store: Arc<dyn QueueStore>,
    monitor: Arc<NetworkMonitor>,
    probe_client: Option<reqwest::Client>,
    lifecycle: Arc<TokenLifecycle<C>>,
    queue: PostQueue<C>,
    tracker: RateLimitTracker<C>,
    identity: parking_lot::RwLock<Option<UserIdentity>>,
    state_tx: watch::Sender<AuthState>,
    attempt_gate: Mutex<()>,
    drain_gate: Mutex<()>,
    tasks: parking_lot::Mutex<BackgroundTasks>,
}

impl AuthOrchestrator<SystemClock> {
    /// Wire the production stack: HTTP adapters over one request executor,
    /// the OS keychain, a JSON queue file, and the system browser.
    ///
    /// # Errors
    /// Returns `PerchError::Config` for invalid settings and
    /// `PerchError::Internal` when the HTTP client cannot be built.
    pub fn production(config: PerchConfig, queue_path: impl Into<PathBuf>) -> Result<Arc<Self>> {
        config.validate()?;

        let monitor = Arc::new(NetworkMonitor::new(config.probe.clone()));
        let executor = Arc::new(RequestExecutor::new(monitor.clone(), config.retry.clone())?);
        let parts = OrchestratorParts {
            oauth: Arc::new(HttpOAuthApi::new(executor.clone(), config.provider.clone())),
            social: Arc::new(HttpSocialApi::new(
                executor.clone(),
                config.provider.api_base_url.clone(),
            )),
            credentials: Arc::new(KeyringCredentialStore::default()),
            queue_store: Arc::new(JsonQueueStore::new(queue_path)),
            opener: Arc::new(SystemUrlOpener),
            monitor,
            probe_client: Some(executor.client().clone()),
        };

        Self::new(SystemClock, config, parts)
    }
}

impl<C: Clock + Clone + 'static> AuthOrchestrator<C> {
    /// Assemble an orchestrator from explicit collaborators.
    ///
    /// # Errors
    /// Returns `PerchError::Config` when any config section is invalid.
    pub fn new(clock: C, config: PerchConfig, parts: OrchestratorParts) -> Result<Arc<Self>> {
        config.validate()?;

        let lifecycle = Arc::new(TokenLifecycle::new(
            parts.oauth.clone(),
            parts.credentials,
            clock.clone(),
            config.lifecycle.clone(),
        ));
        let queue = PostQueue::new(clock.clone(), config.queue.clone());
        let tracker = RateLimitTracker::new(clock.clone(), config.rate_limit.clone());
        let (state_tx, _) = watch::channel(AuthState::Disconnected);

        Ok(Arc::new(Self {
            clock,
            config,
            oauth: parts.oauth,
            social: parts.social,
            opener: parts.opener,
            queue_store: parts.queue_store,
            monitor: parts.monitor,
            probe_client: parts.probe_client,
            lifecycle,
            queue,
            tracker,
            identity: parking_lot::RwLock::new(None),
            state_tx,
            attempt_gate: Mutex::new(()),
            drain_gate: Mutex::new(()),
            tasks: parking_lot::Mutex::new(BackgroundTasks::default()),
        }))
    }

    /// Restore persisted state and start the background tasks.
    ///
    /// Loads the stored token record and the persisted queue, then spawns
    /// auto-refresh, the refresh state bridge, latency probing, and the
    /// periodic queue drain. Returns
    /// `true` when a token record was restored. A restored record has not
    /// been live-verified, so verification runs in the background and the
    /// state channel moves to `Authenticated` once it succeeds; offline
    /// startup is never blocked on it.
    ///
    /// # Errors
    /// Returns `PerchError::Store` when the credential store cannot be read.
    /// An unreadable queue file is logged and treated as empty.
    pub async fn initialize(self: &Arc<Self>) -> Result<bool> {
        match self.queue_store.load().await {
            Ok(stored) => {
                if !stored.is_empty() {
                    info!(count = stored.len(), "restoring persisted post queue");
                }
                self.queue.restore(stored).await;
            }
            Err(err) => {
                warn!(error = %err, "failed to load persisted queue, starting empty");
            }
        }

        let restored = self.lifecycle.initialize().await?;
        self.spawn_background_tasks();

        if restored {
            let this = self.clone();
            let handle = tokio::spawn(async move {
                match this.verify_live().await {
                    Ok(identity) => {
                        info!(username = %identity.username, "restored session verified");
                    }
                    Err(err) if err.requires_reauth() => {
                        // A disconnect that raced the verification leaves no
                        // record behind; there is no session left to report on.
                        if this.lifecycle.record().await.is_some() {
                            warn!(error = %err, "restored session is no longer valid");
                            this.publish_state(AuthState::Error(err.to_string()));
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "startup verification deferred");
                    }
                }
            });
            self.tasks.lock().startup_verify = Some(handle);
        }

        Ok(restored)
    }

    /// Run one interactive authorization round against the provider.
    ///
    /// Generates fresh PKCE material, opens the authorization URL in the
    /// browser, waits for the loopback callback, exchanges the code, and
    /// installs the verified session. The returned state nonce must match
    /// the issued one before the code is ever exchanged.
    ///
    /// # Errors
    /// `AuthorizationError::AttemptInProgress` when a round is already
    /// outstanding, `Denied`/`Timeout`/`StateMismatch` for failed rounds,
    /// plus exchange and verification failures. Every failure publishes
    /// `AuthState::Error` and tears down the listener.
    pub async fn authenticate(self: &Arc<Self>) -> Result<UserIdentity> {
        let Ok(_attempt) = self.attempt_gate.try_lock() else {
            return Err(AuthorizationError::AttemptInProgress.into());
        };

        self.publish_state(AuthState::Authenticating);
        info!("starting interactive authorization");

        match self.run_authorization().await {
            Ok(identity) => {
                info!(username = %identity.username, "authorization complete");
                self.publish_state(AuthState::Authenticated(identity.clone()));
                Ok(identity)
            }
            Err(err) => {
                warn!(error = %err, "authorization failed");
                self.publish_state(AuthState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn run_authorization(self: &Arc<Self>) -> Result<UserIdentity> {
        let server = CallbackServer::start(&self.config.listener).await?;
        let redirect_uri = server.redirect_uri();

        let attempt = AuthorizationAttempt::begin(&redirect_uri, self.clock.now())?;
        let authorize_url = attempt.authorization_url(&self.config.provider)?;
        self.opener.open(&authorize_url)?;
        info!(port = server.port(), "browser opened, waiting for authorization callback");

        let timeout = Duration::from_secs(self.config.listener.wait_timeout_secs);
        let (code, returned_state) = match server.wait(timeout).await? {
            CallbackOutcome::Code { code, state } => (code, state),
            CallbackOutcome::Denied { error, .. } => {
                return Err(AuthorizationError::Denied(error).into());
            }
        };

        // The code is exchanged only after the state nonce round-trips
        // intact; anything else is treated as forgery.
        attempt.validate_callback_state(&returned_state)?;

        let grant = self
            .oauth
            .exchange_code(&code, &attempt.challenge.code_verifier, &redirect_uri)
            .await?;
        let record = TokenRecord::from_grant(grant, self.clock.now());

        let identity = self.social.verify_identity(&record.access_token).await?;
        self.lifecycle.install(record).await?;
        *self.identity.write() = Some(identity.clone());

        let released = self.queue.release_reauth_holds().await;
        if released > 0 {
            self.persist_queue().await;
        }
        self.ensure_auto_refresh();
        self.ensure_phase_bridge();

        Ok(identity)
    }

    /// Publish a post, or park it in the queue when it cannot go out now.
    ///
    /// The caller always gets one of: a delivery receipt, a queued
    /// acknowledgment carrying the entry id, or an actionable error.
    ///
    /// # Errors
    /// `PerchError::Validation` for empty or oversized text,
    /// `TokenError::Missing` when never authenticated,
    /// `PerchError::RateLimit` when local admission denies the send, and
    /// definitive API rejections (non-retryable 4xx).
    pub async fn post(&self, text: &str) -> Result<PostOutcome> {
        if text.trim().is_empty() {
            return Err(PerchError::Validation("post text is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > MAX_POST_CHARS {
            return Err(PerchError::Validation(format!(
                "post text is {chars} characters, limit is {MAX_POST_CHARS}"
            )));
        }
        if self.lifecycle.record().await.is_none() {
            return Err(TokenError::Missing.into());
        }

        if let Admission::Denied { resets_at } = self.tracker.check_admission() {
            debug!(%resets_at, "post denied by local rate limit");
            return Err(PerchError::RateLimit { resets_at });
        }

        if !self.monitor.can_attempt(OperationClass::Posting) {
            info!("network unavailable, queueing post");
            return Ok(self.park(text, None).await);
        }

        if self.lifecycle.needs_liveness_probe().await {
            debug!("session idle, probing identity before posting");
            if let Err(err) = self.verify_live().await {
                return self.settle_post_failure(text, err).await;
            }
        }

        match self.deliver(text).await {
            Ok(delivery) => {
                self.tracker.record_usage();
                if let Some(snapshot) = delivery.rate_limit {
                    self.tracker.apply_snapshot(snapshot);
                }
                info!(id = %delivery.receipt.id, "post delivered");
                Ok(PostOutcome::Sent(delivery.receipt))
            }
            Err(err) => self.settle_post_failure(text, err).await,
        }
    }

    /// Send every eligible queued entry, oldest first.
    ///
    /// Stops early when admission is denied, the network drops, or the
    /// session turns out to need reauthorization. Safe to call concurrently
    /// with the background drain; passes are serialized.
    ///
    /// # Errors
    /// Currently infallible in practice; the `Result` leaves room for
    /// stores that must fail the pass.
    pub async fn drain_queue(&self) -> Result<DrainOutcome> {
        let _pass = self.drain_gate.lock().await;

        let eligible = self.queue.eligible().await;
        if eligible.is_empty() {
            return Ok(DrainOutcome { sent: 0, remaining: self.queue.len().await });
        }
        debug!(count = eligible.len(), "draining eligible queue entries");

        let mut sent = 0;
        for entry in eligible {
            if let Admission::Denied { resets_at } = self.tracker.check_admission() {
                debug!(%resets_at, "drain paused by local rate limit");
                break;
            }
            if !self.monitor.can_attempt(OperationClass::Posting) {
                debug!("drain paused, network unavailable");
                break;
            }

            let stop = match self.deliver(&entry.text).await {
                Ok(delivery) => {
                    self.queue.record_success(&entry.id).await;
                    self.tracker.record_usage();
                    if let Some(snapshot) = delivery.rate_limit {
                        self.tracker.apply_snapshot(snapshot);
                    }
                    sent += 1;
                    info!(id = %delivery.receipt.id, "queued post delivered");
                    false
                }
                Err(err) if err.requires_reauth() => {
                    self.queue.record_failure(&entry.id, &err).await;
                    self.publish_state(AuthState::Error(err.to_string()));
                    warn!(error = %err, "drain stopped, reauthorization required");
                    true
                }
                Err(err) if err.is_retryable() => {
                    self.note_rate_limit(&err);
                    self.queue.record_failure(&entry.id, &err).await;
                    // Connectivity failures affect every remaining entry.
                    matches!(err, PerchError::Network(_) | PerchError::RateLimit { .. })
                }
                Err(err) => {
                    warn!(id = %entry.id, error = %err, "dropping undeliverable post");
                    self.queue.remove(&entry.id).await;
                    false
                }
            };

            self.persist_queue().await;
            if stop {
                break;
            }
        }

        let remaining = self.queue.len().await;
        info!(sent, remaining, "queue drain pass complete");
        Ok(DrainOutcome { sent, remaining })
    }

    /// Whether a usable session exists.
    pub async fn is_authenticated(&self) -> bool {
        self.lifecycle.is_authenticated().await
    }

    /// Identity from the most recent live verification, if any.
    pub fn identity(&self) -> Option<UserIdentity> {
        self.identity.read().clone()
    }

    /// End the session: revoke the grant and clear stored credentials.
    ///
    /// Revocation is best effort and never fails the call. Queued posts are
    /// retained for the next session.
    ///
    /// # Errors
    /// Returns `PerchError::Store` when the credential store rejects the
    /// deletion; the in-memory session is gone regardless.
    pub async fn disconnect(&self) -> Result<()> {
        info!("disconnecting session");

        {
            let mut tasks = self.tasks.lock();
            for handle in
                [tasks.auto_refresh.take(), tasks.startup_verify.take()].into_iter().flatten()
            {
                handle.abort();
            }
        }

        if let Some(record) = self.lifecycle.record().await {
            let token = record.refresh_token.unwrap_or(record.access_token);
            if let Err(err) = self.oauth.revoke(&token).await {
                warn!(error = %err, "token revocation failed");
            }
        }

        *self.identity.write() = None;
        let result = self.lifecycle.clear().await;
        self.publish_state(AuthState::Disconnected);
        info!(queued = self.queue.len().await, "disconnected, queued posts retained");
        result
    }

    /// Watch channel of authentication state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// Watch channel of queue depth.
    pub fn subscribe_queue_depth(&self) -> watch::Receiver<usize> {
        self.queue.subscribe_depth()
    }

    /// Persist the queue one last time and stop every background task.
    pub async fn shutdown(&self) {
        self.persist_queue().await;
        self.tasks.lock().abort_all();
        debug!("background tasks stopped");
    }

    /* --- internals --- */

    fn spawn_background_tasks(self: &Arc<Self>) {
        self.ensure_auto_refresh();
        self.ensure_phase_bridge();

        let mut tasks = self.tasks.lock();

        if tasks.probe.is_none() {
            if let Some(client) = &self.probe_client {
                let probe = LatencyProbe::new(
                    client.clone(),
                    self.monitor.clone(),
                    self.config.provider.api_base_url.clone(),
                    self.config.probe.clone(),
                );
                tasks.probe = Some(probe.spawn());
            }
        }

        if tasks.drain.is_none() {
            let this = self.clone();
            let period = Duration::from_secs(self.config.queue.drain_interval_secs);
            tasks.drain = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    if !this.lifecycle.is_authenticated().await {
                        continue;
                    }
                    if this.monitor.quality() == ConnectionQuality::None {
                        continue;
                    }
                    if this.queue.is_empty().await {
                        continue;
                    }
                    if let Err(err) = this.drain_queue().await {
                        warn!(error = %err, "background drain failed");
                    }
                }
            }));
        }
    }

    fn ensure_auto_refresh(&self) {
        let mut tasks = self.tasks.lock();
        let running = tasks.auto_refresh.as_ref().is_some_and(|handle| !handle.is_finished());
        if !running {
            let lifecycle = self.lifecycle.clone();
            tasks.auto_refresh = Some(tokio::spawn(lifecycle.start_auto_refresh()));
        }
    }

    /// Forward lifecycle phase changes onto the public state channel, so a
    /// refresh started anywhere, including the auto-refresh task, is
    /// observable to subscribers.
    fn ensure_phase_bridge(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        let running = tasks.phase_bridge.as_ref().is_some_and(|handle| !handle.is_finished());
        if running {
            return;
        }
        let this = self.clone();
        let mut phases = self.lifecycle.subscribe_phase();
        tasks.phase_bridge = Some(tokio::spawn(async move {
            while phases.changed().await.is_ok() {
                let phase = *phases.borrow_and_update();
                this.publish_token_phase(phase);
            }
        }));
    }

    /// Map one lifecycle phase onto the state channel.
    ///
    /// Only the refresh window is bridged: `Refreshing` while a renewal is
    /// in flight, then back to `Authenticated` once the record settles. A
    /// terminally rejected background refresh surfaces as `Error`.
    /// Interactive flows publish their own transitions.
    fn publish_token_phase(&self, phase: TokenPhase) {
        match phase {
            TokenPhase::Refreshing => {
                self.state_tx.send_if_modified(|current| {
                    if !matches!(current, AuthState::Authenticated(_)) {
                        return false;
                    }
                    debug!("auth state transition to refreshing");
                    *current = AuthState::Refreshing;
                    true
                });
            }
            TokenPhase::Valid | TokenPhase::ExpiringSoon | TokenPhase::Expired => {
                if let Some(identity) = self.identity() {
                    self.state_tx.send_if_modified(|current| {
                        if !matches!(current, AuthState::Refreshing) {
                            return false;
                        }
                        debug!(username = %identity.username, "refresh settled, session restored");
                        *current = AuthState::Authenticated(identity);
                        true
                    });
                }
            }
            TokenPhase::Invalid => {
                self.state_tx.send_if_modified(|current| {
                    if !matches!(current, AuthState::Authenticated(_) | AuthState::Refreshing) {
                        return false;
                    }
                    *current = AuthState::Error("session requires reauthorization".to_string());
                    true
                });
            }
            TokenPhase::Missing => {}
        }
    }

    /// One delivery attempt with the single refresh-and-retry cycle on 401.
    async fn deliver(&self, text: &str) -> Result<PostDelivery> {
        let record = self.lifecycle.ensure_fresh().await?;
        match self.social.create_post(&record.access_token, text).await {
            Ok(delivery) => {
                self.lifecycle.mark_verified();
                Ok(delivery)
            }
            Err(err) if is_unauthorized(&err) => {
                info!("access token rejected, refreshing once and retrying");
                let renewed =
                    self.lifecycle.refresh_after_unauthorized(&record.access_token).await?;
                match self.social.create_post(&renewed.access_token, text).await {
                    Ok(delivery) => {
                        self.lifecycle.mark_verified();
                        Ok(delivery)
                    }
                    Err(err) if is_unauthorized(&err) => Err(self.invalidate_session(&err).await),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Live identity check with the same single 401 refresh cycle.
    ///
    /// On success the idle tracking resets, the cached identity updates,
    /// and the state channel reports `Authenticated`.
    async fn verify_live(&self) -> Result<UserIdentity> {
        let record = self.lifecycle.ensure_fresh().await?;
        let identity = match self.social.verify_identity(&record.access_token).await {
            Ok(identity) => identity,
            Err(err) if is_unauthorized(&err) => {
                let renewed =
                    self.lifecycle.refresh_after_unauthorized(&record.access_token).await?;
                match self.social.verify_identity(&renewed.access_token).await {
                    Ok(identity) => identity,
                    Err(err) if is_unauthorized(&err) => {
                        return Err(self.invalidate_session(&err).await);
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        // The session can be torn down while the identity call is in
        // flight; a verified result for a cleared session is stale.
        if !self.lifecycle.is_authenticated().await {
            return Err(TokenError::Missing.into());
        }

        self.lifecycle.mark_verified();
        *self.identity.write() = Some(identity.clone());
        self.publish_state(AuthState::Authenticated(identity.clone()));
        Ok(identity)
    }

    /// Classify a failed post: park it for retry, hold it for
    /// reauthorization, or surface a definitive error.
    async fn settle_post_failure(&self, text: &str, err: PerchError) -> Result<PostOutcome> {
        if err.requires_reauth() {
            warn!(error = %err, "session requires reauthorization, holding post");
            let outcome = self.park(text, Some(&err)).await;
            self.publish_state(AuthState::Error(err.to_string()));
            return Ok(outcome);
        }
        if err.is_retryable() {
            self.note_rate_limit(&err);
            info!(error = %err, "post attempt failed, queueing for retry");
            return Ok(self.park(text, Some(&err)).await);
        }
        Err(err)
    }

    /// Enqueue the text verbatim and persist the queue.
    async fn park(&self, text: &str, cause: Option<&PerchError>) -> PostOutcome {
        let outcome = self.queue.enqueue(text, cause).await;
        let id = outcome.id().to_string();
        if !matches!(outcome, perch_core::EnqueueOutcome::Duplicate { .. }) {
            self.persist_queue().await;
        }
        PostOutcome::Queued { id }
    }

    /// The server rejected a token the provider just renewed; the session
    /// cannot recover without a full reauthorization.
    async fn invalidate_session(&self, cause: &PerchError) -> PerchError {
        let reason = format!("access token rejected after refresh: {cause}");
        error!(error = %cause, "session invalidated");
        self.lifecycle.mark_invalid(&reason).await;
        TokenError::RefreshRejected(reason).into()
    }

    /// Align the local tracker with a server-reported 429.
    fn note_rate_limit(&self, err: &PerchError) {
        if let PerchError::RateLimit { resets_at } = err {
            let window = self.tracker.window();
            self.tracker.apply_snapshot(RateLimitSnapshot {
                limit: window.limit,
                remaining: 0,
                resets_at: *resets_at,
            });
        }
    }

    async fn persist_queue(&self) {
        let snapshot = self.queue.snapshot().await;
        if let Err(err) = self.queue_store.save(&snapshot).await {
            warn!(error = %err, "failed to persist post queue");
        }
    }

    fn publish_state(&self, next: AuthState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(state = ?next, "auth state transition");
            *current = next;
            true
        });
    }
}

fn is_unauthorized(err: &PerchError) -> bool {
    matches!(err, PerchError::Api { status: 401, .. })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use perch_core::testing::{
        test_identity, MockCredentialStore, MockOAuthApi, MockQueueStore, MockSocialApi,
        RecordingUrlOpener,
    };
    use perch_core::MockClock;
    use perch_domain::TokenGrant;

    use super::*;

    struct Harness {
        orchestrator: Arc<AuthOrchestrator<MockClock>>,
        oauth: Arc<MockOAuthApi>,
        social: Arc<MockSocialApi>,
        credentials: Arc<MockCredentialStore>,
        queue_store: Arc<MockQueueStore>,
        monitor: Arc<NetworkMonitor>,
        clock: MockClock,
    }

    fn test_config() -> PerchConfig {
        PerchConfig::for_client("test-client")
    }

    fn build(config: PerchConfig, opener: Arc<dyn UrlOpener>) -> Harness {
        let clock = MockClock::new();
        let oauth = Arc::new(MockOAuthApi::new());
        let social = Arc::new(MockSocialApi::new());
        let credentials = Arc::new(MockCredentialStore::new());
        let queue_store = Arc::new(MockQueueStore::new());
        let monitor = Arc::new(NetworkMonitor::new(config.probe.clone()));

        let orchestrator = AuthOrchestrator::new(
            clock.clone(),
            config,
            OrchestratorParts {
                oauth: oauth.clone(),
                social: social.clone(),
                credentials: credentials.clone(),
                queue_store: queue_store.clone(),
                opener,
                monitor: monitor.clone(),
                probe_client: None,
            },
        )
        .expect("orchestrator config");

        Harness { orchestrator, oauth, social, credentials, queue_store, monitor, clock }
    }

    fn harness() -> Harness {
        build(test_config(), Arc::new(RecordingUrlOpener::new()))
    }

    fn stored_grant() -> TokenGrant {
        TokenGrant {
            access_token: "stored-access".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 7200,
            refresh_token: Some("stored-refresh".to_string()),
            scope: None,
        }
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<AuthState>,
        matches: fn(&AuthState) -> bool,
    ) -> AuthState {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if matches(&current) {
                        return current.clone();
                    }
                }
                rx.changed().await.expect("state channel closed");
            }
        })
        .await
        .expect("state transition timed out")
    }

    /// Build a harness with a restored, live-verified session.
    async fn authenticated_harness(config: PerchConfig) -> (Harness, watch::Receiver<AuthState>) {
        let h = build(config, Arc::new(RecordingUrlOpener::new()));
        let record = TokenRecord::from_grant(stored_grant(), h.clock.now());
        h.credentials.store(&record).await.expect("seed record");

        let mut rx = h.orchestrator.subscribe_state();
        let restored = h.orchestrator.initialize().await.expect("initialize");
        assert!(restored);
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Authenticated(_))).await;
        (h, rx)
    }

    /// Opener playing the provider role: parses the authorization URL and
    /// immediately redirects back to the loopback listener.
    struct AutoApprovingBrowser {
        code: String,
        state_override: Option<String>,
        deny: bool,
    }

    impl AutoApprovingBrowser {
        fn approving(code: &str) -> Self {
            Self { code: code.to_string(), state_override: None, deny: false }
        }

        fn forging_state(code: &str, state: &str) -> Self {
            Self {
                code: code.to_string(),
                state_override: Some(state.to_string()),
                deny: false,
            }
        }

        fn denying() -> Self {
            Self { code: String::new(), state_override: None, deny: true }
        }
    }

    impl UrlOpener for AutoApprovingBrowser {
        fn open(&self, url: &str) -> Result<()> {
            let parsed = url::Url::parse(url)
                .map_err(|err| PerchError::Validation(err.to_string()))?;
            let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
            let redirect = query
                .get("redirect_uri")
                .cloned()
                .ok_or_else(|| PerchError::Validation("missing redirect_uri".to_string()))?;
            let state = self
                .state_override
                .clone()
                .or_else(|| query.get("state").cloned())
                .unwrap_or_default();

            let callback = if self.deny {
                format!("{redirect}?error=access_denied&error_description=User%20declined&state={state}")
            } else {
                format!("{redirect}?code={}&state={state}", self.code)
            };
            tokio::spawn(async move {
                let _ = reqwest::get(&callback).await;
            });
            Ok(())
        }
    }

    /// Validates the full loopback authorization round.
    ///
    /// Assertions:
    /// - The resolved identity matches the verification response.
    /// - The token record is persisted and the state reports authenticated.
    #[tokio::test]
    async fn authenticate_completes_loopback_flow() {
        let h = build(test_config(), Arc::new(AutoApprovingBrowser::approving("auth-code-1")));

        let identity = h.orchestrator.authenticate().await.expect("authorization");

        assert_eq!(identity, test_identity());
        assert_eq!(h.oauth.exchange_calls(), 1);
        let stored = h.credentials.stored().await.expect("record stored");
        assert_eq!(stored.access_token, "exchanged-access");
        assert!(h.orchestrator.is_authenticated().await);
        let mut rx = h.orchestrator.subscribe_state();
        let state = wait_for_state(&mut rx, |s| matches!(s, AuthState::Authenticated(_))).await;
        assert_eq!(state, AuthState::Authenticated(test_identity()));
    }

    /// Validates that a forged `state` aborts before any code exchange.
    ///
    /// Assertions:
    /// - The error is `StateMismatch` and no exchange call is made.
    /// - The state channel reports the failure.
    #[tokio::test]
    async fn forged_state_never_reaches_exchange() {
        let h = build(
            test_config(),
            Arc::new(AutoApprovingBrowser::forging_state("auth-code-1", "forged-nonce")),
        );

        let err = h.orchestrator.authenticate().await.expect_err("must fail");

        assert_eq!(
            err,
            PerchError::Authorization(AuthorizationError::StateMismatch)
        );
        assert_eq!(h.oauth.exchange_calls(), 0);
        assert!(!h.orchestrator.is_authenticated().await);
        let mut rx = h.orchestrator.subscribe_state();
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Error(_))).await;
    }

    /// Validates the user-declined callback path.
    ///
    /// Assertions:
    /// - The error carries the provider's denial reason.
    /// - No code exchange is attempted.
    #[tokio::test]
    async fn denied_callback_maps_to_denied_error() {
        let h = build(test_config(), Arc::new(AutoApprovingBrowser::denying()));

        let err = h.orchestrator.authenticate().await.expect_err("must fail");

        match err {
            PerchError::Authorization(AuthorizationError::Denied(reason)) => {
                assert!(reason.contains("access_denied"), "reason: {reason}");
            }
            other => panic!("expected denial, got {other:?}"),
        }
        assert_eq!(h.oauth.exchange_calls(), 0);
    }

    /// Validates the attempt gate and the callback timeout.
    ///
    /// Assertions:
    /// - A second authenticate during an active round is rejected.
    /// - The hung round times out and publishes an error state.
    #[tokio::test]
    async fn concurrent_authenticate_is_rejected_and_timeout_reported() {
        let mut config = test_config();
        config.listener.wait_timeout_secs = 1;
        let h = build(config, Arc::new(RecordingUrlOpener::new()));

        let first = h.orchestrator.clone();
        let running = tokio::spawn(async move { first.authenticate().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = h.orchestrator.authenticate().await.expect_err("gate must hold");
        assert_eq!(
            second,
            PerchError::Authorization(AuthorizationError::AttemptInProgress)
        );

        let outcome = running.await.expect("task join").expect_err("must time out");
        assert_eq!(outcome, PerchError::Authorization(AuthorizationError::Timeout));
        let mut rx = h.orchestrator.subscribe_state();
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Error(_))).await;
    }

    /// Validates startup restoration of both session and queue.
    ///
    /// Assertions:
    /// - `initialize` reports the restored record and republishes depth.
    /// - Background verification moves the state to authenticated.
    #[tokio::test]
    async fn initialize_restores_session_and_queue() {
        let h = harness();
        let record = TokenRecord::from_grant(stored_grant(), h.clock.now());
        h.credentials.store(&record).await.expect("seed record");
        h.queue_store
            .seed(vec![
                perch_domain::QueuedPost::new("parked one", h.clock.now()),
                perch_domain::QueuedPost::new("parked two", h.clock.now()),
            ])
            .await;

        let mut depth = h.orchestrator.subscribe_queue_depth();
        let mut rx = h.orchestrator.subscribe_state();
        let restored = h.orchestrator.initialize().await.expect("initialize");

        assert!(restored);
        assert!(h.orchestrator.is_authenticated().await);
        depth.changed().await.expect("depth published");
        assert_eq!(*depth.borrow_and_update(), 2);
        let state = wait_for_state(&mut rx, |s| matches!(s, AuthState::Authenticated(_))).await;
        assert_eq!(state, AuthState::Authenticated(test_identity()));
        assert_eq!(h.orchestrator.identity(), Some(test_identity()));
    }

    /// Validates posting without any session.
    ///
    /// Assertions:
    /// - The error is `TokenError::Missing`; nothing is queued or persisted.
    #[tokio::test]
    async fn post_without_session_fails_with_missing() {
        let h = harness();

        let err = h.orchestrator.post("hello").await.expect_err("must fail");

        assert_eq!(err, PerchError::Token(TokenError::Missing));
        assert_eq!(h.queue_store.save_calls(), 0);
        assert_eq!(h.social.post_calls(), 0);
    }

    /// Validates local text constraints.
    ///
    /// Assertions:
    /// - Empty and oversized posts are rejected before any other check.
    #[tokio::test]
    async fn post_validates_text_bounds() {
        let h = harness();

        let empty = h.orchestrator.post("   ").await.expect_err("empty");
        assert!(matches!(empty, PerchError::Validation(_)));

        let oversized = h.orchestrator.post(&"x".repeat(MAX_POST_CHARS + 1)).await;
        assert!(matches!(oversized, Err(PerchError::Validation(_))));
    }

    /// Validates the happy posting path.
    ///
    /// Assertions:
    /// - The receipt comes back and the text reaches the API unchanged.
    #[tokio::test]
    async fn post_delivers_and_returns_receipt() {
        let (h, _rx) = authenticated_harness(test_config()).await;

        let outcome = h.orchestrator.post("hello world").await.expect("post");

        match outcome {
            PostOutcome::Sent(receipt) => assert_eq!(receipt.text, "hello world"),
            other => panic!("expected sent, got {other:?}"),
        }
        let posted = h.social.posted().await;
        assert_eq!(posted.last().map(|(_, text)| text.clone()), Some("hello world".to_string()));
    }

    /// Validates the single refresh-and-retry cycle on 401.
    ///
    /// Assertions:
    /// - Exactly one refresh happens and the retry uses the renewed token.
    #[tokio::test]
    async fn post_refreshes_once_after_401() {
        let (h, _rx) = authenticated_harness(test_config()).await;
        h.social
            .push_post_result(Err(PerchError::Api { status: 401, detail: "Unauthorized".into() }))
            .await;

        let outcome = h.orchestrator.post("retry me").await.expect("post");

        assert!(matches!(outcome, PostOutcome::Sent(_)));
        assert_eq!(h.oauth.refresh_calls(), 1);
        assert_eq!(h.social.post_calls(), 2);
        let posted = h.social.posted().await;
        assert_eq!(posted[1].0, "refreshed-access-1");
    }

    /// Validates the refresh window is observable on the state channel.
    ///
    /// Assertions:
    /// - A 401-triggered refresh publishes `Refreshing` while in flight.
    /// - The state settles back to `Authenticated` once the renewal lands.
    #[tokio::test]
    async fn refresh_cycle_publishes_refreshing_then_authenticated() {
        let (h, mut rx) = authenticated_harness(test_config()).await;
        h.social
            .push_post_result(Err(PerchError::Api { status: 401, detail: "Unauthorized".into() }))
            .await;
        h.oauth.set_refresh_delay(Duration::from_millis(100));

        let poster = h.orchestrator.clone();
        let posting = tokio::spawn(async move { poster.post("token rotation").await });

        let state = wait_for_state(&mut rx, |s| matches!(s, AuthState::Refreshing)).await;
        assert_eq!(state, AuthState::Refreshing);

        let outcome = posting.await.expect("task join").expect("post");
        assert!(matches!(outcome, PostOutcome::Sent(_)));
        let state = wait_for_state(&mut rx, |s| matches!(s, AuthState::Authenticated(_))).await;
        assert_eq!(state, AuthState::Authenticated(test_identity()));
    }

    /// Validates the second-401 terminal path.
    ///
    /// Assertions:
    /// - Only one refresh cycle runs; the post is held for reauthorization.
    /// - The state channel reports the error and the session is invalid.
    #[tokio::test]
    async fn second_401_invalidates_session_and_holds_post() {
        let (h, mut rx) = authenticated_harness(test_config()).await;
        let unauthorized =
            PerchError::Api { status: 401, detail: "Unauthorized".to_string() };
        h.social.push_post_result(Err(unauthorized.clone())).await;
        h.social.push_post_result(Err(unauthorized)).await;

        let outcome = h.orchestrator.post("held post").await.expect("queued ack");

        assert!(matches!(outcome, PostOutcome::Queued { .. }));
        assert_eq!(h.oauth.refresh_calls(), 1);
        assert_eq!(h.social.post_calls(), 2);
        assert!(!h.orchestrator.is_authenticated().await);
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Error(_))).await;

        let contents = h.queue_store.contents().await;
        assert_eq!(contents.len(), 1);
        assert!(contents[0].requires_reauth);
        assert_eq!(contents[0].text, "held post");
    }

    /// Validates the terminal refresh path during posting.
    ///
    /// Assertions:
    /// - No retry follows a rejected refresh; the post is held.
    #[tokio::test]
    async fn terminal_refresh_holds_post_without_retry() {
        let (h, mut rx) = authenticated_harness(test_config()).await;
        h.social
            .push_post_result(Err(PerchError::Api { status: 401, detail: "Unauthorized".into() }))
            .await;
        h.oauth
            .push_refresh_result(Err(TokenError::RefreshRejected("invalid_grant".into()).into()))
            .await;

        let outcome = h.orchestrator.post("held post").await.expect("queued ack");

        assert!(matches!(outcome, PostOutcome::Queued { .. }));
        assert_eq!(h.social.post_calls(), 1);
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Error(_))).await;
        let contents = h.queue_store.contents().await;
        assert!(contents[0].requires_reauth);
    }

    /// Validates queueing on retryable API failure.
    ///
    /// Assertions:
    /// - The post parks with a scheduled retry and the cause recorded.
    #[tokio::test]
    async fn retryable_failure_queues_with_backoff() {
        let (h, _rx) = authenticated_harness(test_config()).await;
        h.social
            .push_post_result(Err(PerchError::Api { status: 503, detail: "upstream".into() }))
            .await;

        let outcome = h.orchestrator.post("flaky post").await.expect("queued ack");

        assert!(matches!(outcome, PostOutcome::Queued { .. }));
        let contents = h.queue_store.contents().await;
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].text, "flaky post");
        assert!(contents[0].last_error.as_deref().unwrap_or_default().contains("503"));
        assert!(contents[0].next_attempt_at > contents[0].enqueued_at);
    }

    /// Validates offline queueing ahead of any network call.
    ///
    /// Assertions:
    /// - The text is preserved verbatim; the API is never touched.
    /// - A repeated identical post deduplicates to the same entry.
    #[tokio::test]
    async fn offline_post_queues_verbatim_and_deduplicates() {
        let (h, _rx) = authenticated_harness(test_config()).await;
        let post_calls_before = h.social.post_calls();
        for _ in 0..test_config().probe.offline_after_failures {
            h.monitor.record_failure();
        }

        let first = h.orchestrator.post("offline words").await.expect("queued");
        let second = h.orchestrator.post("offline words").await.expect("duplicate");

        let (PostOutcome::Queued { id: first_id }, PostOutcome::Queued { id: second_id }) =
            (first, second)
        else {
            panic!("expected queued outcomes");
        };
        assert_eq!(first_id, second_id);
        assert_eq!(h.social.post_calls(), post_calls_before);
        let contents = h.queue_store.contents().await;
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].text, "offline words");
    }

    /// Validates fail-fast local admission.
    ///
    /// Assertions:
    /// - The denied post is not queued and never reaches the API.
    #[tokio::test]
    async fn admission_denial_fails_fast_without_queueing() {
        let mut config = test_config();
        config.rate_limit.monthly_limit = 1;
        let (h, _rx) = authenticated_harness(config).await;

        h.orchestrator.post("first").await.expect("post within limit");
        let err = h.orchestrator.post("second").await.expect_err("must deny");

        assert!(matches!(err, PerchError::RateLimit { .. }));
        assert_eq!(h.social.post_calls(), 1);
        let contents = h.queue_store.contents().await;
        assert!(contents.is_empty());
    }

    /// Validates a full drain pass.
    ///
    /// Assertions:
    /// - Every eligible entry is sent and removed; the persisted file ends
    ///   empty.
    #[tokio::test]
    async fn drain_sends_eligible_entries() {
        let h = harness();
        let record = TokenRecord::from_grant(stored_grant(), h.clock.now());
        h.credentials.store(&record).await.expect("seed record");
        h.queue_store
            .seed(vec![
                perch_domain::QueuedPost::new("queued one", h.clock.now()),
                perch_domain::QueuedPost::new("queued two", h.clock.now()),
            ])
            .await;
        let mut rx = h.orchestrator.subscribe_state();
        h.orchestrator.initialize().await.expect("initialize");
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Authenticated(_))).await;

        let outcome = h.orchestrator.drain_queue().await.expect("drain");

        assert_eq!(outcome, DrainOutcome { sent: 2, remaining: 0 });
        assert!(h.queue_store.contents().await.is_empty());
        let posted = h.social.posted().await;
        let texts: Vec<_> = posted.iter().map(|(_, text)| text.as_str()).collect();
        assert!(texts.contains(&"queued one") && texts.contains(&"queued two"));
    }

    /// Validates that a terminal auth failure stops the drain pass.
    ///
    /// Assertions:
    /// - Nothing is sent; the failing entry is held and the rest remain.
    #[tokio::test]
    async fn drain_stops_and_holds_on_terminal_auth_failure() {
        let h = harness();
        let record = TokenRecord::from_grant(stored_grant(), h.clock.now());
        h.credentials.store(&record).await.expect("seed record");
        h.queue_store
            .seed(vec![
                perch_domain::QueuedPost::new("queued one", h.clock.now()),
                perch_domain::QueuedPost::new("queued two", h.clock.now()),
            ])
            .await;
        let mut rx = h.orchestrator.subscribe_state();
        h.orchestrator.initialize().await.expect("initialize");
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Authenticated(_))).await;

        h.social
            .push_post_result(Err(PerchError::Api { status: 401, detail: "Unauthorized".into() }))
            .await;
        h.oauth
            .push_refresh_result(Err(TokenError::RefreshRejected("expired".into()).into()))
            .await;

        let outcome = h.orchestrator.drain_queue().await.expect("drain");

        assert_eq!(outcome, DrainOutcome { sent: 0, remaining: 2 });
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Error(_))).await;
        let contents = h.queue_store.contents().await;
        assert!(contents[0].requires_reauth);
        assert!(!contents[1].requires_reauth);
    }

    /// Validates that definitive rejections drop the entry instead of
    /// retrying forever.
    ///
    /// Assertions:
    /// - The undeliverable entry is removed; later entries still go out.
    #[tokio::test]
    async fn drain_drops_undeliverable_entries() {
        let h = harness();
        let record = TokenRecord::from_grant(stored_grant(), h.clock.now());
        h.credentials.store(&record).await.expect("seed record");
        h.queue_store
            .seed(vec![
                perch_domain::QueuedPost::new("duplicate content", h.clock.now()),
                perch_domain::QueuedPost::new("fresh content", h.clock.now()),
            ])
            .await;
        let mut rx = h.orchestrator.subscribe_state();
        h.orchestrator.initialize().await.expect("initialize");
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Authenticated(_))).await;

        h.social
            .push_post_result(Err(PerchError::Api {
                status: 403,
                detail: "You are not allowed to create a Tweet with duplicate content.".into(),
            }))
            .await;

        let outcome = h.orchestrator.drain_queue().await.expect("drain");

        assert_eq!(outcome, DrainOutcome { sent: 1, remaining: 0 });
        assert!(h.queue_store.contents().await.is_empty());
    }

    /// Validates disconnect semantics.
    ///
    /// Assertions:
    /// - Revocation is attempted, the store is cleared, the queue survives.
    #[tokio::test]
    async fn disconnect_revokes_and_retains_queue() {
        let (h, mut rx) = authenticated_harness(test_config()).await;
        h.social
            .push_post_result(Err(PerchError::Api { status: 503, detail: "upstream".into() }))
            .await;
        h.orchestrator.post("survives disconnect").await.expect("queued");

        h.orchestrator.disconnect().await.expect("disconnect");

        assert_eq!(h.oauth.revoke_calls(), 1);
        assert!(h.credentials.stored().await.is_none());
        assert!(!h.orchestrator.is_authenticated().await);
        assert_eq!(h.orchestrator.identity(), None);
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Disconnected)).await;
        let contents = h.queue_store.contents().await;
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].text, "survives disconnect");
    }

    /// Validates disconnect cancels a startup verification still in flight.
    ///
    /// Assertions:
    /// - No authenticated publish lands after `Disconnected`.
    /// - The session stays gone once the verification window elapses.
    #[tokio::test]
    async fn disconnect_cancels_inflight_startup_verification() {
        let h = harness();
        let record = TokenRecord::from_grant(stored_grant(), h.clock.now());
        h.credentials.store(&record).await.expect("seed record");
        h.social.set_verify_delay(Duration::from_millis(150));

        let mut rx = h.orchestrator.subscribe_state();
        h.orchestrator.initialize().await.expect("initialize");
        h.orchestrator.disconnect().await.expect("disconnect");

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(*rx.borrow_and_update(), AuthState::Disconnected);
        assert!(!h.orchestrator.is_authenticated().await);
        assert_eq!(h.orchestrator.identity(), None);
    }

    /// Validates that reauthorization releases held entries.
    ///
    /// Assertions:
    /// - Held entries become eligible again after a fresh authorization.
    #[tokio::test]
    async fn authenticate_releases_reauth_holds() {
        let mut config = test_config();
        config.listener.wait_timeout_secs = 5;
        let h = build(config, Arc::new(AutoApprovingBrowser::approving("auth-code-2")));
        let record = TokenRecord::from_grant(stored_grant(), h.clock.now());
        h.credentials.store(&record).await.expect("seed record");
        let mut rx = h.orchestrator.subscribe_state();
        h.orchestrator.initialize().await.expect("initialize");
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Authenticated(_))).await;

        // Force a terminal failure so the entry is held.
        let unauthorized =
            PerchError::Api { status: 401, detail: "Unauthorized".to_string() };
        h.social.push_post_result(Err(unauthorized.clone())).await;
        h.social.push_post_result(Err(unauthorized)).await;
        h.orchestrator.post("waiting for reauth").await.expect("held");
        wait_for_state(&mut rx, |s| matches!(s, AuthState::Error(_))).await;

        h.orchestrator.authenticate().await.expect("reauthorize");

        let outcome = h.orchestrator.drain_queue().await.expect("drain");
        assert_eq!(outcome, DrainOutcome { sent: 1, remaining: 0 });
    }
}
