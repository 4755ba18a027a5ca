//! Token lifecycle management with single-flight refresh
//!
//! Owns the only mutation path for the token record:
//! - Load from / persist to the credential store
//! - Proactive refresh before expiry (background task)
//! - Single-flight refresh under concurrent demand
//! - Terminal-failure detection (provider rejected the refresh token)
//! - Idle tracking for the liveness probe before critical operations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use perch_domain::config::LifecycleConfig;
use perch_domain::errors::TokenError;
use perch_domain::types::TokenRecord;
use perch_domain::{PerchError, Result};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::ports::{CredentialStore, OAuthApi};
use crate::time::Clock;

/// Cadence for re-checking when there is nothing to schedule against
const MISSING_RECHECK_SECS: u64 = 60;

/// Observable phase of the managed token record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPhase {
    /// No record present (never authenticated, or disconnected)
    Missing,
    /// Record present and outside the refresh margin
    Valid,
    /// Record inside the refresh margin but not yet expired
    ExpiringSoon,
    /// A refresh call is in flight
    Refreshing,
    /// Record past its expiry instant (still refreshable)
    Expired,
    /// Provider rejected the refresh token; full reauthorization required
    Invalid,
}

/// Manages one token record over its whole lifetime
///
/// All refreshes funnel through an internal gate: concurrent callers
/// serialize, and a caller that acquires the gate after the record was
/// already renewed reuses it instead of hitting the network again.
pub struct TokenLifecycle<C: Clock> {
    oauth: Arc<dyn OAuthApi>,
    store: Arc<dyn CredentialStore>,
    clock: C,
    config: LifecycleConfig,
    record: RwLock<Option<TokenRecord>>,
    refresh_gate: Mutex<()>,
    refreshing: AtomicBool,
    invalid_reason: parking_lot::Mutex<Option<String>>,
    last_verified: parking_lot::Mutex<Option<DateTime<Utc>>>,
    phase_tx: watch::Sender<TokenPhase>,
}

impl<C: Clock> TokenLifecycle<C> {
    /// Create a lifecycle manager with no record loaded.
    pub fn new(
        oauth: Arc<dyn OAuthApi>,
        store: Arc<dyn CredentialStore>,
        clock: C,
        config: LifecycleConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(TokenPhase::Missing);
        Self {
            oauth,
            store,
            clock,
            config,
            record: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            refreshing: AtomicBool::new(false),
            invalid_reason: parking_lot::Mutex::new(None),
            last_verified: parking_lot::Mutex::new(None),
            phase_tx,
        }
    }

    /// Load any stored record into memory. Call once at startup.
    ///
    /// Returns `true` when a record was restored. A restored record has not
    /// been live-verified, so the liveness probe is due immediately.
    ///
    /// # Errors
    /// Returns `PerchError::Store` when the credential store fails; a store
    /// with no record is `Ok(false)`.
    pub async fn initialize(&self) -> Result<bool> {
        match self.store.load().await? {
            Some(record) => {
                *self.record.write().await = Some(record);
                *self.last_verified.lock() = None;
                self.publish_phase().await;
                info!("token record restored from credential store");
                Ok(true)
            }
            None => {
                debug!("no stored token record found");
                Ok(false)
            }
        }
    }

    /// Install a fresh record after a completed authorization flow.
    ///
    /// Persists to the credential store and replaces the in-memory record.
    /// The caller just live-verified the identity, so idle tracking resets.
    ///
    /// # Errors
    /// Returns `PerchError::Store` when persistence fails; the record is not
    /// installed in that case.
    pub async fn install(&self, record: TokenRecord) -> Result<()> {
        self.store.store(&record).await?;
        *self.record.write().await = Some(record);
        *self.invalid_reason.lock() = None;
        *self.last_verified.lock() = Some(self.clock.now());
        self.publish_phase().await;
        info!("token record installed");
        Ok(())
    }

    /// Current record, if any (no refresh side effects).
    pub async fn record(&self) -> Option<TokenRecord> {
        self.record.read().await.clone()
    }

    /// Whether a usable session exists (record present and not invalidated).
    pub async fn is_authenticated(&self) -> bool {
        self.record.read().await.is_some() && self.invalid_reason.lock().is_none()
    }

    /// Current phase of the record.
    pub async fn phase(&self) -> TokenPhase {
        let record = self.record.read().await;
        self.compute_phase(record.as_ref())
    }

    /// Watch channel carrying phase transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<TokenPhase> {
        self.phase_tx.subscribe()
    }

    /// A valid access token, refreshing first when needed.
    ///
    /// # Errors
    /// `TokenError::Missing` when not authenticated, refresh errors when the
    /// record could not be renewed.
    pub async fn access_token(&self) -> Result<String> {
        self.ensure_fresh().await.map(|record| record.access_token)
    }

    /// The current record, renewed first when inside the refresh margin.
    ///
    /// Concurrent callers share one refresh; in-flight holders of the old
    /// token are unaffected.
    ///
    /// # Errors
    /// `TokenError::Missing` when not authenticated;
    /// `TokenError::RefreshRejected` when the provider rejected the refresh
    /// token (reauthorization required); transport errors otherwise.
    pub async fn ensure_fresh(&self) -> Result<TokenRecord> {
        if let Some(reason) = self.invalid_reason.lock().clone() {
            return Err(TokenError::RefreshRejected(reason).into());
        }
        {
            let guard = self.record.read().await;
            let record = guard.as_ref().ok_or(PerchError::Token(TokenError::Missing))?;
            if !record.expires_within(self.clock.now(), self.config.refresh_margin_secs) {
                return Ok(record.clone());
            }
        }
        self.refresh_locked(None).await
    }

    /// Force a renewal after the server rejected the current access token.
    ///
    /// `stale_access` is the token that received the 401. If the record has
    /// already moved past it (a concurrent refresh won the race) the current
    /// record is returned without another network call.
    ///
    /// # Errors
    /// Same as [`Self::ensure_fresh`].
    pub async fn refresh_after_unauthorized(&self, stale_access: &str) -> Result<TokenRecord> {
        if let Some(reason) = self.invalid_reason.lock().clone() {
            return Err(TokenError::RefreshRejected(reason).into());
        }
        self.refresh_locked(Some(stale_access)).await
    }

    /// Whether a live identity probe is due before critical operations.
    ///
    /// True when a record exists but has not been exercised against the
    /// server within the idle threshold (including right after a restart).
    pub async fn needs_liveness_probe(&self) -> bool {
        if self.record.read().await.is_none() {
            return false;
        }
        let now = self.clock.now();
        match *self.last_verified.lock() {
            Some(at) => (now - at).num_seconds() > self.config.idle_probe_secs,
            None => true,
        }
    }

    /// Record a successful live use of the access token.
    pub fn mark_verified(&self) {
        *self.last_verified.lock() = Some(self.clock.now());
    }

    /// Mark the session as requiring full reauthorization.
    ///
    /// Used by the orchestrator when the server keeps rejecting a token the
    /// provider just renewed.
    pub async fn mark_invalid(&self, reason: &str) {
        self.set_invalid(reason).await;
    }

    /// Drop the record from memory and the credential store.
    ///
    /// # Errors
    /// Returns `PerchError::Store` when the store rejects the deletion; the
    /// in-memory record is cleared regardless.
    pub async fn clear(&self) -> Result<()> {
        *self.record.write().await = None;
        *self.invalid_reason.lock() = None;
        *self.last_verified.lock() = None;
        self.publish_phase().await;
        let result = self.store.clear().await;
        info!("token record cleared");
        result
    }

    /// Background task that renews the record shortly before expiry.
    ///
    /// Sleeps until `expires_at - refresh_margin`, refreshes, and reschedules.
    /// Recoverable failures retry with exponential backoff; a terminal
    /// rejection parks the task until the record changes.
    ///
    /// # Example
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use perch_core::time::SystemClock;
    /// # use perch_core::tokens::TokenLifecycle;
    /// # fn example(lifecycle: Arc<TokenLifecycle<SystemClock>>) {
    /// tokio::spawn(async move {
    ///     lifecycle.start_auto_refresh().await;
    /// });
    /// # }
    /// ```
    pub async fn start_auto_refresh(self: Arc<Self>) {
        info!("token auto-refresh task started");
        let mut backoff_secs = self.config.refresh_backoff_base_secs;

        loop {
            let wake = self.next_wake_secs().await;
            if wake > 0 {
                debug!(seconds = wake, "auto-refresh sleeping until next check");
                tokio::time::sleep(std::time::Duration::from_secs(wake)).await;
            }

            // The session may have ended or gone terminal during the sleep.
            match self.phase().await {
                TokenPhase::Missing | TokenPhase::Invalid => {
                    tokio::time::sleep(std::time::Duration::from_secs(MISSING_RECHECK_SECS)).await;
                    continue;
                }
                TokenPhase::Valid => {
                    backoff_secs = self.config.refresh_backoff_base_secs;
                    continue;
                }
                TokenPhase::ExpiringSoon | TokenPhase::Refreshing | TokenPhase::Expired => {}
            }

            match self.ensure_fresh().await {
                Ok(_) => {
                    backoff_secs = self.config.refresh_backoff_base_secs;
                }
                Err(err) if err.requires_reauth() => {
                    error!(error = %err, "auto-refresh rejected; reauthorization required");
                }
                Err(err) => {
                    warn!(error = %err, retry_in_secs = backoff_secs, "auto-refresh failed");
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                    backoff_secs =
                        (backoff_secs * 2).min(self.config.refresh_backoff_max_secs);
                }
            }
        }
    }

    async fn next_wake_secs(&self) -> u64 {
        let guard = self.record.read().await;
        match guard.as_ref() {
            Some(record) if self.invalid_reason.lock().is_none() => {
                let due_in = record.seconds_until_expiry(self.clock.now())
                    - self.config.refresh_margin_secs;
                u64::try_from(due_in).unwrap_or(0)
            }
            _ => MISSING_RECHECK_SECS,
        }
    }

    async fn refresh_locked(&self, stale_access: Option<&str>) -> Result<TokenRecord> {
        let _gate = self.refresh_gate.lock().await;

        // Re-check under the gate: a concurrent caller may have already
        // renewed the record while this one waited.
        let pending = {
            let guard = self.record.read().await;
            let record = guard.as_ref().ok_or(PerchError::Token(TokenError::Missing))?;
            let already_fresh = match stale_access {
                Some(stale) => record.access_token != stale,
                None => {
                    !record.expires_within(self.clock.now(), self.config.refresh_margin_secs)
                }
            };
            if already_fresh {
                debug!("record already renewed by a concurrent refresh");
                return Ok(record.clone());
            }
            record.refresh_token.clone().map(|token| (token, record.clone()))
        };

        let Some((refresh_token, prior)) = pending else {
            let reason = "no refresh token issued for this session";
            self.set_invalid(reason).await;
            return Err(TokenError::RefreshRejected(reason.to_string()).into());
        };

        self.refreshing.store(true, Ordering::SeqCst);
        self.publish_phase().await;
        let outcome = self.oauth.refresh(&refresh_token).await;
        self.refreshing.store(false, Ordering::SeqCst);

        match outcome {
            Ok(grant) => {
                let renewed = prior.renewed(grant, self.clock.now());
                *self.record.write().await = Some(renewed.clone());
                self.publish_phase().await;
                info!("access token refreshed");
                if let Err(err) = self.store.store(&renewed).await {
                    // The in-memory session stays healthy; only restart
                    // durability is affected.
                    warn!(error = %err, "failed to persist refreshed token record");
                }
                Ok(renewed)
            }
            Err(err) if err.requires_reauth() => {
                error!(error = %err, "refresh rejected by provider");
                self.set_invalid(&err.to_string()).await;
                Err(err)
            }
            Err(err) => {
                self.publish_phase().await;
                warn!(error = %err, "token refresh failed");
                Err(err)
            }
        }
    }

    async fn set_invalid(&self, reason: &str) {
        *self.invalid_reason.lock() = Some(reason.to_string());
        self.publish_phase().await;
    }

    async fn publish_phase(&self) {
        let record = self.record.read().await;
        let phase = self.compute_phase(record.as_ref());
        self.phase_tx.send_replace(phase);
    }

    fn compute_phase(&self, record: Option<&TokenRecord>) -> TokenPhase {
        if self.invalid_reason.lock().is_some() {
            return TokenPhase::Invalid;
        }
        let Some(record) = record else {
            return TokenPhase::Missing;
        };
        if self.refreshing.load(Ordering::SeqCst) {
            return TokenPhase::Refreshing;
        }
        let now = self.clock.now();
        if record.is_expired(now) {
            TokenPhase::Expired
        } else if record.expires_within(now, self.config.refresh_margin_secs) {
            TokenPhase::ExpiringSoon
        } else {
            TokenPhase::Valid
        }
    }
}
