//! Advisory tracking of the posting quota
//!
//! Keeps a local count against a rolling window so quota exhaustion is
//! caught before spending a network call. Server-reported header data
//! overrides the local estimate whenever it arrives; the server remains
//! authoritative and 429 handling stays in the request executor.

use chrono::{DateTime, Utc};
use perch_domain::config::RateLimitConfig;
use perch_domain::types::{RateLimitSnapshot, RateLimitWindow};
use tracing::{debug, warn};

use crate::time::{Clock, SystemClock};

/// Outcome of a local admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Quota available; proceed with the network attempt
    Allowed,
    /// Local window exhausted; retry after `resets_at`
    Denied {
        /// When the current window rolls over
        resets_at: DateTime<Utc>,
    },
}

/// Local posting-quota tracker
pub struct RateLimitTracker<C: Clock = SystemClock> {
    clock: C,
    config: RateLimitConfig,
    window: parking_lot::Mutex<RateLimitWindow>,
}

impl<C: Clock> RateLimitTracker<C> {
    /// Create a tracker with an empty window starting now.
    pub fn new(clock: C, config: RateLimitConfig) -> Self {
        let window = RateLimitWindow {
            window_start: clock.now(),
            limit: config.monthly_limit,
            used: 0,
            resets_at: clock.now() + chrono::Duration::days(config.window_days),
        };
        Self { clock, config, window: parking_lot::Mutex::new(window) }
    }

    /// Check whether a post may be attempted under the local quota.
    pub fn check_admission(&self) -> Admission {
        let mut window = self.window.lock();
        self.roll_if_due(&mut window);

        if window.used >= window.limit {
            warn!(
                limit = window.limit,
                resets_at = %window.resets_at,
                "local posting quota exhausted"
            );
            Admission::Denied { resets_at: window.resets_at }
        } else {
            Admission::Allowed
        }
    }

    /// Count one successful post against the window.
    pub fn record_usage(&self) {
        let mut window = self.window.lock();
        self.roll_if_due(&mut window);
        window.used = window.used.saturating_add(1);
        debug!(used = window.used, limit = window.limit, "post counted against quota");
    }

    /// Replace local estimates with server-reported quota data.
    pub fn apply_snapshot(&self, snapshot: RateLimitSnapshot) {
        let mut window = self.window.lock();
        window.limit = snapshot.limit;
        window.used = snapshot.limit.saturating_sub(snapshot.remaining);
        window.resets_at = snapshot.resets_at;
        debug!(
            limit = window.limit,
            remaining = snapshot.remaining,
            resets_at = %window.resets_at,
            "applied server rate-limit snapshot"
        );
    }

    /// Current window state.
    pub fn window(&self) -> RateLimitWindow {
        let mut window = self.window.lock();
        self.roll_if_due(&mut window);
        window.clone()
    }

    /// Remaining local allowance.
    pub fn remaining(&self) -> u32 {
        self.window().remaining()
    }

    fn roll_if_due(&self, window: &mut RateLimitWindow) {
        let now = self.clock.now();
        if now >= window.resets_at {
            debug!("rate-limit window rolled over");
            *window = RateLimitWindow {
                window_start: now,
                limit: self.config.monthly_limit,
                used: 0,
                resets_at: now + chrono::Duration::days(self.config.window_days),
            };
        }
    }
}
