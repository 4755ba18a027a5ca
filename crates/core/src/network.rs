//! Network state classification from latency probes
//!
//! Consumes success/failure reports from the connectivity probe and derives
//! a `ConnectionQuality`, which in turn shapes gating (`can_attempt`),
//! per-class timeouts, and retry aggressiveness. The monitor itself never
//! performs network I/O.

use std::collections::VecDeque;
use std::time::Duration;

use perch_domain::config::ProbeConfig;
use perch_domain::constants::{RETRY_BASE_DELAY_MS, RETRY_MAX_ATTEMPTS};
use perch_domain::types::{ConnectionQuality, OperationClass};
use tracing::{debug, info, warn};

/// Reduced attempt budget used under degraded connectivity
const CONSERVATIVE_MAX_ATTEMPTS: u32 = 2;
const CONSERVATIVE_BASE_DELAY_MS: u64 = 2_000;

/// Retry budget recommended for the current connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryProfile {
    /// Attempt ceiling including the first try
    pub max_attempts: u32,
    /// First backoff delay
    pub base_delay: Duration,
}

#[derive(Debug)]
struct MonitorState {
    samples: VecDeque<Duration>,
    consecutive_failures: u32,
}

/// Connectivity classifier fed by the latency probe
///
/// Starts optimistic (`Good`) until evidence arrives: an unknown network is
/// not a reason to hold back a user-initiated action.
pub struct NetworkMonitor {
    config: ProbeConfig,
    state: parking_lot::RwLock<MonitorState>,
}

impl NetworkMonitor {
    /// Create a monitor with no samples yet.
    #[must_use]
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            state: parking_lot::RwLock::new(MonitorState {
                samples: VecDeque::new(),
                consecutive_failures: 0,
            }),
        }
    }

    /// Record a successful probe round trip.
    pub fn record_success(&self, latency: Duration) {
        let before = self.quality();
        {
            let mut state = self.state.write();
            state.consecutive_failures = 0;
            state.samples.push_back(latency);
            while state.samples.len() > self.config.sample_window {
                state.samples.pop_front();
            }
        }
        let after = self.quality();
        if before == after {
            debug!(latency_ms = latency.as_millis() as u64, quality = ?after, "probe succeeded");
        } else {
            info!(from = ?before, to = ?after, "connection quality changed");
        }
    }

    /// Record a failed probe.
    pub fn record_failure(&self) {
        let before = self.quality();
        {
            let mut state = self.state.write();
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        }
        let after = self.quality();
        if after == ConnectionQuality::None && before != ConnectionQuality::None {
            warn!("connectivity lost after consecutive probe failures");
        } else {
            debug!(quality = ?after, "probe failed");
        }
    }

    /// Current quality classification.
    ///
    /// `None` after the configured run of consecutive failures; otherwise
    /// by median latency over the sample window.
    pub fn quality(&self) -> ConnectionQuality {
        let state = self.state.read();
        if state.consecutive_failures >= self.config.offline_after_failures {
            return ConnectionQuality::None;
        }
        if state.samples.is_empty() {
            return ConnectionQuality::Good;
        }

        let mut sorted: Vec<Duration> = state.samples.iter().copied().collect();
        sorted.sort_unstable();
        let median = sorted[sorted.len() / 2];

        match median.as_millis() {
            0..=149 => ConnectionQuality::Excellent,
            150..=399 => ConnectionQuality::Good,
            400..=999 => ConnectionQuality::Fair,
            _ => ConnectionQuality::Poor,
        }
    }

    /// Whether an operation of this class should be attempted at all.
    ///
    /// Authentication is always attemptable: it is an explicit user action
    /// and its own timeout bounds the damage of a wrong guess.
    pub fn can_attempt(&self, class: OperationClass) -> bool {
        class == OperationClass::Authentication || self.quality() != ConnectionQuality::None
    }

    /// Timeout for this class under current conditions.
    pub fn recommended_timeout(&self, class: OperationClass) -> Duration {
        let multiplier = match self.quality() {
            ConnectionQuality::Excellent | ConnectionQuality::Good => 1.0,
            ConnectionQuality::Fair => 1.5,
            ConnectionQuality::Poor | ConnectionQuality::None => 2.0,
        };
        class.base_timeout().mul_f64(multiplier)
    }

    /// Retry budget for this class under current conditions.
    pub fn retry_profile(&self, _class: OperationClass) -> RetryProfile {
        match self.quality() {
            ConnectionQuality::Poor | ConnectionQuality::None => RetryProfile {
                max_attempts: CONSERVATIVE_MAX_ATTEMPTS,
                base_delay: Duration::from_millis(CONSERVATIVE_BASE_DELAY_MS),
            },
            _ => RetryProfile {
                max_attempts: RETRY_MAX_ATTEMPTS,
                base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            },
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}
