//! Time abstraction for testability
//!
//! Token expiry, rate windows, and queue eligibility are all wall-clock
//! decisions; routing them through a `Clock` keeps the logic deterministic
//! under test without waiting for real time to pass.
//!
//! # Examples
//!
//! ```
//! use chrono::Duration;
//! use perch_core::time::{Clock, MockClock, SystemClock};
//!
//! // Use the system clock in production
//! let clock = SystemClock;
//! let _now = clock.now();
//!
//! // Use the mock clock in tests
//! let mock = MockClock::new();
//! let start = mock.now();
//! mock.advance(Duration::seconds(5));
//! assert_eq!(mock.now() - start, Duration::seconds(5));
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Trait for wall-clock access to enable testing
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock implementation
///
/// Use this in production code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing
///
/// Starts at the real current time but only moves when advanced manually.
/// Clones share the same underlying offset.
#[derive(Debug, Clone)]
pub struct MockClock {
    base: DateTime<Utc>,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current real time.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a mock clock anchored at a specific instant.
    #[must_use]
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self { base, offset: Arc::new(Mutex::new(Duration::zero())) }
    }

    /// Advance the mock clock without real time passing.
    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock();
        *offset += duration;
    }

    /// Set the absolute simulated elapsed time.
    pub fn set_elapsed(&self, duration: Duration) {
        let mut offset = self.offset.lock();
        *offset = duration;
    }

    /// Simulated time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + *self.offset.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
