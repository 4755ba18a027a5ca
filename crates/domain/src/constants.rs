//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! core.

// Posting constraints
pub const MAX_POST_CHARS: usize = 280;

// Token lifecycle
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 900; // refresh 15 min before expiry
pub const DEFAULT_IDLE_PROBE_SECS: i64 = 300; // liveness probe after 5 min idle
pub const REFRESH_BACKOFF_BASE_SECS: u64 = 1;
pub const REFRESH_BACKOFF_MAX_SECS: u64 = 30;

// Authorization round
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

// Request execution
pub const TIMEOUT_AUTHENTICATION_SECS: u64 = 30;
pub const TIMEOUT_POSTING_SECS: u64 = 10;
pub const TIMEOUT_REFRESH_SECS: u64 = 20;
pub const TIMEOUT_GENERAL_SECS: u64 = 15;
pub const RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const RETRY_MAX_DELAY_SECS: u64 = 30;
pub const RETRY_JITTER_FACTOR: f64 = 0.2;
pub const RETRY_AFTER_CAP_SECS: u64 = 300;

// Post queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const QUEUE_MAX_ATTEMPTS: u32 = 10;
pub const QUEUE_MAX_AGE_DAYS: i64 = 7;
pub const QUEUE_RETRY_BASE_SECS: i64 = 5;
pub const QUEUE_RETRY_MAX_SECS: i64 = 900;
pub const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 30;

// Rate limiting
pub const DEFAULT_MONTHLY_POST_LIMIT: u32 = 500;
pub const RATE_WINDOW_DAYS: i64 = 30;

// Network monitoring
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
pub const PROBE_TIMEOUT_SECS: u64 = 5;
pub const QUALITY_SAMPLE_WINDOW: usize = 5;
pub const OFFLINE_AFTER_FAILURES: u32 = 2;
