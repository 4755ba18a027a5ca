//! Offline post queue
//!
//! Holds posts that could not be delivered and schedules their retries.
//! The queue is purely in-memory; callers persist snapshots through a
//! [`QueueStore`](crate::ports::QueueStore) after mutations. Depth changes
//! are published on a watch channel for UI consumption.

use std::collections::VecDeque;

use perch_domain::config::QueueConfig;
use perch_domain::errors::PerchError;
use perch_domain::types::QueuedPost;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::time::Clock;

/// Result of an enqueue request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted as a new entry
    Queued { id: String },
    /// Identical text already queued; nothing added
    Duplicate { id: String },
    /// Accepted, displacing the oldest entry to stay within capacity
    QueuedEvictedOldest { id: String, evicted: String },
}

impl EnqueueOutcome {
    /// Content id of the entry the request resolved to.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Queued { id } | Self::Duplicate { id } | Self::QueuedEvictedOldest { id, .. } => {
                id
            }
        }
    }
}

/// FIFO retry queue for undelivered posts
///
/// Entries are identified by a hash of their text, so re-submitting the
/// same content while it is still queued is a no-op. Retry timing lives on
/// each entry; the queue only decides membership and eligibility.
pub struct PostQueue<C: Clock> {
    clock: C,
    config: QueueConfig,
    entries: RwLock<VecDeque<QueuedPost>>,
    depth_tx: watch::Sender<usize>,
}

impl<C: Clock> PostQueue<C> {
    /// Create an empty queue.
    pub fn new(clock: C, config: QueueConfig) -> Self {
        let (depth_tx, _) = watch::channel(0);
        Self {
            clock,
            config,
            entries: RwLock::new(VecDeque::new()),
            depth_tx,
        }
    }

    /// Add a post, deduplicating by content and evicting the oldest entry
    /// when at capacity.
    ///
    /// With `cause: None` the entry is eligible immediately (queued ahead of
    /// any delivery attempt, e.g. while offline). With a cause, the entry
    /// records the failed attempt and backs off; reauth-class causes hold
    /// the entry until [`release_reauth_holds`](Self::release_reauth_holds).
    pub async fn enqueue(&self, text: &str, cause: Option<&PerchError>) -> EnqueueOutcome {
        let id = QueuedPost::content_id(text);
        let now = self.clock.now();

        let mut entries = self.entries.write().await;
        if entries.iter().any(|entry| entry.id == id) {
            debug!(id = %id, "post already queued, skipping duplicate");
            return EnqueueOutcome::Duplicate { id };
        }

        let mut entry = QueuedPost::new(text, now);
        if let Some(err) = cause {
            let retry_at = match err {
                PerchError::RateLimit { resets_at } => Some(*resets_at),
                _ => None,
            };
            entry.schedule_retry(now, &err.to_string(), retry_at);
            entry.requires_reauth = err.requires_reauth();
        }

        let evicted = if entries.len() >= self.config.capacity {
            entries.pop_front().map(|oldest| {
                warn!(evicted = %oldest.id, "queue at capacity, dropping oldest post");
                oldest.id
            })
        } else {
            None
        };

        entries.push_back(entry);
        let depth = entries.len();
        drop(entries);
        self.publish_depth(depth);

        info!(id = %id, depth, "post queued");
        match evicted {
            Some(evicted) => EnqueueOutcome::QueuedEvictedOldest { id, evicted },
            None => EnqueueOutcome::Queued { id },
        }
    }

    /// Entries due for a delivery attempt, in insertion order.
    ///
    /// Entries past the age bound are dropped here so that held posts
    /// cannot outlive the retention window.
    pub async fn eligible(&self) -> Vec<QueuedPost> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|entry| {
            let expired = now - entry.enqueued_at > chrono::Duration::days(self.config.max_age_days);
            if expired {
                warn!(id = %entry.id, "dropping queued post past retention window");
            }
            !expired
        });
        let depth = entries.len();
        let pruned = before != depth;

        let due: Vec<QueuedPost> = entries
            .iter()
            .filter(|entry| entry.is_eligible(now))
            .cloned()
            .collect();
        drop(entries);

        if pruned {
            self.publish_depth(depth);
        }
        due
    }

    /// Remove a delivered entry.
    pub async fn record_success(&self, id: &str) -> bool {
        let removed = self.remove(id).await;
        if removed {
            debug!(id = %id, "queued post delivered");
        }
        removed
    }

    /// Record a failed delivery attempt for a queued entry.
    ///
    /// Reauth-class errors hold the entry; anything else backs it off
    /// exponentially (rate-limit errors wait for the advertised reset).
    /// Entries exceeding the attempt or age bounds are dropped.
    pub async fn record_failure(&self, id: &str, error: &PerchError) {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let Some(position) = entries.iter().position(|entry| entry.id == id) else {
            return;
        };

        let entry = &mut entries[position];
        if error.requires_reauth() {
            entry.requires_reauth = true;
            entry.last_error = Some(error.to_string());
            info!(id = %id, "queued post held pending re-authentication");
            return;
        }

        let retry_at = match error {
            PerchError::RateLimit { resets_at } => Some(*resets_at),
            _ => None,
        };
        entry.schedule_retry(now, &error.to_string(), retry_at);

        if entry.exceeded_bounds(now, self.config.max_attempts, self.config.max_age_days) {
            warn!(
                id = %id,
                attempts = entry.attempt_count,
                "dropping queued post after exhausting retry bounds"
            );
            entries.remove(position);
            let depth = entries.len();
            drop(entries);
            self.publish_depth(depth);
        } else {
            debug!(
                id = %id,
                attempts = entry.attempt_count,
                next_attempt_at = %entry.next_attempt_at,
                "queued post rescheduled"
            );
        }
    }

    /// Release entries held for re-authentication, making them eligible
    /// immediately.
    pub async fn release_reauth_holds(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let mut released = 0;
        for entry in entries.iter_mut() {
            if entry.requires_reauth {
                entry.requires_reauth = false;
                entry.next_attempt_at = now;
                released += 1;
            }
        }
        drop(entries);
        if released > 0 {
            info!(released, "released posts held for re-authentication");
        }
        released
    }

    /// Remove an entry by id.
    pub async fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let Some(position) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        entries.remove(position);
        let depth = entries.len();
        drop(entries);
        self.publish_depth(depth);
        true
    }

    /// Number of queued entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Copy of all entries, for persistence.
    pub async fn snapshot(&self) -> Vec<QueuedPost> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Replace queue contents from a persisted snapshot.
    ///
    /// Keeps the newest entries when the snapshot exceeds capacity.
    pub async fn restore(&self, posts: Vec<QueuedPost>) {
        let mut entries = self.entries.write().await;
        entries.clear();
        let total = posts.len();
        let skip = total.saturating_sub(self.config.capacity);
        if skip > 0 {
            warn!(dropped = skip, "restored queue exceeds capacity, dropping oldest posts");
        }
        entries.extend(posts.into_iter().skip(skip));
        let depth = entries.len();
        drop(entries);
        self.publish_depth(depth);
        debug!(depth, "queue restored");
    }

    /// Watch channel carrying the queue depth.
    pub fn subscribe_depth(&self) -> watch::Receiver<usize> {
        self.depth_tx.subscribe()
    }

    fn publish_depth(&self, depth: usize) {
        self.depth_tx.send_replace(depth);
    }
}
