//! Token-bucket admission control.
//!
//! The bucket holds at most `capacity` tokens. A background task adds one
//! token per refill period; callers take tokens with [`TokenBucket::try_acquire`]
//! and never wait. An empty bucket means the request is shed, not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Debug)]
pub struct TokenBucket {
    tokens: AtomicU32,
    capacity: u32,
}

impl TokenBucket {
    /// A full bucket with the given capacity.
    pub fn new(capacity: u32) -> Self {
        Self {
            tokens: AtomicU32::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens currently available.
    pub fn available(&self) -> u32 {
        self.tokens.load(Ordering::Acquire)
    }

    /// Take one token if there is one.
    pub fn try_acquire(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Add one token unless the bucket is already full.
    /// Returns whether a token was added.
    pub fn refill_one(&self) -> bool {
        let capacity = self.capacity;
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_ok()
    }

    /// Start the refill ticker. It runs until the handle is aborted or the
    /// runtime shuts down.
    pub fn spawn_refill(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let bucket = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; the bucket starts full anyway.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if bucket.refill_one() {
                    debug!(available = bucket.available(), "rate limit token added");
                }
            }
        })
    }
}
