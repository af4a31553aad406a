//! Sliding-window rate limiting for protected external operations.
//!
//! - `SlidingWindowLimiter`: admission control for one category
//! - `QuotaBoard`: one limiter per configured category

mod board;

pub use board::QuotaBoard;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::LimitConfig;
use crate::domain::{OperationCategory, QuotaStatus};
use crate::ports::Clock;
use crate::ports::clock::to_chrono;

/// Admits at most `capacity` calls in any trailing `window`.
///
/// Admission timestamps come from the `Clock` port. Checking and reserving
/// happen under one lock, so concurrent callers cannot overshoot.
pub struct SlidingWindowLimiter {
    category: OperationCategory,
    capacity: u32,
    window: Duration,
    warn_below: u32,
    clock: Arc<dyn Clock>,
    admitted: Mutex<VecDeque<DateTime<Utc>>>,
}

impl SlidingWindowLimiter {
    pub fn new(category: OperationCategory, limit: &LimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            category,
            capacity: limit.capacity,
            window: limit.window,
            warn_below: limit.warn_below,
            clock,
            admitted: Mutex::new(VecDeque::with_capacity(limit.capacity as usize)),
        }
    }

    pub fn category(&self) -> &OperationCategory {
        &self.category
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(to_chrono(self.window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Admit one call if the window has room, recording it. A refusal records nothing.
    pub fn is_allowed(&self) -> bool {
        let now = self.clock.now();
        let cutoff = self.cutoff(now);
        let mut admitted = self.admitted.lock();
        while admitted.front().is_some_and(|t| *t <= cutoff) {
            admitted.pop_front();
        }

        if admitted.len() >= self.capacity as usize {
            debug!(
                category = %self.category,
                capacity = self.capacity,
                "call refused by rate limiter"
            );
            return false;
        }
        admitted.push_back(now);

        let remaining = self.capacity - admitted.len() as u32;
        if remaining < self.warn_below {
            warn!(
                category = %self.category,
                remaining,
                capacity = self.capacity,
                "quota running low"
            );
        }
        true
    }

    fn in_window(&self, admitted: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now);
        admitted.iter().filter(|t| **t > cutoff).count()
    }

    /// Calls still available in the current window. Consumes nothing.
    pub fn remaining(&self) -> u32 {
        let now = self.clock.now();
        let admitted = self.admitted.lock();
        let used = self.in_window(&admitted, now) as u32;
        self.capacity.saturating_sub(used)
    }

    /// Time until the next call would be admitted (zero if it would be now).
    pub fn retry_after(&self) -> Duration {
        if self.capacity == 0 {
            // never admits; report a full window
            return self.window;
        }
        let now = self.clock.now();
        let cutoff = self.cutoff(now);
        let admitted = self.admitted.lock();
        let in_window: Vec<_> = admitted.iter().filter(|t| **t > cutoff).collect();
        if in_window.len() < self.capacity as usize {
            return Duration::ZERO;
        }
        // the slot frees when the oldest admission that would keep us full expires
        let freeing = in_window[in_window.len() - self.capacity as usize];
        match freeing.checked_add_signed(to_chrono(self.window)) {
            Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO),
            None => self.window,
        }
    }

    pub fn status(&self) -> QuotaStatus {
        let remaining = self.remaining();
        QuotaStatus {
            category: self.category.clone(),
            capacity: self.capacity,
            remaining,
            window_secs: self.window.as_secs(),
            low: remaining < self.warn_below,
        }
    }
}
