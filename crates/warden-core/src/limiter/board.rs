//! QuotaBoard: per-category limiters built from config.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::SlidingWindowLimiter;
use crate::config::LimitConfig;
use crate::domain::{OperationCategory, QuotaStatus};
use crate::ports::Clock;

/// Categories are independent: each limiter has its own lock.
///
/// A category without a configured limit is not throttled.
#[derive(Clone, Default)]
pub struct QuotaBoard {
    limiters: BTreeMap<OperationCategory, Arc<SlidingWindowLimiter>>,
}

impl QuotaBoard {
    pub fn from_config(
        limits: &BTreeMap<OperationCategory, LimitConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiters = limits
            .iter()
            .map(|(category, limit)| {
                let limiter = SlidingWindowLimiter::new(category.clone(), limit, clock.clone());
                (category.clone(), Arc::new(limiter))
            })
            .collect();
        Self { limiters }
    }

    pub fn limiter(&self, category: &OperationCategory) -> Option<Arc<SlidingWindowLimiter>> {
        self.limiters.get(category).cloned()
    }

    pub fn is_allowed(&self, category: &OperationCategory) -> bool {
        match self.limiters.get(category) {
            Some(limiter) => limiter.is_allowed(),
            None => {
                debug!(%category, "no limit configured for category");
                true
            }
        }
    }

    pub fn status(&self, category: &OperationCategory) -> Option<QuotaStatus> {
        self.limiters.get(category).map(|l| l.status())
    }

    /// Snapshot of every category, ordered by name.
    pub fn statuses(&self) -> Vec<QuotaStatus> {
        self.limiters.values().map(|l| l.status()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::ports::FixedClock;
    use chrono::Utc;
    use std::time::Duration;

    fn board() -> (QuotaBoard, FixedClock) {
        let clock = FixedClock::new(Utc::now());
        let board = QuotaBoard::from_config(&AppConfig::default().limits, Arc::new(clock.clone()));
        (board, clock)
    }

    #[test]
    fn default_categories_are_configured() {
        let (board, _) = board();
        let statuses = board.statuses();

        assert_eq!(statuses.len(), 2);
        let model = board.status(&OperationCategory::model_invoke()).unwrap();
        assert_eq!((model.capacity, model.window_secs), (10, 60));
        let submit = board.status(&OperationCategory::task_submit()).unwrap();
        assert_eq!((submit.capacity, submit.window_secs), (5, 3600));
    }

    #[test]
    fn categories_do_not_share_budget() {
        let (board, clock) = board();
        let submit = OperationCategory::task_submit();
        for _ in 0..5 {
            assert!(board.is_allowed(&submit));
        }
        assert!(!board.is_allowed(&submit));
        assert!(board.is_allowed(&OperationCategory::model_invoke()));

        clock.advance(Duration::from_secs(3600));
        assert!(board.is_allowed(&submit));
    }

    #[test]
    fn low_flag_follows_warning_threshold() {
        let (board, _) = board();
        let submit = OperationCategory::task_submit();
        for _ in 0..3 {
            board.is_allowed(&submit);
        }
        // 2 remaining, threshold is "below 2"
        assert!(!board.status(&submit).unwrap().low);
        board.is_allowed(&submit);
        assert!(board.status(&submit).unwrap().low);
    }

    #[test]
    fn unconfigured_category_is_not_throttled() {
        let (board, _) = board();
        let other = OperationCategory::new("search");
        assert!((0..100).all(|_| board.is_allowed(&other)));
        assert!(board.status(&other).is_none());
    }
}
