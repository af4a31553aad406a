//! Status - リテンションループの観測用スナップショット

use std::time::Duration;

use serde::Serialize;

use crate::ports::SweepReport;

/// Published on a `watch` channel after every sweep and every reschedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetentionStatus {
    /// Sweeps that ran to completion (successful or not).
    pub runs: u64,
    /// Sweeps skipped because another sweep held the guard.
    pub skipped: u64,
    pub consecutive_failures: u32,
    /// Delay chosen for the next scheduled sweep.
    #[serde(with = "crate::config::secs")]
    pub next_delay: Duration,
    pub last_report: Option<SweepReport>,
    pub last_error: Option<String>,
}

impl RetentionStatus {
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}
