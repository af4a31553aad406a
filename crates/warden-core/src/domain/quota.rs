use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a protected operation category (one limiter per category).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationCategory(String);

impl OperationCategory {
    /// Synchronous calls to the external reasoning/model service.
    pub const MODEL_INVOKE: &'static str = "model_invoke";
    /// Submissions of long-running external tasks.
    pub const TASK_SUBMIT: &'static str = "task_submit";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn model_invoke() -> Self {
        Self::new(Self::MODEL_INVOKE)
    }

    pub fn task_submit() -> Self {
        Self::new(Self::TASK_SUBMIT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Quota snapshot for display. Reading it consumes no budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub category: OperationCategory,
    pub capacity: u32,
    pub remaining: u32,
    pub window_secs: u64,
    /// `remaining` has dropped below the configured warning threshold.
    pub low: bool,
}

impl fmt::Display for QuotaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} calls remaining: {}/{} (window {}s)",
            self.category, self.remaining, self.capacity, self.window_secs
        )
    }
}
