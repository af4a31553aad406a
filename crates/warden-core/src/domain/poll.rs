//! Poll model: external task states and the poller's own state machine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity of a task held by the external long-running task system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status reported by the external task system.
///
/// The named variants are the closed set the task API documents; anything
/// else (e.g. `DELETED` from a provisioning API) is kept verbatim in
/// `Other`. Serialized as SCREAMING_SNAKE_CASE strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Created,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Created => "CREATED",
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelling => "CANCELLING",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Other(s) => s,
        }
    }

    /// Parse a status string; matching is case-insensitive.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATED" => TaskStatus::Created,
            "QUEUED" => TaskStatus::Queued,
            "RUNNING" => TaskStatus::Running,
            "COMPLETED" => TaskStatus::Completed,
            "FAILED" => TaskStatus::Failed,
            "CANCELLING" => TaskStatus::Cancelling,
            "CANCELLED" => TaskStatus::Cancelled,
            other => TaskStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TaskStatus::parse(s))
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        TaskStatus::parse(&s)
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Which external statuses end the poll, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTarget {
    /// Status that means success.
    pub desired: TaskStatus,
    /// Statuses that mean definitive failure.
    pub failure: Vec<TaskStatus>,
}

impl PollTarget {
    /// Wait for `desired`; no status counts as failure.
    pub fn reach(desired: TaskStatus) -> Self {
        Self {
            desired,
            failure: Vec::new(),
        }
    }

    pub fn with_failure(mut self, status: TaskStatus) -> Self {
        self.failure.push(status);
        self
    }

    pub fn classify(&self, status: &TaskStatus) -> Observation {
        if *status == self.desired {
            Observation::Succeeded
        } else if self.failure.contains(status) {
            Observation::Failed
        } else {
            Observation::Pending
        }
    }
}

impl Default for PollTarget {
    fn default() -> Self {
        Self::reach(TaskStatus::Completed)
            .with_failure(TaskStatus::Failed)
            .with_failure(TaskStatus::Cancelled)
    }
}

/// Classification of one observed status against a `PollTarget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Succeeded,
    Failed,
    Pending,
}

/// Poller state machine.
///
/// State transitions:
/// - Submitted -> Polling -> Completed
/// - Submitted -> Polling -> Failed
/// - Submitted -> Polling -> ... -> TimedOut (max_attempts reached)
/// - Submitted -> Polling -> Cancelled (cancellation at a suspension point)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollPhase {
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollPhase::Completed | PollPhase::Failed | PollPhase::TimedOut | PollPhase::Cancelled
        )
    }
}

/// Per-task poll state, mutated once per cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    pub task: TaskHandle,
    pub phase: PollPhase,
    /// Status queries performed so far.
    pub attempt: u32,
    /// Last status returned by the external system, if any query succeeded.
    pub status: Option<TaskStatus>,
    /// Wait before the next query (None before the first wait is known, and
    /// in terminal phases).
    pub next_wait: Option<Duration>,
}

impl PollState {
    pub fn submitted(task: TaskHandle) -> Self {
        Self {
            task,
            phase: PollPhase::Submitted,
            attempt: 0,
            status: None,
            next_wait: None,
        }
    }
}

/// Progress report emitted on every poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollProgress {
    pub task: TaskHandle,
    pub phase: PollPhase,
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_wait_secs: Option<f64>,
}

impl PollProgress {
    pub(crate) fn from_state(state: &PollState, max_attempts: u32) -> Self {
        Self {
            task: state.task.clone(),
            phase: state.phase,
            attempt: state.attempt,
            max_attempts,
            status: state.status.clone(),
            next_wait_secs: state.next_wait.map(|d| d.as_secs_f64()),
        }
    }
}

/// Terminal result of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// External system reported the desired status.
    Completed { attempts: u32 },
    /// External system reported a failure status. Do not retry silently.
    Failed { attempts: u32, status: TaskStatus },
    /// Gave up after `max_attempts`; the task may still be running.
    TimedOut {
        attempts: u32,
        last_status: Option<TaskStatus>,
    },
    /// Caller cancelled.
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Completed { attempts }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::TimedOut { attempts, .. }
            | PollOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn phase(&self) -> PollPhase {
        match self {
            PollOutcome::Completed { .. } => PollPhase::Completed,
            PollOutcome::Failed { .. } => PollPhase::Failed,
            PollOutcome::TimedOut { .. } => PollPhase::TimedOut,
            PollOutcome::Cancelled { .. } => PollPhase::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Completed { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            PollOutcome::Completed { .. } => "Task Completed!".to_string(),
            PollOutcome::Failed { status, .. } => {
                format!(
                    "Task ended with status {status}. Please review the request before retrying."
                )
            }
            PollOutcome::TimedOut { .. } => concat!(
                "Maximum attempts reached. ",
                "Please check if the device is available or check task status manually."
            )
            .to_string(),
            PollOutcome::Cancelled { .. } => "Polling cancelled.".to_string(),
        }
    }

    pub fn fallback(&self) -> Option<super::errors::Fallback> {
        use super::errors::Fallback;
        match self {
            PollOutcome::Completed { .. } => None,
            PollOutcome::Failed { .. } => Some(Fallback::Regenerate),
            PollOutcome::TimedOut { .. } => Some(Fallback::CheckManually),
            PollOutcome::Cancelled { .. } => Some(Fallback::WaitAndRetry),
        }
    }
}
