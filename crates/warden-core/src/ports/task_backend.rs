//! TaskBackend port - 外部の長時間タスク API
//!
//! Poller は `StatusSource` だけに依存します。投入（submit）は
//! `TaskSubmitter` に分けて、レートリミットで保護します。
//! wire format は実装側（クラウド SDK など）の責務です。

use async_trait::async_trait;

use crate::domain::{TaskHandle, TaskStatus};

/// Failure talking to the external task system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("task {0} is unknown to the backend")]
    UnknownTask(TaskHandle),

    #[error("backend request failed: {0}")]
    Request(String),
}

/// External "get status" capability.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn get_status(&self, task: &TaskHandle) -> Result<TaskStatus, BackendError>;
}

/// External "submit task" capability.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    /// Submit a task described by an opaque JSON request.
    async fn submit(&self, request: &serde_json::Value) -> Result<TaskHandle, BackendError>;
}

/// Backend exposing both halves of the task contract.
pub trait TaskBackend: StatusSource + TaskSubmitter {}

impl<T: StatusSource + TaskSubmitter> TaskBackend for T {}
