//! TaskGateway - レートリミット付きのタスク投入 + ポーリング

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::poller::Poller;
use crate::domain::{ErrorKind, Fallback, PollOutcome, PollTarget, TaskHandle};
use crate::limiter::SlidingWindowLimiter;
use crate::ports::{BackendError, TaskSubmitter};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The limiter refused; the backend was not contacted.
    #[error("task submission rate limit reached, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::RateLimited { .. } => ErrorKind::RateLimited,
            SubmitError::Backend(_) => ErrorKind::External,
        }
    }

    pub fn fallback(&self) -> Fallback {
        Fallback::WaitAndRetry
    }

    pub fn user_message(&self) -> String {
        match self {
            SubmitError::RateLimited { retry_after } => format!(
                "Task submission limit reached. Please wait {} minutes before submitting again.",
                retry_after.as_secs().div_ceil(60).max(1)
            ),
            SubmitError::Backend(_) => "Failed to submit task. Please try again later.".to_string(),
        }
    }
}

/// Submission gated by a limiter, followed by polling to a terminal state.
pub struct TaskGateway {
    submitter: Arc<dyn TaskSubmitter>,
    limiter: Arc<SlidingWindowLimiter>,
    poller: Poller,
}

impl TaskGateway {
    pub fn new(
        submitter: Arc<dyn TaskSubmitter>,
        limiter: Arc<SlidingWindowLimiter>,
        poller: Poller,
    ) -> Self {
        Self {
            submitter,
            limiter,
            poller,
        }
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub async fn submit(&self, request: &serde_json::Value) -> Result<TaskHandle, SubmitError> {
        if !self.limiter.is_allowed() {
            let retry_after = self.limiter.retry_after();
            warn!(
                category = %self.limiter.category(),
                retry_after_secs = retry_after.as_secs(),
                "submission refused by rate limiter"
            );
            return Err(SubmitError::RateLimited { retry_after });
        }
        let task = self.submitter.submit(request).await?;
        info!(%task, category = %self.limiter.category(), "task submitted");
        Ok(task)
    }

    pub async fn submit_and_wait(
        &self,
        request: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(TaskHandle, PollOutcome), SubmitError> {
        self.submit_and_wait_for(request, &PollTarget::default(), cancel).await
    }

    pub async fn submit_and_wait_for(
        &self,
        request: &serde_json::Value,
        target: &PollTarget,
        cancel: &CancellationToken,
    ) -> Result<(TaskHandle, PollOutcome), SubmitError> {
        let task = self.submit(request).await?;
        let outcome = self.poller.wait_for(&task, target, cancel).await;
        Ok((task, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::poller::PollPolicy;
    use crate::config::LimitConfig;
    use crate::domain::{OperationCategory, TaskStatus};
    use crate::impls::ScriptedTaskBackend;
    use crate::ports::FixedClock;
    use chrono::Utc;

    fn gateway(capacity: u32) -> (TaskGateway, Arc<ScriptedTaskBackend>) {
        let backend = Arc::new(
            ScriptedTaskBackend::new().on_submit([TaskStatus::Queued, TaskStatus::Completed]),
        );
        let clock = FixedClock::new(Utc::now());
        let limiter = Arc::new(SlidingWindowLimiter::new(
            OperationCategory::task_submit(),
            &LimitConfig::new(capacity, Duration::from_secs(3600)),
            Arc::new(clock),
        ));
        let poller = Poller::new(backend.clone(), PollPolicy::default());
        (TaskGateway::new(backend.clone(), limiter, poller), backend)
    }

    #[tokio::test(start_paused = true)]
    async fn submits_then_polls_to_completion() {
        let (gateway, backend) = gateway(5);
        let (task, outcome) = gateway
            .submit_and_wait(&serde_json::json!({ "circuit": "bell" }), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Completed { attempts: 2 });
        assert_eq!(backend.polls(&task), 2);
        assert_eq!(gateway.limiter().remaining(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_never_reaches_the_backend() {
        let (gateway, backend) = gateway(1);
        let request = serde_json::json!({});
        gateway.submit(&request).await.unwrap();

        let err = gateway.submit(&request).await.unwrap_err();

        match &err {
            SubmitError::RateLimited { retry_after } => {
                assert_eq!(*retry_after, Duration::from_secs(3600))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(
            err.user_message(),
            "Task submission limit reached. Please wait 60 minutes before submitting again."
        );
        assert_eq!(backend.submissions().len(), 1);
    }

    #[tokio::test]
    async fn zero_capacity_gateway_refuses_every_submission() {
        let (gateway, backend) = gateway(0);

        let err = gateway.submit(&serde_json::json!({})).await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::RateLimited { retry_after } if retry_after == Duration::from_secs(3600)
        ));
        assert!(backend.submissions().is_empty());
    }
}
