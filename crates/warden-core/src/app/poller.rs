//! Poller - 外部の長時間タスクを完了まで待つ
//!
//! # フロー
//! 1. `StatusSource::get_status` で状態を問い合わせる（1 回 = 1 attempt）
//! 2. `PollTarget` で分類: desired → Completed / failure → Failed
//! 3. それ以外は backoff 分だけ待って再問い合わせ
//! 4. `max_attempts` 回問い合わせても終わらなければ TimedOut
//!
//! 待機は `CancellationToken` と競合させるので、キャンセルは次の待機で即座に効きます。
//! 問い合わせ自体の失敗は終端扱いにせず、ログに残して次のサイクルへ進みます。

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{
    Backoff, Observation, PollOutcome, PollPhase, PollProgress, PollState, PollTarget, TaskHandle,
};
use crate::ports::{NoopProgressSink, ProgressSink, StatusSource};

/// Attempt budget and wait curve for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub backoff: Backoff,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    /// 10s, 15s, 22.5s ... capped at 120s; 60 status queries.
    fn default() -> Self {
        Self {
            backoff: Backoff::new(Duration::from_secs(10), 1.5, Duration::from_secs(120)),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    /// Waiting for cloud resources to be provisioned: short waits, smaller budget.
    pub fn provisioning() -> Self {
        Self {
            backoff: Backoff::new(Duration::from_secs(2), 1.5, Duration::from_secs(30)),
            max_attempts: 30,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wait after the `attempt`-th status query (1-based).
    pub fn wait_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt.saturating_sub(1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("poll.max_attempts must be at least 1".into());
        }
        if !(self.backoff.multiplier.is_finite() && self.backoff.multiplier >= 1.0) {
            return Err("poll.backoff.multiplier must be >= 1".into());
        }
        if self.backoff.ceiling < self.backoff.base {
            return Err("poll.backoff.ceiling must be >= poll.backoff.base".into());
        }
        Ok(())
    }
}

pub struct Poller {
    source: Arc<dyn StatusSource>,
    policy: PollPolicy,
    sink: Arc<dyn ProgressSink>,
}

impl Poller {
    pub fn new(source: Arc<dyn StatusSource>, policy: PollPolicy) -> Self {
        Self {
            source,
            policy,
            sink: Arc::new(NoopProgressSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll until `COMPLETED`, treating `FAILED` and `CANCELLED` as failure.
    pub async fn wait_until_complete(
        &self,
        task: &TaskHandle,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        self.wait_for(task, &PollTarget::default(), cancel).await
    }

    pub async fn wait_for(
        &self,
        task: &TaskHandle,
        target: &PollTarget,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let max_attempts = self.policy.max_attempts;
        let mut state = PollState::submitted(task.clone());
        self.report(&state);

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return self.finish(&mut state, PollOutcome::Cancelled { attempts: attempt - 1 });
            }

            state.phase = PollPhase::Polling;
            state.attempt = attempt;
            state.next_wait = None;

            let observed = match self.source.get_status(task).await {
                Ok(status) => {
                    info!(%task, attempt, max_attempts, %status, "task status");
                    Some(status)
                }
                Err(e) => {
                    warn!(%task, attempt, max_attempts, error = %e, "status query failed");
                    None
                }
            };

            if let Some(status) = observed {
                let observation = target.classify(&status);
                state.status = Some(status.clone());
                match observation {
                    Observation::Succeeded => {
                        let outcome = PollOutcome::Completed { attempts: attempt };
                        return self.finish(&mut state, outcome);
                    }
                    Observation::Failed => {
                        let outcome = PollOutcome::Failed { attempts: attempt, status };
                        return self.finish(&mut state, outcome);
                    }
                    Observation::Pending => {}
                }
            }

            if attempt == max_attempts {
                break;
            }

            let wait = self.policy.wait_after(attempt);
            state.next_wait = Some(wait);
            self.report(&state);
            debug!(
                %task,
                attempt,
                wait_secs = wait.as_secs_f64(),
                "waiting before next status query"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return self.finish(&mut state, PollOutcome::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let outcome = PollOutcome::TimedOut {
            attempts: state.attempt,
            last_status: state.status.clone(),
        };
        self.finish(&mut state, outcome)
    }

    fn finish(&self, state: &mut PollState, outcome: PollOutcome) -> PollOutcome {
        state.phase = outcome.phase();
        state.next_wait = None;
        self.report(state);
        match &outcome {
            PollOutcome::Completed { attempts } => {
                info!(task = %state.task, attempts, "task completed")
            }
            other => warn!(
                task = %state.task,
                attempts = other.attempts(),
                phase = ?other.phase(),
                "task did not complete"
            ),
        }
        outcome
    }

    fn report(&self, state: &PollState) {
        self.sink.report(&PollProgress::from_state(state, self.policy.max_attempts));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use crate::impls::ScriptedTaskBackend;
    use crate::ports::BackendError;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    fn running_then_completed(running: usize) -> Vec<TaskStatus> {
        let mut steps = vec![TaskStatus::Running; running];
        steps.push(TaskStatus::Completed);
        steps
    }

    fn poller(backend: &Arc<ScriptedTaskBackend>, policy: PollPolicy) -> Poller {
        Poller::new(backend.clone(), policy)
    }

    #[test]
    fn waits_follow_the_backoff_curve() {
        let policy = PollPolicy::default();
        assert_eq!(policy.wait_after(1), Duration::from_secs(10));
        assert_eq!(policy.wait_after(2), Duration::from_secs(15));
        assert_eq!(policy.wait_after(3), Duration::from_millis(22_500));
        assert_eq!(policy.wait_after(60), Duration::from_secs(120));
    }

    #[test]
    fn invalid_policies_fail_validation() {
        assert!(PollPolicy::default().validate().is_ok());
        assert!(PollPolicy::provisioning().validate().is_ok());
        assert!(PollPolicy::default().with_max_attempts(0).validate().is_err());

        let mut shrinking = PollPolicy::default();
        shrinking.backoff.multiplier = 0.5;
        assert!(shrinking.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_exactly_six_polls() {
        let backend = Arc::new(ScriptedTaskBackend::new());
        let task = backend.script("job-1", running_then_completed(5));
        let started = Instant::now();

        let outcome = poller(&backend, PollPolicy::default())
            .wait_until_complete(&task, &CancellationToken::new())
            .await;

        assert_eq!(outcome, PollOutcome::Completed { attempts: 6 });
        assert_eq!(backend.polls(&task), 6);
        // 10 + 15 + 22.5 + 33.75 + 50.625
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(131_875));
        assert!(waited < Duration::from_secs(132));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_max_attempts() {
        let backend = Arc::new(ScriptedTaskBackend::new());
        let task = backend.script("job-1", [TaskStatus::Running]);

        let outcome = poller(&backend, PollPolicy::default().with_max_attempts(5))
            .wait_until_complete(&task, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                attempts: 5,
                last_status: Some(TaskStatus::Running)
            }
        );
        assert_eq!(backend.polls(&task), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_status_is_terminal() {
        let backend = Arc::new(ScriptedTaskBackend::new());
        let task = backend.script(
            "job-1",
            [TaskStatus::Queued, TaskStatus::Running, TaskStatus::Failed],
        );

        let outcome = poller(&backend, PollPolicy::default())
            .wait_until_complete(&task, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                attempts: 3,
                status: TaskStatus::Failed
            }
        );
        assert!(!outcome.is_success());
        assert_eq!(backend.polls(&task), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn query_errors_count_as_attempts() {
        let backend = Arc::new(ScriptedTaskBackend::new());
        let task = backend.script_steps(
            "job-1",
            vec![
                Err(BackendError::Request("connection reset".into())),
                Err(BackendError::Request("connection reset".into())),
                Ok(TaskStatus::Completed),
            ],
        );

        let outcome = poller(&backend, PollPolicy::default())
            .wait_until_complete(&task, &CancellationToken::new())
            .await;

        assert_eq!(outcome, PollOutcome::Completed { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let backend = Arc::new(ScriptedTaskBackend::new());
        let task = backend.script("job-1", [TaskStatus::Running]);
        let cancel = CancellationToken::new();
        let poller = poller(&backend, PollPolicy::default());

        let handle = {
            let cancel = cancel.clone();
            let task = task.clone();
            tokio::spawn(async move { poller.wait_until_complete(&task, &cancel).await })
        };

        // first wait is 10s; cancel in the middle of it
        tokio::time::sleep(Duration::from_secs(3)).await;
        let before = Instant::now();
        cancel.cancel();
        let outcome = handle.await.unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });
        assert!(before.elapsed() < Duration::from_secs(1));
        assert_eq!(backend.polls(&task), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_skips_polling() {
        let backend = Arc::new(ScriptedTaskBackend::new());
        let task = backend.script("job-1", [TaskStatus::Running]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = poller(&backend, PollPolicy::default())
            .wait_until_complete(&task, &cancel)
            .await;

        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 0 });
        assert_eq!(backend.polls(&task), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_reported_every_cycle() {
        let backend = Arc::new(ScriptedTaskBackend::new());
        let task = backend.script("job-1", running_then_completed(2));
        let seen: Arc<Mutex<Vec<PollProgress>>> = Arc::default();
        let sink = {
            let seen = seen.clone();
            move |p: &PollProgress| seen.lock().push(p.clone())
        };

        poller(&backend, PollPolicy::default())
            .with_sink(Arc::new(sink))
            .wait_until_complete(&task, &CancellationToken::new())
            .await;

        let seen = seen.lock();
        let phases: Vec<_> = seen.iter().map(|p| (p.phase, p.attempt)).collect();
        assert_eq!(
            phases,
            vec![
                (PollPhase::Submitted, 0),
                (PollPhase::Polling, 1),
                (PollPhase::Polling, 2),
                (PollPhase::Completed, 3),
            ]
        );
        assert_eq!(seen[1].next_wait_secs, Some(10.0));
        assert_eq!(seen[2].next_wait_secs, Some(15.0));
        assert_eq!(seen[3].status, Some(TaskStatus::Completed));
        assert!(seen.iter().all(|p| p.max_attempts == 60));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_target_for_provisioning_waits() {
        let backend = Arc::new(ScriptedTaskBackend::new());
        let task = backend.script(
            "bucket-1",
            [TaskStatus::parse("PENDING"), TaskStatus::parse("DELETED")],
        );
        let target = PollTarget::reach(TaskStatus::parse("ACTIVE"))
            .with_failure(TaskStatus::parse("DELETED"));

        let outcome = poller(&backend, PollPolicy::provisioning())
            .wait_for(&task, &target, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                attempts: 2,
                status: TaskStatus::Other("DELETED".into())
            }
        );
    }
}
