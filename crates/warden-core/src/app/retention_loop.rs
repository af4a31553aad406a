//! RetentionScheduler - 期限切れ artifact の定期削除
//!
//! # フロー
//! 1. `interval` 待つ（shutdown と select で競合）
//! 2. `Prunable::purge_expired(horizon)` を spawn_blocking で実行
//! 3. 成功: 失敗カウンタをリセット / 失敗: `min(interval * 2^failures, max_backoff)` 待つ
//!
//! sweep は同時に 1 つだけ（guard を取れなければスキップ）。
//! 失敗してもループは止まらず、プロセスを落としません。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::status::RetentionStatus;
use crate::config::RetentionConfig;
use crate::domain::{Backoff, StorageError};
use crate::ports::{Prunable, SweepReport};

/// Wait curve between scheduled sweeps: doubles per consecutive failure.
pub(crate) fn sweep_backoff(config: &RetentionConfig) -> Backoff {
    Backoff::new(config.interval, 2.0, config.max_backoff)
}

/// Shared between the loop and on-demand callers.
struct Sweeper {
    store: Arc<dyn Prunable>,
    horizon: Duration,
    guard: Mutex<()>,
    status: watch::Sender<RetentionStatus>,
}

impl Sweeper {
    /// One expiry sweep; `None` if another sweep is already running.
    async fn sweep(&self) -> Option<Result<SweepReport, StorageError>> {
        let Ok(_guard) = self.guard.try_lock() else {
            debug!("sweep already running, skipping");
            self.status.send_modify(|s| s.skipped += 1);
            return None;
        };

        let store = self.store.clone();
        let horizon = self.horizon;
        let result = run_blocking(move || store.purge_expired(horizon)).await;
        self.record(&result);
        Some(result)
    }

    /// Delete everything; waits for a running sweep to finish first.
    async fn purge_all(&self) -> Result<SweepReport, StorageError> {
        let _guard = self.guard.lock().await;
        let store = self.store.clone();
        let result = run_blocking(move || store.purge_all()).await;
        self.record(&result);
        result
    }

    fn record(&self, result: &Result<SweepReport, StorageError>) {
        self.status.send_modify(|s| {
            s.runs += 1;
            match result {
                Ok(report) => {
                    s.consecutive_failures = 0;
                    s.last_report = Some(report.clone());
                    s.last_error = None;
                }
                Err(e) => {
                    s.consecutive_failures = s.consecutive_failures.saturating_add(1);
                    s.last_error = Some(e.to_string());
                }
            }
        });
    }

    fn consecutive_failures(&self) -> u32 {
        self.status.borrow().consecutive_failures
    }
}

async fn run_blocking<F>(f: F) -> Result<SweepReport, StorageError>
where
    F: FnOnce() -> Result<SweepReport, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(StorageError::Aborted(e.to_string())))
}

/// Handle to the background retention loop.
///
/// - `request_shutdown()` で次の待機から抜ける
/// - `shutdown_and_purge()` は停止後に全 artifact を削除する
pub struct RetentionScheduler {
    sweeper: Arc<Sweeper>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RetentionScheduler {
    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(store: Arc<dyn Prunable>, config: RetentionConfig) -> Self {
        let backoff = sweep_backoff(&config);
        let (status, _) = watch::channel(RetentionStatus {
            next_delay: backoff.delay(0),
            ..RetentionStatus::default()
        });
        let sweeper = Arc::new(Sweeper {
            store,
            horizon: config.horizon,
            guard: Mutex::new(()),
            status,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = config.interval.as_secs_f64(),
            horizon_secs = config.horizon.as_secs_f64(),
            "retention scheduler started"
        );
        let join = tokio::spawn(retention_loop(sweeper.clone(), backoff, shutdown_rx));

        Self {
            sweeper,
            shutdown_tx,
            join,
        }
    }

    pub fn status(&self) -> RetentionStatus {
        self.sweeper.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RetentionStatus> {
        self.sweeper.status.subscribe()
    }

    /// Run an expiry sweep now. Returns `None` if a sweep is already executing.
    pub async fn sweep_now(&self) -> Option<Result<SweepReport, StorageError>> {
        self.sweeper.sweep().await
    }

    /// Delete every registered artifact, regardless of age.
    pub async fn purge_now(&self) -> Result<SweepReport, StorageError> {
        self.sweeper.purge_all().await
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            error!(error = %e, "retention loop ended abnormally");
        }
    }

    /// Stop the loop, then purge everything.
    pub async fn shutdown_and_purge(self) -> Result<SweepReport, StorageError> {
        let sweeper = self.sweeper.clone();
        self.shutdown_and_join().await;
        let result = sweeper.purge_all().await;
        match &result {
            Ok(report) => info!(
                deleted = report.deleted,
                orphans = report.orphans,
                "purged store at shutdown"
            ),
            Err(e) => warn!(error = %e, "purge at shutdown incomplete"),
        }
        result
    }
}

async fn retention_loop(
    sweeper: Arc<Sweeper>,
    backoff: Backoff,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let failures = sweeper.consecutive_failures();
        let delay = backoff.delay(failures);
        sweeper.status.send_modify(|s| s.next_delay = delay);
        if failures > 0 {
            warn!(
                failures,
                delay_secs = delay.as_secs_f64(),
                "retention sweep failing, backing off"
            );
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(delay) => {}
        }
        if *shutdown_rx.borrow() || shutdown_rx.has_changed().is_err() {
            break;
        }

        match sweeper.sweep().await {
            Some(Ok(report)) => debug!(
                deleted = report.deleted,
                scanned = report.scanned,
                "scheduled sweep done"
            ),
            Some(Err(e)) => error!(error = %e, "scheduled sweep failed"),
            None => {}
        }
    }
    info!("retention scheduler stopped");
}
