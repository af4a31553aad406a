//! ProgressSink port - ポーリング進捗の通知
//!
//! UI やサービス層はこれを実装して、毎サイクルの状態を表示します。
//!
//! # 実装
//! - NoopProgressSink: 何もしない
//! - クロージャ: `Fn(&PollProgress)` をそのまま sink として使える
//! - WatchProgressSink: 最新の進捗だけを `watch` で配信

use tokio::sync::watch;

use crate::domain::PollProgress;

/// Receives a progress report on every poll cycle.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &PollProgress);
}

pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn report(&self, _progress: &PollProgress) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&PollProgress) + Send + Sync,
{
    fn report(&self, progress: &PollProgress) {
        self(progress)
    }
}

/// Publishes the latest progress on a `watch` channel.
pub struct WatchProgressSink {
    tx: watch::Sender<Option<PollProgress>>,
}

impl WatchProgressSink {
    pub fn channel() -> (Self, watch::Receiver<Option<PollProgress>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchProgressSink {
    fn report(&self, progress: &PollProgress) {
        // receivers may already be dropped
        let _ = self.tx.send(Some(progress.clone()));
    }
}
