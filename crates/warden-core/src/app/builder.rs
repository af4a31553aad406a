//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 設定、ストレージ、tokio ランタイムを build() で確認
//! - グローバル状態なし: registry もリミッタも App が所有する

use std::path::Path;
use std::sync::Arc;

use crate::app::poller::{PollPolicy, Poller};
use crate::app::retention_loop::RetentionScheduler;
use crate::app::submit::TaskGateway;
use crate::config::{AppConfig, ConfigError};
use crate::domain::{ArtifactInfo, OperationCategory, StorageError};
use crate::error::WardenError;
use crate::limiter::QuotaBoard;
use crate::ports::{
    Clock, ProgressSink, StatusSource, SweepReport, SystemClock, TaskBackend, TaskSubmitter,
    UlidGenerator,
};
use crate::store::SecureArtifactStore;
use crate::validation;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(AppConfig::from_file(path)?)
///     .with_backend(Arc::new(backend))
///     .build()?;
/// ```
pub struct AppBuilder {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    status_source: Option<Arc<dyn StatusSource>>,
    submitter: Option<Arc<dyn TaskSubmitter>>,
    sink: Option<Arc<dyn ProgressSink>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open artifact store: {0}")]
    Store(#[from] StorageError),

    #[error("a task backend is configured but no limit exists for category {0}")]
    MissingLimit(OperationCategory),

    #[error("build() must run inside a tokio runtime (the retention scheduler is spawned)")]
    NoRuntime,
}

impl AppBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            status_source: None,
            submitter: None,
            sink: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// External task system used by the gateway.
    pub fn with_backend<B: TaskBackend + 'static>(mut self, backend: Arc<B>) -> Self {
        self.status_source = Some(backend.clone());
        self.submitter = Some(backend);
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// # 検証
    /// - config.validate()
    /// - backend があるなら task_submit の limit が必要
    /// - tokio ランタイム上で呼ばれているか
    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let submit_category = OperationCategory::task_submit();
        if self.submitter.is_some() && !self.config.limits.contains_key(&submit_category) {
            return Err(BuildError::MissingLimit(submit_category));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BuildError::NoRuntime);
        }

        let ids = Arc::new(UlidGenerator::new(self.clock.clone()));
        let store = Arc::new(SecureArtifactStore::new(
            self.config.store.clone(),
            self.clock.clone(),
            ids,
        )?);
        let quotas = QuotaBoard::from_config(&self.config.limits, self.clock.clone());

        let gateway = match (self.status_source, self.submitter, quotas.limiter(&submit_category)) {
            (Some(source), Some(submitter), Some(limiter)) => {
                let mut poller = Poller::new(source, self.config.poll);
                if let Some(sink) = &self.sink {
                    poller = poller.with_sink(sink.clone());
                }
                Some(TaskGateway::new(submitter, limiter, poller))
            }
            _ => None,
        };

        let retention = RetentionScheduler::spawn(store.clone(), self.config.retention.clone());

        Ok(App {
            config: self.config,
            store,
            quotas,
            retention,
            gateway,
        })
    }
}

/// App はアプリケーションのランタイム
pub struct App {
    config: AppConfig,
    store: Arc<SecureArtifactStore>,
    quotas: QuotaBoard,
    retention: RetentionScheduler,
    gateway: Option<TaskGateway>,
}

impl App {
    /// Load `path` (or defaults) and build without a task backend.
    pub fn from_config_file(path: Option<&Path>) -> Result<Self, WardenError> {
        let config = AppConfig::load(path)?;
        Ok(AppBuilder::new(config).build()?)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SecureArtifactStore> {
        &self.store
    }

    pub fn quotas(&self) -> &QuotaBoard {
        &self.quotas
    }

    pub fn retention(&self) -> &RetentionScheduler {
        &self.retention
    }

    pub fn gateway(&self) -> Option<&TaskGateway> {
        self.gateway.as_ref()
    }

    /// A poller over `source` using the configured policy.
    pub fn poller(&self, source: Arc<dyn StatusSource>) -> Poller {
        Poller::new(source, self.config.poll)
    }

    pub fn provisioning_poller(&self, source: Arc<dyn StatusSource>) -> Poller {
        Poller::new(source, PollPolicy::provisioning())
    }

    /// Validate, store and verify an upload; returns its metadata.
    pub fn ingest(&self, raw: &[u8]) -> Result<ArtifactInfo, WardenError> {
        let id = self.store.validate_and_store(raw)?;
        self.store.check_integrity(id)?;
        self.store.info(id).ok_or(WardenError::Vanished(id))
    }

    /// Free text cleaned for an external request, using the configured length cap.
    pub fn sanitize(&self, text: &str) -> String {
        validation::sanitize_text_input(text, self.config.max_text_len)
    }

    /// Stop the retention loop and purge every artifact.
    pub async fn shutdown(self) -> Result<SweepReport, StorageError> {
        self.retention.shutdown_and_purge().await
    }
}
