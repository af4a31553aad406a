//! warden-core
//!
//! Guard rails for workflows that handle untrusted uploads and call
//! rate-limited external services.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, artifact, poll, quota, backoff, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, StatusSource, TaskSubmitter, ProgressSink, Prunable）
//! - **store**: SecureArtifactStore（検証済み artifact の保存・整合性確認・削除）
//! - **limiter**: SlidingWindowLimiter / QuotaBoard
//! - **app**: アプリケーションロジック（builder, poller, retention_loop, submit, status）
//! - **impls**: 実装（ScriptedTaskBackend など開発用）
//! - **validation**: digest と入力検証
//! - **config**: 設定ファイル
//! - **observability**: tracing の初期化
//! - **error**: crate 全体のエラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod limiter;
pub mod observability;
pub mod ports;
pub mod store;
pub mod validation;

pub use app::{App, AppBuilder};
pub use config::AppConfig;
pub use error::WardenError;
pub use store::SecureArtifactStore;
