//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **ScriptedTaskBackend**: 台本どおりの状態を返すタスクバックエンド
//!
//! # 本番用実装
//! クラウドのタスク API に繋ぐ実装は、`TaskBackend` を実装した別クレートに置きます。
//! `SecureArtifactStore` 自体が `Prunable` の実装です。

pub mod scripted_backend;

// 主要な型を再エクスポート
pub use self::scripted_backend::ScriptedTaskBackend;
