//! App - アプリケーション層
//!
//! このモジュールは、ports / store / limiter を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Poller**: 外部タスクの完了待ち（指数バックオフ + キャンセル）
//! - **TaskGateway**: レートリミット付きの投入 + ポーリング
//! - **RetentionScheduler**: 期限切れ artifact の定期削除
//! - **RetentionStatus**: リテンションループの状態

pub mod builder;
pub mod poller;
pub mod retention_loop;
pub mod status;
pub mod submit;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::poller::{PollPolicy, Poller};
pub use self::retention_loop::RetentionScheduler;
pub use self::status::RetentionStatus;
pub use self::submit::{SubmitError, TaskGateway};
