//! Ports - 抽象化レイヤー
//!
//! 外部システム（時計、ID、長時間タスク API、進捗表示、ストレージ掃除）への
//! インターフェースを trait として定義し、実装の詳細を隠蔽します。

pub mod clock;
pub mod id_generator;
pub mod progress_sink;
pub mod retention;
pub mod task_backend;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::progress_sink::{NoopProgressSink, ProgressSink, WatchProgressSink};
pub use self::retention::{Prunable, SweepReport};
pub use self::task_backend::{BackendError, StatusSource, TaskBackend, TaskSubmitter};
