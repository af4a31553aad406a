//! Prunable port - リテンションループが依存する面
//!
//! RetentionScheduler は store 全体ではなく、この trait だけを見ます。
//! 失敗するバックエンドを差し込んでバックオフを検証できます。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::StorageError;

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Registered artifacts examined.
    pub scanned: usize,
    /// Artifacts deleted.
    pub deleted: usize,
    /// Orphan files (not in the registry) wiped from the storage directory.
    pub orphans: usize,
}

/// Stores that can drop data past a retention horizon.
///
/// Both methods are blocking; the retention loop runs them on the blocking pool.
pub trait Prunable: Send + Sync {
    /// Delete every artifact whose last access is older than `horizon`.
    fn purge_expired(&self, horizon: Duration) -> Result<SweepReport, StorageError>;

    /// Delete everything, regardless of age.
    fn purge_all(&self) -> Result<SweepReport, StorageError>;
}
