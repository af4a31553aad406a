//! IdGenerator port - ID 生成の抽象化
//!
//! Artifact の handle とファイル名のサフィックスは同じ ULID から作ります。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::ArtifactId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は推測困難で一意な ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（store から並行に呼ばれる）
pub trait IdGenerator: Send + Sync {
    fn generate_artifact_id(&self) -> ArtifactId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// timestamp 部分は Clock から取るので、FixedClock を使うと
/// 生成時刻が決定的になります。ランダム部分は `rand` から。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_artifact_id(&self) -> ArtifactId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        ArtifactId::from(ulid)
    }
}
