//! IdGenerator port - ID 生成の抽象化
//!
//! Used when a submission omits `id`. テスト容易性のために trait として抽象化。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::JobId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は Job ID を生成
///
/// # ULID の特性
/// - 時刻でソート可能（生成順 ≒ 投入順）
/// - 複数プロセスから調整なしで生成可能
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        JobId::from_trusted(format!("job-{ulid}"))
    }
}
