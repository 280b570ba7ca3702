//! IdGenerator port - ID 生成の抽象化
//!
//! invocation ごとに新しい ID を発行します。テスト容易性のために trait として
//! 抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock から timestamp を取る）

use crate::domain::InvocationId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は invocation ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（merge loop タスクに move される）
pub trait IdGenerator: Send + Sync {
    fn generate_invocation_id(&self) -> InvocationId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// テスト時に FixedClock を使うと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_invocation_id(&self) -> InvocationId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        InvocationId::from(ulid)
    }
}
