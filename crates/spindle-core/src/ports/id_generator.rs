//! IdGenerator port - RunId の生成

use ulid::Ulid;

use crate::domain::RunId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;
}

/// Clock を使って現在時刻ベースの ULID を生成する。
/// FixedClock を渡せば timestamp 部分が決定的になる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        RunId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
