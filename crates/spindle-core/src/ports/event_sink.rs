//! EventSink port - イベント記録の抽象化
//!
//! Called synchronously from the producer, workers and driver; keep
//! implementations cheap and non-blocking.

use crate::domain::EngineEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}
