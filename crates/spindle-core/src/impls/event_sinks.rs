//! EventSink implementations.

use std::sync::{Mutex, PoisonError};

use crate::domain::EngineEvent;
use crate::ports::EventSink;

/// Discards every event. The engine default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Indices in the order workers claimed them.
    pub fn dispatched(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Dispatched { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn pulled_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, EngineEvent::Pulled { .. }))
            .count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.emit(EngineEvent::Pulled { index: 0 });
        sink.emit(EngineEvent::Dispatched { index: 0, worker: 2 });
        sink.emit(EngineEvent::Pulled { index: 1 });

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.dispatched(), vec![0]);
        assert_eq!(sink.pulled_count(), 2);
    }
}
