//! Engine events, delivered to an `EventSink`.

use serde::Serialize;

use super::outcome::OutcomeKind;
use super::state::EngineState;

/// Why the producer stopped pulling from the item source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStop {
    Exhausted,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An item was pulled from the source and wrapped into an envelope.
    Pulled { index: u64 },
    /// A worker claimed the envelope and handed it to the executor.
    Dispatched { index: u64, worker: usize },
    Completed {
        index: u64,
        worker: usize,
        kind: OutcomeKind,
    },
    StateChanged { from: EngineState, to: EngineState },
    SourceStopped { pulled: u64, reason: SourceStop },
}
