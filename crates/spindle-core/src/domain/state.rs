//! Engine state machine and run termination status.

use serde::{Deserialize, Serialize};

/// Lifecycle of one run.
///
/// State transitions:
/// - Running -> Completed (everything dispatched and collected, no stop)
/// - Running -> Draining -> Halted (halt-on-error, interrupt, or source failure)
///
/// Draining: nothing new is dispatched; in-flight work finishes or is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Running,
    Draining,
    Halted,
    Completed,
}

impl EngineState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::Halted | EngineState::Completed)
    }

    pub fn can_transition_to(self, next: EngineState) -> bool {
        matches!(
            (self, next),
            (EngineState::Running, EngineState::Draining)
                | (EngineState::Running, EngineState::Completed)
                | (EngineState::Draining, EngineState::Halted)
        )
    }
}

/// How a run ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStatus {
    /// All items processed, no failures.
    Completed,
    /// Continue-on-error run with at least one failure.
    CompletedWithFailures,
    /// Halt-on-error fired, or the item source failed.
    Halted,
    /// External interrupt.
    Cancelled,
}

impl TerminationStatus {
    pub fn is_success(self) -> bool {
        matches!(self, TerminationStatus::Completed)
    }
}
