//! Outcome model: the terminal result of one dispatched envelope.
//!
//! Exactly one `Outcome` exists per dispatched envelope. Failures are data
//! here, not errors: a failing item never tears down the run by itself.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::millis;

/// Classification of an outcome.
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / FAILURE / TIMEOUT / CANCELLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
    Timeout,
    Cancelled,
}

impl OutcomeKind {
    pub fn is_failure(self) -> bool {
        !matches!(self, OutcomeKind::Success)
    }
}

/// Why an envelope did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskFailure {
    /// The unit of work reported an error.
    #[error("task failed: {reason}")]
    Failed { reason: String },

    /// The unit of work panicked. Counted as a failure.
    #[error("task panicked: {message}")]
    Panicked { message: String },

    /// The per-task deadline passed before the executor answered.
    #[error("timed out after {}ms", .after.as_millis())]
    Timeout {
        #[serde(rename = "after_ms", with = "millis")]
        after: Duration,
    },

    /// Stopped by a halt or an external interrupt.
    ///
    /// `acknowledged == false` means the engine stopped waiting without the
    /// execution confirming it stopped; the work may still be running.
    #[error("cancelled")]
    Cancelled { acknowledged: bool },
}

impl TaskFailure {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            TaskFailure::Failed { .. } | TaskFailure::Panicked { .. } => OutcomeKind::Failure,
            TaskFailure::Timeout { .. } => OutcomeKind::Timeout,
            TaskFailure::Cancelled { .. } => OutcomeKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<R> {
    pub index: u64,

    /// Worker slot that ran the envelope.
    pub worker: usize,

    pub started_at: DateTime<Utc>,

    #[serde(rename = "duration_ms", with = "millis")]
    pub duration: Duration,

    pub result: Result<R, TaskFailure>,
}

impl<R> Outcome<R> {
    pub fn kind(&self) -> OutcomeKind {
        match &self.result {
            Ok(_) => OutcomeKind::Success,
            Err(failure) => failure.kind(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&R> {
        self.result.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.result.as_ref().err()
    }

    pub fn into_value(self) -> Option<R> {
        self.result.ok()
    }

    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> Outcome<U> {
        Outcome {
            index: self.index,
            worker: self.worker,
            started_at: self.started_at,
            duration: self.duration,
            result: self.result.map(f),
        }
    }

    /// One-line description used in logs and CLI diagnostics.
    pub fn summary(&self) -> String {
        match &self.result {
            Ok(_) => format!("#{} ok in {}ms", self.index, self.duration.as_millis()),
            Err(failure) => format!("#{}: {}", self.index, failure),
        }
    }
}

/// A failure with the index it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub index: u64,
    pub failure: TaskFailure,
}

impl fmt::Display for FailureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {}", self.index, self.failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn outcome(result: Result<u32, TaskFailure>) -> Outcome<u32> {
        Outcome {
            index: 7,
            worker: 1,
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            duration: Duration::from_millis(12),
            result,
        }
    }

    #[test]
    fn outcome_kind_serializes_as_required_names() {
        let s = serde_json::to_string(&OutcomeKind::Success).unwrap();
        assert_eq!(s, "\"SUCCESS\"");

        let s = serde_json::to_string(&OutcomeKind::Timeout).unwrap();
        assert_eq!(s, "\"TIMEOUT\"");

        let s = serde_json::to_string(&OutcomeKind::Cancelled).unwrap();
        assert_eq!(s, "\"CANCELLED\"");
    }

    #[test]
    fn failure_is_tagged_with_kind() {
        let f = TaskFailure::Timeout {
            after: Duration::from_millis(500),
        };
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["kind"], "TIMEOUT");
        assert_eq!(v["after_ms"], 500);
        assert_eq!(f.to_string(), "timed out after 500ms");
    }

    #[test]
    fn kinds_follow_the_result() {
        assert_eq!(outcome(Ok(1)).kind(), OutcomeKind::Success);
        let panicked = outcome(Err(TaskFailure::Panicked {
            message: "boom".into(),
        }));
        assert_eq!(panicked.kind(), OutcomeKind::Failure);
        assert!(panicked.kind().is_failure());
        let cancelled = outcome(Err(TaskFailure::Cancelled {
            acknowledged: false,
        }));
        assert_eq!(cancelled.kind(), OutcomeKind::Cancelled);
    }

    #[test]
    fn summary_names_index_and_reason() {
        let o = outcome(Err(TaskFailure::Failed {
            reason: "bad input".into(),
        }));
        assert_eq!(o.summary(), "#7: task failed: bad input");
        assert_eq!(outcome(Ok(3)).summary(), "#7 ok in 12ms");
    }

    #[test]
    fn outcome_json_carries_duration_in_millis() {
        let v = serde_json::to_value(outcome(Ok(4)).map(|n| n * 2)).unwrap();
        assert_eq!(v["index"], 7);
        assert_eq!(v["duration_ms"], 12);
        assert_eq!(v["result"]["Ok"], 8);
    }
}
