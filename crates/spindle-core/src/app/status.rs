//! Status - 実行結果のレポート
//!
//! A `RunReport` explains how a run ended: the termination status, the
//! counters, what stopped it, and what was pulled but never attempted.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::cancel::StopReason;
use crate::domain::{EngineState, FailureSummary, RunId, TerminationStatus, millis};
use crate::error::{EngineError, SourceError};
use crate::observability::RunCounts;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: TerminationStatus,
    pub state: EngineState,
    pub counts: RunCounts,

    /// First trip of the cancellation controller, if any.
    pub stop_reason: Option<StopReason>,

    /// The failure that halted a halt-on-error run.
    pub first_failure: Option<FailureSummary>,

    /// Set when the item source itself failed.
    pub source_error: Option<SourceError>,

    /// Indices pulled from the source but never handed to a worker.
    pub never_dispatched: Vec<u64>,

    /// Completed outcomes left out of ordered output after a halt.
    pub withheld: Vec<u64>,

    /// Outcomes dropped because the consumer went away.
    pub discarded: u64,

    pub source_exhausted: bool,

    #[serde(rename = "elapsed_ms", with = "millis")]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a source fault into an error; everything else stays a report.
    pub fn into_result(self) -> Result<RunReport, EngineError> {
        match self.source_error {
            Some(source) => Err(EngineError::SourceFailed {
                pulled: self.counts.pulled,
                source,
            }),
            None => Ok(self),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?}: {} pulled, {} dispatched, {} succeeded, {} failed in {}ms",
            self.run_id,
            self.status,
            self.counts.pulled,
            self.counts.dispatched,
            self.counts.succeeded,
            self.counts.failures(),
            self.elapsed.as_millis()
        )?;
        if let Some(first) = &self.first_failure {
            write!(f, "; halted by {first}")?;
        }
        if let Some(err) = &self.source_error {
            write!(f, "; {err}")?;
        }
        if !self.never_dispatched.is_empty() {
            write!(f, "; never dispatched: {:?}", self.never_dispatched)?;
        }
        Ok(())
    }
}

/// The first stop reason decides; a later interrupt does not override a halt.
/// Without one, failures decide.
pub(crate) fn termination_status(reason: Option<&StopReason>, counts: &RunCounts) -> TerminationStatus {
    match reason {
        Some(StopReason::Interrupted) => TerminationStatus::Cancelled,
        Some(StopReason::FailureObserved { .. } | StopReason::SourceFailed { .. }) => {
            TerminationStatus::Halted
        }
        None if counts.failures() > 0 => TerminationStatus::CompletedWithFailures,
        None => TerminationStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskFailure;
    use rstest::rstest;

    fn counts(failed: u64) -> RunCounts {
        RunCounts {
            failed,
            ..RunCounts::default()
        }
    }

    #[rstest]
    #[case(None, 0, TerminationStatus::Completed)]
    #[case(None, 2, TerminationStatus::CompletedWithFailures)]
    #[case(Some(StopReason::Interrupted), 0, TerminationStatus::Cancelled)]
    #[case(
        Some(StopReason::SourceFailed { message: "x".into() }),
        0,
        TerminationStatus::Halted
    )]
    #[case(
        Some(StopReason::FailureObserved {
            index: 1,
            failure: TaskFailure::Failed { reason: "x".into() },
        }),
        1,
        TerminationStatus::Halted
    )]
    fn status_derivation(
        #[case] reason: Option<StopReason>,
        #[case] failed: u64,
        #[case] expected: TerminationStatus,
    ) {
        assert_eq!(termination_status(reason.as_ref(), &counts(failed)), expected);
    }

    fn report() -> RunReport {
        RunReport {
            run_id: RunId::from(ulid::Ulid::nil()),
            status: TerminationStatus::Halted,
            state: EngineState::Halted,
            counts: counts(1),
            stop_reason: None,
            first_failure: Some(FailureSummary {
                index: 1,
                failure: TaskFailure::Failed {
                    reason: "bad".into(),
                },
            }),
            source_error: None,
            never_dispatched: vec![2, 3],
            withheld: Vec::new(),
            discarded: 0,
            source_exhausted: false,
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn display_names_trigger_and_leftovers() {
        let text = report().to_string();
        assert!(text.contains("halted by #1: task failed: bad"));
        assert!(text.contains("never dispatched: [2, 3]"));
    }

    #[test]
    fn source_fault_becomes_error() {
        let mut faulty = report();
        faulty.counts.pulled = 4;
        faulty.source_error = Some(SourceError::new("eof"));
        match faulty.into_result() {
            Err(EngineError::SourceFailed { pulled, .. }) => assert_eq!(pulled, 4),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(report().into_result().is_ok());
    }
}
