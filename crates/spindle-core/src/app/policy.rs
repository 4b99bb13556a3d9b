//! Error Policy Enforcer.
//!
//! The policy itself is a pure decision (failure -> verdict); the enforcer
//! applies the side effect (tripping the controller).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cancel::{CancellationController, StopReason};
use crate::domain::{Outcome, TaskFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    #[default]
    ContinueOnError,
    HaltOnError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Halt,
}

impl ErrorPolicy {
    pub fn decide(self, _failure: &TaskFailure) -> Verdict {
        match self {
            ErrorPolicy::ContinueOnError => Verdict::Proceed,
            ErrorPolicy::HaltOnError => Verdict::Halt,
        }
    }
}

/// Applies the policy on each worker's completion path, before that worker
/// may claim another envelope.
pub(crate) struct PolicyEnforcer {
    policy: ErrorPolicy,
    controller: CancellationController,
}

impl PolicyEnforcer {
    pub(crate) fn new(policy: ErrorPolicy, controller: CancellationController) -> Self {
        Self {
            policy,
            controller,
        }
    }

    pub(crate) fn observe<R>(&self, outcome: &Outcome<R>) -> Verdict {
        let Some(failure) = outcome.failure() else {
            return Verdict::Proceed;
        };

        // cancellations caused by an earlier stop are expected fallout
        if matches!(failure, TaskFailure::Cancelled { .. }) && self.controller.is_tripped() {
            debug!(index = outcome.index, "task cancelled during drain");
            return Verdict::Proceed;
        }

        match self.policy.decide(failure) {
            Verdict::Proceed => {
                warn!(index = outcome.index, %failure, "task failed; continuing");
                Verdict::Proceed
            }
            Verdict::Halt => {
                let first = self.controller.trip(StopReason::FailureObserved {
                    index: outcome.index,
                    failure: failure.clone(),
                });
                if first {
                    warn!(index = outcome.index, %failure, "task failed; halting run");
                } else {
                    debug!(index = outcome.index, %failure, "task failed while draining");
                }
                Verdict::Halt
            }
        }
    }
}
