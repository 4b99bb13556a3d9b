//! Cancellation Controller - run-wide stop signal.

use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::TaskFailure;

/// Why a run stopped dispatching. The first trip wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// External interrupt (Ctrl-C or `Run::cancel`).
    Interrupted,
    /// Halt-on-error saw its first failure.
    FailureObserved { index: u64, failure: TaskFailure },
    /// The item source failed.
    SourceFailed { message: String },
}

impl StopReason {
    /// Interrupts and halts cancel in-flight tasks; a source failure only
    /// stops new dispatch and lets running tasks finish.
    pub fn aborts_tasks(&self) -> bool {
        !matches!(self, StopReason::SourceFailed { .. })
    }
}

struct Inner {
    dispatch: CancellationToken,
    tasks: CancellationToken,
    reason: OnceLock<StopReason>,
}

/// Cloneable handle on the run's stop signal.
///
/// Two tokens:
/// - dispatch: observed by the producer and the work queue
/// - tasks: observed by the timeout supervisor for every in-flight task
#[derive(Clone)]
pub struct CancellationController {
    inner: Arc<Inner>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatch: CancellationToken::new(),
                tasks: CancellationToken::new(),
                reason: OnceLock::new(),
            }),
        }
    }

    /// External interrupt. Returns `true` if this was the first trip.
    pub fn interrupt(&self) -> bool {
        self.trip(StopReason::Interrupted)
    }

    pub(crate) fn trip(&self, reason: StopReason) -> bool {
        let aborts_tasks = reason.aborts_tasks();
        let first = self.inner.reason.set(reason).is_ok();
        self.inner.dispatch.cancel();
        // a later interrupt still reaches running tasks after a source failure
        if aborts_tasks {
            self.inner.tasks.cancel();
        }
        first
    }

    pub fn is_tripped(&self) -> bool {
        self.inner.dispatch.is_cancelled()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.inner.reason.get().cloned()
    }

    /// Resolves once the controller has tripped.
    pub async fn tripped(&self) {
        self.inner.dispatch.cancelled().await
    }

    pub(crate) fn dispatch_token(&self) -> CancellationToken {
        self.inner.dispatch.clone()
    }

    pub(crate) fn task_token(&self) -> CancellationToken {
        self.inner.tasks.clone()
    }

    /// Interrupt the run on Ctrl-C. Abort the handle to stop listening.
    pub fn trip_on_ctrl_c(&self) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling run");
                controller.interrupt();
            }
        })
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationController")
            .field("tripped", &self.is_tripped())
            .field("reason", &self.inner.reason.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trip_wins() {
        let controller = CancellationController::new();
        assert!(!controller.is_tripped());

        assert!(controller.interrupt());
        assert!(!controller.trip(StopReason::SourceFailed {
            message: "late".into()
        }));
        assert_eq!(controller.reason(), Some(StopReason::Interrupted));
        assert!(controller.is_tripped());
    }

    #[test]
    fn source_failure_only_stops_dispatch() {
        let controller = CancellationController::new();
        controller.trip(StopReason::SourceFailed {
            message: "eof".into(),
        });
        assert!(controller.dispatch_token().is_cancelled());
        assert!(!controller.task_token().is_cancelled());

        // later interrupt still reaches running tasks
        controller.interrupt();
        assert!(controller.task_token().is_cancelled());
        assert!(matches!(
            controller.reason(),
            Some(StopReason::SourceFailed { .. })
        ));
    }

    #[tokio::test]
    async fn tripped_resolves_for_clones() {
        let controller = CancellationController::new();
        let waiter = tokio::spawn({
            let c = controller.clone();
            async move { c.tripped().await }
        });
        controller.trip(StopReason::FailureObserved {
            index: 2,
            failure: TaskFailure::Failed {
                reason: "x".into(),
            },
        });
        waiter.await.unwrap();
        assert!(controller.task_token().is_cancelled());
    }
}
