//! Timeout Supervisor.
//!
//! Every execution runs on its own tokio task so that a deadline or an
//! interrupt can free the worker slot without waiting for the executor.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

use crate::domain::{Envelope, Outcome, TaskFailure};
use crate::error::TaskError;
use crate::ports::{CancelSupport, Clock, TaskExecutor};

pub(crate) struct TimeoutSupervisor<T, E> {
    executor: Arc<E>,
    timeout: Option<Duration>,
    grace: Duration,
    tasks: CancellationToken,
    clock: Arc<dyn Clock>,
    _item: PhantomData<fn(T)>,
}

impl<T, E> TimeoutSupervisor<T, E>
where
    T: Send + 'static,
    E: TaskExecutor<T>,
{
    pub(crate) fn new(
        executor: Arc<E>,
        timeout: Option<Duration>,
        grace: Duration,
        tasks: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            timeout,
            grace,
            tasks,
            clock,
            _item: PhantomData,
        }
    }

    /// Run one envelope to exactly one outcome.
    pub(crate) async fn supervise(&self, envelope: Envelope<T>, worker: usize) -> Outcome<E::Output> {
        let index = envelope.index();
        let started_at = self.clock.now();
        let started = Instant::now();

        let token = self.tasks.child_token();
        let executor = Arc::clone(&self.executor);
        let task_token = token.clone();
        let mut handle = tokio::spawn(
            async move { executor.execute(envelope, task_token).await }.in_current_span(),
        );

        let deadline = async {
            match self.timeout {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let result = tokio::select! {
            biased;
            joined = &mut handle => settle(joined),
            _ = &mut deadline => {
                // 遅れて返ってきた結果は捨てる
                token.cancel();
                handle.abort();
                let after = self.timeout.unwrap_or_default();
                debug!(index, after_ms = after.as_millis() as u64, "task timed out");
                Err(TaskFailure::Timeout { after })
            }
            _ = self.tasks.cancelled() => self.interrupt(index, handle, token).await,
        };

        Outcome {
            index,
            worker,
            started_at,
            duration: started.elapsed(),
            result,
        }
    }

    async fn interrupt(
        &self,
        index: u64,
        mut handle: JoinHandle<Result<E::Output, TaskError>>,
        token: CancellationToken,
    ) -> Result<E::Output, TaskFailure> {
        token.cancel();
        if self.executor.cancellation() == CancelSupport::Unsupported {
            handle.abort();
            return Err(TaskFailure::Cancelled {
                acknowledged: false,
            });
        }

        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(joined) => settle(joined),
            Err(_) => {
                warn!(
                    index,
                    grace_ms = self.grace.as_millis() as u64,
                    "task did not acknowledge cancellation; abandoning it"
                );
                handle.abort();
                Err(TaskFailure::Cancelled {
                    acknowledged: false,
                })
            }
        }
    }
}

fn settle<R>(joined: Result<Result<R, TaskError>, JoinError>) -> Result<R, TaskFailure> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(TaskError::Failed(reason))) => Err(TaskFailure::Failed { reason }),
        Ok(Err(TaskError::Cancelled)) => Err(TaskFailure::Cancelled { acknowledged: true }),
        Err(err) if err.is_panic() => Err(TaskFailure::Panicked {
            message: panic_message(err.into_panic()),
        }),
        Err(_) => Err(TaskFailure::Cancelled {
            acknowledged: false,
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
