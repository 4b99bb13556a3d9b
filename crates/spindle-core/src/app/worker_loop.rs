//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. WorkQueue::claim() で envelope を取得
//! 2. TimeoutSupervisor で実行 → Outcome
//! 3. PolicyEnforcer で評価（次の claim より前）
//! 4. Delivery として driver に送る

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error};

use super::aggregator::Delivery;
use super::policy::PolicyEnforcer;
use super::supervisor::TimeoutSupervisor;
use crate::domain::EngineEvent;
use crate::observability::RunStats;
use crate::ports::{EventSink, TaskExecutor};
use crate::queue::{Queued, WorkQueue};

pub(crate) struct WorkerLoop<T, E: TaskExecutor<T>>
where
    T: Send + 'static,
{
    pub(crate) queue: Arc<WorkQueue<T>>,
    pub(crate) supervisor: TimeoutSupervisor<T, E>,
    pub(crate) policy: PolicyEnforcer,
    pub(crate) stats: Arc<RunStats>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) completions: mpsc::UnboundedSender<Delivery<E::Output>>,
}

impl<T, E> WorkerLoop<T, E>
where
    T: Send + 'static,
    E: TaskExecutor<T>,
{
    /// Run the pool until the queue is closed and empty, or halted.
    ///
    /// `Some(k)`: k long-lived workers. `None`: one task per claimed envelope.
    pub(crate) async fn run(self, workers: Option<usize>) {
        let this = Arc::new(self);
        match workers {
            Some(k) => this.run_bounded(k).await,
            None => this.run_unbounded().await,
        }
        debug!("worker pool finished");
    }

    async fn run_bounded(self: Arc<Self>, k: usize) {
        let mut set = JoinSet::new();
        for worker in 0..k {
            let this = Arc::clone(&self);
            set.spawn(async move { this.work(worker).await }.in_current_span());
        }
        while let Some(joined) = set.join_next().await {
            report_join(joined);
        }
    }

    async fn run_unbounded(self: Arc<Self>) {
        let mut set = JoinSet::new();
        let mut worker = 0usize;
        while let Some(queued) = self.queue.claim().await {
            let this = Arc::clone(&self);
            set.spawn(async move { this.run_one(queued, worker).await }.in_current_span());
            worker += 1;
            while let Some(joined) = set.try_join_next() {
                report_join(joined);
            }
        }
        while let Some(joined) = set.join_next().await {
            report_join(joined);
        }
    }

    async fn work(&self, worker: usize) {
        while let Some(queued) = self.queue.claim().await {
            self.run_one(queued, worker).await;
        }
    }

    async fn run_one(&self, queued: Queued<T>, worker: usize) {
        let Queued {
            envelope,
            admission,
        } = queued;
        let index = envelope.index();

        self.stats.record_dispatch();
        self.events.emit(EngineEvent::Dispatched { index, worker });
        debug!(index, worker, "dispatched");

        let outcome = self.supervisor.supervise(envelope, worker).await;
        let kind = outcome.kind();
        self.stats.record_completion(kind);
        self.events.emit(EngineEvent::Completed {
            index,
            worker,
            kind,
        });
        debug!(index, worker, ?kind, duration_ms = outcome.duration.as_millis() as u64, "completed");

        // halt はこの worker が次を claim する前に反映する
        self.policy.observe(&outcome);

        // driver がいなくなっていたら結果は捨てる
        let _ = self.completions.send(Delivery::new(outcome, admission));
    }
}

fn report_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "worker task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cancel::CancellationController;
    use crate::app::policy::ErrorPolicy;
    use crate::domain::{Context, Envelope};
    use crate::error::TaskError;
    use crate::impls::{FnExecutor, NoopEventSink};
    use crate::ports::SystemClock;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn run_pool(
        items: u64,
        workers: Option<usize>,
        policy: ErrorPolicy,
        fail_on: Option<u64>,
    ) -> (Vec<u64>, Arc<RunStats>, CancellationController) {
        let controller = CancellationController::new();
        let queue = Arc::new(WorkQueue::new(64, controller.dispatch_token()));
        for i in 0..items {
            queue
                .push(Queued::new(Envelope::new(i, i, Context::empty()), None))
                .await
                .unwrap();
        }
        queue.close().await;

        let exec = FnExecutor::new(move |env: Envelope<u64>, _cancel: CancellationToken| async move {
            if Some(env.index()) == fail_on {
                return Err(TaskError::failed("boom"));
            }
            Ok(env.into_item())
        });
        let stats = Arc::new(RunStats::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerLoop {
            queue,
            supervisor: TimeoutSupervisor::new(
                Arc::new(exec),
                None,
                Duration::from_millis(50),
                controller.task_token(),
                Arc::new(SystemClock),
            ),
            policy: PolicyEnforcer::new(policy, controller.clone()),
            stats: stats.clone(),
            events: Arc::new(NoopEventSink),
            completions: tx,
        };
        pool.run(workers).await;

        let mut seen = Vec::new();
        while let Some(delivery) = rx.recv().await {
            seen.push(delivery.index());
        }
        seen.sort_unstable();
        (seen, stats, controller)
    }

    #[tokio::test]
    async fn bounded_pool_runs_every_envelope_once() {
        let (seen, stats, _) = run_pool(20, Some(3), ErrorPolicy::ContinueOnError, None).await;
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        let counts = stats.snapshot();
        assert_eq!(counts.dispatched, 20);
        assert!(counts.peak_in_flight <= 3);
    }

    #[tokio::test]
    async fn unbounded_pool_runs_every_envelope_once() {
        let (seen, stats, _) = run_pool(10, None, ErrorPolicy::ContinueOnError, None).await;
        assert_eq!(seen.len(), 10);
        assert_eq!(stats.snapshot().completed, 10);
    }

    #[tokio::test]
    async fn halting_worker_stops_the_sequential_pool() {
        let (seen, stats, controller) = run_pool(10, Some(1), ErrorPolicy::HaltOnError, Some(2)).await;
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(stats.snapshot().failures(), 1);
        assert!(controller.is_tripped());
    }
}
