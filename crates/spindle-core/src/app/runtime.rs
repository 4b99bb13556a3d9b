//! Engine and Run - the public surface of a bounded-concurrency run.
//!
//! `Engine::start` wires one run:
//!
//! ```text
//! source -> Producer -> WorkQueue -> WorkerLoop (supervisor, policy)
//!                                        |
//!                                   completions
//!                                        v
//!                        driver (aggregator, state) -> OutcomeStream
//! ```
//!
//! The driver task owns the aggregator and the state machine; nothing else
//! writes either.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::Stream;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::aggregator::{Aggregator, Delivery};
use super::builder::EngineBuilder;
use super::cancel::{CancellationController, StopReason};
use super::config::EngineConfig;
use super::policy::PolicyEnforcer;
use super::producer::{Producer, ProducerReport};
use super::status::{RunReport, termination_status};
use super::supervisor::TimeoutSupervisor;
use super::worker_loop::WorkerLoop;
use crate::domain::{
    Context, EngineEvent, EngineState, FailureSummary, Outcome, RunId, SourceStop,
};
use crate::error::EngineError;
use crate::observability::{RunCounts, RunStats};
use crate::ports::{Clock, EventSink, IdGenerator, ItemSource, TaskExecutor, UlidGenerator};
use crate::queue::WorkQueue;

/// Reusable engine: configuration plus shared context. Each `start` is an
/// independent run.
pub struct Engine {
    config: EngineConfig,
    context: Context,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    ids: UlidGenerator<Arc<dyn Clock>>,
}

impl Engine {
    pub(crate) fn new(
        config: EngineConfig,
        context: Context,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            ids: UlidGenerator::new(Arc::clone(&clock)),
            config,
            context,
            clock,
            events,
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Probe the executor, then start pulling and dispatching.
    ///
    /// Fails with `ExecutorUnavailable` before anything is pulled.
    pub async fn start<S, E>(&self, source: S, executor: E) -> Result<Run<E::Output>, EngineError>
    where
        S: ItemSource + 'static,
        E: TaskExecutor<S::Item>,
    {
        if let Err(err) = executor.probe().await {
            error!(error = %err, "executor probe failed; nothing dispatched");
            return Err(err.into());
        }

        let run_id = self.ids.generate_run_id();
        let span = info_span!("run", run_id = %run_id);

        let controller = CancellationController::new();
        let stats = Arc::new(RunStats::default());
        let queue = Arc::new(WorkQueue::new(
            self.config.effective_queue_capacity(),
            controller.dispatch_token(),
        ));
        let (state_tx, state_rx) = watch::channel(EngineState::Running);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let producer = Producer {
            queue: Arc::clone(&queue),
            admission: self
                .config
                .admission_limit()
                .map(|permits| Arc::new(Semaphore::new(permits))),
            context: self.context.clone(),
            controller: controller.clone(),
            stats: Arc::clone(&stats),
            events: Arc::clone(&self.events),
        };
        let pool = WorkerLoop {
            queue: Arc::clone(&queue),
            supervisor: TimeoutSupervisor::new(
                Arc::new(executor),
                self.config.task_timeout,
                self.config.cancel_grace,
                controller.task_token(),
                Arc::clone(&self.clock),
            ),
            policy: PolicyEnforcer::new(self.config.error_policy, controller.clone()),
            stats: Arc::clone(&stats),
            events: Arc::clone(&self.events),
            completions: completions_tx,
        };
        let driver = Driver {
            run_id,
            queue,
            controller: controller.clone(),
            stats: Arc::clone(&stats),
            events: Arc::clone(&self.events),
            state: state_tx,
            output: output_tx,
            detached: false,
            discarded: 0,
        };

        let workers = self.config.concurrency.limit();
        info!(
            parent: &span,
            workers = ?workers,
            queue_capacity = self.config.effective_queue_capacity(),
            ordered = self.config.ordered,
            output = ?self.config.output,
            policy = ?self.config.error_policy,
            "run started"
        );
        let aggregator = Aggregator::new(self.config.output, self.config.ordered);
        let handle = tokio::spawn(
            driver
                .drive(producer, source, pool, workers, aggregator, completions_rx)
                .instrument(span),
        );

        Ok(Run {
            id: run_id,
            outcomes: OutcomeStream { rx: output_rx },
            abandon: InterruptOnDrop(Some(controller.clone())),
            controller,
            state: state_rx,
            stats,
            driver: handle,
        })
    }

    /// Start a run and wait for every outcome.
    pub async fn collect<S, E>(&self, source: S, executor: E) -> Result<Collected<E::Output>, EngineError>
    where
        S: ItemSource + 'static,
        E: TaskExecutor<S::Item>,
    {
        self.start(source, executor).await?.collect().await
    }
}

/// A run in progress.
///
/// Dropping it without `wait` or `collect` interrupts the run.
pub struct Run<R> {
    id: RunId,
    outcomes: OutcomeStream<R>,
    controller: CancellationController,
    abandon: InterruptOnDrop,
    state: watch::Receiver<EngineState>,
    stats: Arc<RunStats>,
    driver: JoinHandle<RunReport>,
}

impl<R> Run<R> {
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Next outcome, `None` once the run is terminal and everything was emitted.
    pub async fn next(&mut self) -> Option<Outcome<R>> {
        self.outcomes.rx.recv().await.map(Delivery::into_outcome)
    }

    pub fn outcomes(&mut self) -> &mut OutcomeStream<R> {
        &mut self.outcomes
    }

    pub fn controller(&self) -> &CancellationController {
        &self.controller
    }

    /// External interrupt: stop dispatching and cancel in-flight tasks.
    pub fn cancel(&self) {
        self.controller.interrupt();
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn counts(&self) -> RunCounts {
        self.stats.snapshot()
    }

    /// Wait for the run to finish. Outcomes not consumed yet are discarded.
    pub async fn wait(mut self) -> Result<RunReport, EngineError> {
        self.abandon.disarm();
        drop(self.outcomes);
        self.driver
            .await
            .map_err(|err| EngineError::Driver(err.to_string()))
    }

    /// Consume every outcome, then wait for the report.
    pub async fn collect(mut self) -> Result<Collected<R>, EngineError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next().await {
            outcomes.push(outcome);
        }
        let report = self.wait().await?;
        Ok(Collected { outcomes, report })
    }
}

/// Interrupts the run when the owning `Run` goes away, like tokio-util's
/// `DropGuard`. `wait` disarms it.
struct InterruptOnDrop(Option<CancellationController>);

impl InterruptOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(controller) = self.0.take() {
            if controller.interrupt() {
                debug!("run dropped before completion; interrupted");
            }
        }
    }
}

/// Every outcome of a finished run, in emission order, plus its report.
#[derive(Debug)]
pub struct Collected<R> {
    pub outcomes: Vec<Outcome<R>>,
    pub report: RunReport,
}

impl<R> Collected<R> {
    /// Successful values in emission order.
    pub fn values(&self) -> Vec<&R> {
        self.outcomes.iter().filter_map(Outcome::value).collect()
    }
}

/// Outcome sequence of a run.
///
/// In collected mode nothing arrives until the run is terminal.
pub struct OutcomeStream<R> {
    rx: mpsc::UnboundedReceiver<Delivery<R>>,
}

impl<R> Stream for OutcomeStream<R> {
    type Item = Outcome<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        // consuming the delivery releases its admission permit
        self.get_mut()
            .rx
            .poll_recv(cx)
            .map(|delivery| delivery.map(Delivery::into_outcome))
    }
}

struct Driver<T, R> {
    run_id: RunId,
    queue: Arc<WorkQueue<T>>,
    controller: CancellationController,
    stats: Arc<RunStats>,
    events: Arc<dyn EventSink>,
    state: watch::Sender<EngineState>,
    output: mpsc::UnboundedSender<Delivery<R>>,
    detached: bool,
    discarded: u64,
}

impl<T, R> Driver<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    async fn drive<S, E>(
        mut self,
        producer: Producer<T>,
        source: S,
        pool: WorkerLoop<T, E>,
        workers: Option<usize>,
        mut aggregator: Aggregator<R>,
        mut completions: mpsc::UnboundedReceiver<Delivery<R>>,
    ) -> RunReport
    where
        S: ItemSource<Item = T> + 'static,
        E: TaskExecutor<T, Output = R>,
    {
        let started = Instant::now();
        let producer = tokio::spawn(producer.run(source).in_current_span());
        let pool = tokio::spawn(pool.run(workers).in_current_span());
        let stop = self.controller.dispatch_token();

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled(), if self.current() == EngineState::Running => {
                    self.transition(EngineState::Draining);
                }
                delivery = completions.recv() => match delivery {
                    Some(delivery) => {
                        for ready in aggregator.accept(delivery) {
                            self.deliver(ready);
                        }
                    }
                    // every worker is gone
                    None => break,
                },
            }
        }

        if let Err(err) = pool.await {
            error!(error = %err, "worker pool ended abnormally");
        }
        let producer = match producer.await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "producer ended abnormally");
                ProducerReport {
                    pulled: self.stats.snapshot().pulled,
                    stop: SourceStop::Cancelled,
                    error: None,
                    rejected: Vec::new(),
                }
            }
        };

        let mut never_dispatched: Vec<u64> = self
            .queue
            .drain()
            .await
            .into_iter()
            .map(|entry| entry.index())
            .chain(producer.rejected.iter().copied())
            .collect();
        never_dispatched.sort_unstable();

        let reason = self.controller.reason();
        if reason.is_some() {
            if self.current() == EngineState::Running {
                self.transition(EngineState::Draining);
            }
            self.transition(EngineState::Halted);
        } else {
            self.transition(EngineState::Completed);
        }

        let finished = aggregator.finish(reason.is_some());
        for delivery in finished.emitted {
            self.deliver(delivery);
        }

        let counts = self.stats.snapshot();
        let first_failure = match &reason {
            Some(StopReason::FailureObserved { index, failure }) => Some(FailureSummary {
                index: *index,
                failure: failure.clone(),
            }),
            _ => None,
        };
        let report = RunReport {
            run_id: self.run_id,
            status: termination_status(reason.as_ref(), &counts),
            state: self.current(),
            counts,
            stop_reason: reason,
            first_failure,
            source_error: producer.error,
            never_dispatched,
            withheld: finished.withheld,
            discarded: self.discarded,
            source_exhausted: producer.stop == SourceStop::Exhausted,
            elapsed: started.elapsed(),
        };

        if report.is_success() {
            info!(
                status = ?report.status,
                completed = report.counts.completed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "run finished"
            );
        } else {
            warn!(
                status = ?report.status,
                completed = report.counts.completed,
                failures = report.counts.failures(),
                never_dispatched = report.never_dispatched.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "run finished"
            );
        }
        report
    }

    fn current(&self) -> EngineState {
        *self.state.borrow()
    }

    fn transition(&mut self, to: EngineState) {
        let from = self.current();
        if !from.can_transition_to(to) {
            warn!(?from, ?to, "ignored invalid state transition");
            return;
        }
        self.state.send_replace(to);
        self.events.emit(EngineEvent::StateChanged { from, to });
        debug!(?from, ?to, "state changed");
    }

    fn deliver(&mut self, delivery: Delivery<R>) {
        if self.detached {
            self.discarded += 1;
            return;
        }
        if self.output.send(delivery).is_err() {
            // 受け手がいないので以降は捨てる
            debug!("outcome consumer went away; discarding further outcomes");
            self.detached = true;
            self.discarded += 1;
        }
    }
}
