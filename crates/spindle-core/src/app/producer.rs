//! Producer - pulls items from the source into the work queue.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::cancel::{CancellationController, StopReason};
use crate::domain::{Context, EngineEvent, Envelope, SourceStop};
use crate::error::SourceError;
use crate::observability::RunStats;
use crate::ports::{EventSink, ItemSource};
use crate::queue::{Queued, WorkQueue};

/// How the producer ended.
#[derive(Debug)]
pub(crate) struct ProducerReport {
    pub(crate) pulled: u64,
    pub(crate) stop: SourceStop,
    pub(crate) error: Option<SourceError>,
    /// Pulled, then handed back by a halted queue.
    pub(crate) rejected: Vec<u64>,
}

pub(crate) struct Producer<T> {
    pub(crate) queue: Arc<WorkQueue<T>>,
    /// `None` in unbounded mode.
    pub(crate) admission: Option<Arc<Semaphore>>,
    pub(crate) context: Context,
    pub(crate) controller: CancellationController,
    pub(crate) stats: Arc<RunStats>,
    pub(crate) events: Arc<dyn EventSink>,
}

impl<T: Send + 'static> Producer<T> {
    pub(crate) async fn run<S>(self, mut source: S) -> ProducerReport
    where
        S: ItemSource<Item = T>,
    {
        let halt = self.controller.dispatch_token();
        let mut pulled = 0u64;
        let mut rejected = Vec::new();

        let (stop, error) = loop {
            // 下流に空きが出るまで source には触らない
            let admission = match &self.admission {
                Some(permits) => tokio::select! {
                    biased;
                    _ = halt.cancelled() => break (SourceStop::Cancelled, None),
                    permit = Arc::clone(permits).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break (SourceStop::Cancelled, None),
                    },
                },
                None => None,
            };

            let next = tokio::select! {
                biased;
                _ = halt.cancelled() => break (SourceStop::Cancelled, None),
                next = source.next() => next,
            };

            match next {
                Ok(Some(item)) => {
                    let index = pulled;
                    pulled += 1;
                    self.stats.record_pulled();
                    self.events.emit(EngineEvent::Pulled { index });

                    let envelope = Envelope::new(index, item, self.context.clone());
                    if let Err(entry) = self.queue.push(Queued::new(envelope, admission)).await {
                        rejected.push(entry.index());
                        break (SourceStop::Cancelled, None);
                    }
                }
                Ok(None) => break (SourceStop::Exhausted, None),
                Err(err) => {
                    warn!(pulled, error = %err, "item source failed; draining");
                    self.controller.trip(StopReason::SourceFailed {
                        message: err.message.clone(),
                    });
                    break (SourceStop::Failed, Some(err));
                }
            }
        };

        if stop != SourceStop::Exhausted {
            source.stop();
        }
        self.queue.close().await;
        self.events.emit(EngineEvent::SourceStopped {
            pulled,
            reason: stop,
        });
        debug!(pulled, reason = ?stop, "producer finished");

        ProducerReport {
            pulled,
            stop,
            error,
            rejected,
        }
    }
}
