//! Bounded FIFO work queue shared by the producer and the worker pool.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::domain::Envelope;

/// A queued envelope plus its downstream admission permit (if any).
///
/// The permit travels with the envelope and then with its outcome, and is
/// released only when the outcome is consumed.
#[derive(Debug)]
pub struct Queued<T> {
    pub envelope: Envelope<T>,
    pub admission: Option<OwnedSemaphorePermit>,
}

impl<T> Queued<T> {
    pub fn new(envelope: Envelope<T>, admission: Option<OwnedSemaphorePermit>) -> Self {
        Self {
            envelope,
            admission,
        }
    }

    pub fn index(&self) -> u64 {
        self.envelope.index()
    }
}

struct QueueState<T> {
    items: VecDeque<Queued<T>>,
    closed: bool,
}

/// Bounded queue between the producer and the workers.
///
/// - `push` waits while the queue holds `capacity` envelopes (backpressure).
/// - `claim` hands each envelope to exactly one worker, FIFO, under the lock,
///   so dispatch order is index order.
/// - Once the halt token fires nothing more is pushed or claimed; leftovers
///   stay in the queue until `drain`.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    slots: Semaphore,
    available: Notify,
    halt: CancellationToken,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize, halt: CancellationToken) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            slots: Semaphore::new(capacity),
            available: Notify::new(),
            halt,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Enqueue, waiting for a free slot. The entry is handed back if the queue
    /// was halted or closed meanwhile.
    pub async fn push(&self, entry: Queued<T>) -> Result<(), Queued<T>> {
        let slot = tokio::select! {
            biased;
            _ = self.halt.cancelled() => return Err(entry),
            slot = self.slots.acquire() => match slot {
                Ok(slot) => slot,
                Err(_) => return Err(entry),
            },
        };

        let mut state = self.state.lock().await;
        if state.closed || self.halt.is_cancelled() {
            return Err(entry);
        }
        // slot は claim 側で add_permits して返す
        slot.forget();
        state.items.push_back(entry);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Claim the oldest envelope. `None` once the queue is closed and empty,
    /// or as soon as the halt token fires.
    pub async fn claim(&self) -> Option<Queued<T>> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // 先に waiter として登録しておかないと close() の notify_waiters を取りこぼす
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if self.halt.is_cancelled() {
                    return None;
                }
                if let Some(entry) = state.items.pop_front() {
                    self.slots.add_permits(1);
                    if !state.items.is_empty() {
                        self.available.notify_one();
                    }
                    return Some(entry);
                }
                if state.closed {
                    return None;
                }
            }

            tokio::select! {
                _ = self.halt.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// No more pushes. Workers finish what is queued, then `claim` returns `None`.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.available.notify_waiters();
    }

    /// Remove everything still queued (never dispatched).
    pub async fn drain(&self) -> Vec<Queued<T>> {
        let mut state = self.state.lock().await;
        let drained: Vec<_> = state.items.drain(..).collect();
        self.slots.add_permits(drained.len());
        drained
    }
}
