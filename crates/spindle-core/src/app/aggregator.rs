//! Result Aggregator.
//!
//! Owned by the run driver task; no locking needed.

use std::collections::BTreeMap;

use tokio::sync::OwnedSemaphorePermit;
use tracing::warn;

use super::config::OutputMode;
use crate::domain::{Outcome, OutcomeKind};

/// An outcome on its way to the consumer.
///
/// The admission permit is released when the delivery is dropped or unwrapped,
/// which frees room for the producer to pull another item.
#[derive(Debug)]
pub(crate) struct Delivery<R> {
    pub(crate) outcome: Outcome<R>,
    pub(crate) admission: Option<OwnedSemaphorePermit>,
}

impl<R> Delivery<R> {
    pub(crate) fn new(outcome: Outcome<R>, admission: Option<OwnedSemaphorePermit>) -> Self {
        Self { outcome, admission }
    }

    pub(crate) fn index(&self) -> u64 {
        self.outcome.index
    }

    pub(crate) fn into_outcome(self) -> Outcome<R> {
        drop(self.admission);
        self.outcome
    }
}

/// Reorder buffer: holds values until every lower index has been released.
///
/// Memory is bounded by the longest out-of-order run.
#[derive(Debug)]
pub(crate) struct ReorderBuffer<V> {
    next: u64,
    pending: BTreeMap<u64, V>,
}

impl<V> ReorderBuffer<V> {
    pub(crate) fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Insert and return whatever became contiguous, in index order.
    pub(crate) fn push(&mut self, index: u64, value: V) -> Vec<V> {
        self.pending.insert(index, value);
        let mut ready = Vec::new();
        while let Some(value) = self.pending.remove(&self.next) {
            ready.push(value);
            self.next += 1;
        }
        ready
    }

    /// Next index the buffer is waiting for.
    pub(crate) fn next_index(&self) -> u64 {
        self.next
    }

    /// Remaining (non-contiguous) entries.
    pub(crate) fn into_pending(self) -> BTreeMap<u64, V> {
        self.pending
    }
}

enum Mode<R> {
    Streaming,
    Ordered(ReorderBuffer<Delivery<R>>),
    Collected { ordered: bool, items: Vec<Outcome<R>> },
}

/// What is left once the run is terminal.
pub(crate) struct Finished<R> {
    pub(crate) emitted: Vec<Delivery<R>>,
    /// Indices that completed but can not be emitted without breaking order.
    pub(crate) withheld: Vec<u64>,
}

pub(crate) struct Aggregator<R> {
    mode: Mode<R>,
}

impl<R> Aggregator<R> {
    pub(crate) fn new(output: OutputMode, ordered: bool) -> Self {
        let mode = match (output, ordered) {
            (OutputMode::Streaming, false) => Mode::Streaming,
            (OutputMode::Streaming, true) => Mode::Ordered(ReorderBuffer::new()),
            (OutputMode::Collected, ordered) => Mode::Collected {
                ordered,
                items: Vec::new(),
            },
        };
        Self { mode }
    }

    /// Accept one delivery; returns the deliveries now ready for the consumer.
    pub(crate) fn accept(&mut self, delivery: Delivery<R>) -> Vec<Delivery<R>> {
        match &mut self.mode {
            Mode::Streaming => vec![delivery],
            Mode::Ordered(buffer) => buffer.push(delivery.index(), delivery),
            Mode::Collected { items, .. } => {
                // collected 側はここで permit を返す（返さないと producer が詰まる）
                items.push(delivery.into_outcome());
                Vec::new()
            }
        }
    }

    pub(crate) fn finish(self, halted: bool) -> Finished<R> {
        match self.mode {
            Mode::Streaming => Finished {
                emitted: Vec::new(),
                withheld: Vec::new(),
            },
            Mode::Ordered(buffer) => {
                let expected = buffer.next_index();
                let withheld: Vec<u64> = buffer.into_pending().into_keys().collect();
                if !withheld.is_empty() {
                    warn!(
                        waiting_for = expected,
                        count = withheld.len(),
                        "ordered output withheld outcomes after a gap"
                    );
                }
                Finished {
                    emitted: Vec::new(),
                    withheld,
                }
            }
            Mode::Collected {
                ordered: false,
                items,
            } => Finished {
                emitted: items.into_iter().map(|o| Delivery::new(o, None)).collect(),
                withheld: Vec::new(),
            },
            Mode::Collected {
                ordered: true,
                mut items,
            } => {
                items.sort_by_key(|o| o.index);
                if !halted {
                    return Finished {
                        emitted: items.into_iter().map(|o| Delivery::new(o, None)).collect(),
                        withheld: Vec::new(),
                    };
                }
                // halted: in-order prefix of completed, non-cancelled outcomes
                let prefix = items
                    .iter()
                    .enumerate()
                    .take_while(|(expected, o)| {
                        o.index == *expected as u64 && o.kind() != OutcomeKind::Cancelled
                    })
                    .count();
                let rest = items.split_off(prefix);
                Finished {
                    emitted: items.into_iter().map(|o| Delivery::new(o, None)).collect(),
                    withheld: rest.into_iter().map(|o| o.index).collect(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskFailure;
    use chrono::Utc;
    use rstest::rstest;
    use std::time::Duration;

    fn ok(index: u64) -> Delivery<u64> {
        Delivery::new(
            Outcome {
                index,
                worker: 0,
                started_at: Utc::now(),
                duration: Duration::ZERO,
                result: Ok(index * 10),
            },
            None,
        )
    }

    fn with_failure(index: u64, failure: TaskFailure) -> Delivery<u64> {
        Delivery::new(
            Outcome {
                index,
                worker: 0,
                started_at: Utc::now(),
                duration: Duration::ZERO,
                result: Err(failure),
            },
            None,
        )
    }

    fn indices(deliveries: &[Delivery<u64>]) -> Vec<u64> {
        deliveries.iter().map(Delivery::index).collect()
    }

    #[test]
    fn reorder_buffer_releases_contiguous_runs() {
        let mut buffer = ReorderBuffer::new();
        assert!(buffer.push(2, 'c').is_empty());
        assert!(buffer.push(1, 'b').is_empty());
        assert_eq!(buffer.next_index(), 0);
        assert_eq!(buffer.push(0, 'a'), vec!['a', 'b', 'c']);
        assert_eq!(buffer.next_index(), 3);
        assert_eq!(buffer.push(3, 'd'), vec!['d']);
        assert!(buffer.into_pending().is_empty());
    }

    #[test]
    fn streaming_passes_through_completion_order() {
        let mut agg = Aggregator::new(OutputMode::Streaming, false);
        assert_eq!(indices(&agg.accept(ok(2))), vec![2]);
        assert_eq!(indices(&agg.accept(ok(0))), vec![0]);
        let finished = agg.finish(false);
        assert!(finished.emitted.is_empty());
        assert!(finished.withheld.is_empty());
    }

    #[test]
    fn ordered_streaming_holds_until_gap_fills() {
        let mut agg = Aggregator::new(OutputMode::Streaming, true);
        assert!(agg.accept(ok(1)).is_empty());
        assert!(agg.accept(ok(3)).is_empty());
        assert_eq!(indices(&agg.accept(ok(0))), vec![0, 1]);
        assert_eq!(indices(&agg.accept(ok(2))), vec![2, 3]);
    }

    #[test]
    fn ordered_streaming_withholds_after_unfilled_gap() {
        let mut agg = Aggregator::new(OutputMode::Streaming, true);
        assert_eq!(indices(&agg.accept(ok(0))), vec![0]);
        assert!(agg.accept(ok(2)).is_empty());
        let finished = agg.finish(true);
        assert_eq!(finished.withheld, vec![2]);
    }

    #[rstest]
    #[case(false, vec![2, 0, 1])]
    #[case(true, vec![0, 1, 2])]
    fn collected_emits_only_at_finish(#[case] ordered: bool, #[case] expected: Vec<u64>) {
        let mut agg = Aggregator::new(OutputMode::Collected, ordered);
        for i in [2, 0, 1] {
            assert!(agg.accept(ok(i)).is_empty());
        }
        let finished = agg.finish(false);
        assert_eq!(indices(&finished.emitted), expected);
    }

    #[test]
    fn collected_ordered_halted_keeps_non_cancelled_prefix() {
        let mut agg = Aggregator::new(OutputMode::Collected, true);
        agg.accept(with_failure(3, TaskFailure::Cancelled { acknowledged: true }));
        agg.accept(ok(0));
        agg.accept(with_failure(
            1,
            TaskFailure::Failed {
                reason: "x".into(),
            },
        ));
        agg.accept(ok(4));
        agg.accept(ok(2));

        let finished = agg.finish(true);
        assert_eq!(indices(&finished.emitted), vec![0, 1, 2]);
        assert_eq!(finished.withheld, vec![3, 4]);
    }

    #[test]
    fn collected_unordered_halted_keeps_everything() {
        let mut agg = Aggregator::new(OutputMode::Collected, false);
        agg.accept(ok(1));
        agg.accept(with_failure(0, TaskFailure::Cancelled { acknowledged: false }));
        let finished = agg.finish(true);
        assert_eq!(indices(&finished.emitted), vec![1, 0]);
        assert!(finished.withheld.is_empty());
    }
}
