use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::OutcomeKind;

/// Point-in-time counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub pulled: u64,
    pub dispatched: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
}

impl RunCounts {
    /// Every non-success outcome.
    pub fn failures(&self) -> u64 {
        self.failed + self.timed_out + self.cancelled
    }
}

/// Live counters, updated by the producer and the workers.
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    pulled: AtomicU64,
    dispatched: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
    completed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
}

impl RunStats {
    pub(crate) fn record_pulled(&self) {
        self.pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn record_completion(&self, kind: OutcomeKind) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.completed.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            OutcomeKind::Success => &self.succeeded,
            OutcomeKind::Failure => &self.failed,
            OutcomeKind::Timeout => &self.timed_out,
            OutcomeKind::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RunCounts {
        RunCounts {
            pulled: self.pulled.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_tracks_highest_in_flight() {
        let stats = RunStats::default();
        stats.record_dispatch();
        stats.record_dispatch();
        stats.record_completion(OutcomeKind::Success);
        stats.record_dispatch();
        stats.record_completion(OutcomeKind::Timeout);
        stats.record_completion(OutcomeKind::Failure);

        let counts = stats.snapshot();
        assert_eq!(counts.dispatched, 3);
        assert_eq!(counts.in_flight, 0);
        assert_eq!(counts.peak_in_flight, 2);
        assert_eq!(counts.completed, 3);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.failures(), 2);
    }
}
