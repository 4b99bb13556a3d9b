//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Durations are written in milliseconds (`task_timeout_ms`, `cancel_grace_ms`).

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::builder::BuildError;
use super::policy::ErrorPolicy;
use crate::domain::millis;

/// Floor for the derived queue capacity.
pub const MIN_DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// How long an interrupted task may take to acknowledge cancellation before
/// the engine stops waiting for it.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(500);

/// Worker pool size.
///
/// Serialized as an integer: a positive value is the pool size, zero or a
/// negative value means unbounded (one worker per item, only sensible for
/// small inputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Concurrency {
    Bounded(NonZeroUsize),
    Unbounded,
}

impl Concurrency {
    pub fn from_limit(limit: i64) -> Self {
        usize::try_from(limit)
            .ok()
            .and_then(NonZeroUsize::new)
            .map_or(Concurrency::Unbounded, Concurrency::Bounded)
    }

    /// Host parallelism, falling back to a single worker.
    pub fn host() -> Self {
        Concurrency::Bounded(std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN))
    }

    /// `None` when unbounded.
    pub fn limit(self) -> Option<usize> {
        match self {
            Concurrency::Bounded(n) => Some(n.get()),
            Concurrency::Unbounded => None,
        }
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::host()
    }
}

impl From<i64> for Concurrency {
    fn from(limit: i64) -> Self {
        Self::from_limit(limit)
    }
}

impl From<Concurrency> for i64 {
    fn from(c: Concurrency) -> Self {
        c.limit()
            .map_or(0, |n| i64::try_from(n).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Emit each outcome as soon as it is produced.
    #[default]
    Streaming,
    /// Emit everything once the run is terminal.
    Collected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub concurrency: Concurrency,

    pub output: OutputMode,

    /// Reorder outcomes to input order before emission.
    pub ordered: bool,

    /// Per-task deadline. `None` means tasks may run forever.
    #[serde(rename = "task_timeout_ms", with = "millis::option")]
    pub task_timeout: Option<Duration>,

    pub error_policy: ErrorPolicy,

    /// Explicit queue capacity; derived from concurrency when `None`.
    pub queue_capacity: Option<usize>,

    #[serde(rename = "cancel_grace_ms", with = "millis")]
    pub cancel_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::default(),
            output: OutputMode::default(),
            ordered: false,
            task_timeout: None,
            error_policy: ErrorPolicy::default(),
            queue_capacity: None,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// `max(2 * concurrency, 1024)` unless overridden.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or_else(|| match self.concurrency.limit() {
            Some(k) => k.saturating_mul(2).max(MIN_DEFAULT_QUEUE_CAPACITY),
            None => MIN_DEFAULT_QUEUE_CAPACITY,
        })
    }

    /// Items that may be pulled but not yet consumed downstream: queue slots
    /// plus worker slots. Unbounded pools have no such limit.
    pub fn admission_limit(&self) -> Option<usize> {
        self.concurrency
            .limit()
            .map(|k| self.effective_queue_capacity().saturating_add(k))
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.queue_capacity == Some(0) {
            return Err(BuildError::ZeroQueueCapacity);
        }
        if self.task_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BuildError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn bounded(n: usize) -> Concurrency {
        Concurrency::Bounded(NonZeroUsize::new(n).unwrap())
    }

    #[rstest]
    #[case(4, bounded(4))]
    #[case(1, bounded(1))]
    #[case(0, Concurrency::Unbounded)]
    #[case(-3, Concurrency::Unbounded)]
    fn concurrency_from_limit(#[case] limit: i64, #[case] expected: Concurrency) {
        assert_eq!(Concurrency::from_limit(limit), expected);
    }

    #[rstest]
    #[case(bounded(2), None, 1024)]
    #[case(bounded(600), None, 1200)]
    #[case(Concurrency::Unbounded, None, 1024)]
    #[case(bounded(8), Some(3), 3)]
    fn queue_capacity_defaults(
        #[case] concurrency: Concurrency,
        #[case] explicit: Option<usize>,
        #[case] expected: usize,
    ) {
        let config = EngineConfig {
            concurrency,
            queue_capacity: explicit,
            ..EngineConfig::default()
        };
        assert_eq!(config.effective_queue_capacity(), expected);
    }

    #[test]
    fn admission_limit_is_queue_plus_workers() {
        let config = EngineConfig {
            concurrency: bounded(2),
            queue_capacity: Some(3),
            ..EngineConfig::default()
        };
        assert_eq!(config.admission_limit(), Some(5));

        let unbounded = EngineConfig {
            concurrency: Concurrency::Unbounded,
            ..EngineConfig::default()
        };
        assert_eq!(unbounded.admission_limit(), None);
    }

    #[test]
    fn empty_json_is_the_default_config() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn json_fields_use_millis_and_integers() {
        let config = EngineConfig::from_json_str(
            r#"{
                "concurrency": 0,
                "output": "collected",
                "ordered": true,
                "task_timeout_ms": 250,
                "error_policy": "halt_on_error",
                "queue_capacity": 16
            }"#,
        )
        .unwrap();

        assert_eq!(config.concurrency, Concurrency::Unbounded);
        assert_eq!(config.output, OutputMode::Collected);
        assert!(config.ordered);
        assert_eq!(config.task_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.error_policy, ErrorPolicy::HaltOnError);
        assert_eq!(config.queue_capacity, Some(16));
        assert_eq!(config.cancel_grace, DEFAULT_CANCEL_GRACE);

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["concurrency"], 0);
        assert_eq!(back["task_timeout_ms"], 250);
    }

    #[rstest]
    #[case(Some(0), None, Some(BuildError::ZeroQueueCapacity))]
    #[case(None, Some(Duration::ZERO), Some(BuildError::ZeroTimeout))]
    #[case(Some(1), Some(Duration::from_millis(1)), None)]
    fn validation(
        #[case] queue_capacity: Option<usize>,
        #[case] task_timeout: Option<Duration>,
        #[case] expected: Option<BuildError>,
    ) {
        let config = EngineConfig {
            queue_capacity,
            task_timeout,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate().err(), expected);
    }
}
