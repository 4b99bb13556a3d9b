use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::builder::BuildError;

/// Failure reported by a `TaskExecutor` for a single item.
///
/// Per-item failures never abort a run; the engine turns them into an
/// `Outcome` and keeps them as data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    /// The executor observed its cancellation token and stopped.
    #[error("cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn failed(reason: impl Into<String>) -> Self {
        TaskError::Failed(reason.into())
    }
}

/// The item source itself failed (as opposed to one item's unit of work).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("item source failed: {message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::new(err.to_string())
    }
}

/// The executor capability cannot be invoked at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("executor unavailable: {0}")]
pub struct ExecutorUnavailable(pub String);

impl ExecutorUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Run-level errors. Only these abort a run outright.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    ExecutorUnavailable(#[from] ExecutorUnavailable),

    #[error("item source failed after {pulled} items: {source}")]
    SourceFailed {
        pulled: u64,
        #[source]
        source: SourceError,
    },

    #[error("invalid engine configuration: {0}")]
    Config(#[from] BuildError),

    #[error("run driver terminated abnormally: {0}")]
    Driver(String),
}
