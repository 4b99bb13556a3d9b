//! ItemSource port - lazy, pull-based input sequence.

use async_trait::async_trait;

use crate::error::SourceError;

/// Produces the items a run iterates over.
///
/// The engine calls `next()` from a single producer task, one item at a time,
/// and only when there is room for it downstream. Sources must not need the
/// whole sequence in memory.
#[async_trait]
pub trait ItemSource: Send {
    type Item: Send + 'static;

    /// Next item, `Ok(None)` at end of sequence.
    ///
    /// An `Err` is a failure of the source itself and stops the run from
    /// dispatching anything further.
    async fn next(&mut self) -> Result<Option<Self::Item>, SourceError>;

    /// Cancellation tripped: release whatever feeds this source. At most the one
    /// pending `next()` call is abandoned.
    fn stop(&mut self) {}
}
