//! TaskExecutor port - performs the unit of work for one envelope.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::Envelope;
use crate::error::{ExecutorUnavailable, TaskError};

/// Whether an executor honors its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSupport {
    /// The executor watches the token and returns promptly once it fires.
    Cooperative,
    /// The token is ignored. A cancelled task is reported `Cancelled` right
    /// away but may keep consuming resources in the background.
    Unsupported,
}

/// The user's unit of work, opaque to the engine.
///
/// `execute` runs on its own tokio task. Blocking work belongs in
/// `spawn_blocking`; note that the engine cannot preempt it, so such executors
/// should report `CancelSupport::Unsupported`.
#[async_trait]
pub trait TaskExecutor<T: Send + 'static>: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn execute(
        &self,
        envelope: Envelope<T>,
        cancel: CancellationToken,
    ) -> Result<Self::Output, TaskError>;

    fn cancellation(&self) -> CancelSupport {
        CancelSupport::Cooperative
    }

    /// Checked once before anything is dispatched. An error aborts the run.
    async fn probe(&self) -> Result<(), ExecutorUnavailable> {
        Ok(())
    }
}
