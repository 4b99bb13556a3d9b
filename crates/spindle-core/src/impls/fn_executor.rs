//! FnExecutor - closure を TaskExecutor として使うためのアダプタ

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::Envelope;
use crate::error::TaskError;
use crate::ports::{CancelSupport, TaskExecutor};

/// Adapts `Fn(Envelope<T>, CancellationToken) -> impl Future<Output = Result<R, TaskError>>`.
///
/// ```ignore
/// let exec = FnExecutor::new(|env: Envelope<u32>, _cancel| async move {
///     Ok::<_, TaskError>(env.into_item() * 2)
/// });
/// ```
pub struct FnExecutor<F> {
    f: F,
    support: CancelSupport,
}

impl<F> FnExecutor<F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            support: CancelSupport::Cooperative,
        }
    }

    /// Declare that the closure ignores its token.
    pub fn uncancellable(mut self) -> Self {
        self.support = CancelSupport::Unsupported;
        self
    }
}

#[async_trait]
impl<T, R, F, Fut> TaskExecutor<T> for FnExecutor<F>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(Envelope<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
{
    type Output = R;

    async fn execute(&self, envelope: Envelope<T>, cancel: CancellationToken) -> Result<R, TaskError> {
        (self.f)(envelope, cancel).await
    }

    fn cancellation(&self) -> CancelSupport {
        self.support
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Context;

    #[tokio::test]
    async fn closure_receives_the_envelope() {
        let exec = FnExecutor::new(|env: Envelope<u32>, _cancel: CancellationToken| async move {
            Ok::<_, TaskError>(env.index() * 100 + u64::from(*env.item()))
        });
        let out = exec
            .execute(Envelope::new(3, 7, Context::empty()), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, 307);
        assert_eq!(exec.cancellation(), CancelSupport::Cooperative);
    }

    #[tokio::test]
    async fn uncancellable_is_reported() {
        let exec = FnExecutor::new(|_env: Envelope<()>, _cancel: CancellationToken| async move {
            Err::<(), _>(TaskError::failed("nope"))
        })
        .uncancellable();
        assert_eq!(exec.cancellation(), CancelSupport::Unsupported);
        let err = exec
            .execute(Envelope::new(0, (), Context::empty()), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::failed("nope"));
    }
}
