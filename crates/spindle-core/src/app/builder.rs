//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! 設定の検証は `build()` で行う（Fail-fast）。

use std::sync::Arc;
use std::time::Duration;

use super::config::{Concurrency, EngineConfig, OutputMode};
use super::policy::ErrorPolicy;
use super::runtime::Engine;
use crate::domain::Context;
use crate::impls::NoopEventSink;
use crate::ports::{Clock, EventSink, SystemClock};

/// Configuration rejected at build time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("task timeout must be greater than zero")]
    ZeroTimeout,
}

/// ```ignore
/// let engine = EngineBuilder::new()
///     .concurrency(4)
///     .ordered(true)
///     .halt_on_error()
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    context: Context,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::from_config(EngineConfig::default())
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            context: Context::empty(),
            clock: Arc::new(SystemClock),
            events: Arc::new(NoopEventSink),
        }
    }

    /// Positive: pool size. Zero or negative: unbounded.
    pub fn concurrency(mut self, limit: i64) -> Self {
        self.config.concurrency = Concurrency::from_limit(limit);
        self
    }

    pub fn ordered(mut self, ordered: bool) -> Self {
        self.config.ordered = ordered;
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.config.output = output;
        self
    }

    pub fn collected(self) -> Self {
        self.output(OutputMode::Collected)
    }

    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.config.task_timeout = Some(timeout);
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    pub fn halt_on_error(self) -> Self {
        self.error_policy(ErrorPolicy::HaltOnError)
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.config.cancel_grace = grace;
        self
    }

    /// Read-only context shared by every task of every run.
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        self.config.validate()?;
        Ok(Engine::new(self.config, self.context, self.clock, self.events))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_with_defaults() {
        let engine = EngineBuilder::new().build().unwrap();
        assert_eq!(engine.config(), &EngineConfig::default());
    }

    #[test]
    fn setters_land_in_config() {
        let engine = EngineBuilder::new()
            .concurrency(3)
            .ordered(true)
            .collected()
            .task_timeout(Duration::from_millis(40))
            .halt_on_error()
            .queue_capacity(7)
            .cancel_grace(Duration::from_millis(10))
            .build()
            .unwrap();

        let config = engine.config();
        assert_eq!(config.concurrency.limit(), Some(3));
        assert!(config.ordered);
        assert_eq!(config.output, OutputMode::Collected);
        assert_eq!(config.task_timeout, Some(Duration::from_millis(40)));
        assert_eq!(config.error_policy, ErrorPolicy::HaltOnError);
        assert_eq!(config.queue_capacity, Some(7));
        assert_eq!(config.cancel_grace, Duration::from_millis(10));
    }

    #[test]
    fn build_rejects_zero_capacity() {
        let err = EngineBuilder::new().queue_capacity(0).build().err();
        assert_eq!(err, Some(BuildError::ZeroQueueCapacity));
    }

    #[test]
    fn build_rejects_zero_timeout() {
        let err = EngineBuilder::new()
            .task_timeout(Duration::ZERO)
            .build()
            .err();
        assert_eq!(err, Some(BuildError::ZeroTimeout));
    }

    #[test]
    fn non_positive_concurrency_is_unbounded() {
        let engine = EngineBuilder::new().concurrency(0).build().unwrap();
        assert_eq!(engine.config().concurrency, Concurrency::Unbounded);
    }
}
