//! spindle-core
//!
//! Bounded-concurrency iteration engine: pull items from a source, run each
//! through an async executor on a fixed pool of workers, and stream the
//! outcomes back in completion or input order.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（envelope, context, outcome, state, events, ids）
//! - **ports**: 抽象化レイヤー（ItemSource, TaskExecutor, EventSink, Clock, IdGenerator）
//! - **app**: エンジン本体（builder, runtime, worker_loop, supervisor, aggregator, cancel）
//! - **queue**: producer と worker の間の bounded queue
//! - **impls**: 実装（IterSource, FnExecutor, RecordingEventSink など）
//!
//! ```ignore
//! let engine = Engine::builder().concurrency(4).ordered(true).build()?;
//! let exec = FnExecutor::new(|env: Envelope<u64>, _cancel| async move {
//!     Ok::<_, TaskError>(env.into_item() * 2)
//! });
//! let collected = engine.collect(IterSource::new(1..=5u64), exec).await?;
//! ```

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{
    CancellationController, Collected, Concurrency, Engine, EngineBuilder, EngineConfig,
    ErrorPolicy, OutcomeStream, OutputMode, Run, RunReport, StopReason,
};
pub use domain::{Context, Envelope, Outcome, OutcomeKind, TaskFailure, TerminationStatus};
pub use error::{EngineError, ExecutorUnavailable, SourceError, TaskError};
pub use observability::RunCounts;
