//! Impls - ready-made ports implementations.
//!
//! # 含まれる実装
//! - **IterSource / StreamSource / ChannelSource / LineSource**: ItemSource
//! - **FnExecutor**: closure ベースの TaskExecutor
//! - **NoopEventSink / RecordingEventSink**: EventSink

pub mod event_sinks;
pub mod fn_executor;
pub mod sources;

pub use self::event_sinks::{NoopEventSink, RecordingEventSink};
pub use self::fn_executor::FnExecutor;
pub use self::sources::{ChannelSource, IterSource, LineSource, StreamSource};
