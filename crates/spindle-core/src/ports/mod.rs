//! Ports - the seams between the engine and its collaborators.
//!
//! The engine only knows these traits; concrete sources, executors and sinks
//! live in `impls` or in the caller's crate.

pub mod clock;
pub mod event_sink;
pub mod executor;
pub mod id_generator;
pub mod source;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::executor::{CancelSupport, TaskExecutor};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::source::ItemSource;
