//! Queue module: the Dispatcher's bounded work queue.
//!
//! Design intent:
//! - The producer is the only writer; workers only claim.
//! - Capacity is the backpressure point for the item source.
//! - Halting is observed under the queue lock, so no claim can slip past it.

mod bounded;

pub use bounded::{Queued, WorkQueue};
