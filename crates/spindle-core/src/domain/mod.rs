//! Domain model (envelope, context, outcome, state, events).

pub mod context;
pub mod envelope;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod state;

pub(crate) mod millis;

pub use context::{Context, ContextBuilder};
pub use envelope::Envelope;
pub use events::{EngineEvent, SourceStop};
pub use ids::RunId;
pub use outcome::{FailureSummary, Outcome, OutcomeKind, TaskFailure};
pub use state::{EngineState, TerminationStatus};
