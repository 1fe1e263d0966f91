//! Domain models for the dispatch simulator

pub mod event;
pub mod outcome;
pub mod request;
pub mod server;

// Re-exports
pub use event::{Event, EventLog, EventQueue, SimulationEvent};
pub use outcome::{Outcome, OutcomeTable};
pub use request::{Request, RequestId, PASSTHROUGH_FIELDS};
pub use server::{Server, ServerId, ServerPool};
