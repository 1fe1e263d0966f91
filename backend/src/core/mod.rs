//! Core building blocks shared by every simulation component

pub mod error;
pub mod time;

pub use error::SimulationError;
pub use time::SimClock;
