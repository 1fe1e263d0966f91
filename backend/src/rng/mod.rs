//! Deterministic random number generation
//!
//! Uses xorshift64* streams whose seeds are derived from one root seed.
//! CRITICAL: All randomness in the simulator MUST go through this module.
//! Each purpose (service-time jitter, exploration, resampling, ...) gets its
//! own named stream so draws for one purpose never shift another.

mod manager;
mod xorshift;

pub use manager::{
    RngManager, ARRIVAL_JITTER, BOOTSTRAP, DEFAULT_STREAMS, POLICY_EXPLORE, POLICY_TIEBREAK,
    SERVICE_TIME,
};
pub use xorshift::RngStream;
