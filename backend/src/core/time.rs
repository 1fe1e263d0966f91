//! Simulation clock
//!
//! The simulation advances in continuous time, jumping from event to event.
//! The clock never moves backwards; every event pop goes through
//! [`SimClock::advance_to`].

use serde::{Deserialize, Serialize};

/// Event-driven simulation clock
///
/// # Example
/// ```
/// use dispatch_simulator_core_rs::SimClock;
///
/// let mut clock = SimClock::new();
/// assert_eq!(clock.now(), 0.0);
///
/// clock.advance_to(2.5);
/// assert_eq!(clock.now(), 2.5);
/// assert_eq!(clock.events_processed(), 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulated time (seconds)
    now: f64,
    /// Number of events the clock has been advanced for
    events_processed: usize,
}

impl SimClock {
    /// Create a clock at t = 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock to the timestamp of the next event
    ///
    /// # Panics
    /// Panics if `timestamp` is earlier than the current time. The event
    /// queue guarantees this never happens; a panic here means the ordering
    /// invariant is broken.
    pub fn advance_to(&mut self, timestamp: f64) {
        assert!(
            timestamp >= self.now,
            "clock cannot move backwards: {} -> {}",
            self.now,
            timestamp
        );
        self.now = timestamp;
        self.events_processed += 1;
    }

    /// Current simulated time
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of events processed so far
    pub fn events_processed(&self) -> usize {
        self.events_processed
    }
}
