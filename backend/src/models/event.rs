//! Simulation events and the dispatch event log.
//!
//! Two kinds of events live here:
//! - [`SimulationEvent`]: scheduled future events driving the clock
//!   (`Arrival`, `Completion`), held in an [`EventQueue`]
//! - [`Event`]: audit records of what the dispatcher did, appended to an
//!   [`EventLog`] in processing order
//!
//! # Ordering
//!
//! The event queue pops in `(timestamp, kind, sequence)` order:
//! 1. Earlier timestamp first
//! 2. At equal timestamps, `Completion` before `Arrival`, so a server frees
//!    before a same-instant arrival is considered for it
//! 3. Remaining ties in insertion order (FIFO)
//!
//! # Example
//!
//! ```rust
//! use dispatch_simulator_core_rs::models::{EventQueue, SimulationEvent};
//!
//! let mut queue = EventQueue::new();
//! queue.push(SimulationEvent::Arrival { timestamp: 1.0, request_index: 0 });
//! queue.push(SimulationEvent::Completion { timestamp: 1.0, server_id: 0, request_id: 7 });
//!
//! assert!(matches!(queue.pop(), Some(SimulationEvent::Completion { .. })));
//! assert!(matches!(queue.pop(), Some(SimulationEvent::Arrival { .. })));
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::request::RequestId;
use super::server::ServerId;

// ============================================================================
// Scheduled events
// ============================================================================

/// A future event on the simulation clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationEvent {
    /// A server finishes its in-flight request
    Completion {
        timestamp: f64,
        server_id: ServerId,
        request_id: RequestId,
    },

    /// A request reaches the system (index into the run's request list)
    Arrival {
        timestamp: f64,
        request_index: usize,
    },
}

impl SimulationEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            SimulationEvent::Completion { timestamp, .. } => *timestamp,
            SimulationEvent::Arrival { timestamp, .. } => *timestamp,
        }
    }

    /// Tie-break rank at equal timestamps (lower pops first)
    fn kind_rank(&self) -> u8 {
        match self {
            SimulationEvent::Completion { .. } => 0,
            SimulationEvent::Arrival { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    event: SimulationEvent,
    seq: u64,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.event
            .timestamp()
            .total_cmp(&other.event.timestamp())
            .then_with(|| self.event.kind_rank().cmp(&other.event.kind_rank()))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

/// Min-priority queue of pending simulation events
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SimulationEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { event, seq }));
    }

    pub fn pop(&mut self) -> Option<SimulationEvent> {
        self.heap.pop().map(|Reverse(s)| s.event)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// ============================================================================
// Dispatch event log
// ============================================================================

/// Audit record of a dispatcher action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Request entered the backlog
    Arrival {
        time: f64,
        request_id: RequestId,
        backlog_len: usize,
    },

    /// Policy placed a request on a server
    Assigned {
        time: f64,
        request_id: RequestId,
        server_id: ServerId,
        start_time: f64,
        completion_time: f64,
    },

    /// Policy deferred the backlog head although a server was idle
    Deferred {
        time: f64,
        request_id: RequestId,
        backlog_len: usize,
    },

    /// Server finished a request
    Completed {
        time: f64,
        request_id: RequestId,
        server_id: ServerId,
        sla_met: bool,
    },

    /// Run was cancelled between events
    Truncated {
        time: f64,
        pending_requests: usize,
    },
}

impl Event {
    /// Simulated time the event was recorded at
    pub fn time(&self) -> f64 {
        match self {
            Event::Arrival { time, .. } => *time,
            Event::Assigned { time, .. } => *time,
            Event::Deferred { time, .. } => *time,
            Event::Completed { time, .. } => *time,
            Event::Truncated { time, .. } => *time,
        }
    }

    /// Short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Arrival { .. } => "Arrival",
            Event::Assigned { .. } => "Assigned",
            Event::Deferred { .. } => "Deferred",
            Event::Completed { .. } => "Completed",
            Event::Truncated { .. } => "Truncated",
        }
    }

    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Event::Arrival { request_id, .. }
            | Event::Assigned { request_id, .. }
            | Event::Deferred { request_id, .. }
            | Event::Completed { request_id, .. } => Some(*request_id),
            Event::Truncated { .. } => None,
        }
    }
}

/// Ordered log of dispatcher events for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Events for a specific request, in processing order
    pub fn events_for_request(&self, request_id: RequestId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.request_id() == Some(request_id))
            .collect()
    }
}
