//! Dispatch Simulator Core - Rust Engine
//!
//! Discrete-event simulator of a pool of identical servers handling a
//! time-ordered stream of requests, with pluggable dispatch policies and
//! bootstrap confidence intervals for comparing them.
//!
//! # Architecture
//!
//! - **core**: Simulation clock and error taxonomy
//! - **rng**: Named deterministic random streams
//! - **models**: Domain types (Request, Server, events, outcomes)
//! - **stream**: Input row validation into a request stream
//! - **arrivals**: Synthetic workload generation
//! - **policy**: Dispatch policies (round robin, least loaded, hierarchical RL)
//! - **metrics**: Outcome recording and aggregates
//! - **bootstrap**: Confidence intervals over outcome tables
//! - **orchestrator**: Configuration, event loop, experiments
//!
//! # Critical Invariants
//!
//! 1. All randomness is deterministic (named streams derived from one seed)
//! 2. A server holds at most one in-flight request
//! 3. Every request that enters a finished run produces exactly one outcome
//!
//! The library emits `tracing` events and never installs a subscriber.

// Module declarations
pub mod arrivals;
pub mod bootstrap;
pub mod core;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod stream;

// Re-exports for convenience
pub use bootstrap::{BootstrapEstimator, Metric, SummaryRow};
pub use core::{SimClock, SimulationError};
pub use metrics::{Aggregates, MetricsRecorder};
pub use models::{Event, EventLog, Outcome, OutcomeTable, Request, Server, ServerPool};
pub use orchestrator::{
    run_experiment, simulate, CancellationToken, ExperimentReport, RunResult, Seeds, SimConfig,
    Simulator,
};
pub use policy::{DispatchPolicy, PolicyConfig};
pub use rng::RngManager;
pub use stream::RequestStream;
