//! Orchestrator: configuration, the simulation loop and experiments
//!
//! See `engine.rs` for the event loop and `experiment.rs` for running
//! several policies over several seeds.

pub mod config;
pub mod engine;
pub mod experiment;
pub mod manifest;

// Re-export main types for convenience
pub use config::{EpsilonDecay, RlConfig, Seeds, SimConfig};
pub use engine::{simulate, CancellationToken, RunResult, RunSummary, Simulator};
pub use experiment::{run_experiment, ExperimentReport, PolicyRun};
pub use manifest::{compute_config_hash, RunManifest};
