//! Hierarchical reinforcement-learning dispatch policy
//!
//! # Hierarchy
//!
//! ```text
//! high level:  StateKey ──► HighAction ──► target cluster ──(idle fallback)──► cluster
//! low level:   (StateKey, cluster) ──► slot ──► server
//! ```
//!
//! Servers are split into `cluster_count` contiguous clusters. The high
//! level chooses how to pick a cluster; the low level chooses an idle server
//! inside it. State features are discretized into buckets (backlog length,
//! pool occupancy, request type).
//!
//! # Lifecycle
//!
//! 1. [`train`] owns a mutable [`PolicyState`] and runs episodes with a
//!    [`TrainingPolicy`]
//! 2. The final state is published once as an `Arc<PolicySnapshot>`
//! 3. Any number of [`HierarchicalPolicy`] instances evaluate greedily over
//!    that snapshot, possibly on several threads; none can modify it

mod hierarchy;
mod schedule;
mod state;
mod trainer;

pub use hierarchy::{HierarchicalPolicy, HighAction, PolicySnapshot, PolicyState, Step};
pub use schedule::EpsilonSchedule;
pub use state::{ClusterLayout, LowKey, StateKey};
pub use trainer::{
    train, DivergenceWarning, EpisodeStats, TrainingPolicy, TrainingReport, ValueLevel,
};
