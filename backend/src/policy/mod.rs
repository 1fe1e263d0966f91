//! Dispatch Policy Module
//!
//! This module defines the policy interface consulted by the simulator
//! whenever a backlogged request could be placed on an idle server.
//!
//! # Policy Interface
//!
//! All policies implement the [`DispatchPolicy`] trait:
//! ```rust
//! use dispatch_simulator_core_rs::policy::{Decision, DispatchPolicy, SystemSnapshot};
//! use dispatch_simulator_core_rs::Request;
//!
//! struct FirstIdle;
//!
//! impl DispatchPolicy for FirstIdle {
//!     fn name(&self) -> &str {
//!         "first_idle"
//!     }
//!
//!     fn select(&mut self, snapshot: &SystemSnapshot<'_>, _request: &Request) -> Decision {
//!         snapshot
//!             .idle_servers()
//!             .next()
//!             .map(|s| Decision::Assign(s.id()))
//!             .unwrap_or(Decision::Defer)
//!     }
//! }
//! ```
//!
//! # Contract
//!
//! - `Assign(id)` must name an existing, idle server
//! - `Defer` leaves the request at the head of the backlog
//! - Decisions depend only on the snapshot, the request and the policy's
//!   own state (cursor, learned values, private RNG stream), so a run can be
//!   replayed exactly
//!
//! Violations abort the run with `PolicyContractViolation`.
//!
//! # Available policies
//!
//! 1. **RoundRobin**: cycle servers in index order
//! 2. **LeastLoaded**: earliest `busy_until`, lowest index on ties
//! 3. **RlHierarchical**: learned two-level policy (see [`rl`])

use serde::{Deserialize, Serialize};

use crate::core::SimulationError;
use crate::models::{Request, RequestId, Server, ServerId};

pub mod least_loaded;
pub mod rl;
pub mod round_robin;

pub use least_loaded::LeastLoadedPolicy;
pub use round_robin::RoundRobinPolicy;

/// What a policy wants done with the request it was shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Start the request on this server now
    Assign(ServerId),

    /// Keep the request in the backlog
    Defer,
}

/// Read-only view of the system at a decision point
#[derive(Debug, Clone, Copy)]
pub struct SystemSnapshot<'a> {
    now: f64,
    servers: &'a [Server],
    backlog_len: usize,
}

impl<'a> SystemSnapshot<'a> {
    pub fn new(now: f64, servers: &'a [Server], backlog_len: usize) -> Self {
        Self {
            now,
            servers,
            backlog_len,
        }
    }

    /// Current simulated time
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn servers(&self) -> &'a [Server] {
        self.servers
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Requests waiting in the backlog, including the one being decided
    pub fn backlog_len(&self) -> usize {
        self.backlog_len
    }

    pub fn idle_servers(&self) -> impl Iterator<Item = &'a Server> + 'a {
        self.servers.iter().filter(|s| s.is_idle())
    }

    pub fn occupied_count(&self) -> usize {
        self.servers.iter().filter(|s| !s.is_idle()).count()
    }

    /// Time at which a server can take new work (idle servers: now)
    pub fn free_at(&self, server: &Server) -> f64 {
        server.busy_until().unwrap_or(self.now)
    }
}

/// Realized result of an earlier decision, delivered on completion
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionFeedback {
    pub request_id: RequestId,
    pub server_id: ServerId,
    pub wait_time: f64,
    pub response_time: f64,
    pub sla_met: bool,
}

/// Dispatch policy trait
///
/// `select` is called only while at least one server is idle. `observe` is
/// the training hook: it receives the realized outcome of every assignment
/// and is a no-op for static policies.
pub trait DispatchPolicy: Send {
    /// Stable policy name used in summary tables
    fn name(&self) -> &str;

    /// Pick a server for the request at the head of the backlog
    fn select(&mut self, snapshot: &SystemSnapshot<'_>, request: &Request) -> Decision;

    /// Feedback about a completed request this policy dispatched
    fn observe(&mut self, _feedback: &DecisionFeedback) {}
}

/// Policy selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Cycle servers in fixed index order
    RoundRobin,

    /// Server that frees soonest
    LeastLoaded,

    /// Learned hierarchical policy (trained before evaluation)
    RlHierarchical,
}

impl PolicyConfig {
    /// Resolve a policy by name
    pub fn from_name(name: &str) -> Result<Self, SimulationError> {
        match name {
            "round_robin" => Ok(PolicyConfig::RoundRobin),
            "least_loaded" => Ok(PolicyConfig::LeastLoaded),
            "rl_hierarchical" => Ok(PolicyConfig::RlHierarchical),
            other => Err(SimulationError::Configuration(format!(
                "unknown policy '{}' (expected round_robin, least_loaded or rl_hierarchical)",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyConfig::RoundRobin => "round_robin",
            PolicyConfig::LeastLoaded => "least_loaded",
            PolicyConfig::RlHierarchical => "rl_hierarchical",
        }
    }

    pub fn is_trainable(&self) -> bool {
        matches!(self, PolicyConfig::RlHierarchical)
    }
}

/// Build a static (non-learning) policy
///
/// Learned policies need a trained snapshot; build them with
/// [`rl::HierarchicalPolicy::new`] after [`rl::train`].
pub fn build_static_policy(
    config: &PolicyConfig,
) -> Result<Box<dyn DispatchPolicy>, SimulationError> {
    match config {
        PolicyConfig::RoundRobin => Ok(Box::new(RoundRobinPolicy::new())),
        PolicyConfig::LeastLoaded => Ok(Box::new(LeastLoadedPolicy::new())),
        PolicyConfig::RlHierarchical => Err(SimulationError::Configuration(
            "rl_hierarchical must be trained before it can dispatch".to_string(),
        )),
    }
}
