//! Round Robin policy
//!
//! Cycles servers in fixed index order regardless of load. From its cursor
//! it takes the first idle server; the cursor then moves past that server.
//! Tie-breaking is positional, never random.

use super::{Decision, DispatchPolicy, SystemSnapshot};
use crate::models::Request;

/// Round robin over server indices
///
/// # Example
///
/// ```
/// use dispatch_simulator_core_rs::policy::{Decision, DispatchPolicy, RoundRobinPolicy, SystemSnapshot};
/// use dispatch_simulator_core_rs::{Request, Server};
///
/// let servers = vec![Server::new(0), Server::new(1)];
/// let snapshot = SystemSnapshot::new(0.0, &servers, 1);
/// let req = Request::new(0, 0.0, 1.0, "quiz");
///
/// let mut policy = RoundRobinPolicy::new();
/// assert_eq!(policy.select(&snapshot, &req), Decision::Assign(0));
/// assert_eq!(policy.select(&snapshot, &req), Decision::Assign(1));
/// assert_eq!(policy.select(&snapshot, &req), Decision::Assign(0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoundRobinPolicy {
    cursor: usize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DispatchPolicy for RoundRobinPolicy {
    fn name(&self) -> &str {
        "round_robin"
    }

    fn select(&mut self, snapshot: &SystemSnapshot<'_>, _request: &Request) -> Decision {
        let n = snapshot.server_count();
        if n == 0 {
            return Decision::Defer;
        }
        let servers = snapshot.servers();
        for offset in 0..n {
            let idx = (self.cursor + offset) % n;
            if servers[idx].is_idle() {
                self.cursor = (idx + 1) % n;
                return Decision::Assign(servers[idx].id());
            }
        }
        Decision::Defer
    }
}
