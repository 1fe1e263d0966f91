//! Least Loaded policy
//!
//! Picks the server expected to free soonest: the smallest `busy_until`,
//! where an idle server counts as free now. Ties go to the lowest server
//! index, so replays are exact without any randomness.

use super::{Decision, DispatchPolicy, SystemSnapshot};
use crate::models::Request;

/// Earliest-free server, lowest index on ties
#[derive(Debug, Clone, Default)]
pub struct LeastLoadedPolicy;

impl LeastLoadedPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchPolicy for LeastLoadedPolicy {
    fn name(&self) -> &str {
        "least_loaded"
    }

    fn select(&mut self, snapshot: &SystemSnapshot<'_>, _request: &Request) -> Decision {
        // (free_at, busy) so an idle server wins over a busy one completing
        // at this very instant; strict < keeps the lowest index on ties
        let mut best: Option<((f64, bool), usize)> = None;
        for server in snapshot.servers() {
            let key = (snapshot.free_at(server), !server.is_idle());
            let better = match best {
                None => true,
                Some(((t, busy), _)) => key.0 < t || (key.0 == t && busy && !key.1),
            };
            if better {
                best = Some((key, server.id()));
            }
        }
        match best {
            Some(((_, false), id)) => Decision::Assign(id),
            _ => Decision::Defer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Server;

    #[test]
    fn test_picks_lowest_index_among_idle() {
        let mut servers: Vec<Server> = (0..3).map(Server::new).collect();
        servers[0].assign(1, 0.0, 2.0);
        let snapshot = SystemSnapshot::new(1.0, &servers, 1);
        let mut policy = LeastLoadedPolicy::new();
        assert_eq!(
            policy.select(&snapshot, &Request::new(2, 1.0, 1.0, "a")),
            Decision::Assign(1)
        );
    }

    #[test]
    fn test_chosen_server_has_minimal_busy_until() {
        let mut servers: Vec<Server> = (0..4).map(Server::new).collect();
        servers[0].assign(1, 0.0, 9.0);
        servers[1].assign(2, 0.0, 3.0);
        servers[3].assign(3, 0.0, 4.0);
        let snapshot = SystemSnapshot::new(2.0, &servers, 1);
        let mut policy = LeastLoadedPolicy::new();

        let Decision::Assign(chosen) = policy.select(&snapshot, &Request::new(4, 2.0, 1.0, "a"))
        else {
            panic!("expected an assignment");
        };
        let chosen_free = snapshot.free_at(&servers[chosen]);
        for server in &servers {
            assert!(chosen_free <= snapshot.free_at(server));
        }
        assert_eq!(chosen, 2);
    }

    #[test]
    fn test_defers_when_all_busy() {
        let mut servers: Vec<Server> = (0..2).map(Server::new).collect();
        servers[0].assign(1, 0.0, 1.0);
        servers[1].assign(2, 0.0, 1.0);
        let snapshot = SystemSnapshot::new(0.0, &servers, 1);
        assert_eq!(
            LeastLoadedPolicy::new().select(&snapshot, &Request::new(3, 0.0, 1.0, "a")),
            Decision::Defer
        );
    }
}
