//! Server slots and the server pool
//!
//! Each server moves through `Idle → Busy (assignment) → Idle (completion)`
//! and holds at most one in-flight request. The pool is owned by exactly one
//! simulation run.

use serde::{Deserialize, Serialize};

use super::request::RequestId;

/// Server index within the pool (0-based)
pub type ServerId = usize;

/// One server slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    id: ServerId,
    /// Completion time of the in-flight request; `None` while idle
    busy_until: Option<f64>,
    current_request_id: Option<RequestId>,
    served: usize,
    busy_time: f64,
}

impl Server {
    pub fn new(id: ServerId) -> Self {
        Self {
            id,
            busy_until: None,
            current_request_id: None,
            served: 0,
            busy_time: 0.0,
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn is_idle(&self) -> bool {
        self.current_request_id.is_none()
    }

    pub fn busy_until(&self) -> Option<f64> {
        self.busy_until
    }

    pub fn current_request_id(&self) -> Option<RequestId> {
        self.current_request_id
    }

    /// Requests completed by this server
    pub fn served(&self) -> usize {
        self.served
    }

    /// Total time spent serving
    pub fn busy_time(&self) -> f64 {
        self.busy_time
    }

    /// Start serving a request
    ///
    /// # Panics
    /// Panics if the server is already busy (mutual exclusion invariant).
    pub fn assign(&mut self, request_id: RequestId, start_time: f64, completion_time: f64) {
        assert!(
            self.is_idle(),
            "server {} already serving request {:?}",
            self.id,
            self.current_request_id
        );
        self.current_request_id = Some(request_id);
        self.busy_until = Some(completion_time);
        self.busy_time += completion_time - start_time;
    }

    /// Free the server, returning the request it was serving
    pub fn release(&mut self) -> Option<RequestId> {
        let finished = self.current_request_id.take();
        if finished.is_some() {
            self.served += 1;
        }
        self.busy_until = None;
        finished
    }
}

/// Fixed pool of identical servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPool {
    servers: Vec<Server>,
}

impl ServerPool {
    /// Create a pool of `size` idle servers
    ///
    /// # Panics
    /// Panics if `size == 0`; configuration validation rejects that earlier.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "server pool must not be empty");
        Self {
            servers: (0..size).map(Server::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn get(&self, id: ServerId) -> Option<&Server> {
        self.servers.get(id)
    }

    pub fn get_mut(&mut self, id: ServerId) -> Option<&mut Server> {
        self.servers.get_mut(id)
    }

    pub fn occupied_count(&self) -> usize {
        self.servers.iter().filter(|s| !s.is_idle()).count()
    }

    pub fn idle_count(&self) -> usize {
        self.len() - self.occupied_count()
    }

    pub fn has_idle(&self) -> bool {
        self.servers.iter().any(Server::is_idle)
    }

    pub fn all_idle(&self) -> bool {
        self.servers.iter().all(Server::is_idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_and_release_cycle() {
        let mut server = Server::new(0);
        assert!(server.is_idle());

        server.assign(42, 1.0, 3.5);
        assert!(!server.is_idle());
        assert_eq!(server.busy_until(), Some(3.5));
        assert_eq!(server.current_request_id(), Some(42));

        assert_eq!(server.release(), Some(42));
        assert!(server.is_idle());
        assert_eq!(server.busy_until(), None);
        assert_eq!(server.served(), 1);
        assert!((server.busy_time() - 2.5).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "already serving")]
    fn test_double_assignment_panics() {
        let mut server = Server::new(1);
        server.assign(1, 0.0, 1.0);
        server.assign(2, 0.0, 1.0);
    }

    #[test]
    fn test_pool_counts() {
        let mut pool = ServerPool::new(3);
        assert_eq!(pool.idle_count(), 3);
        pool.get_mut(1).unwrap().assign(9, 0.0, 2.0);
        assert_eq!(pool.occupied_count(), 1);
        assert!(pool.has_idle());
        assert!(!pool.all_idle());
    }
}
