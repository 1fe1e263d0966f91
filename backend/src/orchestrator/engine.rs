//! Simulator Engine
//!
//! Discrete-event loop integrating all run components:
//! - Request arrivals (from a validated request stream)
//! - Policy evaluation (backlog → server assignment)
//! - Server occupancy (one in-flight request per server)
//! - Outcome recording (wait, response, SLA)
//! - Event logging (complete dispatch history)
//!
//! # Architecture
//!
//! ```text
//! Until the event queue is empty:
//! 1. Check cancellation (coarse-grained, once per event)
//! 2. Pop the next event, advance the clock
//! 3. Arrival    → append request to the backlog, schedule the next arrival
//!    Completion → free the server, finalize the outcome, feed the policy
//! 4. Drain the backlog while a server is idle and the policy assigns
//! ```
//!
//! Only the next arrival is ever scheduled, so the event queue holds at most
//! `server_count + 1` entries.
//!
//! The loop is single-threaded and runs to completion; the total order of
//! the event queue is what makes runs reproducible.
//!
//! # Example
//!
//! ```rust
//! use dispatch_simulator_core_rs::policy::LeastLoadedPolicy;
//! use dispatch_simulator_core_rs::rng::RngManager;
//! use dispatch_simulator_core_rs::{Request, RequestStream, SimConfig, Simulator};
//!
//! let config = SimConfig { server_count: 2, ..SimConfig::default() };
//! let stream = RequestStream::from_requests(vec![
//!     Request::new(0, 0.0, 1.0, "quiz"),
//!     Request::new(1, 0.0, 1.0, "quiz"),
//!     Request::new(2, 0.0, 1.0, "quiz"),
//! ]).unwrap();
//!
//! let mut policy = LeastLoadedPolicy::new();
//! let rng = RngManager::with_default_streams(7);
//! let result = Simulator::new(&config, &stream, &mut policy, &rng).unwrap().run().unwrap();
//!
//! assert_eq!(result.outcomes.len(), 3);
//! assert_eq!(result.summary.makespan, 2.0);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{SimClock, SimulationError};
use crate::metrics::{Aggregates, MetricsRecorder};
use crate::models::{
    Event, EventLog, EventQueue, OutcomeTable, Request, ServerPool, SimulationEvent,
};
use crate::orchestrator::SimConfig;
use crate::policy::{Decision, DecisionFeedback, DispatchPolicy, SystemSnapshot};
use crate::rng::{RngManager, SERVICE_TIME};
use crate::stream::RequestStream;

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag for aborting a run between events
///
/// Cloning shares the flag; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Run results
// ============================================================================

/// End-of-run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub policy: String,
    pub requests_in: usize,
    pub outcomes_out: usize,
    pub truncated: bool,
    /// Time of the last processed event
    pub makespan: f64,
    pub events_processed: usize,
    /// Highest number of simultaneously busy servers observed
    pub peak_occupancy: usize,
    /// Busy time / makespan per server
    pub utilization: Vec<f64>,
    /// `None` when no request completed
    pub aggregates: Option<Aggregates>,
}

/// Everything a finished (or cancelled) run produced
#[derive(Debug, Clone)]
pub struct RunResult {
    pub outcomes: OutcomeTable,
    pub event_log: EventLog,
    pub summary: RunSummary,
}

// ============================================================================
// Simulator
// ============================================================================

/// One simulation run over one request stream with one policy
///
/// The simulator owns its server pool, event queue and backlog exclusively;
/// nothing is shared across runs.
pub struct Simulator<'a> {
    policy: &'a mut dyn DispatchPolicy,
    requests: &'a [Request],
    /// Effective service time per request (after jitter)
    service_times: Vec<f64>,
    pool: ServerPool,
    queue: EventQueue,
    clock: SimClock,
    /// Indices into `requests`, FIFO
    backlog: VecDeque<usize>,
    recorder: MetricsRecorder,
    event_log: EventLog,
    cancel: Option<CancellationToken>,
    peak_occupancy: usize,
}

impl<'a> Simulator<'a> {
    /// Set up a run
    ///
    /// Validates the configuration and draws per-request service-time
    /// jitter (in stream order) from the `service_time` stream of `rng`.
    pub fn new(
        config: &SimConfig,
        stream: &'a RequestStream,
        policy: &'a mut dyn DispatchPolicy,
        rng: &RngManager,
    ) -> Result<Self, SimulationError> {
        config.validate()?;

        let requests = stream.requests();
        let service_times = if config.service_time_jitter > 0.0 {
            let mut service_rng = rng.stream(SERVICE_TIME)?;
            let j = config.service_time_jitter;
            requests
                .iter()
                .map(|r| r.service_time() * (1.0 - j + 2.0 * j * service_rng.next_f64()))
                .collect()
        } else {
            requests.iter().map(Request::service_time).collect()
        };

        Ok(Self {
            policy,
            requests,
            service_times,
            pool: ServerPool::new(config.server_count),
            queue: EventQueue::new(),
            clock: SimClock::new(),
            backlog: VecDeque::new(),
            recorder: MetricsRecorder::new(config.sla_seconds),
            event_log: EventLog::new(),
            cancel: None,
            peak_occupancy: 0,
        })
    }

    /// Abort the run when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run until the stream is exhausted and every server is idle
    pub fn run(mut self) -> Result<RunResult, SimulationError> {
        info!(
            policy = self.policy.name(),
            requests = self.requests.len(),
            servers = self.pool.len(),
            "simulation started"
        );

        if let Some(first) = self.requests.first() {
            self.queue.push(SimulationEvent::Arrival {
                timestamp: first.timestamp(),
                request_index: 0,
            });
        }

        let mut truncated = false;
        loop {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                truncated = true;
                break;
            }
            let Some(event) = self.queue.pop() else {
                break;
            };
            self.clock.advance_to(event.timestamp());

            match event {
                SimulationEvent::Arrival { request_index, .. } => {
                    self.handle_arrival(request_index);
                }
                SimulationEvent::Completion {
                    server_id,
                    request_id,
                    ..
                } => {
                    self.handle_completion(server_id, request_id)?;
                }
            }

            self.drain_backlog()?;
        }

        if truncated {
            let pending = self.requests.len() - self.recorder.len();
            warn!(
                policy = self.policy.name(),
                time = self.clock.now(),
                completed = self.recorder.len(),
                pending,
                "simulation cancelled, returning partial outcomes"
            );
            self.event_log.log(Event::Truncated {
                time: self.clock.now(),
                pending_requests: pending,
            });
        } else if self.backlog.is_empty() {
            // every busy server still has a pending completion
            debug_assert!(self.pool.all_idle(), "queue drained with a busy server");
        } else {
            return Err(SimulationError::PolicyContractViolation {
                policy: self.policy.name().to_string(),
                reason: format!(
                    "deferred {} backlogged requests with {} idle servers and no pending events",
                    self.backlog.len(),
                    self.pool.idle_count()
                ),
            });
        }

        Ok(self.finish(truncated))
    }

    fn handle_arrival(&mut self, request_index: usize) {
        let request = &self.requests[request_index];
        self.backlog.push_back(request_index);
        self.event_log.log(Event::Arrival {
            time: self.clock.now(),
            request_id: request.id(),
            backlog_len: self.backlog.len(),
        });

        if let Some(next) = self.requests.get(request_index + 1) {
            self.queue.push(SimulationEvent::Arrival {
                timestamp: next.timestamp(),
                request_index: request_index + 1,
            });
        }
    }

    fn handle_completion(
        &mut self,
        server_id: usize,
        request_id: u64,
    ) -> Result<(), SimulationError> {
        let now = self.clock.now();
        let released = self.pool.get_mut(server_id).and_then(|s| s.release());
        debug_assert_eq!(released, Some(request_id));

        let outcome = self.recorder.record_completion(request_id, now)?;
        let feedback = DecisionFeedback {
            request_id,
            server_id,
            wait_time: outcome.wait_time,
            response_time: outcome.response_time,
            sla_met: outcome.sla_met,
        };
        self.event_log.log(Event::Completed {
            time: now,
            request_id,
            server_id,
            sla_met: feedback.sla_met,
        });
        self.policy.observe(&feedback);
        Ok(())
    }

    /// Offer the backlog head to the policy while a server is idle
    fn drain_backlog(&mut self) -> Result<(), SimulationError> {
        let now = self.clock.now();

        while let Some(&index) = self.backlog.front() {
            if !self.pool.has_idle() {
                break;
            }
            let request = &self.requests[index];
            let snapshot = SystemSnapshot::new(now, self.pool.servers(), self.backlog.len());

            match self.policy.select(&snapshot, request) {
                Decision::Defer => {
                    debug!(request_id = request.id(), time = now, "policy deferred");
                    self.event_log.log(Event::Deferred {
                        time: now,
                        request_id: request.id(),
                        backlog_len: self.backlog.len(),
                    });
                    break;
                }
                Decision::Assign(server_id) => {
                    let server = self.pool.get_mut(server_id).ok_or_else(|| {
                        SimulationError::PolicyContractViolation {
                            policy: self.policy.name().to_string(),
                            reason: format!(
                                "assigned request {} to unknown server {}",
                                request.id(),
                                server_id
                            ),
                        }
                    })?;
                    if !server.is_idle() {
                        return Err(SimulationError::PolicyContractViolation {
                            policy: self.policy.name().to_string(),
                            reason: format!(
                                "assigned request {} to busy server {}",
                                request.id(),
                                server_id
                            ),
                        });
                    }

                    let start_time = now.max(server.busy_until().unwrap_or(now));
                    let completion_time = start_time + self.service_times[index];
                    server.assign(request.id(), start_time, completion_time);
                    self.backlog.pop_front();

                    self.recorder.record_start(request, server_id, start_time);
                    self.queue.push(SimulationEvent::Completion {
                        timestamp: completion_time,
                        server_id,
                        request_id: request.id(),
                    });
                    self.event_log.log(Event::Assigned {
                        time: now,
                        request_id: request.id(),
                        server_id,
                        start_time,
                        completion_time,
                    });

                    let occupied = self.pool.occupied_count();
                    debug_assert!(occupied <= self.pool.len());
                    self.peak_occupancy = self.peak_occupancy.max(occupied);
                }
            }
        }
        Ok(())
    }

    fn finish(self, truncated: bool) -> RunResult {
        let makespan = self.clock.now();
        let utilization = self
            .pool
            .servers()
            .iter()
            .map(|s| if makespan > 0.0 { s.busy_time() / makespan } else { 0.0 })
            .collect();
        let outcomes = self.recorder.finalize(truncated);

        let summary = RunSummary {
            policy: self.policy.name().to_string(),
            requests_in: self.requests.len(),
            outcomes_out: outcomes.len(),
            truncated,
            makespan,
            events_processed: self.clock.events_processed(),
            peak_occupancy: self.peak_occupancy,
            utilization,
            aggregates: Aggregates::from_table(&outcomes),
        };

        if let Some(agg) = &summary.aggregates {
            info!(
                policy = %summary.policy,
                outcomes = summary.outcomes_out,
                mean_response = agg.mean_response_time,
                p95_response = agg.p95_response_time,
                sla_pct = agg.sla_percentage,
                makespan,
                "simulation finished"
            );
        } else {
            info!(policy = %summary.policy, "simulation finished with no outcomes");
        }

        RunResult {
            outcomes,
            event_log: self.event_log,
            summary,
        }
    }
}

/// Convenience wrapper: set up and run in one call
pub fn simulate(
    config: &SimConfig,
    stream: &RequestStream,
    policy: &mut dyn DispatchPolicy,
    rng: &RngManager,
) -> Result<RunResult, SimulationError> {
    Simulator::new(config, stream, policy, rng)?.run()
}
