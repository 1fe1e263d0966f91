//! Two-level value tables and the decision procedure
//!
//! The high level picks a cluster-choice rule ([`HighAction`]); the low
//! level picks an idle server slot inside the resulting cluster. Both
//! levels are tabular. [`PolicyState`] is the mutable table owned by the
//! trainer; [`PolicySnapshot`] is its frozen copy used for evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::state::{stable_type_hash, ClusterLayout, LowKey, StateKey};
use crate::models::{Request, ServerId};
use crate::policy::{Decision, DispatchPolicy, SystemSnapshot};
use crate::rng::RngStream;

/// Coarse action of the high level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HighAction {
    /// Cluster with the most idle servers (lowest index on ties)
    LeastLoadedCluster,

    /// Cluster the request type hashes to
    TypeAffinityCluster,
}

impl HighAction {
    pub const ALL: [HighAction; 2] = [
        HighAction::LeastLoadedCluster,
        HighAction::TypeAffinityCluster,
    ];

    pub fn index(self) -> usize {
        match self {
            HighAction::LeastLoadedCluster => 0,
            HighAction::TypeAffinityCluster => 1,
        }
    }

    /// Cluster this action aims at, before idle fallback
    fn target_cluster(
        self,
        layout: &ClusterLayout,
        snapshot: &SystemSnapshot<'_>,
        request: &Request,
    ) -> usize {
        match self {
            HighAction::LeastLoadedCluster => {
                let servers = snapshot.servers();
                let mut best = (0, 0);
                for c in 0..layout.cluster_count() {
                    let idle = servers[layout.range(c)].iter().filter(|s| s.is_idle()).count();
                    if idle > best.1 {
                        best = (c, idle);
                    }
                }
                best.0
            }
            HighAction::TypeAffinityCluster => {
                (stable_type_hash(request.request_type()) % layout.cluster_count() as u64) as usize
            }
        }
    }
}

/// One decision as taken, enough to replay its value update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub state: StateKey,
    pub action: HighAction,
    /// Cluster actually used (after fallback)
    pub low_key: LowKey,
    /// Server position within the effective cluster
    pub slot: usize,
    pub server_id: ServerId,
}

// ============================================================================
// Value tables
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ValueTables {
    pub(crate) cluster_count: usize,
    pub(crate) high: BTreeMap<StateKey, [f64; 2]>,
    pub(crate) low: BTreeMap<LowKey, Vec<f64>>,
}

impl ValueTables {
    fn new(cluster_count: usize) -> Self {
        Self {
            cluster_count,
            ..Self::default()
        }
    }

    pub(crate) fn high_value(&self, state: &StateKey, action: HighAction) -> f64 {
        self.high.get(state).map_or(0.0, |v| v[action.index()])
    }

    pub(crate) fn high_max(&self, state: &StateKey) -> f64 {
        self.high.get(state).map_or(0.0, |v| v[0].max(v[1]))
    }

    pub(crate) fn low_value(&self, key: &LowKey, slot: usize) -> f64 {
        self.low
            .get(key)
            .and_then(|v| v.get(slot))
            .copied()
            .unwrap_or(0.0)
    }

    pub(crate) fn low_max(&self, key: &LowKey) -> f64 {
        match self.low.get(key) {
            Some(values) if !values.is_empty() => {
                values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }
            _ => 0.0,
        }
    }

    pub(crate) fn set_high(&mut self, state: StateKey, action: HighAction, value: f64) {
        self.high.entry(state).or_insert([0.0; 2])[action.index()] = value;
    }

    pub(crate) fn set_low(&mut self, key: LowKey, slot: usize, value: f64) {
        let values = self.low.entry(key).or_default();
        if values.len() <= slot {
            values.resize(slot + 1, 0.0);
        }
        values[slot] = value;
    }

    fn greedy_action(&self, state: &StateKey) -> HighAction {
        // strict > keeps the first action on ties
        let mut best = HighAction::ALL[0];
        for action in HighAction::ALL.into_iter().skip(1) {
            if self.high_value(state, action) > self.high_value(state, best) {
                best = action;
            }
        }
        best
    }

    /// Decide for `request`; `explore` is `(rng, epsilon)` during training
    ///
    /// Returns `None` only when no server is idle.
    pub(crate) fn decide(
        &self,
        snapshot: &SystemSnapshot<'_>,
        request: &Request,
        mut explore: Option<(&mut RngStream, f64)>,
    ) -> Option<Step> {
        let layout = ClusterLayout::new(snapshot.server_count(), self.cluster_count);
        let servers = snapshot.servers();
        let state = StateKey::observe(snapshot, request.request_type());

        let action = match explore_pick(&mut explore, HighAction::ALL.len()) {
            Some(i) => HighAction::ALL[i],
            None => self.greedy_action(&state),
        };

        let target = action.target_cluster(&layout, snapshot, request);
        let cluster = nearest_cluster_with_idle(&layout, snapshot, target)?;
        let low_key = LowKey { state, cluster };

        let range = layout.range(cluster);
        let idle_slots: Vec<usize> = range
            .clone()
            .filter(|&i| servers[i].is_idle())
            .map(|i| i - range.start)
            .collect();

        let slot = match explore_pick(&mut explore, idle_slots.len()) {
            Some(i) => idle_slots[i],
            None => {
                let mut best = idle_slots[0];
                for &slot in &idle_slots[1..] {
                    if self.low_value(&low_key, slot) > self.low_value(&low_key, best) {
                        best = slot;
                    }
                }
                best
            }
        };

        Some(Step {
            state,
            action,
            low_key,
            slot,
            server_id: servers[range.start + slot].id(),
        })
    }
}

/// Uniform index in `[0, choices)` with probability epsilon, else `None`
fn explore_pick(explore: &mut Option<(&mut RngStream, f64)>, choices: usize) -> Option<usize> {
    let (rng, epsilon) = explore.as_mut()?;
    if rng.next_f64() < *epsilon {
        Some(rng.next_index(choices))
    } else {
        None
    }
}

/// `target` if it has an idle server, else the closest cluster that does
/// (lower index first at equal distance)
fn nearest_cluster_with_idle(
    layout: &ClusterLayout,
    snapshot: &SystemSnapshot<'_>,
    target: usize,
) -> Option<usize> {
    let servers = snapshot.servers();
    let has_idle = |c: usize| servers[layout.range(c)].iter().any(|s| s.is_idle());
    let k = layout.cluster_count();
    for distance in 0..k {
        if distance <= target && has_idle(target - distance) {
            return Some(target - distance);
        }
        if target + distance < k && has_idle(target + distance) {
            return Some(target + distance);
        }
    }
    None
}

// ============================================================================
// Trainer-owned state and published snapshot
// ============================================================================

/// Mutable value tables, owned by exactly one trainer
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyState {
    pub(crate) tables: ValueTables,
}

impl PolicyState {
    pub fn new(cluster_count: usize) -> Self {
        Self {
            tables: ValueTables::new(cluster_count.max(1)),
        }
    }

    /// Number of (state, action) entries learned at either level
    pub fn entries(&self) -> usize {
        self.tables.high.len() + self.tables.low.len()
    }

    /// Freeze a copy for evaluation
    pub fn publish(&self) -> Arc<PolicySnapshot> {
        Arc::new(PolicySnapshot {
            tables: self.tables.clone(),
        })
    }
}

/// Immutable learned values shared by evaluation runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    tables: ValueTables,
}

impl PolicySnapshot {
    pub fn cluster_count(&self) -> usize {
        self.tables.cluster_count
    }

    pub fn high_value(&self, state: &StateKey, action: HighAction) -> f64 {
        self.tables.high_value(state, action)
    }

    pub fn low_value(&self, key: &LowKey, slot: usize) -> f64 {
        self.tables.low_value(key, slot)
    }

    pub fn to_json(&self) -> Result<String, crate::core::SimulationError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Greedy evaluation policy over a frozen snapshot
///
/// # Example
///
/// ```
/// use dispatch_simulator_core_rs::policy::rl::{HierarchicalPolicy, PolicyState};
/// use dispatch_simulator_core_rs::policy::{Decision, DispatchPolicy, SystemSnapshot};
/// use dispatch_simulator_core_rs::{Request, Server};
///
/// let snapshot = PolicyState::new(2).publish();
/// let mut policy = HierarchicalPolicy::new(snapshot);
///
/// let servers: Vec<Server> = (0..4).map(Server::new).collect();
/// let view = SystemSnapshot::new(0.0, &servers, 1);
/// // untrained: least-loaded cluster, first slot
/// assert_eq!(policy.select(&view, &Request::new(0, 0.0, 1.0, "quiz")), Decision::Assign(0));
/// ```
#[derive(Debug, Clone)]
pub struct HierarchicalPolicy {
    snapshot: Arc<PolicySnapshot>,
}

impl HierarchicalPolicy {
    pub fn new(snapshot: Arc<PolicySnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Arc<PolicySnapshot> {
        &self.snapshot
    }
}

impl DispatchPolicy for HierarchicalPolicy {
    fn name(&self) -> &str {
        "rl_hierarchical"
    }

    fn select(&mut self, snapshot: &SystemSnapshot<'_>, request: &Request) -> Decision {
        self.snapshot
            .tables
            .decide(snapshot, request, None)
            .map_or(Decision::Defer, |step| Decision::Assign(step.server_id))
    }
}
