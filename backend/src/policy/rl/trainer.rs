//! Episodic training of the hierarchical policy
//!
//! Each episode runs the full simulator with a [`TrainingPolicy`] that
//! explores epsilon-greedily and records every decision. When the episode
//! ends, TD(0) updates are applied in decision order:
//!
//! ```text
//! Q(s,a) += α · (r + γ · max Q(s',·) − Q(s,a))
//! ```
//!
//! where `s'` is the state of the next decision in the episode (the last
//! decision is terminal). The reward of a decision is
//! `-(wait_time) - sla_penalty` when its request missed the SLA and
//! `-(wait_time)` otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::hierarchy::{PolicySnapshot, PolicyState, Step};
use super::schedule::EpsilonSchedule;
use crate::core::SimulationError;
use crate::models::{Request, RequestId};
use crate::orchestrator::{simulate, RlConfig, SimConfig};
use crate::policy::{Decision, DecisionFeedback, DispatchPolicy, SystemSnapshot};
use crate::rng::{RngManager, RngStream, POLICY_EXPLORE};
use crate::stream::RequestStream;

/// Which value table a clipped update belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueLevel {
    High,
    Low,
}

/// A value update that left `[-value_bound, value_bound]` and was clipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceWarning {
    pub episode: usize,
    pub level: ValueLevel,
    /// Unclipped result of the update
    pub raw_value: f64,
    pub clipped_to: f64,
}

/// Per-episode training statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub episode: usize,
    pub epsilon: f64,
    pub requests: usize,
    pub decisions: usize,
    pub mean_reward: f64,
    pub sla_percentage: f64,
    pub divergences: usize,
}

/// Result of [`train`]
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Learned values, frozen for evaluation
    pub snapshot: Arc<PolicySnapshot>,
    pub episodes: Vec<EpisodeStats>,
    pub divergences: Vec<DivergenceWarning>,
}

#[derive(Debug, Clone)]
struct Transition {
    step: Step,
    reward: Option<f64>,
}

/// Exploring policy used during one training episode
///
/// Owns the [`PolicyState`] for the duration of the episode and hands it
/// back from [`TrainingPolicy::finish_episode`].
pub struct TrainingPolicy {
    state: PolicyState,
    epsilon: f64,
    sla_penalty: f64,
    explore: RngStream,
    trajectory: Vec<Transition>,
    pending: HashMap<RequestId, usize>,
}

impl TrainingPolicy {
    pub fn new(state: PolicyState, epsilon: f64, sla_penalty: f64, explore: RngStream) -> Self {
        Self {
            state,
            epsilon,
            sla_penalty,
            explore,
            trajectory: Vec::new(),
            pending: HashMap::new(),
        }
    }

    pub fn decisions(&self) -> usize {
        self.trajectory.len()
    }

    /// Apply the episode's TD updates and give the state back
    pub fn finish_episode(
        mut self,
        episode: usize,
        config: &RlConfig,
    ) -> (PolicyState, Vec<DivergenceWarning>) {
        let mut divergences = Vec::new();
        let tables = &mut self.state.tables;
        let alpha = config.learning_rate;
        let gamma = config.discount;
        let bound = config.value_bound;

        let mut clip = |raw: f64, level: ValueLevel| -> f64 {
            if raw.is_finite() && raw.abs() <= bound {
                return raw;
            }
            let clipped = if raw.is_nan() {
                0.0
            } else {
                raw.clamp(-bound, bound)
            };
            warn!(episode, ?level, raw, clipped, "value update diverged, clipping");
            divergences.push(DivergenceWarning {
                episode,
                level,
                raw_value: raw,
                clipped_to: clipped,
            });
            clipped
        };

        for i in 0..self.trajectory.len() {
            let step = self.trajectory[i].step;
            // a decision whose request never completed carries no signal
            let Some(reward) = self.trajectory[i].reward else {
                continue;
            };
            let next = self.trajectory.get(i + 1).map(|t| t.step);

            let high_next = next.map_or(0.0, |n| tables.high_max(&n.state));
            let q = tables.high_value(&step.state, step.action);
            let updated = clip(q + alpha * (reward + gamma * high_next - q), ValueLevel::High);
            tables.set_high(step.state, step.action, updated);

            let low_next = next.map_or(0.0, |n| tables.low_max(&n.low_key));
            let q = tables.low_value(&step.low_key, step.slot);
            let updated = clip(q + alpha * (reward + gamma * low_next - q), ValueLevel::Low);
            tables.set_low(step.low_key, step.slot, updated);
        }

        (self.state, divergences)
    }

    fn mean_reward(&self) -> f64 {
        let rewards: Vec<f64> = self.trajectory.iter().filter_map(|t| t.reward).collect();
        if rewards.is_empty() {
            0.0
        } else {
            rewards.iter().sum::<f64>() / rewards.len() as f64
        }
    }
}

impl DispatchPolicy for TrainingPolicy {
    fn name(&self) -> &str {
        "rl_hierarchical"
    }

    fn select(&mut self, snapshot: &SystemSnapshot<'_>, request: &Request) -> Decision {
        let step = self.state.tables.decide(
            snapshot,
            request,
            Some((&mut self.explore, self.epsilon)),
        );
        match step {
            Some(step) => {
                self.pending.insert(request.id(), self.trajectory.len());
                self.trajectory.push(Transition { step, reward: None });
                Decision::Assign(step.server_id)
            }
            None => Decision::Defer,
        }
    }

    fn observe(&mut self, feedback: &DecisionFeedback) {
        if let Some(index) = self.pending.remove(&feedback.request_id) {
            let penalty = if feedback.sla_met { 0.0 } else { self.sla_penalty };
            self.trajectory[index].reward = Some(-feedback.wait_time - penalty);
        }
    }
}

/// Train the hierarchical policy on `stream`
///
/// Episodes run sequentially. With `episode_length` set, episode `e` replays
/// a contiguous window whose offset is drawn from the `(policy_explore,
/// "window", e)` substream; exploration within the episode uses
/// `(policy_explore, "episode", e)`. Training is therefore reproducible from
/// the root seed of `rng` alone.
pub fn train(
    config: &SimConfig,
    stream: &RequestStream,
    rng: &RngManager,
) -> Result<TrainingReport, SimulationError> {
    config.validate()?;
    let rl = &config.rl;
    let schedule = EpsilonSchedule::from_config(rl);
    let mut state = PolicyState::new(rl.cluster_count);
    let mut episodes = Vec::with_capacity(rl.episodes);
    let mut divergences = Vec::new();

    info!(
        episodes = rl.episodes,
        requests = stream.len(),
        clusters = rl.cluster_count,
        "training started"
    );

    for episode in 0..rl.episodes {
        let epsilon = schedule.epsilon_at(episode);

        let windowed;
        let episode_stream = match rl.episode_length {
            Some(len) if len < stream.len() => {
                let offset = rng
                    .substream(POLICY_EXPLORE, "window", episode as u64)?
                    .next_index(stream.len() - len + 1);
                windowed = stream.window(offset, len);
                &windowed
            }
            _ => stream,
        };

        let explore = rng.substream(POLICY_EXPLORE, "episode", episode as u64)?;
        let mut policy = TrainingPolicy::new(state, epsilon, rl.sla_penalty, explore);
        let result = simulate(config, episode_stream, &mut policy, rng)?;

        let decisions = policy.decisions();
        let mean_reward = policy.mean_reward();
        let (next_state, mut warnings) = policy.finish_episode(episode, rl);
        state = next_state;

        let stats = EpisodeStats {
            episode,
            epsilon,
            requests: episode_stream.len(),
            decisions,
            mean_reward,
            sla_percentage: result
                .summary
                .aggregates
                .as_ref()
                .map_or(f64::NAN, |a| a.sla_percentage),
            divergences: warnings.len(),
        };
        info!(
            episode,
            epsilon,
            mean_reward,
            sla_pct = stats.sla_percentage,
            divergences = stats.divergences,
            "training episode finished"
        );
        episodes.push(stats);
        divergences.append(&mut warnings);
    }

    info!(
        entries = state.entries(),
        divergences = divergences.len(),
        "training finished"
    );

    Ok(TrainingReport {
        snapshot: state.publish(),
        episodes,
        divergences,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::rl::HighAction;

    fn stream(n: usize) -> RequestStream {
        RequestStream::from_requests(
            (0..n)
                .map(|i| {
                    let kind = if i % 2 == 0 { "a" } else { "b" };
                    Request::new(i as u64, i as f64 * 0.25, 1.0, kind)
                })
                .collect(),
        )
        .unwrap()
    }

    fn config(episodes: usize) -> SimConfig {
        let mut config = SimConfig {
            server_count: 4,
            ..SimConfig::default()
        };
        config.rl.episodes = episodes;
        config.rl.epsilon_decay_episodes = episodes;
        config
    }

    #[test]
    fn test_training_runs_every_episode() {
        let rng = RngManager::with_default_streams(3);
        let report = train(&config(5), &stream(20), &rng).unwrap();
        assert_eq!(report.episodes.len(), 5);
        assert!(report.episodes.iter().all(|e| e.decisions == 20));
        assert!(report.divergences.is_empty());
    }

    #[test]
    fn test_training_is_reproducible() {
        let rng = RngManager::with_default_streams(3);
        let a = train(&config(4), &stream(16), &rng).unwrap();
        let b = train(&config(4), &stream(16), &rng).unwrap();
        assert_eq!(a.snapshot, b.snapshot);
        assert_eq!(a.episodes, b.episodes);
    }

    #[test]
    fn test_episode_windows_limit_requests() {
        let mut cfg = config(3);
        cfg.rl.episode_length = Some(5);
        let rng = RngManager::with_default_streams(9);
        let report = train(&cfg, &stream(20), &rng).unwrap();
        assert!(report.episodes.iter().all(|e| e.requests == 5 && e.decisions == 5));
    }

    #[test]
    fn test_td_update_single_terminal_decision() {
        let mut policy = TrainingPolicy::new(PolicyState::new(1), 0.0, 10.0, RngStream::new(1));
        let servers: Vec<crate::models::Server> = (0..2).map(crate::models::Server::new).collect();
        let view = SystemSnapshot::new(0.0, &servers, 1);
        let request = Request::new(7, 0.0, 1.0, "a");
        assert_eq!(policy.select(&view, &request), Decision::Assign(0));
        policy.observe(&DecisionFeedback {
            request_id: 7,
            server_id: 0,
            wait_time: 1.0,
            response_time: 3.0,
            sla_met: false,
        });

        let rl = RlConfig {
            learning_rate: 0.5,
            ..RlConfig::default()
        };
        let step = policy.trajectory[0].step;
        let (state, warnings) = policy.finish_episode(0, &rl);
        // terminal: Q = 0 + 0.5 * (-11 - 0)
        assert_eq!(
            state.tables.high_value(&step.state, HighAction::LeastLoadedCluster),
            -5.5
        );
        assert_eq!(state.tables.low_value(&step.low_key, 0), -5.5);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_divergent_update_is_clipped_and_reported() {
        let mut policy = TrainingPolicy::new(PolicyState::new(1), 0.0, 1.0e9, RngStream::new(1));
        let servers = vec![crate::models::Server::new(0)];
        let view = SystemSnapshot::new(0.0, &servers, 1);
        policy.select(&view, &Request::new(0, 0.0, 1.0, "a"));
        policy.observe(&DecisionFeedback {
            request_id: 0,
            server_id: 0,
            wait_time: 0.0,
            response_time: 9.0,
            sla_met: false,
        });

        let rl = RlConfig {
            learning_rate: 1.0,
            value_bound: 100.0,
            ..RlConfig::default()
        };
        let (_, warnings) = policy.finish_episode(2, &rl);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].level, ValueLevel::High);
        assert_eq!(warnings[0].clipped_to, -100.0);
        assert_eq!(warnings[1].episode, 2);
    }
}
