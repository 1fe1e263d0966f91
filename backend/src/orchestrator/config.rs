//! Resolved run configuration
//!
//! The core never discovers or parses configuration files itself; callers
//! hand in a resolved [`SimConfig`] and [`Seeds`] (directly, or as a JSON
//! string via [`SimConfig::from_json`]). Both are validated before any
//! simulation starts.

use serde::{Deserialize, Serialize};

use crate::core::SimulationError;

/// Complete simulation configuration
///
/// # Example
///
/// ```
/// use dispatch_simulator_core_rs::SimConfig;
///
/// let config = SimConfig::from_json(r#"{"server_count": 8, "sla_seconds": 30.0}"#).unwrap();
/// assert_eq!(config.server_count, 8);
/// assert_eq!(config.bootstrap_resamples, 1000); // default
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of identical servers (≥ 1)
    pub server_count: usize,

    /// Response-time threshold; a response at or below it meets the SLA
    pub sla_seconds: f64,

    /// Bootstrap iterations per policy (≥ 1)
    pub bootstrap_resamples: usize,

    /// Outcome tables smaller than this get no confidence interval
    pub bootstrap_min_rows: usize,

    /// Two-sided confidence level for bootstrap intervals (0 < c < 1)
    pub confidence_level: f64,

    /// Abort loading on the first malformed input row
    pub strict_records: bool,

    /// Uniform multiplicative service-time jitter in [0, 1); each request's
    /// service time is scaled by a factor in `[1 - j, 1 + j)` drawn from the
    /// `service_time` stream
    pub service_time_jitter: f64,

    /// RL hyperparameters
    pub rl: RlConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            server_count: 4,
            sla_seconds: 2.0,
            bootstrap_resamples: 1000,
            bootstrap_min_rows: 30,
            confidence_level: 0.95,
            strict_records: false,
            service_time_jitter: 0.0,
            rl: RlConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse a resolved configuration; missing fields take defaults
    pub fn from_json(text: &str) -> Result<Self, SimulationError> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every field; first problem wins
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.server_count == 0 {
            return Err(config_err("server_count must be at least 1"));
        }
        if !(self.sla_seconds.is_finite() && self.sla_seconds > 0.0) {
            return Err(config_err(format!(
                "sla_seconds must be positive, got {}",
                self.sla_seconds
            )));
        }
        if self.bootstrap_resamples == 0 {
            return Err(config_err("bootstrap_resamples must be at least 1"));
        }
        if self.bootstrap_min_rows == 0 {
            return Err(config_err("bootstrap_min_rows must be at least 1"));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(config_err(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if !(self.service_time_jitter >= 0.0 && self.service_time_jitter < 1.0) {
            return Err(config_err(format!(
                "service_time_jitter must be in [0, 1), got {}",
                self.service_time_jitter
            )));
        }
        self.rl.validate()
    }
}

/// Epsilon annealing shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpsilonDecay {
    Linear,
    Exponential,
}

/// Hyperparameters of the hierarchical RL policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlConfig {
    /// TD step size α in (0, 1]
    pub learning_rate: f64,

    /// Discount γ in [0, 1]
    pub discount: f64,

    pub epsilon_start: f64,
    pub epsilon_end: f64,

    /// Episodes over which epsilon moves from start to end
    pub epsilon_decay_episodes: usize,

    pub epsilon_schedule: EpsilonDecay,

    /// Number of training episodes
    pub episodes: usize,

    /// Extra negative reward for a decision whose request missed the SLA
    pub sla_penalty: f64,

    /// Value estimates are clipped to ±value_bound
    pub value_bound: f64,

    /// Number of contiguous server clusters seen by the high level
    pub cluster_count: usize,

    /// Requests per episode window; `None` replays the whole stream
    pub episode_length: Option<usize>,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount: 0.9,
            epsilon_start: 1.0,
            epsilon_end: 0.05,
            epsilon_decay_episodes: 50,
            epsilon_schedule: EpsilonDecay::Linear,
            episodes: 100,
            sla_penalty: 10.0,
            value_bound: 1.0e6,
            cluster_count: 2,
            episode_length: None,
        }
    }
}

impl RlConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(config_err(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(config_err(format!(
                "discount must be in [0, 1], got {}",
                self.discount
            )));
        }
        for (name, eps) in [
            ("epsilon_start", self.epsilon_start),
            ("epsilon_end", self.epsilon_end),
        ] {
            if !(0.0..=1.0).contains(&eps) {
                return Err(config_err(format!("{} must be in [0, 1], got {}", name, eps)));
            }
        }
        if self.epsilon_schedule == EpsilonDecay::Exponential
            && (self.epsilon_start <= 0.0 || self.epsilon_end <= 0.0)
        {
            return Err(config_err(
                "exponential epsilon schedule needs positive epsilon_start and epsilon_end",
            ));
        }
        if !(self.sla_penalty.is_finite() && self.sla_penalty >= 0.0) {
            return Err(config_err("sla_penalty must be non-negative"));
        }
        if !(self.value_bound.is_finite() && self.value_bound > 0.0) {
            return Err(config_err("value_bound must be positive"));
        }
        if self.cluster_count == 0 {
            return Err(config_err("cluster_count must be at least 1"));
        }
        if self.episode_length == Some(0) {
            return Err(config_err("episode_length must be at least 1 when set"));
        }
        Ok(())
    }
}

/// Named seeds consumed by the RNG manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seeds {
    /// Seed of the workload synthesis step (only used by the workload generator)
    #[serde(default)]
    pub synthesis_seed: Option<u64>,

    /// One simulation run per seed
    pub sim_seed_list: Vec<u64>,

    pub bootstrap_seed: u64,
}

impl Seeds {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.sim_seed_list.is_empty() {
            return Err(config_err("sim_seed_list must contain at least one seed"));
        }
        Ok(())
    }
}

fn config_err(msg: impl Into<String>) -> SimulationError {
    SimulationError::Configuration(msg.into())
}
