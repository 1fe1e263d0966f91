//! Synthetic workload generation
//!
//! Produces a request stream from a small parametric description: Poisson
//! arrivals (exponential inter-arrival gaps), a service-time distribution and
//! weighted request types. Used for RL training workloads and tests when no
//! reconstructed input table is at hand.
//!
//! # Key Principles
//!
//! 1. **Determinism**: Same seed + same config → same stream
//! 2. **Stream separation**: arrival gaps and request types draw from
//!    `arrival_jitter`, service times from `service_time`
//! 3. **Same validation**: output goes through [`RequestStream::from_requests`]
//!
//! # Example
//!
//! ```
//! use dispatch_simulator_core_rs::arrivals::{ServiceDistribution, WorkloadConfig, WorkloadGenerator};
//! use dispatch_simulator_core_rs::rng::RngManager;
//! use std::collections::BTreeMap;
//!
//! let config = WorkloadConfig {
//!     num_requests: 100,
//!     arrival_rate: 2.0,
//!     service_distribution: ServiceDistribution::Exponential { mean: 1.5 },
//!     type_weights: BTreeMap::from([("quiz".to_string(), 3.0), ("forum".to_string(), 1.0)]),
//!     student_count: 20,
//!     start_time: 0.0,
//! };
//!
//! let rng = RngManager::with_default_streams(42);
//! let stream = WorkloadGenerator::new(config).unwrap().generate(&rng).unwrap();
//! assert_eq!(stream.len(), 100);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::SimulationError;
use crate::models::Request;
use crate::orchestrator::Seeds;
use crate::rng::{RngManager, RngStream, ARRIVAL_JITTER, SERVICE_TIME};
use crate::stream::RequestStream;

/// Smallest service time a distribution may produce
const MIN_SERVICE_TIME: f64 = 1e-6;

/// Parameters of a synthetic workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Number of requests to generate
    pub num_requests: usize,

    /// Expected arrivals per second (Poisson λ)
    pub arrival_rate: f64,

    /// Distribution of required service times
    pub service_distribution: ServiceDistribution,

    /// Request type selection weights (type → weight)
    /// If empty, every request is of type "default"
    pub type_weights: BTreeMap<String, f64>,

    /// Size of the student id pool attached as `student_id`
    pub student_count: usize,

    /// Timestamp of the first possible arrival
    pub start_time: f64,
}

/// Service time distribution types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceDistribution {
    /// Every request needs exactly `value` seconds
    Constant { value: f64 },

    /// Uniform between min and max
    Uniform { min: f64, max: f64 },

    /// Exponential with the given mean
    Exponential { mean: f64 },

    /// Log-normal (parameters of the underlying normal)
    LogNormal { mu: f64, sigma: f64 },
}

/// Generator for synthetic request streams
pub struct WorkloadGenerator {
    config: WorkloadConfig,
    /// Type names in sorted order with cumulative weights
    cumulative_types: Vec<(String, f64)>,
}

impl WorkloadGenerator {
    pub fn new(config: WorkloadConfig) -> Result<Self, SimulationError> {
        if !(config.arrival_rate.is_finite() && config.arrival_rate > 0.0) {
            return Err(SimulationError::Configuration(
                "arrival_rate must be positive".to_string(),
            ));
        }
        if !config.start_time.is_finite() {
            return Err(SimulationError::Configuration(
                "start_time must be finite".to_string(),
            ));
        }
        if config.student_count == 0 {
            return Err(SimulationError::Configuration(
                "student_count must be at least 1".to_string(),
            ));
        }
        validate_distribution(&config.service_distribution)?;

        let mut cumulative_types = Vec::with_capacity(config.type_weights.len());
        let mut total = 0.0;
        for (name, weight) in &config.type_weights {
            if !(weight.is_finite() && *weight >= 0.0) {
                return Err(SimulationError::Configuration(format!(
                    "type weight for '{}' must be non-negative",
                    name
                )));
            }
            total += weight;
            cumulative_types.push((name.clone(), total));
        }
        if !cumulative_types.is_empty() && total <= 0.0 {
            return Err(SimulationError::Configuration(
                "type weights must not all be zero".to_string(),
            ));
        }

        Ok(Self {
            config,
            cumulative_types,
        })
    }

    /// Generate from `seeds.synthesis_seed`
    pub fn generate_from_seeds(&self, seeds: &Seeds) -> Result<RequestStream, SimulationError> {
        let seed = seeds.synthesis_seed.ok_or_else(|| {
            SimulationError::Configuration(
                "synthesis_seed is required to generate a workload".to_string(),
            )
        })?;
        self.generate(&RngManager::with_default_streams(seed))
    }

    /// Generate the full stream
    ///
    /// Fails with a configuration error when the parameters drive an arrival
    /// time or a service time out of the finite range.
    pub fn generate(&self, rng: &RngManager) -> Result<RequestStream, SimulationError> {
        let mut arrival_rng = rng.stream(ARRIVAL_JITTER)?;
        let mut service_rng = rng.stream(SERVICE_TIME)?;

        let mean_gap = 1.0 / self.config.arrival_rate;
        let mut now = self.config.start_time;
        let mut requests = Vec::with_capacity(self.config.num_requests);

        for i in 0..self.config.num_requests {
            now += arrival_rng.exponential(mean_gap);
            let request_type = self.sample_type(&mut arrival_rng);
            let service_time = self.sample_service(&mut service_rng);
            if !now.is_finite() {
                return Err(SimulationError::Configuration(format!(
                    "arrival time of request {} is not finite",
                    i
                )));
            }
            if !service_time.is_finite() {
                return Err(SimulationError::Configuration(format!(
                    "service time of request {} is not finite ({:?})",
                    i, self.config.service_distribution
                )));
            }
            let student = arrival_rng.next_index(self.config.student_count);

            requests.push(
                Request::new(i as u64, now, service_time, request_type)
                    .with_attribute("student_id", format!("s{:05}", student)),
            );
        }

        RequestStream::from_requests(requests)
    }

    fn sample_type(&self, rng: &mut RngStream) -> String {
        let Some((_, total)) = self.cumulative_types.last() else {
            return "default".to_string();
        };
        let target = rng.next_f64() * total;
        self.cumulative_types
            .iter()
            .find(|(_, cumulative)| target < *cumulative)
            .or(self.cumulative_types.last())
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    fn sample_service(&self, rng: &mut RngStream) -> f64 {
        let value = match &self.config.service_distribution {
            ServiceDistribution::Constant { value } => *value,
            ServiceDistribution::Uniform { min, max } => min + (max - min) * rng.next_f64(),
            ServiceDistribution::Exponential { mean } => rng.exponential(*mean),
            ServiceDistribution::LogNormal { mu, sigma } => {
                (mu + sigma * sample_standard_normal(rng)).exp()
            }
        };
        value.max(MIN_SERVICE_TIME)
    }
}

fn validate_distribution(dist: &ServiceDistribution) -> Result<(), SimulationError> {
    let ok = match dist {
        ServiceDistribution::Constant { value } => value.is_finite() && *value > 0.0,
        ServiceDistribution::Uniform { min, max } => {
            min.is_finite() && max.is_finite() && *min > 0.0 && min <= max
        }
        ServiceDistribution::Exponential { mean } => mean.is_finite() && *mean > 0.0,
        ServiceDistribution::LogNormal { mu, sigma } => {
            mu.is_finite() && sigma.is_finite() && *sigma >= 0.0
        }
    };
    if ok {
        Ok(())
    } else {
        Err(SimulationError::Configuration(format!(
            "invalid service distribution {:?}",
            dist
        )))
    }
}

/// Box-Muller transform
fn sample_standard_normal(rng: &mut RngStream) -> f64 {
    let u1 = 1.0 - rng.next_f64();
    let u2 = rng.next_f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
