//! Bootstrap confidence intervals
//!
//! For each policy's outcome table, draws `resamples` same-size resamples
//! with replacement and recomputes every [`Metric`] on each. The interval
//! bounds are percentiles of the resample distribution at the configured
//! confidence level.
//!
//! # Determinism
//!
//! Resample `i` of policy `p` draws from `substream("bootstrap", p, i)`, so
//! the result does not depend on how rayon schedules iterations or how many
//! threads it uses.
//!
//! # Example
//!
//! ```
//! use dispatch_simulator_core_rs::bootstrap::{BootstrapConfig, BootstrapEstimator};
//! use dispatch_simulator_core_rs::metrics::MetricsRecorder;
//! use dispatch_simulator_core_rs::Request;
//!
//! let mut recorder = MetricsRecorder::new(2.0);
//! for i in 0..50u64 {
//!     let req = Request::new(i, 0.0, 1.0, "quiz");
//!     recorder.record_start(&req, 0, 0.0);
//!     recorder.record_completion(i, 1.0 + (i % 5) as f64 * 0.5).unwrap();
//! }
//! let table = recorder.finalize(false);
//!
//! let config = BootstrapConfig { resamples: 200, confidence_level: 0.95, min_rows: 30 };
//! let rows = BootstrapEstimator::new(config, 2025).estimate("least_loaded", &table).unwrap();
//! assert_eq!(rows.len(), 3);
//! assert!(rows.iter().all(|r| r.ci_low <= r.estimate && r.estimate <= r.ci_high));
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::SimulationError;
use crate::metrics::{percentile_in_place, percentile_sorted};
use crate::models::OutcomeTable;
use crate::orchestrator::SimConfig;
use crate::rng::{RngManager, BOOTSTRAP};

/// Summary metric with a confidence interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    MeanResponseTime,
    P95ResponseTime,
    SlaPercentage,
}

impl Metric {
    pub const ALL: [Metric; 3] = [
        Metric::MeanResponseTime,
        Metric::P95ResponseTime,
        Metric::SlaPercentage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::MeanResponseTime => "mean_response_time",
            Metric::P95ResponseTime => "p95_response_time",
            Metric::SlaPercentage => "sla_percentage",
        }
    }
}

/// One row of the summary table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub policy: String,
    pub metric: Metric,
    pub estimate: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// A policy that produced no summary rows, and why
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyFailure {
    pub policy: String,
    pub error: SimulationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub resamples: usize,
    /// Two-sided level, e.g. 0.95 for the 2.5th/97.5th percentiles
    pub confidence_level: f64,
    pub min_rows: usize,
}

impl BootstrapConfig {
    pub fn from_sim_config(config: &SimConfig) -> Self {
        Self {
            resamples: config.bootstrap_resamples,
            confidence_level: config.confidence_level,
            min_rows: config.bootstrap_min_rows,
        }
    }
}

/// Percentile-bootstrap estimator seeded from `bootstrap_seed`
#[derive(Debug, Clone)]
pub struct BootstrapEstimator {
    config: BootstrapConfig,
    rng: RngManager,
}

impl BootstrapEstimator {
    pub fn new(config: BootstrapConfig, bootstrap_seed: u64) -> Self {
        Self {
            config,
            rng: RngManager::new(bootstrap_seed, [BOOTSTRAP]),
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Summary rows (one per [`Metric`], in [`Metric::ALL`] order)
    pub fn estimate(
        &self,
        policy: &str,
        table: &OutcomeTable,
    ) -> Result<Vec<SummaryRow>, SimulationError> {
        let n = table.len();
        if n < self.config.min_rows {
            return Err(SimulationError::InsufficientData {
                policy: policy.to_string(),
                rows: n,
                min_rows: self.config.min_rows,
            });
        }

        let responses = table.response_times();
        let sla: Vec<bool> = table.rows().iter().map(|o| o.sla_met).collect();
        let estimates = metrics_of(&mut responses.clone(), sla.iter().filter(|m| **m).count());

        debug!(policy, rows = n, resamples = self.config.resamples, "bootstrap started");

        let draws: Vec<[f64; 3]> = (0..self.config.resamples)
            .into_par_iter()
            .map_init(
                || Vec::with_capacity(n),
                |sample: &mut Vec<f64>, i| -> Result<[f64; 3], SimulationError> {
                    let mut rng = self.rng.substream(BOOTSTRAP, policy, i as u64)?;
                    sample.clear();
                    let mut met = 0;
                    for _ in 0..n {
                        let row = rng.next_index(n);
                        sample.push(responses[row]);
                        met += usize::from(sla[row]);
                    }
                    Ok(metrics_of(sample, met))
                },
            )
            .collect::<Result<_, _>>()?;

        let tail = (1.0 - self.config.confidence_level) / 2.0;
        let rows = Metric::ALL
            .iter()
            .enumerate()
            .map(|(m, &metric)| {
                let mut dist: Vec<f64> = draws.iter().map(|d| d[m]).collect();
                dist.sort_by(|a, b| a.total_cmp(b));
                let estimate = estimates[m];
                let low = percentile_sorted(&dist, tail);
                let high = percentile_sorted(&dist, 1.0 - tail);
                if estimate < low || estimate > high {
                    debug!(
                        policy,
                        metric = metric.name(),
                        estimate,
                        low,
                        high,
                        "widening interval to contain estimate"
                    );
                }
                SummaryRow {
                    policy: policy.to_string(),
                    metric,
                    estimate,
                    ci_low: low.min(estimate),
                    ci_high: high.max(estimate),
                }
            })
            .collect();
        Ok(rows)
    }

    /// Estimate every policy; failures stay with their policy
    pub fn estimate_all<'a, I>(&self, tables: I) -> (Vec<SummaryRow>, Vec<PolicyFailure>)
    where
        I: IntoIterator<Item = (&'a str, &'a OutcomeTable)>,
    {
        let mut rows = Vec::new();
        let mut failures = Vec::new();
        for (policy, table) in tables {
            match self.estimate(policy, table) {
                Ok(mut r) => rows.append(&mut r),
                Err(error) => {
                    warn!(policy, %error, "no confidence intervals for policy");
                    failures.push(PolicyFailure {
                        policy: policy.to_string(),
                        error,
                    });
                }
            }
        }
        (rows, failures)
    }
}

/// [mean, p95, sla%] of a sample; reorders `responses`
fn metrics_of(responses: &mut [f64], sla_met: usize) -> [f64; 3] {
    let n = responses.len() as f64;
    let mean = responses.iter().sum::<f64>() / n;
    let sla_pct = 100.0 * sla_met as f64 / n;
    let p95 = percentile_in_place(responses, 0.95);
    [mean, p95, sla_pct]
}
