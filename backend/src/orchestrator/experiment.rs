//! Experiment runner
//!
//! Runs every configured policy over every simulation seed, pools the
//! outcomes per policy and bootstraps confidence intervals:
//!
//! ```text
//! for each policy:
//!     rl_hierarchical → train once on the first sim seed, publish snapshot
//!     for each sim seed (parallel): simulate → OutcomeTable
//!     concat tables in seed order
//! bootstrap every pooled table (per-policy failures are kept, not fatal)
//! ```
//!
//! Each seed gets its own [`RngManager`], server pool and event queue, so
//! the parallel runs share nothing mutable. Results are assembled in seed
//! order and are identical for any thread count.

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::info;

use super::engine::{simulate, RunResult, RunSummary};
use super::manifest::RunManifest;
use super::{SimConfig, Seeds};
use crate::bootstrap::{BootstrapConfig, BootstrapEstimator, Metric, PolicyFailure, SummaryRow};
use crate::core::SimulationError;
use crate::models::OutcomeTable;
use crate::policy::rl::{self, HierarchicalPolicy, TrainingReport};
use crate::policy::{build_static_policy, PolicyConfig};
use crate::rng::RngManager;
use crate::stream::RequestStream;

/// Pooled results of one policy across all seeds
#[derive(Debug, Clone)]
pub struct PolicyRun {
    pub policy: String,
    /// One summary per seed, in seed order
    pub runs: Vec<RunSummary>,
    /// Outcomes of every seed, concatenated in seed order
    pub outcomes: OutcomeTable,
}

/// Everything an experiment produced
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub manifest: RunManifest,
    pub policies: Vec<PolicyRun>,
    pub summary: Vec<SummaryRow>,
    /// Policies without confidence intervals
    pub failures: Vec<PolicyFailure>,
    /// Present when `rl_hierarchical` was configured
    pub training: Option<TrainingReport>,
}

impl ExperimentReport {
    pub fn policy(&self, name: &str) -> Option<&PolicyRun> {
        self.policies.iter().find(|p| p.policy == name)
    }

    pub fn summary_row(&self, policy: &str, metric: Metric) -> Option<&SummaryRow> {
        self.summary
            .iter()
            .find(|r| r.policy == policy && r.metric == metric)
    }

    /// Summary table as a JSON array
    pub fn summary_json(&self) -> Result<String, SimulationError> {
        Ok(serde_json::to_string(&self.summary)?)
    }
}

/// Run a full experiment
///
/// Configuration problems and policy contract violations abort the whole
/// experiment; too little data for a confidence interval only removes that
/// policy's summary rows.
pub fn run_experiment(
    config: &SimConfig,
    seeds: &Seeds,
    stream: &RequestStream,
    policies: &[PolicyConfig],
) -> Result<ExperimentReport, SimulationError> {
    config.validate()?;
    seeds.validate()?;
    if policies.is_empty() {
        return Err(SimulationError::Configuration(
            "at least one policy must be configured".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for policy in policies {
        if !seen.insert(policy.name()) {
            return Err(SimulationError::Configuration(format!(
                "policy '{}' configured more than once",
                policy.name()
            )));
        }
    }

    let manifest = RunManifest::new(config, seeds, policies, stream)?;
    info!(
        run_id = %manifest.run_id,
        config_hash = %manifest.config_hash,
        policies = policies.len(),
        seeds = seeds.sim_seed_list.len(),
        requests = stream.len(),
        "experiment started"
    );

    let mut runs = Vec::with_capacity(policies.len());
    let mut training = None;

    for policy in policies {
        let results = if policy.is_trainable() {
            let training_rng = RngManager::with_default_streams(seeds.sim_seed_list[0]);
            let report = rl::train(config, stream, &training_rng)?;
            let snapshot = Arc::clone(&report.snapshot);
            training = Some(report);

            run_seeds(seeds, |rng| {
                let mut evaluation = HierarchicalPolicy::new(Arc::clone(&snapshot));
                simulate(config, stream, &mut evaluation, rng)
            })?
        } else {
            run_seeds(seeds, |rng| {
                let mut dispatcher = build_static_policy(policy)?;
                simulate(config, stream, dispatcher.as_mut(), rng)
            })?
        };

        let outcomes = OutcomeTable::concat(results.iter().map(|r| &r.outcomes));
        runs.push(PolicyRun {
            policy: policy.name().to_string(),
            runs: results.into_iter().map(|r| r.summary).collect(),
            outcomes,
        });
    }

    let estimator = BootstrapEstimator::new(
        BootstrapConfig::from_sim_config(config),
        seeds.bootstrap_seed,
    );
    let (summary, failures) =
        estimator.estimate_all(runs.iter().map(|r| (r.policy.as_str(), &r.outcomes)));

    info!(
        run_id = %manifest.run_id,
        summary_rows = summary.len(),
        failures = failures.len(),
        "experiment finished"
    );

    Ok(ExperimentReport {
        manifest,
        policies: runs,
        summary,
        failures,
        training,
    })
}

/// Run `f` once per sim seed in parallel, results in seed order
fn run_seeds<F>(seeds: &Seeds, f: F) -> Result<Vec<RunResult>, SimulationError>
where
    F: Fn(&RngManager) -> Result<RunResult, SimulationError> + Sync,
{
    seeds
        .sim_seed_list
        .par_iter()
        .map(|&seed| f(&RngManager::with_default_streams(seed)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Request;

    fn stream(n: usize) -> RequestStream {
        RequestStream::from_requests(
            (0..n)
                .map(|i| Request::new(i as u64, i as f64 * 0.3, 1.0, "a"))
                .collect(),
        )
        .unwrap()
    }

    fn seeds(list: Vec<u64>) -> Seeds {
        Seeds {
            synthesis_seed: None,
            sim_seed_list: list,
            bootstrap_seed: 2025,
        }
    }

    #[test]
    fn test_outcomes_pooled_across_seeds() {
        let config = SimConfig {
            bootstrap_resamples: 50,
            ..SimConfig::default()
        };
        let report = run_experiment(
            &config,
            &seeds(vec![1, 2, 3]),
            &stream(20),
            &[PolicyConfig::RoundRobin],
        )
        .unwrap();
        let run = report.policy("round_robin").unwrap();
        assert_eq!(run.runs.len(), 3);
        assert_eq!(run.outcomes.len(), 60);
        assert_eq!(report.summary.len(), 3);
        assert!(report.failures.is_empty());
        assert!(report.training.is_none());
    }

    #[test]
    fn test_small_table_fails_only_that_policy() {
        let config = SimConfig {
            bootstrap_resamples: 20,
            bootstrap_min_rows: 30,
            ..SimConfig::default()
        };
        let report = run_experiment(
            &config,
            &seeds(vec![1]),
            &stream(10),
            &[PolicyConfig::RoundRobin, PolicyConfig::LeastLoaded],
        )
        .unwrap();
        assert_eq!(report.failures.len(), 2);
        assert!(report.summary.is_empty());
        assert_eq!(report.policies.len(), 2);
    }

    #[test]
    fn test_duplicate_policy_rejected() {
        let err = run_experiment(
            &SimConfig::default(),
            &seeds(vec![1]),
            &stream(5),
            &[PolicyConfig::LeastLoaded, PolicyConfig::LeastLoaded],
        )
        .unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));
    }

    #[test]
    fn test_empty_seed_list_rejected() {
        assert!(run_experiment(
            &SimConfig::default(),
            &seeds(vec![]),
            &stream(5),
            &[PolicyConfig::LeastLoaded],
        )
        .is_err());
    }
}
