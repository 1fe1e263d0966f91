//! Experiment Runner Tests
//!
//! End-to-end: load rows, run every policy over several seeds, bootstrap the
//! pooled tables and check the manifest.

use dispatch_simulator_core_rs::arrivals::{ServiceDistribution, WorkloadConfig, WorkloadGenerator};
use dispatch_simulator_core_rs::rng::RngManager;
use dispatch_simulator_core_rs::{
    run_experiment, Metric, PolicyConfig, RequestStream, Seeds, SimConfig, SimulationError,
};
use serde_json::json;
use std::collections::BTreeMap;

fn stream() -> RequestStream {
    WorkloadGenerator::new(WorkloadConfig {
        num_requests: 80,
        arrival_rate: 3.0,
        service_distribution: ServiceDistribution::Exponential { mean: 1.0 },
        type_weights: BTreeMap::from([("quiz".to_string(), 1.0), ("video".to_string(), 1.0)]),
        student_count: 25,
        start_time: 0.0,
    })
    .unwrap()
    .generate(&RngManager::with_default_streams(2024))
    .unwrap()
}

fn config() -> SimConfig {
    let mut config = SimConfig::from_json(
        r#"{
            "server_count": 3,
            "sla_seconds": 2.0,
            "bootstrap_resamples": 200,
            "service_time_jitter": 0.1,
            "rl": {"episodes": 5, "epsilon_decay_episodes": 5}
        }"#,
    )
    .unwrap();
    config.rl.cluster_count = 3;
    config
}

fn seeds() -> Seeds {
    serde_json::from_value(json!({"sim_seed_list": [11, 12, 13], "bootstrap_seed": 2025})).unwrap()
}

fn all_policies() -> Vec<PolicyConfig> {
    ["round_robin", "least_loaded", "rl_hierarchical"]
        .iter()
        .map(|name| PolicyConfig::from_name(name).unwrap())
        .collect()
}

#[test]
fn test_full_experiment_produces_summary_for_every_policy() {
    let report = run_experiment(&config(), &seeds(), &stream(), &all_policies()).unwrap();

    assert_eq!(report.policies.len(), 3);
    for run in &report.policies {
        assert_eq!(run.runs.len(), 3);
        assert_eq!(run.outcomes.len(), 3 * 80);
        assert!(!run.outcomes.is_truncated());
    }
    assert_eq!(report.summary.len(), 9);
    assert!(report.failures.is_empty());
    for row in &report.summary {
        assert!(row.ci_low <= row.estimate && row.estimate <= row.ci_high);
    }
    assert!(report.summary_row("rl_hierarchical", Metric::SlaPercentage).is_some());

    let training = report.training.as_ref().unwrap();
    assert_eq!(training.episodes.len(), 5);

    assert_eq!(
        report.manifest.policies,
        vec!["round_robin", "least_loaded", "rl_hierarchical"]
    );
    assert_eq!(report.manifest.sim_seeds, vec![11, 12, 13]);
    assert_eq!(report.manifest.requests, 80);
}

#[test]
fn test_rerun_is_identical_except_run_id() {
    let a = run_experiment(&config(), &seeds(), &stream(), &all_policies()).unwrap();
    let b = run_experiment(&config(), &seeds(), &stream(), &all_policies()).unwrap();

    assert_eq!(a.summary_json().unwrap(), b.summary_json().unwrap());
    for (x, y) in a.policies.iter().zip(&b.policies) {
        assert_eq!(
            x.outcomes.to_json_lines().unwrap(),
            y.outcomes.to_json_lines().unwrap()
        );
    }
    assert_eq!(a.manifest.config_hash, b.manifest.config_hash);
    assert_ne!(a.manifest.run_id, b.manifest.run_id);
}

#[test]
fn test_seeds_change_outcomes_through_jitter() {
    let report =
        run_experiment(&config(), &seeds(), &stream(), &[PolicyConfig::LeastLoaded]).unwrap();
    let run = report.policy("least_loaded").unwrap();
    assert_ne!(run.runs[0].makespan, run.runs[1].makespan);
}

#[test]
fn test_insufficient_data_is_isolated_per_policy() {
    let mut cfg = config();
    cfg.bootstrap_min_rows = 1000;
    let report = run_experiment(
        &cfg,
        &seeds(),
        &stream(),
        &[PolicyConfig::RoundRobin, PolicyConfig::LeastLoaded],
    )
    .unwrap();
    assert!(report.summary.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, SimulationError::InsufficientData { rows: 240, .. })));
}

#[test]
fn test_lenient_loading_feeds_manifest() {
    let rows = vec![
        json!({"timestamp": 0.0, "service_time": 1.0, "request_type": "quiz", "student_id": 1}),
        json!({"timestamp": 0.5, "service_time": "oops", "request_type": "quiz", "student_id": 2}),
        json!({"timestamp": 1.0, "service_time": 1.0, "request_type": "quiz", "student_id": 3}),
    ];
    let stream = RequestStream::from_rows(&rows, false).unwrap();
    let report = run_experiment(&config(), &seeds(), &stream, &[PolicyConfig::RoundRobin]).unwrap();
    assert_eq!(report.manifest.requests, 2);
    assert_eq!(report.manifest.rejected_rows, 1);
    // 6 pooled rows is below the default minimum of 30
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn test_invalid_configuration_aborts_before_running() {
    let mut cfg = config();
    cfg.server_count = 0;
    let err = run_experiment(&cfg, &seeds(), &stream(), &all_policies()).unwrap_err();
    assert!(matches!(err, SimulationError::Configuration(_)));
}
