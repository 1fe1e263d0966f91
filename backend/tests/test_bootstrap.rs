//! Bootstrap Confidence Interval Tests
//!
//! Intervals must be reproducible from the bootstrap seed regardless of the
//! rayon thread count, always contain the point estimate, tighten as the
//! table grows and settle as the resample count grows.

use dispatch_simulator_core_rs::bootstrap::{BootstrapConfig, BootstrapEstimator, Metric};
use dispatch_simulator_core_rs::metrics::MetricsRecorder;
use dispatch_simulator_core_rs::rng::RngStream;
use dispatch_simulator_core_rs::{OutcomeTable, Request, SimulationError};

/// Table of `n` outcomes with exponential-ish response times around 1.5s
fn table(n: usize, seed: u64) -> OutcomeTable {
    let mut rng = RngStream::new(seed);
    let mut recorder = MetricsRecorder::new(2.0);
    for i in 0..n as u64 {
        let request = Request::new(i, 0.0, 1.0, "quiz");
        recorder.record_start(&request, (i % 4) as usize, 0.0);
        recorder
            .record_completion(i, 0.2 + rng.exponential(1.3))
            .unwrap();
    }
    recorder.finalize(false)
}

fn config(resamples: usize) -> BootstrapConfig {
    BootstrapConfig {
        resamples,
        confidence_level: 0.95,
        min_rows: 30,
    }
}

#[test]
fn test_thousand_resamples_over_500_rows_are_reproducible() {
    let t = table(500, 77);
    let a = BootstrapEstimator::new(config(1000), 2025)
        .estimate("least_loaded", &t)
        .unwrap();
    let b = BootstrapEstimator::new(config(1000), 2025)
        .estimate("least_loaded", &t)
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 3);
    assert_eq!(
        a.iter().map(|r| r.metric).collect::<Vec<_>>(),
        Metric::ALL.to_vec()
    );
}

#[test]
fn test_result_is_independent_of_thread_count() {
    let t = table(300, 5);
    let estimate_on = |threads: usize| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
            .install(|| {
                BootstrapEstimator::new(config(400), 2025)
                    .estimate("round_robin", &t)
                    .unwrap()
            })
    };
    let single = estimate_on(1);
    assert_eq!(single, estimate_on(4));
    assert_eq!(single, estimate_on(7));
}

#[test]
fn test_estimate_always_inside_interval() {
    for seed in 0..10 {
        let t = table(40, seed);
        let rows = BootstrapEstimator::new(config(50), seed)
            .estimate("rl_hierarchical", &t)
            .unwrap();
        for row in rows {
            assert!(
                row.ci_low <= row.estimate && row.estimate <= row.ci_high,
                "{:?}",
                row
            );
        }
    }
}

#[test]
fn test_interval_tightens_with_more_rows() {
    let width = |n: usize| {
        let rows = BootstrapEstimator::new(config(500), 2025)
            .estimate("least_loaded", &table(n, 3))
            .unwrap();
        rows[0].ci_high - rows[0].ci_low
    };
    let small = width(100);
    let large = width(2000);
    assert!(large < small, "small {} large {}", small, large);
}

#[test]
fn test_interval_width_settles_as_resamples_grow() {
    let t = table(400, 11);
    let width = |resamples: usize| {
        let rows = BootstrapEstimator::new(config(resamples), 2025)
            .estimate("least_loaded", &t)
            .unwrap();
        rows[0].ci_high - rows[0].ci_low
    };
    let (w100, w1000, w5000) = (width(100), width(1000), width(5000));
    assert!(w5000 > 0.0);

    // percentile noise shrinks with the resample count
    let tolerance = 0.12 * w5000;
    assert!((w5000 - w1000).abs() < tolerance, "{} {}", w1000, w5000);
    assert!((w100 - w5000).abs() < 0.5 * w5000, "{} {}", w100, w5000);
    assert!((w5000 - w1000).abs() <= (w1000 - w100).abs() + tolerance);
}

#[test]
fn test_different_bootstrap_seeds_give_different_intervals() {
    let t = table(200, 1);
    let a = BootstrapEstimator::new(config(200), 1).estimate("p", &t).unwrap();
    let b = BootstrapEstimator::new(config(200), 2).estimate("p", &t).unwrap();
    assert_eq!(a[0].estimate, b[0].estimate);
    assert_ne!(a[0].ci_low, b[0].ci_low);
}

#[test]
fn test_below_min_rows_reports_insufficient_data() {
    let t = table(10, 1);
    let err = BootstrapEstimator::new(config(100), 1)
        .estimate("round_robin", &t)
        .unwrap_err();
    assert!(matches!(
        err,
        SimulationError::InsufficientData { rows: 10, min_rows: 30, .. }
    ));
}

#[test]
fn test_summary_rows_serialize_with_metric_names() {
    let rows = BootstrapEstimator::new(config(20), 1)
        .estimate("least_loaded", &table(50, 1))
        .unwrap();
    let json = serde_json::to_string(&rows).unwrap();
    assert!(json.contains("\"metric\":\"mean_response_time\""));
    assert!(json.contains("\"metric\":\"p95_response_time\""));
    assert!(json.contains("\"metric\":\"sla_percentage\""));
    assert!(json.contains("\"policy\":\"least_loaded\""));
}
