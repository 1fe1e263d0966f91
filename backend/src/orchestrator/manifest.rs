//! Run manifest
//!
//! Records what an experiment was run with: a unique run id, a hash of the
//! resolved configuration, the seeds and the input shape. The hash also
//! covers every accepted request, so two manifests with the same
//! `config_hash` describe runs whose outcome tables and summary rows are
//! byte-identical.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::SimulationError;
use crate::orchestrator::{SimConfig, Seeds};
use crate::models::Request;
use crate::policy::PolicyConfig;
use crate::stream::RequestStream;

/// Provenance record of one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Unique per invocation, never part of any hash
    pub run_id: String,

    /// SHA-256 of the canonical JSON of config, seeds, policies and input requests
    pub config_hash: String,

    pub policies: Vec<String>,
    pub sim_seeds: Vec<u64>,
    pub bootstrap_seed: u64,

    /// Accepted input requests
    pub requests: usize,

    /// Input rows skipped in lenient mode
    pub rejected_rows: usize,
}

#[derive(Serialize)]
struct HashedInputs<'a> {
    config: &'a SimConfig,
    seeds: &'a Seeds,
    policies: &'a [PolicyConfig],
    requests: &'a [Request],
}

impl RunManifest {
    pub fn new(
        config: &SimConfig,
        seeds: &Seeds,
        policies: &[PolicyConfig],
        stream: &RequestStream,
    ) -> Result<Self, SimulationError> {
        let config_hash = compute_config_hash(&HashedInputs {
            config,
            seeds,
            policies,
            requests: stream.requests(),
        })?;
        Ok(Self {
            run_id: Uuid::new_v4().to_string(),
            config_hash,
            policies: policies.iter().map(|p| p.name().to_string()).collect(),
            sim_seeds: seeds.sim_seed_list.clone(),
            bootstrap_seed: seeds.bootstrap_seed,
            requests: stream.len(),
            rejected_rows: stream.rejected().len(),
        })
    }
}

/// Hash any serializable configuration
///
/// Object keys are sorted recursively before hashing, so field order in the
/// source does not change the hash.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let value = serde_json::to_value(config)
        .map_err(|e| SimulationError::Serialization(format!("config hashing failed: {}", e)))?;
    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| SimulationError::Serialization(format!("config hashing failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(service: f64) -> RequestStream {
        RequestStream::from_requests(
            (0..10)
                .map(|i| Request::new(i, i as f64, service, "quiz"))
                .collect(),
        )
        .unwrap()
    }

    fn seeds() -> Seeds {
        Seeds {
            synthesis_seed: None,
            sim_seed_list: vec![1, 2],
            bootstrap_seed: 2025,
        }
    }

    #[test]
    fn test_same_inputs_same_hash_different_run_id() {
        let policies = [PolicyConfig::LeastLoaded];
        let a = RunManifest::new(&SimConfig::default(), &seeds(), &policies, &stream(1.0)).unwrap();
        let b = RunManifest::new(&SimConfig::default(), &seeds(), &policies, &stream(1.0)).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.config_hash.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_seed() {
        let policies = [PolicyConfig::RoundRobin];
        let mut other = seeds();
        other.bootstrap_seed = 7;
        let a = RunManifest::new(&SimConfig::default(), &seeds(), &policies, &stream(1.0)).unwrap();
        let b = RunManifest::new(&SimConfig::default(), &other, &policies, &stream(1.0)).unwrap();
        assert_ne!(a.config_hash, b.config_hash);
    }

    #[test]
    fn test_hash_changes_with_input_requests() {
        let policies = [PolicyConfig::RoundRobin];
        let a = RunManifest::new(&SimConfig::default(), &seeds(), &policies, &stream(1.0)).unwrap();
        let b = RunManifest::new(&SimConfig::default(), &seeds(), &policies, &stream(2.0)).unwrap();
        assert_eq!(a.requests, b.requests);
        assert_ne!(a.config_hash, b.config_hash);
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"a": 1, "b": {"y": 2, "x": 3}}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"b": {"x": 3, "y": 2}, "a": 1}"#).unwrap();
        assert_eq!(
            compute_config_hash(&a).unwrap(),
            compute_config_hash(&b).unwrap()
        );
    }
}
