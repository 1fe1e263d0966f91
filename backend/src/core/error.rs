//! Error taxonomy for the dispatch simulator
//!
//! Propagation rules:
//! - `Configuration` and `PolicyContractViolation` abort the run immediately
//! - `MalformedRecord` is isolated to the offending row unless strict mode is on
//! - `InsufficientData` is isolated to a single policy's summary rows

use thiserror::Error;

/// Errors produced by the simulation core
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    /// Invalid configuration (server count, SLA threshold, unknown RNG
    /// stream, unknown policy name). Reported before any simulation starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input row failed validation
    #[error("Malformed record at row {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },

    /// A policy returned an invalid server or stalled the backlog
    #[error("Policy '{policy}' violated the dispatch contract: {reason}")]
    PolicyContractViolation { policy: String, reason: String },

    /// Outcome table too small for reliable percentile estimates
    #[error("Insufficient data for policy '{policy}': {rows} rows, need at least {min_rows}")]
    InsufficientData {
        policy: String,
        rows: usize,
        min_rows: usize,
    },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SimulationError {
    fn from(err: serde_json::Error) -> Self {
        SimulationError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_record_message_includes_row() {
        let err = SimulationError::MalformedRecord {
            row: 7,
            reason: "service_time must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed record at row 7: service_time must be positive"
        );
    }

    #[test]
    fn test_insufficient_data_message() {
        let err = SimulationError::InsufficientData {
            policy: "least_loaded".to_string(),
            rows: 3,
            min_rows: 30,
        };
        assert!(err.to_string().contains("least_loaded"));
        assert!(err.to_string().contains("30"));
    }
}
