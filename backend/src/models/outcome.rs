//! Outcome records and outcome tables
//!
//! One [`Outcome`] is written per completed request. Outcomes are immutable;
//! a finalized [`OutcomeTable`] is the hand-off to aggregation and
//! bootstrap resampling.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::request::RequestId;
use super::server::ServerId;
use crate::core::SimulationError;

/// Per-request outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub request_id: RequestId,
    pub request_type: String,
    pub server_id: ServerId,
    pub arrival_time: f64,
    pub start_time: f64,
    pub completion_time: f64,
    pub wait_time: f64,
    pub response_time: f64,
    pub sla_met: bool,
    /// Passthrough attributes from the request, emitted as extra columns
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

/// Finalized outcome rows of one run (or several runs concatenated)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTable {
    rows: Vec<Outcome>,
    /// Set when the run was cancelled before every request completed
    truncated: bool,
}

impl OutcomeTable {
    pub fn new(rows: Vec<Outcome>, truncated: bool) -> Self {
        Self { rows, truncated }
    }

    /// Concatenate tables (e.g. one per simulation seed)
    ///
    /// The result is truncated if any input was.
    pub fn concat<'a, I>(tables: I) -> Self
    where
        I: IntoIterator<Item = &'a OutcomeTable>,
    {
        let mut rows = Vec::new();
        let mut truncated = false;
        for table in tables {
            rows.extend(table.rows.iter().cloned());
            truncated |= table.truncated;
        }
        Self { rows, truncated }
    }

    pub fn rows(&self) -> &[Outcome] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn response_times(&self) -> Vec<f64> {
        self.rows.iter().map(|o| o.response_time).collect()
    }

    /// One JSON object per line, in row order
    pub fn to_json_lines(&self) -> Result<String, SimulationError> {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        Ok(out)
    }
}
