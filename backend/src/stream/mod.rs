//! Request stream loading and validation
//!
//! The request stream is the only place where input rows are checked.
//! Rows are validated in order:
//! 1. Row must be an object with `timestamp`, `service_time`,
//!    `request_type` and `student_id`
//! 2. `service_time` must be a positive finite number
//! 3. `timestamp` must be finite and not earlier than the previous accepted row
//!
//! In lenient mode a bad row is logged, remembered in [`RequestStream::rejected`]
//! and skipped. In strict mode the first bad row aborts loading.
//!
//! A loaded stream is immutable and restartable: every call to
//! [`RequestStream::iter`] yields the same sequence.
//!
//! # Example
//!
//! ```
//! use dispatch_simulator_core_rs::RequestStream;
//! use serde_json::json;
//!
//! let rows = vec![
//!     json!({"timestamp": 0.0, "service_time": 2.0, "request_type": "quiz", "student_id": 1}),
//!     json!({"timestamp": 1.0, "service_time": -1.0, "request_type": "quiz", "student_id": 2}),
//!     json!({"timestamp": 2.0, "service_time": 1.0, "request_type": "forum", "student_id": 3}),
//! ];
//!
//! let stream = RequestStream::from_rows(&rows, false).unwrap();
//! assert_eq!(stream.len(), 2);
//! assert_eq!(stream.rejected()[0].row, 1);
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::SimulationError;
use crate::models::{Request, PASSTHROUGH_FIELDS};
use crate::orchestrator::SimConfig;

/// Required input columns
pub const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "service_time", "request_type", "student_id"];

/// A row dropped during lenient loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// 0-based index of the row in the input table
    pub row: usize,
    pub reason: String,
}

/// Validated, chronologically ordered sequence of requests
#[derive(Debug, Clone, Default)]
pub struct RequestStream {
    requests: Vec<Request>,
    rejected: Vec<RejectedRow>,
}

impl RequestStream {
    /// Build a stream from already constructed requests
    ///
    /// Requests must be in non-decreasing timestamp order with unique ids.
    pub fn from_requests(requests: Vec<Request>) -> Result<Self, SimulationError> {
        let mut seen = HashSet::with_capacity(requests.len());
        let mut last_ts = f64::NEG_INFINITY;
        for (row, req) in requests.iter().enumerate() {
            if req.timestamp() < last_ts {
                return Err(SimulationError::MalformedRecord {
                    row,
                    reason: format!(
                        "timestamp {} precedes previous timestamp {}",
                        req.timestamp(),
                        last_ts
                    ),
                });
            }
            if !seen.insert(req.id()) {
                return Err(SimulationError::MalformedRecord {
                    row,
                    reason: format!("duplicate request id {}", req.id()),
                });
            }
            last_ts = req.timestamp();
        }
        Ok(Self {
            requests,
            rejected: Vec::new(),
        })
    }

    /// Load from input-table rows (JSON objects)
    ///
    /// Request ids are the row indices of the input table, so ids stay
    /// stable even when earlier rows are rejected.
    pub fn from_rows(rows: &[Value], strict: bool) -> Result<Self, SimulationError> {
        let mut requests = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        let mut last_ts = f64::NEG_INFINITY;

        for (row, value) in rows.iter().enumerate() {
            match parse_row(row, value, last_ts) {
                Ok(request) => {
                    last_ts = request.timestamp();
                    requests.push(request);
                }
                Err(SimulationError::MalformedRecord { row, reason }) if !strict => {
                    warn!(row, reason = %reason, "rejecting malformed input row");
                    rejected.push(RejectedRow { row, reason });
                }
                Err(err) => return Err(err),
            }
        }

        debug!(
            accepted = requests.len(),
            rejected = rejected.len(),
            "request stream loaded"
        );
        Ok(Self { requests, rejected })
    }

    /// Load rows in the mode set by `config.strict_records`
    pub fn from_rows_with(rows: &[Value], config: &SimConfig) -> Result<Self, SimulationError> {
        Self::from_rows(rows, config.strict_records)
    }

    /// Load from a JSON array of row objects
    pub fn from_json(text: &str, strict: bool) -> Result<Self, SimulationError> {
        let rows: Vec<Value> = serde_json::from_str(text)?;
        Self::from_rows(&rows, strict)
    }

    /// [`RequestStream::from_json`] in the mode set by `config.strict_records`
    pub fn from_json_with(text: &str, config: &SimConfig) -> Result<Self, SimulationError> {
        Self::from_json(text, config.strict_records)
    }

    /// Contiguous sub-stream of at most `len` requests starting at `start`
    pub fn window(&self, start: usize, len: usize) -> RequestStream {
        let start = start.min(self.requests.len());
        let end = start.saturating_add(len).min(self.requests.len());
        RequestStream {
            requests: self.requests[start..end].to_vec(),
            rejected: Vec::new(),
        }
    }

    /// Fresh iteration over the stream
    pub fn iter(&self) -> std::slice::Iter<'_, Request> {
        self.requests.iter()
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl<'a> IntoIterator for &'a RequestStream {
    type Item = &'a Request;
    type IntoIter = std::slice::Iter<'a, Request>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn malformed(row: usize, reason: impl Into<String>) -> SimulationError {
    SimulationError::MalformedRecord {
        row,
        reason: reason.into(),
    }
}

fn parse_row(row: usize, value: &Value, last_ts: f64) -> Result<Request, SimulationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| malformed(row, "row is not an object"))?;

    for field in REQUIRED_FIELDS {
        match obj.get(field) {
            None | Some(Value::Null) => {
                return Err(malformed(row, format!("missing required field '{}'", field)))
            }
            Some(_) => {}
        }
    }

    let timestamp = number_field(row, obj.get("timestamp"), "timestamp")?;
    let service_time = number_field(row, obj.get("service_time"), "service_time")?;
    if !timestamp.is_finite() {
        return Err(malformed(row, "timestamp must be finite"));
    }
    if !(service_time.is_finite() && service_time > 0.0) {
        return Err(malformed(
            row,
            format!("service_time must be positive, got {}", service_time),
        ));
    }
    if timestamp < last_ts {
        return Err(malformed(
            row,
            format!(
                "timestamp {} precedes previous timestamp {}",
                timestamp, last_ts
            ),
        ));
    }

    let request_type = text_field(obj.get("request_type"))
        .ok_or_else(|| malformed(row, "request_type must be a string or number"))?;

    let mut request = Request::new(row as u64, timestamp, service_time, request_type);
    for field in PASSTHROUGH_FIELDS {
        if let Some(text) = text_field(obj.get(field)) {
            request = request.with_attribute(field, text);
        }
    }
    Ok(request)
}

fn number_field(row: usize, value: Option<&Value>, name: &str) -> Result<f64, SimulationError> {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| malformed(row, format!("{} is not representable as f64", name))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed(row, format!("{} '{}' is not a number", name, s))),
        _ => Err(malformed(row, format!("{} must be numeric", name))),
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_field_reports_row() {
        let rows = vec![
            json!({"timestamp": 0.0, "service_time": 1.0, "request_type": "a", "student_id": 1}),
            json!({"timestamp": 1.0, "service_time": 1.0, "student_id": 2}),
        ];
        let err = RequestStream::from_rows(&rows, true).unwrap_err();
        match err {
            SimulationError::MalformedRecord { row, reason } => {
                assert_eq!(row, 1);
                assert!(reason.contains("request_type"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let rows = vec![json!({
            "timestamp": "3.5",
            "service_time": "0.25",
            "request_type": 7,
            "student_id": "s9"
        })];
        let stream = RequestStream::from_rows(&rows, true).unwrap();
        let req = &stream.requests()[0];
        assert_eq!(req.timestamp(), 3.5);
        assert_eq!(req.service_time(), 0.25);
        assert_eq!(req.request_type(), "7");
        assert_eq!(req.attribute("student_id"), Some("s9"));
    }

    #[test]
    fn test_decreasing_timestamp_checked_against_last_accepted_row() {
        let rows = vec![
            json!({"timestamp": 5.0, "service_time": 1.0, "request_type": "a", "student_id": 1}),
            // rejected: bad service time, must not advance the watermark
            json!({"timestamp": 9.0, "service_time": 0.0, "request_type": "a", "student_id": 2}),
            json!({"timestamp": 6.0, "service_time": 1.0, "request_type": "a", "student_id": 3}),
            json!({"timestamp": 4.0, "service_time": 1.0, "request_type": "a", "student_id": 4}),
        ];
        let stream = RequestStream::from_rows(&rows, false).unwrap();
        let ids: Vec<u64> = stream.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![0, 2]);
        let rejected_rows: Vec<usize> = stream.rejected().iter().map(|r| r.row).collect();
        assert_eq!(rejected_rows, vec![1, 3]);
    }

    #[test]
    fn test_from_requests_rejects_duplicate_ids() {
        let reqs = vec![Request::new(1, 0.0, 1.0, "a"), Request::new(1, 1.0, 1.0, "a")];
        assert!(matches!(
            RequestStream::from_requests(reqs),
            Err(SimulationError::MalformedRecord { row: 1, .. })
        ));
    }

    #[test]
    fn test_window_clamps_to_stream_end() {
        let reqs = (0..5)
            .map(|i| Request::new(i, i as f64, 1.0, "a"))
            .collect::<Vec<_>>();
        let stream = RequestStream::from_requests(reqs).unwrap();
        assert_eq!(stream.window(3, 10).len(), 2);
        assert_eq!(stream.window(10, 3).len(), 0);
    }
}
