//! Metrics recording and aggregation
//!
//! [`MetricsRecorder`] collects outcomes during a run in completion order.
//! Aggregates are pure functions over a finalized [`OutcomeTable`]; nothing
//! is cached between calls.
//!
//! Percentiles use linear interpolation between closest ranks: for `n`
//! sorted values and quantile `q`, position `q·(n-1)` is interpolated between
//! its floor and ceiling neighbours.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::SimulationError;
use crate::models::{Outcome, OutcomeTable, Request, RequestId, ServerId};

/// Start-of-service fragment awaiting completion
#[derive(Debug, Clone)]
struct Started {
    request_type: String,
    server_id: ServerId,
    arrival_time: f64,
    start_time: f64,
    attributes: BTreeMap<String, String>,
}

/// Collects one outcome per completed request
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    sla_seconds: f64,
    in_flight: HashMap<RequestId, Started>,
    rows: Vec<Outcome>,
}

impl MetricsRecorder {
    pub fn new(sla_seconds: f64) -> Self {
        Self {
            sla_seconds,
            in_flight: HashMap::new(),
            rows: Vec::new(),
        }
    }

    /// Record that `request` started on `server_id`
    pub fn record_start(&mut self, request: &Request, server_id: ServerId, start_time: f64) {
        self.in_flight.insert(
            request.id(),
            Started {
                request_type: request.request_type().to_string(),
                server_id,
                arrival_time: request.timestamp(),
                start_time,
                attributes: request.attributes().clone(),
            },
        );
    }

    /// Finalize the outcome of a started request
    ///
    /// Fails if the request was never started or already completed.
    pub fn record_completion(
        &mut self,
        request_id: RequestId,
        completion_time: f64,
    ) -> Result<&Outcome, SimulationError> {
        let started = self.in_flight.remove(&request_id).ok_or_else(|| {
            SimulationError::PolicyContractViolation {
                policy: "simulator".to_string(),
                reason: format!("completion for request {} that is not in flight", request_id),
            }
        })?;
        let response_time = completion_time - started.arrival_time;
        self.rows.push(Outcome {
            request_id,
            request_type: started.request_type,
            server_id: started.server_id,
            arrival_time: started.arrival_time,
            start_time: started.start_time,
            completion_time,
            wait_time: started.start_time - started.arrival_time,
            response_time,
            // inclusive boundary
            sla_met: response_time <= self.sla_seconds,
            attributes: started.attributes,
        });
        Ok(&self.rows[self.rows.len() - 1])
    }

    /// Outcomes recorded so far
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Requests started but not completed
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Freeze the recorded outcomes
    pub fn finalize(self, truncated: bool) -> OutcomeTable {
        OutcomeTable::new(self.rows, truncated)
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// Aggregate statistics of an outcome table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub count: usize,
    pub mean_response_time: f64,
    pub p95_response_time: f64,
    /// Share of requests meeting the SLA, in percent
    pub sla_percentage: f64,
    pub mean_wait_time: f64,
    pub max_wait_time: f64,
}

impl Aggregates {
    /// Compute every aggregate; `None` for an empty table
    pub fn from_table(table: &OutcomeTable) -> Option<Self> {
        Self::from_rows(table.rows())
    }

    fn from_rows(rows: &[Outcome]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let n = rows.len() as f64;
        let mut responses: Vec<f64> = rows.iter().map(|o| o.response_time).collect();
        Some(Self {
            count: rows.len(),
            mean_response_time: responses.iter().sum::<f64>() / n,
            p95_response_time: percentile_in_place(&mut responses, 0.95),
            sla_percentage: 100.0 * rows.iter().filter(|o| o.sla_met).count() as f64 / n,
            mean_wait_time: rows.iter().map(|o| o.wait_time).sum::<f64>() / n,
            max_wait_time: rows.iter().map(|o| o.wait_time).fold(0.0, f64::max),
        })
    }
}

/// Mean response time (NaN for an empty table)
pub fn mean_response_time(table: &OutcomeTable) -> f64 {
    if table.is_empty() {
        return f64::NAN;
    }
    table.rows().iter().map(|o| o.response_time).sum::<f64>() / table.len() as f64
}

/// 95th percentile of response time (NaN for an empty table)
pub fn p95_response_time(table: &OutcomeTable) -> f64 {
    percentile_in_place(&mut table.response_times(), 0.95)
}

/// Percentage of requests meeting the SLA (NaN for an empty table)
pub fn sla_percentage(table: &OutcomeTable) -> f64 {
    if table.is_empty() {
        return f64::NAN;
    }
    100.0 * table.rows().iter().filter(|o| o.sla_met).count() as f64 / table.len() as f64
}

/// Aggregates per subgroup
///
/// `key` is `"request_type"` or the name of a passthrough attribute; rows
/// lacking the attribute are grouped under `"unknown"`.
pub fn aggregates_by(table: &OutcomeTable, key: &str) -> BTreeMap<String, Aggregates> {
    let mut groups: BTreeMap<String, Vec<Outcome>> = BTreeMap::new();
    for row in table.rows() {
        let group = if key == "request_type" {
            row.request_type.clone()
        } else {
            row.attributes
                .get(key)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string())
        };
        groups.entry(group).or_default().push(row.clone());
    }
    groups
        .into_iter()
        .filter_map(|(group, rows)| Aggregates::from_rows(&rows).map(|agg| (group, agg)))
        .collect()
}

impl OutcomeTable {
    /// Aggregates per value of `key` (see [`aggregates_by`])
    pub fn aggregates_by(&self, key: &str) -> BTreeMap<String, Aggregates> {
        aggregates_by(self, key)
    }
}

/// Linear-interpolation percentile of unsorted values
///
/// Reorders `values` (partial selection, O(n)). `q` is clamped to [0, 1].
/// Returns NaN for an empty slice.
pub fn percentile_in_place(values: &mut [f64], q: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let frac = pos - lo as f64;

    let (_, lo_val, upper) = values.select_nth_unstable_by(lo, |a, b| a.total_cmp(b));
    let lo_val = *lo_val;
    if frac == 0.0 || upper.is_empty() {
        return lo_val;
    }
    let hi_val = upper.iter().copied().fold(f64::INFINITY, f64::min);
    lo_val + frac * (hi_val - lo_val)
}

/// Linear-interpolation percentile of already sorted values
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u64, ts: f64) -> Request {
        Request::new(id, ts, 1.0, if id % 2 == 0 { "even" } else { "odd" })
            .with_attribute("sex", if id < 2 { "F" } else { "M" })
    }

    fn table_with_responses(responses: &[f64], sla: f64) -> OutcomeTable {
        let mut recorder = MetricsRecorder::new(sla);
        for (i, r) in responses.iter().enumerate() {
            let req = request(i as u64, 0.0);
            recorder.record_start(&req, 0, 0.0);
            recorder.record_completion(req.id(), *r).unwrap();
        }
        recorder.finalize(false)
    }

    #[test]
    fn test_sla_boundary_is_inclusive() {
        let table = table_with_responses(&[2.0, 2.0000001], 2.0);
        assert!(table.rows()[0].sla_met);
        assert!(!table.rows()[1].sla_met);
        assert_eq!(sla_percentage(&table), 50.0);
    }

    #[test]
    fn test_completion_without_start_fails() {
        let mut recorder = MetricsRecorder::new(1.0);
        assert!(recorder.record_completion(9, 1.0).is_err());
    }

    #[test]
    fn test_wait_and_response_derivation() {
        let mut recorder = MetricsRecorder::new(10.0);
        let req = Request::new(0, 1.0, 2.0, "a");
        recorder.record_start(&req, 3, 2.5);
        let outcome = recorder.record_completion(0, 4.5).unwrap().clone();
        assert_eq!(outcome.wait_time, 1.5);
        assert_eq!(outcome.response_time, 3.5);
        assert_eq!(outcome.server_id, 3);
        assert_eq!(recorder.in_flight(), 0);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile_in_place(&mut values, 0.5), 3.0);
        let mut values = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        // pos = 0.95 * 4 = 3.8 → 4 + 0.8 * (5 - 4)
        assert!((percentile_in_place(&mut values, 0.95) - 4.8).abs() < 1e-12);
        assert!((percentile_sorted(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.95) - 4.8).abs() < 1e-12);
        assert!(percentile_in_place(&mut [], 0.5).is_nan());
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile_in_place(&mut [7.0], 0.95), 7.0);
        assert_eq!(percentile_sorted(&[7.0], 0.95), 7.0);
    }

    #[test]
    fn test_aggregates_match_free_functions() {
        let table = table_with_responses(&[1.0, 2.0, 3.0, 4.0], 2.5);
        let agg = Aggregates::from_table(&table).unwrap();
        assert_eq!(agg.count, 4);
        assert_eq!(agg.mean_response_time, mean_response_time(&table));
        assert_eq!(agg.p95_response_time, p95_response_time(&table));
        assert_eq!(agg.sla_percentage, 50.0);
    }

    #[test]
    fn test_aggregates_by_attribute_and_type() {
        let table = table_with_responses(&[1.0, 2.0, 3.0, 4.0], 10.0);
        let by_sex = aggregates_by(&table, "sex");
        assert_eq!(by_sex["F"].count, 2);
        assert_eq!(by_sex["M"].mean_response_time, 3.5);

        let by_type = aggregates_by(&table, "request_type");
        assert_eq!(by_type["even"].count, 2);

        let by_missing = table.aggregates_by("medu");
        assert_eq!(by_missing["unknown"].count, 4);
    }

    #[test]
    fn test_empty_table_aggregates() {
        let table = OutcomeTable::default();
        assert!(Aggregates::from_table(&table).is_none());
        assert!(mean_response_time(&table).is_nan());
        assert!(sla_percentage(&table).is_nan());
    }
}
