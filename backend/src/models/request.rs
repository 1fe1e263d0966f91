//! Request model
//!
//! A request is one unit of work arriving at the server pool.
//! Each request has:
//! - A unique id (source row index of the input table)
//! - Arrival timestamp (non-decreasing across a stream)
//! - Required service time (> 0)
//! - Request type (categorical)
//! - Passthrough attributes (demographic fields) kept verbatim for
//!   subgroup analysis of outcomes
//!
//! Requests are immutable once created.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique request identifier
pub type RequestId = u64;

/// Attribute names carried from input rows to outcome rows
pub const PASSTHROUGH_FIELDS: [&str; 5] = ["student_id", "sex", "internet", "medu", "fedu"];

/// Immutable request record
///
/// # Example
/// ```
/// use dispatch_simulator_core_rs::Request;
///
/// let req = Request::new(0, 12.5, 3.0, "quiz")
///     .with_attribute("student_id", "s-001")
///     .with_attribute("sex", "F");
///
/// assert_eq!(req.timestamp(), 12.5);
/// assert_eq!(req.attribute("sex"), Some("F"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    id: RequestId,
    timestamp: f64,
    service_time: f64,
    request_type: String,
    attributes: BTreeMap<String, String>,
}

impl Request {
    /// Create a new request
    ///
    /// # Panics
    /// Panics if `service_time` is not a positive finite number or
    /// `timestamp` is not finite. Input rows are validated by the request
    /// stream before they get here.
    pub fn new(
        id: RequestId,
        timestamp: f64,
        service_time: f64,
        request_type: impl Into<String>,
    ) -> Self {
        assert!(timestamp.is_finite(), "timestamp must be finite");
        assert!(
            service_time.is_finite() && service_time > 0.0,
            "service_time must be positive"
        );
        Self {
            id,
            timestamp,
            service_time,
            request_type: request_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach a passthrough attribute (builder style)
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn service_time(&self) -> f64 {
        self.service_time
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}
