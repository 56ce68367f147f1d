//! Wire events published to the event log.
//!
//! Three topics, three event shapes:
//!
//! | Topic | Event | Partition key |
//! |---|---|---|
//! | `detections` | [`DetectionEvent`] | `camera_id` |
//! | `identities` | [`IdentityEvent`] | `customer_id` |
//! | `alerts` | [`AlertEvent`] | `kind` |
//!
//! Every per-detection resolution produces exactly one [`IdentityEvent`]
//! whose [`IdentitySource`] enumerates the outcome. Consumers never branch
//! on the presence of an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::camera::CameraType;
use super::detection::Detection;

/// Placeholder customer id for unresolved detections.
pub const UNKNOWN_CUSTOMER: &str = "UNKNOWN";

/// One published record per processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub camera_id: String,
    pub camera_type: CameraType,
    pub frame_index: u64,
    pub effective_ts: f64,
    pub detections: Vec<Detection>,
}

/// Outcome of resolving a single detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// History-confirmed gallery match.
    Matched,
    /// Candidates existed but the spatiotemporal gate removed them all.
    GatedUnknown,
    /// No candidate crossed the threshold, or the history ring has not
    /// confirmed one yet.
    InsufficientHistory,
    /// The similarity backend was unreachable.
    QdrantUnavailable,
}

/// Published per resolved detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityEvent {
    pub camera_id: String,
    pub track_id: u32,
    pub effective_ts: f64,
    /// Resolved customer, or the literal `"UNKNOWN"`.
    pub customer_id: String,
    pub confidence: f32,
    pub source: IdentitySource,
}

impl IdentityEvent {
    pub fn unknown(
        camera_id: &str,
        track_id: u32,
        effective_ts: f64,
        source: IdentitySource,
    ) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            track_id,
            effective_ts,
            customer_id: UNKNOWN_CUSTOMER.to_string(),
            confidence: 0.0,
            source,
        }
    }
}

/// Policy-triggered alert categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    UnknownAtBilling,
    FalseMergeSuspect,
    VipDetected,
    DriftWarning,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::UnknownAtBilling => "UNKNOWN_AT_BILLING",
            AlertKind::FalseMergeSuspect => "FALSE_MERGE_SUSPECT",
            AlertKind::VipDetected => "VIP_DETECTED",
            AlertKind::DriftWarning => "DRIFT_WARNING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Published on policy-triggered conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: Uuid,
    pub kind: AlertKind,
    pub severity: Severity,
    pub camera_id: String,
    pub customer_id: Option<String>,
    pub ts: f64,
    pub details: HashMap<String, Value>,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, severity: Severity, camera_id: &str, ts: f64) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            kind,
            severity,
            camera_id: camera_id.to_string(),
            customer_id: None,
            ts,
            details: HashMap::new(),
        }
    }

    pub fn with_customer(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}
