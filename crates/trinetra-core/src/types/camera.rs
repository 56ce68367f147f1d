//! Camera configuration types.

use serde::{Deserialize, Serialize};

/// Functional role of a camera within the store.
///
/// The role drives sampling policy (billing and entrance feeds bypass the
/// adaptive drop branch), ANN search effort in the resolver, and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraType {
    /// Door-facing camera used for footfall counting.
    Entrance,
    /// High-resolution face capture near the entrance.
    FaceCapture,
    /// In-aisle journey tracking.
    Tracking,
    /// Billing counter camera. Identity errors here have financial impact.
    Billing,
    /// Parking / vehicle monitoring.
    Vehicle,
    /// Emotion analysis feed.
    Emotion,
}

impl CameraType {
    /// Cameras whose frames may only be dropped by the burst suppressor,
    /// never by the adaptive sampler.
    pub fn is_priority(self) -> bool {
        matches!(self, CameraType::Billing | CameraType::Entrance)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraType::Entrance => "entrance",
            CameraType::FaceCapture => "face_capture",
            CameraType::Tracking => "tracking",
            CameraType::Billing => "billing",
            CameraType::Vehicle => "vehicle",
            CameraType::Emotion => "emotion",
        }
    }
}

/// A configured camera input.
///
/// Immutable for a service lifetime; the table is reloaded on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// Short stable identifier, e.g. `cam_entrance_01`.
    pub camera_id: String,

    /// RTSP source URL. Validated against the configured CIDR allowlist
    /// at startup.
    pub rtsp_url: String,

    #[serde(rename = "type")]
    pub camera_type: CameraType,

    /// Frames per second the inference side wants from this camera.
    pub target_fps: u32,

    /// 0 is highest priority, 5 lowest.
    #[serde(default = "default_priority_tier")]
    pub priority_tier: u8,
}

fn default_priority_tier() -> u8 {
    3
}
