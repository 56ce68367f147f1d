//! Frames and their bus metadata.

use serde::{Deserialize, Serialize};

use super::camera::CameraType;

/// Metadata attached to every frame placed on the frame bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMeta {
    pub camera_id: String,

    /// Carried on the bus so the worker does not need the camera table.
    pub camera_type: CameraType,

    /// Strictly increasing within one (ingestor epoch, camera) pair,
    /// starting at 0 each run.
    pub frame_index: u64,

    /// Wall-clock seconds at ingest, assigned by the ingestor.
    pub ingest_ts: f64,

    /// Camera-reported capture time, when the source provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_ts: Option<f64>,
}

impl FrameMeta {
    /// Camera-reported time when present, ingest wall-clock otherwise.
    /// All downstream timestamp comparisons use this value.
    pub fn effective_ts(&self) -> f64 {
        self.frame_ts.unwrap_or(self.ingest_ts)
    }
}

/// A decoded image at a point in time: JPEG bytes of a 640x640 image plus
/// the metadata the worker needs to attribute it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub meta: FrameMeta,
    pub jpeg: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(frame_ts: Option<f64>) -> FrameMeta {
        FrameMeta {
            camera_id: "cam_01".into(),
            camera_type: CameraType::Tracking,
            frame_index: 7,
            ingest_ts: 1000.5,
            frame_ts,
        }
    }

    #[test]
    fn effective_ts_prefers_camera_time() {
        assert_eq!(meta(Some(999.9)).effective_ts(), 999.9);
        assert_eq!(meta(None).effective_ts(), 1000.5);
    }

    #[test]
    fn frame_ts_omitted_from_wire_when_absent() {
        let json = serde_json::to_string(&meta(None)).unwrap();
        assert!(!json.contains("frame_ts"));
    }
}
