//! Per-camera multi-object tracking.
//!
//! Greedy IoU association: detections inherit the id of the live track they
//! overlap best, everything else opens a new track. State is per camera and
//! serializable, so a clean shutdown can checkpoint to the bus KV and the
//! next worker generation continues the same id space.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use trinetra_core::types::Detection;

/// Minimum IoU for a detection to continue an existing track.
const IOU_THRESHOLD: f32 = 0.3;

/// Tracks silent longer than this are dropped.
const MAX_TRACK_AGE_S: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Track {
    track_id: u32,
    bbox: [f32; 4],
    last_ts: f64,
}

/// Serializable per-camera track state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraTracks {
    tracks: Vec<Track>,
    next_id: u32,
}

/// Tracker over all cameras this worker sees.
#[derive(Debug, Default)]
pub struct IouTracker {
    cameras: HashMap<String, CameraTracks>,
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    inter / (area_a + area_b - inter).max(f32::EPSILON)
}

impl IouTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign track ids to the frame's detections in place.
    pub fn assign(&mut self, camera_id: &str, detections: &mut [Detection], ts: f64) {
        let state = self.cameras.entry(camera_id.to_string()).or_default();
        state.tracks.retain(|t| ts - t.last_ts <= MAX_TRACK_AGE_S);

        // Score every live pair, best matches first, each side used once.
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (d, det) in detections.iter().enumerate() {
            for (t, track) in state.tracks.iter().enumerate() {
                let overlap = iou(&det.bbox, &track.bbox);
                if overlap >= IOU_THRESHOLD {
                    pairs.push((d, t, overlap));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut det_taken = vec![false; detections.len()];
        let mut track_taken = vec![false; state.tracks.len()];
        for (d, t, _) in pairs {
            if det_taken[d] || track_taken[t] {
                continue;
            }
            det_taken[d] = true;
            track_taken[t] = true;
            detections[d].track_id = Some(state.tracks[t].track_id);
            state.tracks[t].bbox = detections[d].bbox;
            state.tracks[t].last_ts = ts;
        }

        for (d, det) in detections.iter_mut().enumerate() {
            if det_taken[d] {
                continue;
            }
            let track_id = state.next_id;
            state.next_id += 1;
            det.track_id = Some(track_id);
            state.tracks.push(Track {
                track_id,
                bbox: det.bbox,
                last_ts: ts,
            });
        }
    }

    pub fn known_cameras(&self) -> Vec<String> {
        self.cameras.keys().cloned().collect()
    }

    /// Serialize one camera's state for checkpointing.
    pub fn export(&self, camera_id: &str) -> Option<Vec<u8>> {
        self.cameras
            .get(camera_id)
            .and_then(|state| serde_json::to_vec(state).ok())
    }

    /// Install previously checkpointed state for a camera. Ignored if the
    /// bytes do not parse (a stale or corrupt checkpoint starts fresh).
    pub fn import(&mut self, camera_id: &str, bytes: &[u8]) {
        if let Ok(state) = serde_json::from_slice::<CameraTracks>(bytes) {
            self.cameras.insert(camera_id.to_string(), state);
        }
    }

    pub fn has_camera(&self, camera_id: &str) -> bool {
        self.cameras.contains_key(camera_id)
    }
}
