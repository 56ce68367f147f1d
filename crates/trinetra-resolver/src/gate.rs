//! Spatiotemporal plausibility gate.
//!
//! If a person was last seen at the entrance two seconds ago, a high-cosine
//! match at a billing counter fifty meters away is not that person. The
//! gate rejects candidate identities whose implied motion between cameras
//! is faster than the floor plan allows, eliminating a class of
//! false-positive matches every embedding system produces in crowded
//! scenes.
//!
//! The gate prefers false-rejects over false-accepts: a false-reject costs
//! one UNKNOWN event, a false-accept attributes someone else's purchase.

use trinetra_core::types::TravelTimeMatrix;

/// A registry record as the gate sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct LastSeen {
    pub camera: String,
    pub ts: f64,
}

/// Outcome of gating one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Plausible transition (or first sighting, or same camera).
    Accept,
    /// The registry entry aged past the session window: treat the entry as
    /// expired and the candidate as a fresh sighting.
    AcceptExpired,
    /// Transition faster than the floor plan allows.
    RejectImpossible,
}

/// Validates cross-camera transitions against minimum travel times.
#[derive(Debug, Clone)]
pub struct SpatiotemporalGate {
    matrix: TravelTimeMatrix,
    window_s: f64,
    /// Travel times are scaled down by this factor to absorb residual
    /// cross-camera clock skew.
    safety_factor: f64,
}

impl SpatiotemporalGate {
    pub fn new(matrix: TravelTimeMatrix, window_s: f64, safety_factor: f64) -> Self {
        Self {
            matrix,
            window_s,
            safety_factor,
        }
    }

    /// Evaluate a candidate seen at `current_camera` / `current_ts` against
    /// its last registry sighting.
    pub fn evaluate(
        &self,
        last_seen: Option<&LastSeen>,
        current_camera: &str,
        current_ts: f64,
    ) -> GateDecision {
        let Some(last) = last_seen else {
            // First sighting: nothing to contradict.
            return GateDecision::Accept;
        };

        if last.camera == current_camera {
            return GateDecision::Accept;
        }

        let elapsed = current_ts - last.ts;
        if elapsed >= self.window_s {
            return GateDecision::AcceptExpired;
        }

        let min_travel = self.matrix.min_travel(&last.camera, current_camera) * self.safety_factor;
        if elapsed < min_travel {
            return GateDecision::RejectImpossible;
        }
        GateDecision::Accept
    }
}
