//! Camera-to-camera minimum travel times.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Minimum travel time applied when a camera pair is absent from the matrix.
pub const DEFAULT_MIN_TRAVEL_S: f64 = 3.0;

/// Static map of `(camera_from, camera_to)` to the minimum number of
/// seconds a person needs to move between the two fields of view.
///
/// Derived from the store floor plan and loaded with the camera table.
/// The spatiotemporal gate consults it to reject physically impossible
/// cross-camera identity transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TravelTimeMatrix {
    matrix: HashMap<String, HashMap<String, f64>>,
}

impl TravelTimeMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: &str, to: &str, min_seconds: f64) {
        self.matrix
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string(), min_seconds);
    }

    /// Minimum seconds to travel `from -> to`. Unknown pairs fall back to
    /// [`DEFAULT_MIN_TRAVEL_S`].
    pub fn min_travel(&self, from: &str, to: &str) -> f64 {
        self.matrix
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(DEFAULT_MIN_TRAVEL_S)
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}
