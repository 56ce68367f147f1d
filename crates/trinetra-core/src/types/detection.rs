//! Per-person detection records.

use serde::{Deserialize, Serialize};

/// Dimensionality of the face embedding space.
pub const EMBEDDING_DIM: usize = 512;

/// Maximum allowed deviation of an embedding's L2 norm from 1.0.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-5;

/// One person detected in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box `[x1, y1, x2, y2]` in pixel coordinates of the
    /// 640x640 inference frame.
    pub bbox: [f32; 4],

    /// Detector class confidence in [0, 1].
    pub conf: f32,

    /// Assigned by the tracker; stable across frames within one camera.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u32>,

    /// 512-dim L2-normalized face embedding, present only when a face
    /// crop was extractable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Detection {
    /// Whether the embedding satisfies the unit-norm invariant
    /// `| ||e|| - 1 | < 1e-5`. Detections without an embedding pass.
    pub fn embedding_is_unit_norm(&self) -> bool {
        match &self.embedding {
            None => true,
            Some(e) => {
                let norm = e.iter().map(|x| x * x).sum::<f32>().sqrt();
                (norm - 1.0).abs() < UNIT_NORM_TOLERANCE
            }
        }
    }
}

/// L2-normalize a vector in place. Leaves zero vectors untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two unit vectors (plain dot product).
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
