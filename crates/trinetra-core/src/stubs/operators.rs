//! Stub detector and embedder.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ndarray::Array4;

use crate::error::OperatorError;
use crate::traits::{BoxDetection, FaceEmbedder, PersonDetector};
use crate::types::EMBEDDING_DIM;

/// Returns a fixed detection list for every input frame.
#[derive(Debug, Clone)]
pub struct StubDetector {
    per_frame: Vec<BoxDetection>,
}

impl Default for StubDetector {
    fn default() -> Self {
        Self {
            per_frame: vec![BoxDetection {
                bbox: [200.0, 120.0, 360.0, 520.0],
                conf: 0.9,
            }],
        }
    }
}

impl StubDetector {
    /// Detector that reports `per_frame` for every frame.
    pub fn with(per_frame: Vec<BoxDetection>) -> Self {
        Self { per_frame }
    }

    /// Detector that reports nothing (empty scenes).
    pub fn empty() -> Self {
        Self { per_frame: vec![] }
    }
}

#[async_trait]
impl PersonDetector for StubDetector {
    async fn detect(&self, batch: &Array4<f32>) -> Result<Vec<Vec<BoxDetection>>, OperatorError> {
        Ok((0..batch.shape()[0]).map(|_| self.per_frame.clone()).collect())
    }
}

/// Emits a deterministic unit basis vector per crop, derived from the crop
/// content, so identical crops embed identically.
#[derive(Debug, Default)]
pub struct StubEmbedder {
    /// Number of upcoming calls that should fail with OOM.
    fail_oom: AtomicUsize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` embed calls fail with [`OperatorError::OutOfMemory`].
    pub fn fail_with_oom(&self, n: usize) {
        self.fail_oom.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl FaceEmbedder for StubEmbedder {
    async fn embed(&self, crops: &Array4<f32>) -> Result<Vec<Vec<f32>>, OperatorError> {
        let remaining = self.fail_oom.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_oom.store(remaining - 1, Ordering::SeqCst);
            return Err(OperatorError::OutOfMemory {
                batch: crops.shape()[0],
            });
        }

        let mut out = Vec::with_capacity(crops.shape()[0]);
        for crop in crops.outer_iter() {
            let checksum: f32 = crop.iter().map(|v| v.abs()).sum();
            let index = (checksum * 7.0) as usize % EMBEDDING_DIM;
            let mut e = vec![0.0f32; EMBEDDING_DIM];
            e[index] = 1.0;
            out.push(e);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detector_reports_per_frame() {
        let det = StubDetector::default();
        let batch = Array4::<f32>::zeros((3, 3, 640, 640));
        let results = det.detect(&batch).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].len(), 1);
    }

    #[tokio::test]
    async fn embedder_outputs_unit_vectors() {
        let emb = StubEmbedder::new();
        let crops = Array4::<f32>::from_elem((2, 3, 112, 112), 0.5);
        let vectors = emb.embed(&crops).await.unwrap();
        assert_eq!(vectors.len(), 2);
        for v in &vectors {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-6);
        }
        // Identical crops embed identically.
        assert_eq!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn oom_injection_is_consumed() {
        let emb = StubEmbedder::new();
        emb.fail_with_oom(1);
        let crops = Array4::<f32>::zeros((1, 3, 112, 112));
        assert!(matches!(
            emb.embed(&crops).await,
            Err(OperatorError::OutOfMemory { .. })
        ));
        assert!(emb.embed(&crops).await.is_ok());
    }
}
