//! Vision operator contracts.
//!
//! The detector and embedder are GPU-resident black boxes behind these
//! traits; the pipeline only depends on their tensor shapes, output
//! schemas, and latency envelopes.
//!
//! # Contracts
//!
//! | Operator | Input | Output | Budget |
//! |---|---|---|---|
//! | Detector | `(B, 3, 640, 640)` f32 | per-frame `(bbox, conf)` lists | <= 50 ms at B=4 |
//! | Embedder | `(C, 3, 112, 112)` f32 | `(C, 512)` L2-normalized | <= 20 ms at C=16 |

use async_trait::async_trait;
use ndarray::Array4;

use crate::error::OperatorError;

/// A raw detector hit, before tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxDetection {
    /// `[x1, y1, x2, y2]` in input-frame pixels.
    pub bbox: [f32; 4],
    pub conf: f32,
}

/// Person detector operator.
#[async_trait]
pub trait PersonDetector: Send + Sync {
    /// Run detection over a `(B, 3, 640, 640)` batch. The result holds one
    /// list per input frame, in input order.
    async fn detect(&self, batch: &Array4<f32>) -> Result<Vec<Vec<BoxDetection>>, OperatorError>;
}

/// Face embedder operator.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    /// Embed a `(C, 3, 112, 112)` batch of face crops into 512-dim
    /// L2-normalized vectors, one per crop, in input order.
    async fn embed(&self, crops: &Array4<f32>) -> Result<Vec<Vec<f32>>, OperatorError>;
}

/// A point-in-time GPU reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuSample {
    pub utilization_pct: f64,
    pub vram_used_mb: f64,
}

/// Optional GPU telemetry hook supplied by the operator runtime.
/// `None` means no device is visible (CPU-only development machines).
pub trait GpuTelemetry: Send + Sync {
    fn sample(&self) -> Option<GpuSample>;
}
