//! Ingestor metric instruments.

use std::sync::Arc;

use trinetra_core::metrics::{Counter, Gauge, Histogram, Registry, LATENCY_BUCKETS_S};
use trinetra_core::types::Camera;

/// Per-camera instrument bundle, created once per supervisor.
pub struct CameraMetrics {
    pub frames_ingested: Arc<Counter>,
    pub frames_dropped: Arc<Counter>,
    pub reconnects: Arc<Counter>,
    pub fill_ratio: Arc<Gauge>,
    pub stream_length: Arc<Gauge>,
    pub frame_latency: Arc<Histogram>,
}

impl CameraMetrics {
    pub fn new(registry: &Registry, camera: &Camera) -> Self {
        let id = camera.camera_id.as_str();
        Self {
            frames_ingested: registry.counter(
                "trinetra_ingestor_frames_total",
                "Total frames ingested per camera",
                &[("camera_id", id), ("camera_type", camera.camera_type.as_str())],
            ),
            frames_dropped: registry.counter(
                "trinetra_ingestor_frames_dropped_total",
                "Frames dropped by validation, sampling, suppression, or backpressure",
                &[("camera_id", id)],
            ),
            reconnects: registry.counter(
                "trinetra_ingestor_reconnects_total",
                "Camera stream reconnect attempts",
                &[("camera_id", id)],
            ),
            fill_ratio: registry.gauge(
                "trinetra_ingestor_stream_fill_ratio",
                "Frame stream fill ratio per camera",
                &[("camera_id", id)],
            ),
            stream_length: registry.gauge(
                "trinetra_frame_stream_length",
                "Current entries in the per-camera frame stream",
                &[("camera_id", id)],
            ),
            frame_latency: registry.histogram(
                "trinetra_ingestor_frame_latency_seconds",
                "Time from queue handoff to bus publish",
                &[],
                LATENCY_BUCKETS_S,
            ),
        }
    }
}
