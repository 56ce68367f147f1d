//! Worker metric instruments.

use std::sync::Arc;

use trinetra_core::metrics::{Counter, Gauge, Histogram, Registry, LATENCY_BUCKETS_S};

pub struct WorkerMetrics {
    pub registry: Arc<Registry>,
    pub detection_latency: Arc<Histogram>,
    pub embedding_latency: Arc<Histogram>,
    pub batch_fill_ratio: Arc<Gauge>,
    pub publish_errors: Arc<Counter>,
    pub gpu_utilization: Arc<Gauge>,
    pub gpu_vram_used: Arc<Gauge>,
}

impl WorkerMetrics {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            detection_latency: registry.histogram(
                "trinetra_detection_latency_seconds",
                "Detector inference latency",
                &[],
                LATENCY_BUCKETS_S,
            ),
            embedding_latency: registry.histogram(
                "trinetra_embedding_latency_seconds",
                "Embedder inference latency",
                &[],
                LATENCY_BUCKETS_S,
            ),
            batch_fill_ratio: registry.gauge(
                "trinetra_worker_batch_fill_ratio",
                "Fraction of the micro-batch size cap in use",
                &[],
            ),
            publish_errors: registry.counter(
                "trinetra_publish_errors_total",
                "Detection events dropped after exhausting publish retries",
                &[],
            ),
            gpu_utilization: registry.gauge(
                "trinetra_gpu_utilization_pct",
                "GPU utilization percent",
                &[],
            ),
            gpu_vram_used: registry.gauge(
                "trinetra_gpu_vram_used_mb",
                "GPU VRAM used in MB",
                &[],
            ),
            registry,
        }
    }

    pub fn frames_processed(&self, camera_id: &str) -> Arc<Counter> {
        self.registry.counter(
            "trinetra_worker_frames_processed_total",
            "Frames fully processed",
            &[("camera_id", camera_id)],
        )
    }

    pub fn detections_total(&self, camera_id: &str) -> Arc<Counter> {
        self.registry.counter(
            "trinetra_detections_total",
            "Person detections produced",
            &[("camera_id", camera_id)],
        )
    }
}
