//! Resolver metric instruments.

use std::sync::Arc;

use trinetra_core::metrics::{Counter, Gauge, Histogram, Registry, LATENCY_BUCKETS_S};

pub struct ResolverMetrics {
    pub registry: Arc<Registry>,
    pub reid_latency: Arc<Histogram>,
    pub ann_latency: Arc<Histogram>,
    pub active_identities: Arc<Gauge>,
    pub consumer_lag: Arc<Gauge>,
    pub deserialization_errors: Arc<Counter>,
    pub identity_flicker: Arc<Counter>,
}

impl ResolverMetrics {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            reid_latency: registry.histogram(
                "trinetra_reid_latency_seconds",
                "Per-event identity resolution latency",
                &[],
                LATENCY_BUCKETS_S,
            ),
            ann_latency: registry.histogram(
                "trinetra_ann_query_latency_seconds",
                "Gallery ANN search latency",
                &[],
                LATENCY_BUCKETS_S,
            ),
            active_identities: registry.gauge(
                "trinetra_active_identities",
                "Currently tracked unique identities",
                &[],
            ),
            consumer_lag: registry.gauge(
                "trinetra_detections_consumer_lag",
                "Uncommitted detection events behind the head",
                &[],
            ),
            deserialization_errors: registry.counter(
                "trinetra_deserialization_errors_total",
                "Malformed detection events skipped",
                &[],
            ),
            identity_flicker: registry.counter(
                "trinetra_identity_flicker_total",
                "Resolved tracks demoted after majority swings",
                &[],
            ),
            registry,
        }
    }

    pub fn matches(&self, camera_id: &str) -> Arc<Counter> {
        self.registry.counter(
            "trinetra_reid_matches_total",
            "History-confirmed identity matches",
            &[("camera_id", camera_id)],
        )
    }

    pub fn unknowns(&self, camera_id: &str) -> Arc<Counter> {
        self.registry.counter(
            "trinetra_reid_unknowns_total",
            "Unresolved identities",
            &[("camera_id", camera_id)],
        )
    }

    pub fn gate_rejections(&self, reason: &str) -> Arc<Counter> {
        self.registry.counter(
            "trinetra_spatiotemporal_gate_rejections_total",
            "Candidates rejected by the spatiotemporal gate",
            &[("reason", reason)],
        )
    }

    pub fn alerts(&self, kind: &str) -> Arc<Counter> {
        self.registry.counter(
            "trinetra_alerts_total",
            "Alerts emitted by kind",
            &[("kind", kind)],
        )
    }
}
