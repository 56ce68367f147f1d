//! In-process metrics with Prometheus text exposition.
//!
//! A small registry of counters, gauges, and fixed-bucket histograms backed
//! by atomics. Instruments are cheap to clone (`Arc` inside) and safe to
//! update from any task; `render` produces the text format served on
//! `/metrics`.

mod registry;

pub use registry::{Counter, Gauge, Histogram, Registry};

/// Latency buckets shared by the pipeline's timing histograms, in seconds.
pub const LATENCY_BUCKETS_S: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5];
