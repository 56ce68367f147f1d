//! Stream Ingestor service.
//!
//! Owns all camera-decoder state and presents a clean frame stream on the
//! frame bus. No inference happens here.
//!
//! # Per-camera pipeline
//!
//! One independent supervisor per camera, sharing nothing with siblings:
//!
//! 1. **Reader**: blocking decode loop on a dedicated task, reconnecting
//!    with exponential backoff (1s doubling to a 30s ceiling).
//! 2. **Validator**: drops blank or corrupted frames by pixel statistics.
//! 3. **Adaptive sampler**: widens its skip interval under bus backpressure,
//!    narrows it under motion.
//! 4. **Burst suppressor**: token bucket at the camera's target rate.
//! 5. **Resizer**: 640x640 bilinear resize, JPEG encode, publish.
//!
//! Billing and entrance cameras bypass the sampler's drop branch; only the
//! burst suppressor may drop them.

pub mod analysis;
pub mod bucket;
pub mod camera;
pub mod encode;
pub mod http;
pub mod metrics;
pub mod queue;
pub mod sampler;
pub mod service;

pub use service::IngestorService;
