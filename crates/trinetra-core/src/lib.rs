//! TRINETRA Core Library
//!
//! Shared foundation for the TRINETRA multi-camera identity pipeline.
//!
//! # Architecture
//!
//! This crate defines:
//! - Domain types (`Camera`, `Frame`, `Detection`, the wire events)
//! - Contract traits (`FrameBus`, `EventLog`, `PersonDetector`,
//!   `FaceEmbedder`, `SimilaritySearch`, `CameraSource`)
//! - Error types and the crate-wide [`Result`] alias
//! - Configuration (environment settings, camera table, named constants)
//! - The in-process metrics registry with Prometheus text exposition
//! - Deterministic stub implementations of the operator contracts for tests
//!
//! The services (`trinetra-ingestor`, `trinetra-worker`, `trinetra-resolver`)
//! and the two infrastructure engines (`trinetra-framebus`,
//! `trinetra-eventlog`) all depend on this crate and nothing else shared.

pub mod config;
pub mod error;
pub mod metrics;
pub mod stubs;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use config::{CamerasFile, ConfigError};
pub use error::{Result, TrinetraError};
pub use types::{
    AlertEvent, AlertKind, Camera, CameraType, Detection, DetectionEvent, Frame, FrameMeta,
    HistoryRing, IdentityEvent, IdentitySource, Severity, TravelTimeMatrix,
};
