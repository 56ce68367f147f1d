//! Inference Worker service.
//!
//! The only GPU-bearing component of the pipeline. Consumes frames from all
//! cameras through one consumer group, micro-batches them for the detector,
//! crops and embeds faces, assigns track ids, and publishes one
//! `DetectionEvent` per input frame to the `detections` topic.
//!
//! # Loop shape
//!
//! ```text
//! consume(group, all streams) ──► MicroBatchAccumulator ──► flush
//!     decode ──► (B,3,640,640) ──► detector
//!     crops  ──► (C,3,112,112) ──► embedder (sub-batch <= 16)
//!     tracker.assign ──► publish per frame ──► ack
//! ```
//!
//! Crash recovery: on startup the worker reclaims pending entries that have
//! been idle over a minute and restores tracker state from the bus
//! checkpoint KV; a clean shutdown writes the checkpoints back.

pub mod batch;
pub mod http;
pub mod metrics;
pub mod service;
pub mod tensor;
pub mod tracker;

pub use service::InferenceWorker;
