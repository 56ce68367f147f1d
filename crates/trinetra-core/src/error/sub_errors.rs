//! Per-domain error types. Each covers one seam of the pipeline.

use thiserror::Error;

/// Frame bus failures.
#[derive(Debug, Error)]
pub enum FrameBusError {
    /// Backing store unreachable. The publisher drops the frame, counts
    /// it, and surfaces this to the caller.
    #[error("Frame bus store unreachable: {0}")]
    StoreUnreachable(String),

    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    /// Consumer group has not been created on this stream.
    #[error("Unknown group {group} on stream {stream}")]
    UnknownGroup { stream: String, group: String },

    /// Payload or checkpoint blob failed to encode or decode in transit.
    #[error("Frame bus codec error: {0}")]
    Codec(String),
}

/// Event log failures.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Underlying store failure (open, read, write, compaction).
    #[error("Event log storage error: {0}")]
    Storage(String),

    #[error("Event log codec error: {0}")]
    Serialization(String),

    /// Commit for an offset beyond the partition head.
    #[error("Commit out of range: {topic}/{partition} offset {offset}, head {head}")]
    CommitOutOfRange {
        topic: String,
        partition: u32,
        offset: u64,
        head: u64,
    },
}

/// Vision operator failures (detector, embedder).
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Device memory exhausted. The worker shrinks the sub-batch and
    /// retries once before emitting an empty result.
    #[error("Operator out of memory at batch size {batch}")]
    OutOfMemory { batch: usize },

    #[error("Operator timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("Input shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Operator failed: {0}")]
    Failed(String),
}

/// Similarity search backend failures.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Backend unreachable. The resolver emits UNKNOWN identities and
    /// withholds offset commits until publishing succeeds again.
    #[error("Similarity backend unavailable: {0}")]
    Unavailable(String),

    #[error("Similarity query timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Similarity backend error: {0}")]
    Backend(String),
}

/// Camera source failures.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Stream lost. The reader closes and reopens with exponential backoff.
    #[error("Camera stream disconnected: {0}")]
    Disconnected(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Camera read timed out")]
    Timeout,

    /// RTSP URL rejected by the CIDR allowlist.
    #[error("Camera URL not allowed: {0}")]
    NotAllowed(String),
}
