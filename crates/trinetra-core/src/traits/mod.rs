//! Contract traits at the pipeline's seams.
//!
//! The two infrastructure contracts ([`FrameBus`], [`EventLog`]) are
//! implemented by the engine crates; the vision operator contracts
//! ([`PersonDetector`], [`FaceEmbedder`]) and the gallery contract
//! ([`SimilaritySearch`]) are implemented externally, with deterministic
//! stubs in [`crate::stubs`] for tests.

mod event_log;
mod frame_bus;
mod operators;
mod similarity;
mod source;

pub use event_log::{EventLog, LogRecord};
pub use frame_bus::{stream_key, BusEntry, EntryId, FrameBus, StreamStats};
pub use operators::{BoxDetection, FaceEmbedder, GpuSample, GpuTelemetry, PersonDetector};
pub use similarity::{GalleryPayload, SearchHit, SimilaritySearch};
pub use source::{CameraSource, RawFrame, SourceFactory};
