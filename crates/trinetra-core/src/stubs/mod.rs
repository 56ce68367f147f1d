//! Deterministic stand-ins for the external contracts.
//!
//! Used by unit tests and by local development runs without a GPU, a camera
//! wall, or a vector database. Behavior is fully deterministic so pipeline
//! tests can assert exact outputs.

mod gallery;
mod operators;
mod source;

pub use gallery::MemoryGallery;
pub use operators::{StubDetector, StubEmbedder};
pub use source::{SyntheticFactory, SyntheticSource};
