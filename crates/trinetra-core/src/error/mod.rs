//! Error types for the TRINETRA pipeline.
//!
//! Per-domain error enums plus the unified [`TrinetraError`] used at crate
//! boundaries. Library code never panics; everything propagates with `?`.

mod sub_errors;
mod unified;

pub use sub_errors::{
    EventLogError, FrameBusError, OperatorError, SearchError, SourceError,
};
pub use unified::{Result, TrinetraError};
