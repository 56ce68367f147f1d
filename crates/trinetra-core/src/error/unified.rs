//! Unified top-level error.

use thiserror::Error;

use crate::config::ConfigError;

use super::sub_errors::{
    EventLogError, FrameBusError, OperatorError, SearchError, SourceError,
};

/// Top-level error for all pipeline crates.
///
/// Service code usually handles the specific sub-error at the failure site
/// (retry, drop, emit UNKNOWN); this type exists for the boundaries where a
/// caller only needs "did it work".
#[derive(Debug, Error)]
pub enum TrinetraError {
    #[error(transparent)]
    FrameBus(#[from] FrameBusError),

    #[error(transparent)]
    EventLog(#[from] EventLogError),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TrinetraError>;
