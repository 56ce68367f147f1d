//! Configuration: named constants, environment settings, camera table.

pub mod constants;

mod cameras;
mod settings;

use thiserror::Error;

pub use cameras::{CamerasFile, CidrAllowlist};
pub use settings::{BrokerSettings, IngestorSettings, ResolverSettings, WorkerSettings};

/// Configuration failures. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("Cannot parse config file {path}: {reason}")]
    FileParse { path: String, reason: String },

    #[error("Invalid environment variable {name}: {reason}")]
    EnvVar { name: String, reason: String },

    #[error("Invalid configuration: {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Read an environment variable, falling back to `default` when unset.
/// Returns an error only when the variable is set but unparsable.
pub(crate) fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::EnvVar {
            name: name.to_string(),
            reason: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

pub(crate) fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
