//! Per-service settings populated from environment variables.
//!
//! | Variable | Default | Effect |
//! |---|---|---|
//! | `FRAME_BUS_URL` | `http://127.0.0.1:7171` | Frame bus backbone endpoint |
//! | `EVENT_LOG_BOOTSTRAP` | `127.0.0.1:7171` | Event log backbone endpoint |
//! | `SIM_SEARCH_URL` | `http://localhost:6333` | Vector search endpoint |
//! | `BROKER_BIND` | `0.0.0.0:7171` | Backbone listen address |
//! | `FRAME_BUFFER_MAXLEN` | `100` | Per-camera stream cap (backbone) |
//! | `EVENT_LOG_DATA_DIR` | `./data/eventlog` | Event log storage (backbone) |
//! | `BATCH_SIZE` | `4` | Worker micro-batch size |
//! | `BATCH_TIMEOUT_MS` | `20` | Worker micro-batch timeout |
//! | `COSINE_THRESHOLD` | `0.72` | Match threshold |
//! | `HISTORY_THRESHOLD` | `0.74` | History-confirmed average score |
//! | `TEMPORAL_GATE_WINDOW_S` | `3600` | Max session time / registry TTL |
//! | `CAMERAS_CONFIG` | `/etc/trinetra/cameras.json` | Camera table path |
//! | `CAMERA_CIDR_ALLOWLIST` | RFC1918 + loopback | RTSP SSRF guard |
//! | `METRICS_PORT` | 8001 / 8002 / 8003 | Prometheus scrape port |
//!
//! Both backbone contracts are served by the broker daemon on one port, so
//! `FRAME_BUS_URL` and `EVENT_LOG_BOOTSTRAP` default to the same endpoint;
//! deployments that split the stores point them at different hosts.
//!
//! Unset variables take their defaults; set-but-invalid variables fail
//! startup.

use super::{env_or, env_string, ConfigError};
use crate::config::constants::{eventlog, framebus, resolver, worker};

/// RFC1918 ranges plus loopback: the LAN cameras live here.
const DEFAULT_CIDR_ALLOWLIST: &str = "10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,127.0.0.0/8";

/// One broker daemon serves both backbone contracts by default.
const DEFAULT_FRAME_BUS_URL: &str = "http://127.0.0.1:7171";
const DEFAULT_EVENT_LOG_BOOTSTRAP: &str = "127.0.0.1:7171";

/// Backbone broker settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub bind: String,
    pub frame_buffer_maxlen: usize,
    pub event_log_data_dir: String,
}

impl BrokerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind: env_string("BROKER_BIND", "0.0.0.0:7171"),
            frame_buffer_maxlen: env_or("FRAME_BUFFER_MAXLEN", framebus::FRAME_BUFFER_MAXLEN)?,
            event_log_data_dir: env_string("EVENT_LOG_DATA_DIR", "./data/eventlog"),
        })
    }
}

/// Stream ingestor settings.
#[derive(Debug, Clone)]
pub struct IngestorSettings {
    pub frame_bus_url: String,
    pub cameras_config: String,
    pub cidr_allowlist: String,
    pub metrics_port: u16,
}

impl IngestorSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            frame_bus_url: env_string("FRAME_BUS_URL", DEFAULT_FRAME_BUS_URL),
            cameras_config: env_string("CAMERAS_CONFIG", "/etc/trinetra/cameras.json"),
            cidr_allowlist: env_string("CAMERA_CIDR_ALLOWLIST", DEFAULT_CIDR_ALLOWLIST),
            metrics_port: env_or("METRICS_PORT", 8001)?,
        })
    }
}

/// Inference worker settings.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub frame_bus_url: String,
    pub event_log_bootstrap: String,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    /// When set, billing-camera events are additionally published here.
    pub billing_topic: Option<String>,
    pub metrics_port: u16,
}

impl WorkerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let batch_size = env_or("BATCH_SIZE", worker::BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "BATCH_SIZE".into(),
                reason: "must be > 0".into(),
            });
        }
        Ok(Self {
            frame_bus_url: env_string("FRAME_BUS_URL", DEFAULT_FRAME_BUS_URL),
            event_log_bootstrap: env_string("EVENT_LOG_BOOTSTRAP", DEFAULT_EVENT_LOG_BOOTSTRAP),
            batch_size,
            batch_timeout_ms: env_or("BATCH_TIMEOUT_MS", worker::BATCH_TIMEOUT_MS)?,
            billing_topic: std::env::var("WORKER_BILLING_TOPIC").ok(),
            metrics_port: env_or("METRICS_PORT", 8002)?,
        })
    }
}

/// Identity resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub event_log_bootstrap: String,
    pub sim_search_url: String,
    pub consumer_group: String,
    pub cosine_threshold: f32,
    pub history_threshold: f32,
    pub temporal_gate_window_s: f64,
    /// Escape hatch for bounded lag during a search outage: after this many
    /// uncommitted events, commit anyway. 0 disables (the default).
    pub max_uncommitted_events: u64,
    pub lag_alert_threshold: u64,
    pub metrics_port: u16,
}

impl ResolverSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cosine_threshold: f32 = env_or("COSINE_THRESHOLD", resolver::COSINE_THRESHOLD)?;
        if !(0.0..=1.0).contains(&cosine_threshold) {
            return Err(ConfigError::Invalid {
                field: "COSINE_THRESHOLD".into(),
                reason: "must be within [0, 1]".into(),
            });
        }
        Ok(Self {
            event_log_bootstrap: env_string("EVENT_LOG_BOOTSTRAP", DEFAULT_EVENT_LOG_BOOTSTRAP),
            sim_search_url: env_string("SIM_SEARCH_URL", "http://localhost:6333"),
            consumer_group: env_string("RESOLVER_CONSUMER_GROUP", resolver::CONSUMER_GROUP),
            cosine_threshold,
            history_threshold: env_or("HISTORY_THRESHOLD", resolver::HISTORY_THRESHOLD)?,
            temporal_gate_window_s: env_or(
                "TEMPORAL_GATE_WINDOW_S",
                resolver::TEMPORAL_GATE_WINDOW_S,
            )?,
            max_uncommitted_events: env_or("RESOLVER_MAX_UNCOMMITTED", 0)?,
            lag_alert_threshold: env_or("LAG_ALERT_THRESHOLD", eventlog::LAG_ALERT_THRESHOLD)?,
            metrics_port: env_or("METRICS_PORT", 8003)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Settings tests mutate process environment; serialize them.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        let s = ResolverSettings::from_env().unwrap();
        assert_eq!(s.cosine_threshold, resolver::COSINE_THRESHOLD);
        assert_eq!(s.temporal_gate_window_s, resolver::TEMPORAL_GATE_WINDOW_S);
        assert_eq!(s.max_uncommitted_events, 0);
        assert_eq!(s.event_log_bootstrap, DEFAULT_EVENT_LOG_BOOTSTRAP);
    }

    #[test]
    fn worker_and_ingestor_share_the_backbone_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        let worker = WorkerSettings::from_env().unwrap();
        let ingestor = IngestorSettings::from_env().unwrap();
        assert_eq!(worker.frame_bus_url, ingestor.frame_bus_url);
        assert_eq!(worker.frame_bus_url, DEFAULT_FRAME_BUS_URL);
    }

    #[test]
    fn invalid_value_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("COSINE_THRESHOLD", "not-a-number");
        let err = ResolverSettings::from_env().unwrap_err();
        std::env::remove_var("COSINE_THRESHOLD");
        assert!(matches!(err, ConfigError::EnvVar { .. }));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("COSINE_THRESHOLD", "1.5");
        let err = ResolverSettings::from_env().unwrap_err();
        std::env::remove_var("COSINE_THRESHOLD");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
