//! Camera table loading and RTSP allowlist validation.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::types::{Camera, TravelTimeMatrix};

/// The on-disk camera configuration: the camera table plus the floor-plan
/// travel-time matrix, one JSON file per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CamerasFile {
    pub cameras: Vec<Camera>,

    #[serde(default)]
    pub travel_times: TravelTimeMatrix,
}

impl CamerasFile {
    /// Load and validate. Fails fast on duplicate ids, zero fps, a non-RTSP
    /// URL, or a camera host outside the allowlist.
    pub fn load(path: &Path, allowlist: &CidrAllowlist) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file: CamerasFile =
            serde_json::from_str(&raw).map_err(|e| ConfigError::FileParse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        file.validate(allowlist)?;
        Ok(file)
    }

    pub fn validate(&self, allowlist: &CidrAllowlist) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for cam in &self.cameras {
            if !seen.insert(cam.camera_id.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "cameras".into(),
                    reason: format!("duplicate camera_id {}", cam.camera_id),
                });
            }
            if cam.target_fps == 0 {
                return Err(ConfigError::Invalid {
                    field: format!("cameras.{}.target_fps", cam.camera_id),
                    reason: "must be > 0".into(),
                });
            }
            if cam.priority_tier > 5 {
                return Err(ConfigError::Invalid {
                    field: format!("cameras.{}.priority_tier", cam.camera_id),
                    reason: "must be within 0..=5".into(),
                });
            }
            allowlist.check_rtsp_url(&cam.camera_id, &cam.rtsp_url)?;
        }
        Ok(())
    }
}

/// Parsed CIDR ranges for RTSP host validation.
///
/// Prevents a poisoned camera table from pointing the ingestor at arbitrary
/// internal endpoints. Hostname URLs are allowed through (resolution happens
/// inside the decoder); IP-literal hosts must fall inside a configured range.
#[derive(Debug, Clone)]
pub struct CidrAllowlist {
    ranges: Vec<(IpAddr, u8)>,
}

impl CidrAllowlist {
    /// Parse a comma-separated list like `10.0.0.0/8,192.168.0.0/16`.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut ranges = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (addr, prefix) = part.split_once('/').ok_or_else(|| ConfigError::Invalid {
                field: "CAMERA_CIDR_ALLOWLIST".into(),
                reason: format!("{part}: missing /prefix"),
            })?;
            let addr: IpAddr = addr.parse().map_err(|_| ConfigError::Invalid {
                field: "CAMERA_CIDR_ALLOWLIST".into(),
                reason: format!("{part}: bad address"),
            })?;
            let max = if addr.is_ipv4() { 32 } else { 128 };
            let prefix: u8 = prefix.parse().map_err(|_| ConfigError::Invalid {
                field: "CAMERA_CIDR_ALLOWLIST".into(),
                reason: format!("{part}: bad prefix"),
            })?;
            if prefix > max {
                return Err(ConfigError::Invalid {
                    field: "CAMERA_CIDR_ALLOWLIST".into(),
                    reason: format!("{part}: prefix exceeds {max}"),
                });
            }
            ranges.push((addr, prefix));
        }
        if ranges.is_empty() {
            return Err(ConfigError::Invalid {
                field: "CAMERA_CIDR_ALLOWLIST".into(),
                reason: "allowlist is empty".into(),
            });
        }
        Ok(Self { ranges })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|&(net, prefix)| match (net, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - prefix as u32)
                };
                (u32::from(net) & mask) == (u32::from(ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if prefix == 0 {
                    0
                } else {
                    u128::MAX << (128 - prefix as u32)
                };
                (u128::from(net) & mask) == (u128::from(ip) & mask)
            }
            _ => false,
        })
    }

    /// Validate an `rtsp://` URL's host against the allowlist.
    fn check_rtsp_url(&self, camera_id: &str, url: &str) -> Result<(), ConfigError> {
        let rest = url.strip_prefix("rtsp://").ok_or_else(|| ConfigError::Invalid {
            field: format!("cameras.{camera_id}.rtsp_url"),
            reason: "must start with rtsp://".into(),
        })?;
        // Strip credentials, path, and port to isolate the host.
        let authority = rest.split('/').next().unwrap_or(rest);
        let host_port = authority.rsplit('@').next().unwrap_or(authority);
        let host = if let Some(stripped) = host_port.strip_prefix('[') {
            stripped.split(']').next().unwrap_or(host_port)
        } else {
            host_port.split(':').next().unwrap_or(host_port)
        };
        if let Ok(ip) = host.parse::<IpAddr>() {
            if !self.contains(ip) {
                return Err(ConfigError::Invalid {
                    field: format!("cameras.{camera_id}.rtsp_url"),
                    reason: format!("host {ip} outside CIDR allowlist"),
                });
            }
        }
        Ok(())
    }
}
