//! Service assembly and lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use trinetra_core::config::constants::shutdown;
use trinetra_core::config::CamerasFile;
use trinetra_core::metrics::Registry;
use trinetra_core::traits::{FrameBus, SourceFactory};

use crate::camera::CameraSupervisor;

/// The running ingestor: one supervisor per configured camera.
pub struct IngestorService {
    supervisors: Vec<CameraSupervisor>,
    stop: Arc<AtomicBool>,
    pub registry: Arc<Registry>,
    pub healthy: Arc<AtomicBool>,
}

impl IngestorService {
    /// Spawn supervisors for every camera in the table.
    pub fn start(
        cameras: &CamerasFile,
        factory: Arc<dyn SourceFactory>,
        bus: Arc<dyn FrameBus>,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let stop = Arc::new(AtomicBool::new(false));
        let healthy = Arc::new(AtomicBool::new(false));

        let supervisors = cameras
            .cameras
            .iter()
            .map(|camera| {
                CameraSupervisor::spawn(
                    camera.clone(),
                    factory.clone(),
                    bus.clone(),
                    &registry,
                    stop.clone(),
                    healthy.clone(),
                )
            })
            .collect::<Vec<_>>();

        info!(cameras = supervisors.len(), "ingestion started");
        Self {
            supervisors,
            stop,
            registry,
            healthy,
        }
    }

    /// Names of camera supervisors that are still running.
    pub fn active_cameras(&self) -> Vec<String> {
        self.supervisors
            .iter()
            .filter(|s| s.is_running())
            .map(|s| s.camera_id.clone())
            .collect()
    }

    /// Raise the stop flag and drain all supervisors, bounded by the
    /// shutdown deadline.
    pub async fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        let drain = async {
            for supervisor in self.supervisors {
                supervisor.join().await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(shutdown::DRAIN_DEADLINE_S), drain)
            .await
            .is_err()
        {
            warn!("drain deadline exceeded; abandoning camera tasks");
        }
        info!("all camera tasks stopped");
    }
}
