//! Per-camera supervisor: blocking reader plus async pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trinetra_core::config::constants::ingest;
use trinetra_core::metrics::Registry;
use trinetra_core::traits::{FrameBus, SourceFactory};
use trinetra_core::types::{Camera, Frame, FrameMeta};

use crate::analysis::{analyze, is_valid};
use crate::bucket::TokenBucket;
use crate::encode::resize_and_encode;
use crate::metrics::CameraMetrics;
use crate::queue::FrameQueue;
use crate::sampler::AdaptiveSampler;

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Handles for one camera's reader and pipeline tasks.
pub struct CameraSupervisor {
    pub camera_id: String,
    reader: JoinHandle<()>,
    pipeline: JoinHandle<()>,
}

impl CameraSupervisor {
    /// Spawn the reader/pipeline pair for one camera. The pair shares
    /// nothing with other cameras beyond the bus handle.
    pub fn spawn(
        camera: Camera,
        factory: Arc<dyn SourceFactory>,
        bus: Arc<dyn FrameBus>,
        registry: &Registry,
        stop: Arc<AtomicBool>,
        healthy: Arc<AtomicBool>,
    ) -> Self {
        let camera_id = camera.camera_id.clone();
        let metrics = Arc::new(CameraMetrics::new(registry, &camera));
        let queue = Arc::new(FrameQueue::new(ingest::READER_QUEUE_CAP));

        let reader = spawn_reader(
            camera.clone(),
            factory,
            queue.clone(),
            metrics.clone(),
            stop.clone(),
        );
        let pipeline = spawn_pipeline(camera, bus, queue, metrics, stop, healthy);

        Self {
            camera_id,
            reader,
            pipeline,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.reader.is_finished() || !self.pipeline.is_finished()
    }

    /// Wait for both halves to finish after the stop flag is raised.
    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.pipeline.await;
    }
}

/// Blocking decode loop with exponential reconnect backoff. This is the
/// only place in the service that blocks a thread on network I/O.
fn spawn_reader(
    camera: Camera,
    factory: Arc<dyn SourceFactory>,
    queue: Arc<FrameQueue>,
    metrics: Arc<CameraMetrics>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut delay = ingest::BACKOFF_INITIAL_S;
        let mut source = None;

        while !stop.load(Ordering::Relaxed) {
            let active = match source.as_mut() {
                Some(active) => active,
                None => match factory.open(&camera) {
                    Ok(opened) => {
                        info!(camera_id = %camera.camera_id, "camera stream open");
                        delay = ingest::BACKOFF_INITIAL_S;
                        source.insert(opened)
                    }
                    Err(e) => {
                        warn!(
                            camera_id = %camera.camera_id,
                            error = %e,
                            retry_in_s = delay,
                            "camera open failed"
                        );
                        metrics.reconnects.inc();
                        sleep_interruptible(delay, &stop);
                        delay = (delay * 2.0).min(ingest::BACKOFF_CEILING_S);
                        continue;
                    }
                },
            };

            match active.read_frame() {
                Ok(raw) => {
                    delay = ingest::BACKOFF_INITIAL_S;
                    if queue.push(raw, now_seconds()) > 0 {
                        metrics.frames_dropped.inc();
                    }
                }
                Err(e) => {
                    warn!(
                        camera_id = %camera.camera_id,
                        error = %e,
                        retry_in_s = delay,
                        "camera stream lost"
                    );
                    metrics.reconnects.inc();
                    source = None;
                    sleep_interruptible(delay, &stop);
                    delay = (delay * 2.0).min(ingest::BACKOFF_CEILING_S);
                }
            }
        }
        debug!(camera_id = %camera.camera_id, "reader stopped");
    })
}

/// Sleep in short slices so shutdown is not held hostage by backoff.
fn sleep_interruptible(seconds: f64, stop: &AtomicBool) {
    let deadline = Instant::now() + Duration::from_secs_f64(seconds);
    while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Async half: validate, sample, suppress bursts, resize, publish.
fn spawn_pipeline(
    camera: Camera,
    bus: Arc<dyn FrameBus>,
    queue: Arc<FrameQueue>,
    metrics: Arc<CameraMetrics>,
    stop: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sampler = AdaptiveSampler::new(
            ingest::DEFAULT_CAPTURE_FPS,
            camera.target_fps,
            camera.camera_type.is_priority(),
        );
        let mut bucket = TokenBucket::new(
            ingest::TOKEN_BUCKET_CAPACITY,
            f64::from(camera.target_fps),
            Instant::now(),
        );
        let mut frame_index = 0u64;
        let mut bus_drops_seen = 0u64;

        while !stop.load(Ordering::Relaxed) {
            let Some((raw, ingest_ts)) = queue.pop(Duration::from_millis(500)).await else {
                continue;
            };
            let started = Instant::now();

            let stats = analyze(&raw);
            if !is_valid(&stats) {
                metrics.frames_dropped.inc();
                continue;
            }

            let bus_stats = bus.stats(&camera.camera_id).await;
            metrics.fill_ratio.set(bus_stats.fill_ratio);
            metrics.stream_length.set(bus_stats.len as f64);

            // Surface the bus's own tail-drop trims on the drop counter.
            if bus_stats.dropped > bus_drops_seen {
                metrics.frames_dropped.inc_by(bus_stats.dropped - bus_drops_seen);
                bus_drops_seen = bus_stats.dropped;
            }

            if !sampler.should_forward(&stats.luma_grid, bus_stats.fill_ratio) {
                metrics.frames_dropped.inc();
                continue;
            }
            if !bucket.try_take(Instant::now()) {
                metrics.frames_dropped.inc();
                continue;
            }

            let jpeg = match resize_and_encode(&raw) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!(camera_id = %camera.camera_id, error = %e, "frame encode failed");
                    metrics.frames_dropped.inc();
                    continue;
                }
            };

            let frame = Frame {
                meta: FrameMeta {
                    camera_id: camera.camera_id.clone(),
                    camera_type: camera.camera_type,
                    frame_index,
                    ingest_ts,
                    frame_ts: raw.frame_ts,
                },
                jpeg,
            };

            match bus.publish(frame).await {
                Ok(_) => {
                    frame_index += 1;
                    healthy.store(true, Ordering::Relaxed);
                    metrics.frames_ingested.inc();
                    metrics.frame_latency.observe(started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    warn!(camera_id = %camera.camera_id, error = %e, "bus publish failed");
                    metrics.frames_dropped.inc();
                }
            }
        }
        debug!(camera_id = %camera.camera_id, "pipeline stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use trinetra_framebus::MemoryFrameBus;

    use trinetra_core::stubs::SyntheticFactory;
    use trinetra_core::traits::stream_key;
    use trinetra_core::types::CameraType;

    fn camera(id: &str, camera_type: CameraType) -> Camera {
        Camera {
            camera_id: id.into(),
            rtsp_url: "rtsp://10.0.0.5/stream".into(),
            camera_type,
            target_fps: 30,
            priority_tier: 1,
        }
    }

    #[tokio::test]
    async fn frames_flow_to_bus_with_monotonic_indices() {
        let bus: Arc<dyn FrameBus> = Arc::new(MemoryFrameBus::new(100));
        bus.ensure_group(&stream_key("cam_01"), "g").await.unwrap();
        let registry = Registry::new();
        let stop = Arc::new(AtomicBool::new(false));
        let healthy = Arc::new(AtomicBool::new(false));

        let supervisor = CameraSupervisor::spawn(
            camera("cam_01", CameraType::Billing),
            Arc::new(SyntheticFactory::default()),
            bus.clone(),
            &registry,
            stop.clone(),
            healthy.clone(),
        );

        // Give the pair time to push a handful of frames.
        let deadline = Instant::now() + Duration::from_secs(5);
        while bus.len("cam_01").await < 3 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        stop.store(true, Ordering::Relaxed);
        supervisor.join().await;

        let entries = bus
            .consume("g", "t", &[stream_key("cam_01")], 100, Duration::ZERO)
            .await
            .unwrap();
        assert!(entries.len() >= 3);
        assert!(healthy.load(Ordering::Relaxed));
        let indices: Vec<u64> = entries.iter().map(|e| e.frame.meta.frame_index).collect();
        assert!(
            indices.windows(2).all(|w| w[1] == w[0] + 1),
            "frame_index must increase without gaps on the bus: {indices:?}"
        );
        // Payloads are 640x640 JPEGs.
        let decoded = image::load_from_memory(&entries[0].frame.jpeg).unwrap();
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 640);
    }
}
