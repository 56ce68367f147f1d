//! The worker's consume/batch/infer/publish loop.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, error, info, warn};

use trinetra_core::config::constants::{eventlog, framebus, worker};
use trinetra_core::config::WorkerSettings;
use trinetra_core::metrics::Registry;
use trinetra_core::traits::{
    BoxDetection, BusEntry, EntryId, EventLog, FaceEmbedder, FrameBus, GpuTelemetry,
    PersonDetector,
};
use trinetra_core::types::{CameraType, Detection, DetectionEvent};

use crate::batch::MicroBatchAccumulator;
use crate::metrics::WorkerMetrics;
use crate::tensor::{crops_to_tensor, decode_jpeg, face_crop, frames_to_tensor};
use crate::tracker::IouTracker;

#[cfg(test)]
mod tests;

fn checkpoint_key(camera_id: &str) -> String {
    format!("tracker:{camera_id}")
}

/// Publish with bounded exponential backoff. Returns false once retries
/// are exhausted; the caller acks the frame regardless and counts the loss.
async fn publish_with_retry(
    log: &dyn EventLog,
    topic: &str,
    key: &str,
    payload: Vec<u8>,
) -> bool {
    let mut delay = Duration::from_millis(eventlog::PUBLISH_BACKOFF_MS);
    for attempt in 1..=eventlog::PUBLISH_RETRIES {
        match log.publish(topic, key, payload.clone()).await {
            Ok(_) => return true,
            Err(e) => {
                warn!(topic, attempt, error = %e, "event publish failed");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
    false
}

/// One inference worker process member of the `inference-workers` group.
pub struct InferenceWorker {
    bus: Arc<dyn FrameBus>,
    log: Arc<dyn EventLog>,
    detector: Arc<dyn PersonDetector>,
    embedder: Arc<dyn FaceEmbedder>,
    telemetry: Option<Arc<dyn GpuTelemetry>>,
    settings: WorkerSettings,
    tracker: IouTracker,
    accumulator: MicroBatchAccumulator,
    /// Streams whose consumer group has already been created.
    ensured_streams: HashSet<String>,
    pub metrics: WorkerMetrics,
    pub healthy: Arc<AtomicBool>,
    consumer_name: String,
}

impl InferenceWorker {
    pub fn new(
        bus: Arc<dyn FrameBus>,
        log: Arc<dyn EventLog>,
        detector: Arc<dyn PersonDetector>,
        embedder: Arc<dyn FaceEmbedder>,
        telemetry: Option<Arc<dyn GpuTelemetry>>,
        settings: WorkerSettings,
    ) -> Self {
        let accumulator = MicroBatchAccumulator::new(
            settings.batch_size,
            Duration::from_millis(settings.batch_timeout_ms),
        );
        Self {
            bus,
            log,
            detector,
            embedder,
            telemetry,
            settings,
            tracker: IouTracker::new(),
            accumulator,
            ensured_streams: HashSet::new(),
            metrics: WorkerMetrics::new(Arc::new(Registry::new())),
            healthy: Arc::new(AtomicBool::new(false)),
            consumer_name: format!("worker-{}", std::process::id()),
        }
    }

    #[cfg(test)]
    pub fn with_consumer_name(mut self, name: &str) -> Self {
        self.consumer_name = name.to_string();
        self
    }

    #[cfg(test)]
    pub async fn process_batch_for_test(&mut self, batch: Vec<BusEntry>) {
        self.process_batch(batch).await;
    }

    /// Take over entries abandoned by a crashed predecessor and process
    /// them first.
    pub async fn startup_recovery(&mut self) {
        let streams = self.bus.stream_names().await;
        self.ensure_groups(&streams).await;
        match self
            .bus
            .reclaim(
                worker::CONSUMER_GROUP,
                &self.consumer_name,
                Duration::from_millis(framebus::RECLAIM_IDLE_MS),
            )
            .await
        {
            Ok(reclaimed) if !reclaimed.is_empty() => {
                info!(count = reclaimed.len(), "processing reclaimed entries");
                self.process_batch(reclaimed).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "reclaim failed"),
        }
    }

    /// Idempotently create the worker group on any stream not seen yet.
    async fn ensure_groups(&mut self, streams: &[String]) {
        for stream in streams {
            if self.ensured_streams.contains(stream) {
                continue;
            }
            match self.bus.ensure_group(stream, worker::CONSUMER_GROUP).await {
                Ok(()) => {
                    self.ensured_streams.insert(stream.clone());
                }
                Err(e) => warn!(stream = %stream, error = %e, "group create failed"),
            }
        }
    }

    /// Run until the stop flag rises, then drain and checkpoint.
    pub async fn run(&mut self, stop: Arc<AtomicBool>) {
        self.startup_recovery().await;
        self.spawn_gpu_poller();

        while !stop.load(Ordering::Relaxed) {
            self.poll_once().await;
        }

        let remainder = self.accumulator.flush();
        if !remainder.is_empty() {
            self.process_batch(remainder).await;
        }
        self.checkpoint_tracker().await;
        info!("worker stopped");
    }

    /// One consume pass plus at most one batch flush.
    pub async fn poll_once(&mut self) {
        let streams = self.bus.stream_names().await;
        if streams.is_empty() {
            tokio::time::sleep(Duration::from_millis(framebus::CONSUME_BLOCK_MS)).await;
            return;
        }
        self.ensure_groups(&streams).await;

        match self
            .bus
            .consume(
                worker::CONSUMER_GROUP,
                &self.consumer_name,
                &streams,
                self.settings.batch_size,
                Duration::from_millis(framebus::CONSUME_BLOCK_MS),
            )
            .await
        {
            Ok(entries) => {
                let now = Instant::now();
                for entry in entries {
                    self.accumulator.add(entry, now);
                }
            }
            Err(e) => {
                warn!(error = %e, "bus consume failed");
                tokio::time::sleep(Duration::from_millis(framebus::CONSUME_BLOCK_MS)).await;
            }
        }

        self.metrics.batch_fill_ratio.set(self.accumulator.fill_ratio());
        if self.accumulator.is_ready(Instant::now()) {
            let batch = self.accumulator.flush();
            self.process_batch(batch).await;
        }
    }

    /// Process one micro-batch end to end: decode, detect, embed, track,
    /// publish, ack.
    async fn process_batch(&mut self, batch: Vec<BusEntry>) {
        if batch.is_empty() {
            return;
        }
        let mut acks: HashMap<String, Vec<EntryId>> = HashMap::new();
        let mut frames: Vec<(BusEntry, RgbImage)> = Vec::with_capacity(batch.len());

        for entry in batch {
            match decode_jpeg(&entry.frame.jpeg) {
                Some(image) => frames.push((entry, image)),
                None => {
                    // Corrupted payload: retrying decodes the same bytes
                    // into the same failure, so ack and move on.
                    warn!(
                        camera_id = %entry.frame.meta.camera_id,
                        frame_index = entry.frame.meta.frame_index,
                        "undecodable frame dropped"
                    );
                    acks.entry(entry.stream.clone()).or_default().push(entry.id);
                }
            }
        }

        if !frames.is_empty() {
            let per_frame = self.detect_frames(&frames).await;
            let mut events = self.build_events(&frames, per_frame);
            self.embed_faces(&frames, &mut events).await;
            self.track(&frames, &mut events).await;
            self.publish_events(&frames, &events).await;
            for (entry, _) in &frames {
                acks.entry(entry.stream.clone()).or_default().push(entry.id);
            }
        }

        for (stream, ids) in acks {
            if let Err(e) = self.bus.ack(worker::CONSUMER_GROUP, &stream, &ids).await {
                warn!(stream = %stream, error = %e, "ack failed");
            }
        }
    }

    /// Detector invocation with the out-of-memory fallback: shrink to
    /// single-frame batches, retry once, and settle for empty results.
    async fn detect_frames(&self, frames: &[(BusEntry, RgbImage)]) -> Vec<Vec<BoxDetection>> {
        let images: Vec<RgbImage> = frames.iter().map(|(_, img)| img.clone()).collect();
        let tensor = frames_to_tensor(&images);
        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_millis(worker::OPERATOR_TIMEOUT_MS),
            self.detector.detect(&tensor),
        )
        .await;
        self.metrics
            .detection_latency
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(detections)) if detections.len() == frames.len() => detections,
            Ok(Ok(detections)) => {
                error!(
                    got = detections.len(),
                    expected = frames.len(),
                    "detector output count mismatch; emitting empty results"
                );
                vec![Vec::new(); frames.len()]
            }
            Ok(Err(e)) => {
                warn!(error = %e, "detector failed; retrying frame by frame");
                let mut out = Vec::with_capacity(frames.len());
                for image in &images {
                    let single = frames_to_tensor(std::slice::from_ref(image));
                    let retried = tokio::time::timeout(
                        Duration::from_millis(worker::OPERATOR_TIMEOUT_MS),
                        self.detector.detect(&single),
                    )
                    .await;
                    match retried {
                        Ok(Ok(mut d)) if d.len() == 1 => out.push(d.remove(0)),
                        _ => out.push(Vec::new()),
                    }
                }
                out
            }
            Err(_) => {
                error!("detector timed out; emitting empty results");
                vec![Vec::new(); frames.len()]
            }
        }
    }

    fn build_events(
        &self,
        frames: &[(BusEntry, RgbImage)],
        per_frame: Vec<Vec<BoxDetection>>,
    ) -> Vec<DetectionEvent> {
        frames
            .iter()
            .zip(per_frame)
            .map(|((entry, _), boxes)| DetectionEvent {
                camera_id: entry.frame.meta.camera_id.clone(),
                camera_type: entry.frame.meta.camera_type,
                frame_index: entry.frame.meta.frame_index,
                effective_ts: entry.frame.meta.effective_ts(),
                detections: boxes
                    .into_iter()
                    .map(|b| Detection {
                        bbox: b.bbox,
                        conf: b.conf,
                        track_id: None,
                        embedding: None,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Crop every detection's face region and embed in sub-batches of at
    /// most 16 crops. Out-of-memory shrinks to single crops with one retry
    /// each; detections whose crop still fails just carry no embedding.
    async fn embed_faces(&self, frames: &[(BusEntry, RgbImage)], events: &mut [DetectionEvent]) {
        let mut crops: Vec<RgbImage> = Vec::new();
        let mut origins: Vec<(usize, usize)> = Vec::new();
        for (fi, (_, image)) in frames.iter().enumerate() {
            for (di, det) in events[fi].detections.iter().enumerate() {
                if let Some(crop) = face_crop(image, det.bbox) {
                    crops.push(crop);
                    origins.push((fi, di));
                }
            }
        }
        if crops.is_empty() {
            return;
        }

        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; crops.len()];
        for start in (0..crops.len()).step_by(worker::SUB_BATCH_MAX) {
            let end = (start + worker::SUB_BATCH_MAX).min(crops.len());
            let chunk = &crops[start..end];
            let tensor = crops_to_tensor(chunk);
            let started = Instant::now();
            let result = tokio::time::timeout(
                Duration::from_millis(worker::OPERATOR_TIMEOUT_MS),
                self.embedder.embed(&tensor),
            )
            .await;
            self.metrics
                .embedding_latency
                .observe(started.elapsed().as_secs_f64());

            match result {
                Ok(Ok(vectors)) if vectors.len() == chunk.len() => {
                    for (offset, vector) in vectors.into_iter().enumerate() {
                        embeddings[start + offset] = Some(vector);
                    }
                }
                Ok(Ok(vectors)) => {
                    error!(
                        got = vectors.len(),
                        expected = chunk.len(),
                        "embedder output count mismatch; dropping sub-batch"
                    );
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "embedder failed; retrying crop by crop");
                    for (offset, crop) in chunk.iter().enumerate() {
                        let single = crops_to_tensor(std::slice::from_ref(crop));
                        let retried = tokio::time::timeout(
                            Duration::from_millis(worker::OPERATOR_TIMEOUT_MS),
                            self.embedder.embed(&single),
                        )
                        .await;
                        if let Ok(Ok(mut vectors)) = retried {
                            if vectors.len() == 1 {
                                embeddings[start + offset] = Some(vectors.remove(0));
                            }
                        }
                    }
                }
                Err(_) => {
                    error!("embedder timed out; dropping sub-batch");
                }
            }
        }

        for ((fi, di), embedding) in origins.into_iter().zip(embeddings) {
            events[fi].detections[di].embedding = embedding;
        }
    }

    /// Assign track ids, restoring checkpointed state the first time a
    /// camera shows up.
    async fn track(&mut self, frames: &[(BusEntry, RgbImage)], events: &mut [DetectionEvent]) {
        for (fi, (entry, _)) in frames.iter().enumerate() {
            let camera_id = entry.frame.meta.camera_id.clone();
            if !self.tracker.has_camera(&camera_id) {
                if let Ok(Some(blob)) = self.bus.get_checkpoint(&checkpoint_key(&camera_id)).await {
                    self.tracker.import(&camera_id, &blob);
                    debug!(camera_id = %camera_id, "tracker state restored from checkpoint");
                }
            }
            let ts = entry.frame.meta.effective_ts();
            self.tracker.assign(&camera_id, &mut events[fi].detections, ts);
        }
    }

    /// One DetectionEvent per input frame, keyed by camera for per-camera
    /// ordering downstream.
    async fn publish_events(&self, frames: &[(BusEntry, RgbImage)], events: &[DetectionEvent]) {
        for (fi, (entry, _)) in frames.iter().enumerate() {
            let event = &events[fi];
            let payload = match serde_json::to_vec(event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(error = %e, "event serialization failed");
                    continue;
                }
            };

            let published = publish_with_retry(
                self.log.as_ref(),
                eventlog::TOPIC_DETECTIONS,
                &event.camera_id,
                payload.clone(),
            )
            .await;
            if published {
                self.healthy.store(true, Ordering::Relaxed);
                self.metrics.frames_processed(&event.camera_id).inc();
                self.metrics
                    .detections_total(&event.camera_id)
                    .inc_by(event.detections.len() as u64);
            } else {
                // Accepted loss: the log backbone is an SLA dependency.
                self.metrics.publish_errors.inc();
            }

            if let Some(topic) = &self.settings.billing_topic {
                if entry.frame.meta.camera_type == CameraType::Billing
                    && !publish_with_retry(self.log.as_ref(), topic, &event.camera_id, payload)
                        .await
                {
                    self.metrics.publish_errors.inc();
                }
            }
        }
    }

    /// Persist per-camera tracker state to the bus KV.
    pub async fn checkpoint_tracker(&self) {
        for camera_id in self.tracker.known_cameras() {
            if let Some(blob) = self.tracker.export(&camera_id) {
                if let Err(e) = self.bus.put_checkpoint(&checkpoint_key(&camera_id), blob).await {
                    warn!(camera_id = %camera_id, error = %e, "tracker checkpoint failed");
                }
            }
        }
    }

    fn spawn_gpu_poller(&self) {
        let Some(telemetry) = self.telemetry.clone() else {
            return;
        };
        let utilization = self.metrics.gpu_utilization.clone();
        let vram = self.metrics.gpu_vram_used.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(5));
            loop {
                tick.tick().await;
                if let Some(sample) = telemetry.sample() {
                    utilization.set(sample.utilization_pct);
                    vram.set(sample.vram_used_mb);
                }
            }
        });
    }
}
