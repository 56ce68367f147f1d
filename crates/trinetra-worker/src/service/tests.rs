//! Worker loop tests against the in-process bus, stub operators, and a
//! temporary event log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ndarray::Array4;
use tempfile::TempDir;

use trinetra_core::config::WorkerSettings;
use trinetra_core::error::OperatorError;
use trinetra_core::stubs::{StubDetector, StubEmbedder};
use trinetra_core::traits::{
    stream_key, BoxDetection, EventLog, FrameBus, PersonDetector,
};
use trinetra_core::types::{CameraType, DetectionEvent, Frame, FrameMeta};
use trinetra_eventlog::{RocksEventLog, TopicSpec};
use trinetra_framebus::MemoryFrameBus;

use super::InferenceWorker;

fn settings() -> WorkerSettings {
    WorkerSettings {
        frame_bus_url: "http://127.0.0.1:7171".into(),
        event_log_bootstrap: "127.0.0.1:7171".into(),
        batch_size: 4,
        batch_timeout_ms: 20,
        billing_topic: None,
        metrics_port: 0,
    }
}

fn jpeg_frame(camera_id: &str, index: u64) -> Frame {
    // A textured 640x640 image so face crops have content.
    let image = image::RgbImage::from_fn(640, 640, |x, y| {
        image::Rgb([(x % 251) as u8, (y % 251) as u8, ((x + y) % 251) as u8])
    });
    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 85)
        .encode_image(&image)
        .unwrap();
    Frame {
        meta: FrameMeta {
            camera_id: camera_id.into(),
            camera_type: CameraType::Tracking,
            frame_index: index,
            ingest_ts: 1000.0 + index as f64,
            frame_ts: None,
        },
        jpeg,
    }
}

struct Harness {
    bus: Arc<MemoryFrameBus>,
    log: Arc<RocksEventLog>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    Harness {
        bus: Arc::new(MemoryFrameBus::new(100)),
        log: Arc::new(RocksEventLog::open(dir.path(), TopicSpec::standard()).unwrap()),
        _dir: dir,
    }
}

fn worker_on(
    h: &Harness,
    detector: Arc<dyn PersonDetector>,
    embedder: Arc<StubEmbedder>,
) -> InferenceWorker {
    InferenceWorker::new(
        h.bus.clone(),
        h.log.clone(),
        detector,
        embedder,
        None,
        settings(),
    )
}


/// Two consume passes with the batch timeout elapsed in between, so a
/// partial batch flushes on the second pass.
async fn pump(worker: &mut InferenceWorker) {
    worker.poll_once().await;
    tokio::time::sleep(Duration::from_millis(25)).await;
    worker.poll_once().await;
}

async fn consume_detections(log: &RocksEventLog) -> Vec<DetectionEvent> {
    let records = log
        .consume(
            "test-observer",
            &["detections".to_string()],
            100,
            Duration::ZERO,
        )
        .await
        .unwrap();
    records
        .iter()
        .map(|r| serde_json::from_slice(&r.payload).unwrap())
        .collect()
}

#[tokio::test]
async fn frames_become_detection_events_and_get_acked() {
    let h = harness();
    for i in 0..4 {
        h.bus.publish(jpeg_frame("cam_01", i)).await.unwrap();
    }

    let mut worker = worker_on(
        &h,
        Arc::new(StubDetector::default()),
        Arc::new(StubEmbedder::new()),
    )
    .with_consumer_name("worker-a");
    pump(&mut worker).await;

    let mut events = consume_detections(&h.log).await;
    assert_eq!(events.len(), 4);
    events.sort_by_key(|e| e.frame_index);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.camera_id, "cam_01");
        assert_eq!(event.frame_index, i as u64);
        assert_eq!(event.detections.len(), 1);
        let det = &event.detections[0];
        assert!(det.track_id.is_some());
        assert!(det.embedding.is_some());
        assert!(det.embedding_is_unit_norm());
    }

    // Identical scene across frames: the tracker holds one id.
    let ids: Vec<u32> = events.iter().map(|e| e.detections[0].track_id.unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));

    // Everything acked: nothing left pending for another consumer to claim.
    let claimable = h.bus.reclaim("inference-workers", "worker-b", Duration::ZERO).await.unwrap();
    assert!(claimable.is_empty());
}

#[tokio::test]
async fn corrupted_frame_is_acked_and_skipped() {
    let h = harness();
    let mut bad = jpeg_frame("cam_01", 0);
    bad.jpeg = vec![0xDE, 0xAD];
    h.bus.publish(bad).await.unwrap();
    h.bus.publish(jpeg_frame("cam_01", 1)).await.unwrap();

    let mut worker = worker_on(
        &h,
        Arc::new(StubDetector::default()),
        Arc::new(StubEmbedder::new()),
    )
    .with_consumer_name("worker-a");
    pump(&mut worker).await;

    let events = consume_detections(&h.log).await;
    assert_eq!(events.len(), 1, "only the decodable frame produces an event");
    assert_eq!(events[0].frame_index, 1);

    let claimable = h.bus.reclaim("inference-workers", "worker-b", Duration::ZERO).await.unwrap();
    assert!(claimable.is_empty(), "the corrupted frame must still be acked");
}

#[tokio::test]
async fn embedder_oom_shrinks_to_single_crops() {
    let h = harness();
    for i in 0..4 {
        h.bus.publish(jpeg_frame("cam_01", i)).await.unwrap();
    }

    let embedder = Arc::new(StubEmbedder::new());
    embedder.fail_with_oom(1);
    let mut worker = worker_on(&h, Arc::new(StubDetector::default()), embedder)
        .with_consumer_name("worker-a");
    pump(&mut worker).await;

    let events = consume_detections(&h.log).await;
    assert_eq!(events.len(), 4);
    for event in &events {
        assert!(
            event.detections[0].embedding.is_some(),
            "single-crop retry must recover the embedding"
        );
    }
}

struct BrokenDetector;

#[async_trait]
impl PersonDetector for BrokenDetector {
    async fn detect(&self, _: &Array4<f32>) -> Result<Vec<Vec<BoxDetection>>, OperatorError> {
        Err(OperatorError::Failed("engine crashed".into()))
    }
}

#[tokio::test]
async fn detector_failure_yields_empty_events() {
    let h = harness();
    h.bus.publish(jpeg_frame("cam_01", 0)).await.unwrap();

    let mut worker = worker_on(&h, Arc::new(BrokenDetector), Arc::new(StubEmbedder::new()))
        .with_consumer_name("worker-a");
    pump(&mut worker).await;

    let events = consume_detections(&h.log).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].detections.is_empty());

    let claimable = h.bus.reclaim("inference-workers", "worker-b", Duration::ZERO).await.unwrap();
    assert!(claimable.is_empty());
}

#[tokio::test]
async fn crash_replay_via_reclaim() {
    let h = harness();
    for i in 0..6 {
        h.bus.publish(jpeg_frame("cam_01", i)).await.unwrap();
    }

    // A predecessor consumed everything but acked nothing.
    h.bus.ensure_group(&stream_key("cam_01"), "inference-workers").await.unwrap();
    let stolen = h
        .bus
        .consume(
            "inference-workers",
            "worker-dead",
            &[stream_key("cam_01")],
            6,
            Duration::ZERO,
        )
        .await
        .unwrap();
    assert_eq!(stolen.len(), 6);

    let mut worker = worker_on(
        &h,
        Arc::new(StubDetector::default()),
        Arc::new(StubEmbedder::new()),
    )
    .with_consumer_name("worker-new");
    // The reclaim window in startup_recovery is a minute; claim directly
    // with a zero idle threshold to stand in for elapsed time.
    let reclaimed = h.bus.reclaim("inference-workers", "worker-new", Duration::ZERO).await.unwrap();
    assert_eq!(reclaimed.len(), 6);
    worker.process_batch_for_test(reclaimed).await;

    let events = consume_detections(&h.log).await;
    assert_eq!(events.len(), 6);
}

#[tokio::test]
async fn tracker_checkpoint_survives_worker_generations() {
    let h = harness();
    h.bus.publish(jpeg_frame("cam_01", 0)).await.unwrap();

    let mut first = worker_on(
        &h,
        Arc::new(StubDetector::default()),
        Arc::new(StubEmbedder::new()),
    )
    .with_consumer_name("worker-a");
    pump(&mut first).await;
    first.checkpoint_tracker().await;
    let first_events = consume_detections(&h.log).await;
    let first_id = first_events[0].detections[0].track_id.unwrap();

    // Next generation, same scene shortly after: the id continues.
    h.bus.publish(jpeg_frame("cam_01", 1)).await.unwrap();
    let mut second = worker_on(
        &h,
        Arc::new(StubDetector::default()),
        Arc::new(StubEmbedder::new()),
    )
    .with_consumer_name("worker-b");
    pump(&mut second).await;

    let later: Vec<DetectionEvent> = consume_detections(&h.log).await;
    assert_eq!(later.len(), 1);
    assert_eq!(later[0].detections[0].track_id.unwrap(), first_id);
}
