//! Loopback integration tests: real HTTP between the remote clients and a
//! served broker, exercising the exact topology a multi-process deployment
//! uses (one backbone, many service processes).

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use trinetra_core::traits::{stream_key, EventLog, FrameBus};
use trinetra_core::types::{CameraType, Frame, FrameMeta};
use trinetra_eventlog::{RocksEventLog, TopicSpec};
use trinetra_framebus::MemoryFrameBus;

use crate::client::{RemoteEventLog, RemoteFrameBus};
use crate::server::{router, BrokerState};

struct Broker {
    base: String,
    _dir: TempDir,
}

async fn start_broker() -> Broker {
    let dir = TempDir::new().unwrap();
    let state = BrokerState {
        bus: Arc::new(MemoryFrameBus::new(100)),
        log: Arc::new(RocksEventLog::open(dir.path(), TopicSpec::standard()).unwrap()),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    Broker {
        base: format!("http://{addr}"),
        _dir: dir,
    }
}

fn frame(camera_id: &str, index: u64) -> Frame {
    Frame {
        meta: FrameMeta {
            camera_id: camera_id.into(),
            camera_type: CameraType::Tracking,
            frame_index: index,
            ingest_ts: 1000.0 + index as f64,
            frame_ts: None,
        },
        jpeg: vec![0xFF, 0xD8, index as u8, 0x7F],
    }
}

#[tokio::test]
async fn remote_bus_publish_consume_ack_round_trip() {
    let broker = start_broker().await;
    let producer = RemoteFrameBus::connect(&broker.base);
    let consumer = RemoteFrameBus::connect(&broker.base);

    for i in 0..4 {
        producer.publish(frame("cam_01", i)).await.unwrap();
    }
    assert_eq!(producer.len("cam_01").await, 4);
    assert!(producer.fill_ratio("cam_01").await > 0.0);

    let key = stream_key("cam_01");
    consumer.ensure_group(&key, "g").await.unwrap();
    let entries = consumer
        .consume("g", "c1", &[key.clone()], 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(entries.len(), 4);
    // Payload bytes survive the base64 round trip.
    assert_eq!(entries[0].frame.jpeg, vec![0xFF, 0xD8, 0, 0x7F]);
    let indices: Vec<u64> = entries.iter().map(|e| e.frame.meta.frame_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
    assert_eq!(consumer.ack("g", &key, &ids).await.unwrap(), 4);
    assert!(consumer
        .consume("g", "c1", &[key], 10, Duration::ZERO)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn two_worker_processes_share_one_group() {
    // The multi-process topology: two clients with distinct consumer
    // names, one group, entries split exclusively between them.
    let broker = start_broker().await;
    let ingestor = RemoteFrameBus::connect(&broker.base);
    let worker_a = RemoteFrameBus::connect(&broker.base);
    let worker_b = RemoteFrameBus::connect(&broker.base);

    let key = stream_key("cam_01");
    worker_a.ensure_group(&key, "inference-workers").await.unwrap();
    for i in 0..6 {
        ingestor.publish(frame("cam_01", i)).await.unwrap();
    }

    let a = worker_a
        .consume("inference-workers", "worker-a", &[key.clone()], 3, Duration::ZERO)
        .await
        .unwrap();
    let b = worker_b
        .consume("inference-workers", "worker-b", &[key.clone()], 3, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(a.len(), 3);
    assert_eq!(b.len(), 3);
    let mut all: Vec<u64> = a
        .iter()
        .chain(b.iter())
        .map(|e| e.frame.meta.frame_index)
        .collect();
    all.sort_unstable();
    assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn crashed_consumer_entries_reclaim_across_processes() {
    let broker = start_broker().await;
    let ingestor = RemoteFrameBus::connect(&broker.base);
    let dead = RemoteFrameBus::connect(&broker.base);
    let successor = RemoteFrameBus::connect(&broker.base);

    let key = stream_key("cam_01");
    dead.ensure_group(&key, "g").await.unwrap();
    for i in 0..5 {
        ingestor.publish(frame("cam_01", i)).await.unwrap();
    }
    let stolen = dead
        .consume("g", "worker-dead", &[key.clone()], 5, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(stolen.len(), 5);

    let reclaimed = successor
        .reclaim("g", "worker-new", Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 5);
}

#[tokio::test]
async fn checkpoints_survive_between_worker_generations() {
    let broker = start_broker().await;
    let first = RemoteFrameBus::connect(&broker.base);
    let second = RemoteFrameBus::connect(&broker.base);

    assert!(first.get_checkpoint("tracker:cam_01").await.unwrap().is_none());
    first
        .put_checkpoint("tracker:cam_01", vec![1, 2, 3])
        .await
        .unwrap();
    assert_eq!(
        second.get_checkpoint("tracker:cam_01").await.unwrap().unwrap(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn remote_log_round_trip_with_manual_commit() {
    let broker = start_broker().await;
    let producer = RemoteEventLog::connect(&broker.base);
    let consumer = RemoteEventLog::connect(&broker.base);

    for i in 0..3u8 {
        producer
            .publish("detections", "cam_01", vec![i])
            .await
            .unwrap();
    }

    let topics = vec!["detections".to_string()];
    let records = consumer
        .consume("g", &topics, 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].payload, vec![1]);
    assert_eq!(consumer.lag("g", "detections").await.unwrap(), 3);

    for record in &records[..2] {
        consumer
            .commit("g", "detections", record.partition, record.offset)
            .await
            .unwrap();
    }
    assert_eq!(consumer.lag("g", "detections").await.unwrap(), 1);

    // Seek rewinds to the committed position: the uncommitted record
    // re-delivers.
    consumer.seek_to_committed("g", &topics).await.unwrap();
    let replay = consumer.consume("g", &topics, 10, Duration::ZERO).await.unwrap();
    assert_eq!(replay.len(), 1);
    assert_eq!(replay[0].payload, vec![2]);
}

#[tokio::test]
async fn unknown_topic_surfaces_as_an_error() {
    let broker = start_broker().await;
    let log = RemoteEventLog::connect(&broker.base);
    let err = log.publish("nope", "k", vec![1]).await.unwrap_err();
    assert!(err.to_string().contains("Unknown topic"));
}

#[tokio::test]
async fn bootstrap_shape_without_scheme_is_accepted() {
    let broker = start_broker().await;
    let hostport = broker.base.trim_start_matches("http://").to_string();
    let log = RemoteEventLog::connect(&hostport);
    assert!(log.endpoint().starts_with("http://"));
    log.publish("alerts", "VIP_DETECTED", vec![9]).await.unwrap();
    let records = log
        .consume("g", &["alerts".to_string()], 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}
