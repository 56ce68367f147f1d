//! Engine tests: partitioning, ordering, commit/replay, retention, lag.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use trinetra_core::traits::EventLog;

use crate::{RocksEventLog, TopicSpec};

fn open(dir: &TempDir) -> RocksEventLog {
    RocksEventLog::open(dir.path(), TopicSpec::standard()).unwrap()
}

const DETECTIONS: &str = "detections";

fn topics() -> Vec<String> {
    vec![DETECTIONS.to_string()]
}

#[tokio::test]
async fn same_key_lands_on_same_partition_in_order() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir);

    let mut partitions = Vec::new();
    for i in 0..5u8 {
        let (partition, offset) = log
            .publish(DETECTIONS, "cam_01", vec![i])
            .await
            .unwrap();
        partitions.push(partition);
        assert_eq!(offset, i as u64);
    }
    assert!(partitions.windows(2).all(|w| w[0] == w[1]));

    let records = log
        .consume("g", &topics(), 10, Duration::ZERO)
        .await
        .unwrap();
    let payloads: Vec<u8> = records.iter().map(|r| r.payload[0]).collect();
    assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn unknown_topic_is_rejected() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir);
    assert!(log.publish("nope", "k", vec![]).await.is_err());
}

#[tokio::test]
async fn consume_without_commit_replays_after_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let log = open(&dir);
        log.publish(DETECTIONS, "cam_01", vec![1]).await.unwrap();
        log.publish(DETECTIONS, "cam_01", vec![2]).await.unwrap();
        let records = log.consume("g", &topics(), 10, Duration::ZERO).await.unwrap();
        assert_eq!(records.len(), 2);
        // No commit. In-memory position advanced, durable offset did not.
        let again = log.consume("g", &topics(), 10, Duration::ZERO).await.unwrap();
        assert!(again.is_empty());
    }

    let log = open(&dir);
    let replayed = log.consume("g", &topics(), 10, Duration::ZERO).await.unwrap();
    assert_eq!(replayed.len(), 2, "uncommitted records must replay");
}

#[tokio::test]
async fn committed_records_do_not_replay() {
    let dir = TempDir::new().unwrap();
    {
        let log = open(&dir);
        log.publish(DETECTIONS, "cam_01", vec![1]).await.unwrap();
        log.publish(DETECTIONS, "cam_01", vec![2]).await.unwrap();
        let records = log.consume("g", &topics(), 10, Duration::ZERO).await.unwrap();
        for r in &records[..1] {
            log.commit("g", DETECTIONS, r.partition, r.offset).await.unwrap();
        }
    }

    let log = open(&dir);
    let replayed = log.consume("g", &topics(), 10, Duration::ZERO).await.unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].payload, vec![2]);
}

#[tokio::test]
async fn seek_to_committed_rewinds_in_memory_position() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir);
    log.publish(DETECTIONS, "cam_01", vec![1]).await.unwrap();
    log.publish(DETECTIONS, "cam_01", vec![2]).await.unwrap();

    let first = log.consume("g", &topics(), 10, Duration::ZERO).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(log
        .consume("g", &topics(), 10, Duration::ZERO)
        .await
        .unwrap()
        .is_empty());

    log.seek_to_committed("g", &topics()).await.unwrap();
    let replay = log.consume("g", &topics(), 10, Duration::ZERO).await.unwrap();
    assert_eq!(replay.len(), 2, "seek must re-deliver uncommitted records");
}

#[tokio::test]
async fn groups_consume_independently() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir);
    log.publish(DETECTIONS, "cam_01", vec![7]).await.unwrap();

    let a = log.consume("g1", &topics(), 10, Duration::ZERO).await.unwrap();
    let b = log.consume("g2", &topics(), 10, Duration::ZERO).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
}

#[tokio::test]
async fn lag_counts_uncommitted_records() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir);
    for i in 0..10u8 {
        // Distinct keys spread records over partitions; lag sums them all.
        log.publish(DETECTIONS, &format!("cam_{i:02}"), vec![i]).await.unwrap();
    }
    assert_eq!(log.lag("g", DETECTIONS).await.unwrap(), 10);

    let records = log.consume("g", &topics(), 10, Duration::ZERO).await.unwrap();
    // Consumption alone does not move durable offsets.
    assert_eq!(log.lag("g", DETECTIONS).await.unwrap(), 10);

    for r in &records {
        log.commit("g", DETECTIONS, r.partition, r.offset).await.unwrap();
    }
    assert_eq!(log.lag("g", DETECTIONS).await.unwrap(), 0);
}

#[tokio::test]
async fn commit_past_head_is_rejected() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir);
    let (partition, offset) = log.publish(DETECTIONS, "cam_01", vec![1]).await.unwrap();
    assert!(log.commit("g", DETECTIONS, partition, offset + 5).await.is_err());
    log.commit("g", DETECTIONS, partition, offset).await.unwrap();
}

#[tokio::test]
async fn offsets_continue_after_reopen() {
    let dir = TempDir::new().unwrap();
    let (partition, first) = {
        let log = open(&dir);
        log.publish(DETECTIONS, "cam_01", vec![1]).await.unwrap()
    };
    let log = open(&dir);
    let (p2, second) = log.publish(DETECTIONS, "cam_01", vec![2]).await.unwrap();
    assert_eq!(partition, p2);
    assert_eq!(second, first + 1);
}

#[tokio::test]
async fn retention_prunes_only_old_records() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir);
    log.publish(DETECTIONS, "cam_01", vec![1]).await.unwrap();
    log.publish(DETECTIONS, "cam_01", vec![2]).await.unwrap();

    // Everything is fresh: a 24 h window prunes nothing.
    assert_eq!(log.prune_older_than(Duration::from_secs(86_400)).unwrap(), 0);

    // A zero-width window prunes everything already published.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let pruned = log.prune_older_than(Duration::ZERO).unwrap();
    assert_eq!(pruned, 2);
    assert!(log
        .consume("g", &topics(), 10, Duration::ZERO)
        .await
        .unwrap()
        .is_empty());

    // New publishes keep allocating past the pruned range.
    let (_, offset) = log.publish(DETECTIONS, "cam_01", vec![3]).await.unwrap();
    assert_eq!(offset, 2);
    let records = log.consume("g2", &topics(), 10, Duration::ZERO).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload, vec![3]);
}

#[tokio::test]
async fn consume_blocks_until_publish() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(open(&dir));

    let consumer = {
        let log = log.clone();
        tokio::spawn(async move { log.consume("g", &topics(), 1, Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    log.publish(DETECTIONS, "cam_01", vec![9]).await.unwrap();

    let records = consumer.await.unwrap().unwrap();
    assert_eq!(records.len(), 1);
}
