//! The RocksDB engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use trinetra_core::config::constants::eventlog;
use trinetra_core::error::EventLogError;
use trinetra_core::traits::{EventLog, LogRecord};

const CF_OFFSETS: &str = "offsets";

/// A topic and its partition count, fixed at open time.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: u32,
}

impl TopicSpec {
    pub fn new(name: &str, partitions: u32) -> Self {
        Self {
            name: name.to_string(),
            partitions,
        }
    }

    /// The pipeline's standard topology: `detections` (8), `identities` (8),
    /// `alerts` (3).
    pub fn standard() -> Vec<TopicSpec> {
        vec![
            TopicSpec::new(eventlog::TOPIC_DETECTIONS, eventlog::DETECTIONS_PARTITIONS),
            TopicSpec::new(eventlog::TOPIC_IDENTITIES, eventlog::IDENTITIES_PARTITIONS),
            TopicSpec::new(eventlog::TOPIC_ALERTS, eventlog::ALERTS_PARTITIONS),
        ]
    }
}

/// On-disk record envelope.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    publish_ts: f64,
    payload: Vec<u8>,
}

/// Durable partitioned log.
pub struct RocksEventLog {
    db: DB,
    topics: HashMap<String, u32>,
    /// Next offset to assign, per (topic, partition).
    heads: Mutex<HashMap<(String, u32), u64>>,
    /// Next offset to read, per (group, topic, partition). Lazily seeded
    /// from committed offsets; never persisted itself.
    positions: Mutex<HashMap<(String, String, u32), u64>>,
    notify: Notify,
}

fn record_key(partition: u32, offset: u64) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..4].copy_from_slice(&partition.to_be_bytes());
    key[4..].copy_from_slice(&offset.to_be_bytes());
    key
}

fn parse_record_key(key: &[u8]) -> Option<(u32, u64)> {
    if key.len() != 12 {
        return None;
    }
    let partition = u32::from_be_bytes(key[..4].try_into().ok()?);
    let offset = u64::from_be_bytes(key[4..].try_into().ok()?);
    Some((partition, offset))
}

fn offset_key(group: &str, topic: &str, partition: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(group.len() + topic.len() + 6);
    key.extend_from_slice(group.as_bytes());
    key.push(0);
    key.extend_from_slice(topic.as_bytes());
    key.push(0);
    key.extend_from_slice(&partition.to_be_bytes());
    key
}

/// FNV-1a over the record key. Stable across restarts and processes, which
/// is what keeps per-camera ordering intact between producer generations.
fn partition_for(key: &str, partitions: u32) -> u32 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % u64::from(partitions)) as u32
}

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl RocksEventLog {
    /// Open (or create) the log at `path` with the given topics.
    pub fn open(path: &Path, topics: Vec<TopicSpec>) -> Result<Self, EventLogError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let mut descriptors: Vec<ColumnFamilyDescriptor> = topics
            .iter()
            .map(|t| ColumnFamilyDescriptor::new(t.name.clone(), Options::default()))
            .collect();
        descriptors.push(ColumnFamilyDescriptor::new(CF_OFFSETS, Options::default()));

        let db = DB::open_cf_descriptors(&db_opts, path, descriptors)
            .map_err(|e| EventLogError::Storage(format!("open {}: {e}", path.display())))?;

        let topic_map: HashMap<String, u32> =
            topics.iter().map(|t| (t.name.clone(), t.partitions)).collect();

        let log = Self {
            db,
            topics: topic_map,
            heads: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        };
        log.scan_heads(&topics)?;
        info!(path = %path.display(), topics = topics.len(), "event log open");
        Ok(log)
    }

    /// Rebuild the per-partition head offsets by reading each partition's
    /// last record key.
    fn scan_heads(&self, topics: &[TopicSpec]) -> Result<(), EventLogError> {
        let mut heads = self.heads.lock();
        for topic in topics {
            let cf = self.cf(&topic.name)?;
            for partition in 0..topic.partitions {
                // Seek backwards from the partition's key-space ceiling.
                let ceiling = record_key(partition, u64::MAX);
                let mut iter = self
                    .db
                    .iterator_cf(cf, IteratorMode::From(&ceiling[..], Direction::Reverse));
                let head = match iter.next() {
                    Some(Ok((key, _))) => match parse_record_key(&key) {
                        Some((p, offset)) if p == partition => offset + 1,
                        _ => 0,
                    },
                    _ => 0,
                };
                heads.insert((topic.name.clone(), partition), head);
            }
        }
        Ok(())
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, EventLogError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| EventLogError::UnknownTopic(name.to_string()))
    }

    fn partitions(&self, topic: &str) -> Result<u32, EventLogError> {
        self.topics
            .get(topic)
            .copied()
            .ok_or_else(|| EventLogError::UnknownTopic(topic.to_string()))
    }

    /// Committed offset for a group partition, if any.
    fn committed(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<Option<u64>, EventLogError> {
        let cf = self.cf(CF_OFFSETS)?;
        let raw = self
            .db
            .get_cf(cf, offset_key(group, topic, partition))
            .map_err(|e| EventLogError::Storage(e.to_string()))?;
        Ok(raw.and_then(|bytes| bytes.try_into().ok().map(u64::from_be_bytes)))
    }

    fn committed_next(&self, group: &str, topic: &str, partition: u32) -> Result<u64, EventLogError> {
        Ok(self.committed(group, topic, partition)?.map_or(0, |c| c + 1))
    }

    /// One non-blocking fetch pass across topics and partitions.
    fn fetch_pass(
        &self,
        group: &str,
        topics: &[String],
        max: usize,
    ) -> Result<Vec<LogRecord>, EventLogError> {
        let mut out = Vec::new();
        let mut positions = self.positions.lock();
        for topic in topics {
            let partitions = self.partitions(topic)?;
            let cf = self.cf(topic)?;
            for partition in 0..partitions {
                if out.len() >= max {
                    break;
                }
                let slot = (group.to_string(), topic.clone(), partition);
                let pos = match positions.get(&slot) {
                    Some(p) => *p,
                    None => {
                        let seeded = self.committed_next(group, topic, partition)?;
                        positions.insert(slot.clone(), seeded);
                        seeded
                    }
                };

                // Iterator seek instead of point reads: retention pruning can
                // leave the position pointing below the partition's first
                // surviving record.
                let start = record_key(partition, pos);
                let iter = self
                    .db
                    .iterator_cf(cf, IteratorMode::From(&start[..], Direction::Forward));
                let mut next_pos = pos;
                for item in iter {
                    if out.len() >= max {
                        break;
                    }
                    let (key, value) = item.map_err(|e| EventLogError::Storage(e.to_string()))?;
                    let Some((p, offset)) = parse_record_key(&key) else {
                        break;
                    };
                    if p != partition {
                        break;
                    }
                    let stored: StoredRecord = bincode::deserialize(&value)
                        .map_err(|e| EventLogError::Serialization(e.to_string()))?;
                    out.push(LogRecord {
                        topic: topic.clone(),
                        partition,
                        offset,
                        key: stored.key,
                        payload: stored.payload,
                        publish_ts: stored.publish_ts,
                    });
                    next_pos = offset + 1;
                }
                if next_pos != pos {
                    positions.insert(slot, next_pos);
                }
            }
        }
        Ok(out)
    }

    /// Delete records older than `max_age`. Returns how many were pruned.
    ///
    /// Offsets are publish-ordered within a partition, so each partition
    /// scan stops at the first young-enough record.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<u64, EventLogError> {
        let cutoff = now_seconds() - max_age.as_secs_f64();
        let mut pruned = 0u64;
        for (topic, partitions) in self.topics.clone() {
            let cf = self.cf(&topic)?;
            for partition in 0..partitions {
                let start = record_key(partition, 0);
                let iter = self
                    .db
                    .iterator_cf(cf, IteratorMode::From(&start[..], Direction::Forward));
                for item in iter {
                    let (key, value) = item.map_err(|e| EventLogError::Storage(e.to_string()))?;
                    let Some((p, _)) = parse_record_key(&key) else {
                        break;
                    };
                    if p != partition {
                        break;
                    }
                    let stored: StoredRecord = bincode::deserialize(&value)
                        .map_err(|e| EventLogError::Serialization(e.to_string()))?;
                    if stored.publish_ts >= cutoff {
                        break;
                    }
                    self.db
                        .delete_cf(cf, &key)
                        .map_err(|e| EventLogError::Storage(e.to_string()))?;
                    pruned += 1;
                }
            }
        }
        if pruned > 0 {
            debug!(pruned, "retention pruned old records");
        }
        Ok(pruned)
    }

    /// Spawn the periodic retention task. Runs hourly with the standard
    /// 24 h window until the log is dropped.
    pub fn spawn_retention(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let log = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(3600));
            tick.tick().await;
            loop {
                tick.tick().await;
                let window = Duration::from_secs(eventlog::RETENTION_HOURS * 3600);
                if let Err(e) = log.prune_older_than(window) {
                    warn!(error = %e, "retention pass failed");
                }
            }
        })
    }
}

#[async_trait]
impl EventLog for RocksEventLog {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<(u32, u64), EventLogError> {
        let partitions = self.partitions(topic)?;
        let partition = partition_for(key, partitions);
        let cf = self.cf(topic)?;

        let stored = StoredRecord {
            key: key.to_string(),
            publish_ts: now_seconds(),
            payload,
        };
        let value =
            bincode::serialize(&stored).map_err(|e| EventLogError::Serialization(e.to_string()))?;

        // Offset allocation and the write stay under one lock so offsets
        // land on disk in order.
        let offset = {
            let mut heads = self.heads.lock();
            let head = heads.entry((topic.to_string(), partition)).or_insert(0);
            let offset = *head;
            self.db
                .put_cf(cf, record_key(partition, offset), value)
                .map_err(|e| EventLogError::Storage(e.to_string()))?;
            *head += 1;
            offset
        };

        self.notify.notify_waiters();
        Ok((partition, offset))
    }

    async fn consume(
        &self,
        group: &str,
        topics: &[String],
        max: usize,
        block: Duration,
    ) -> Result<Vec<LogRecord>, EventLogError> {
        let deadline = Instant::now() + block;
        loop {
            let notified = self.notify.notified();
            let out = self.fetch_pass(group, topics, max)?;
            if !out.is_empty() {
                return Ok(out);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(deadline - now) => {}
            }
        }
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), EventLogError> {
        let head = {
            let heads = self.heads.lock();
            heads
                .get(&(topic.to_string(), partition))
                .copied()
                .unwrap_or(0)
        };
        if offset >= head {
            return Err(EventLogError::CommitOutOfRange {
                topic: topic.to_string(),
                partition,
                offset,
                head,
            });
        }
        let cf = self.cf(CF_OFFSETS)?;
        self.db
            .put_cf(cf, offset_key(group, topic, partition), offset.to_be_bytes())
            .map_err(|e| EventLogError::Storage(e.to_string()))
    }

    async fn seek_to_committed(&self, group: &str, topics: &[String]) -> Result<(), EventLogError> {
        let mut positions = self.positions.lock();
        for topic in topics {
            let partitions = self.partitions(topic)?;
            for partition in 0..partitions {
                let seeded = self.committed_next(group, topic, partition)?;
                positions.insert((group.to_string(), topic.clone(), partition), seeded);
            }
        }
        Ok(())
    }

    async fn lag(&self, group: &str, topic: &str) -> Result<u64, EventLogError> {
        let partitions = self.partitions(topic)?;
        let heads = self.heads.lock();
        let mut total = 0u64;
        for partition in 0..partitions {
            let head = heads
                .get(&(topic.to_string(), partition))
                .copied()
                .unwrap_or(0);
            let next = self.committed_next(group, topic, partition)?;
            total += head.saturating_sub(next);
        }
        Ok(total)
    }
}
