//! Durable partitioned event log contract.
//!
//! Kafka-shaped: topics split into partitions, records keyed and hashed to
//! a partition, per-partition total order, consumer groups with manual
//! offset commit, retention of at least 24 hours. Delivery is at-least-once;
//! consumers are expected to be idempotent.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EventLogError;

/// A record as delivered to a consumer.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
    /// Wall-clock seconds at publish, used for retention.
    pub publish_ts: f64,
}

/// The event log contract.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a record, returning its `(partition, offset)`. The returned
    /// future resolves once the record is durable (producer ack).
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<(u32, u64), EventLogError>;

    /// Fetch up to `max` records past the group's position across `topics`,
    /// blocking up to `block` for at least one. Advances the in-memory read
    /// position but NOT the committed offset.
    async fn consume(
        &self,
        group: &str,
        topics: &[String],
        max: usize,
        block: Duration,
    ) -> Result<Vec<LogRecord>, EventLogError>;

    /// Durably commit the group's offset on one partition: `offset` is the
    /// last processed record; consumption after a restart resumes at
    /// `offset + 1`.
    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), EventLogError>;

    /// Rewind the group's in-memory read positions to the last committed
    /// offsets, re-delivering everything consumed but not committed. Used
    /// when a downstream dependency recovers and withheld events must be
    /// re-processed.
    async fn seek_to_committed(&self, group: &str, topics: &[String]) -> Result<(), EventLogError>;

    /// Sum over partitions of `head - committed` for a group.
    async fn lag(&self, group: &str, topic: &str) -> Result<u64, EventLogError>;
}
