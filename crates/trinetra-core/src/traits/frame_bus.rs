//! Bounded ordered per-camera stream contract.
//!
//! One distinct FIFO stream per camera, keyed `frames:{camera_id}`.
//! Capacity is enforced approximately: when a stream exceeds its cap the
//! oldest entries are silently discarded (tail-drop from the head), so
//! recency always wins over completeness.
//!
//! Consumer groups give each entry to exactly one member; unacked entries
//! stay claimable and are handed to whoever calls [`FrameBus::reclaim`]
//! after the owner has gone idle. Across groups, streams are broadcast
//! independently.
//!
//! The contract also carries a small checkpoint KV used for tracker state
//! (`tracker:{camera_id}`), since the bus store is the one piece of shared
//! infrastructure both worker generations can reach.
//!
//! Implementations may be in-process or remote; every operation is async
//! so a networked backing store fits behind the same seam.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FrameBusError;
use crate::types::Frame;

/// Bus-assigned entry identifier: millisecond timestamp plus a sequence
/// number, monotonically increasing per stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntryId {
    pub ms: u64,
    pub seq: u64,
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// A frame as delivered to a consumer.
#[derive(Debug, Clone)]
pub struct BusEntry {
    pub stream: String,
    pub id: EntryId,
    pub frame: Frame,
}

/// Advisory per-stream statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStats {
    pub len: usize,
    pub fill_ratio: f64,
    pub dropped: u64,
}

/// Stream key for a camera.
pub fn stream_key(camera_id: &str) -> String {
    format!("frames:{camera_id}")
}

/// The frame bus contract.
#[async_trait]
pub trait FrameBus: Send + Sync {
    /// Append a frame to its camera's stream. O(1) amortized; never blocks
    /// for capacity. Fails only when the backing store is unreachable, in
    /// which case the frame is dropped and counted by the caller.
    async fn publish(&self, frame: Frame) -> Result<EntryId, FrameBusError>;

    /// Read up to `count` entries across `streams` on behalf of
    /// `(group, consumer)`, blocking up to `block` for at least one entry.
    /// Delivered entries move to the group's pending list until acked.
    async fn consume(
        &self,
        group: &str,
        consumer: &str,
        streams: &[String],
        count: usize,
        block: Duration,
    ) -> Result<Vec<BusEntry>, FrameBusError>;

    /// Mark entries processed. Returns how many were actually pending.
    async fn ack(
        &self,
        group: &str,
        stream: &str,
        ids: &[EntryId],
    ) -> Result<usize, FrameBusError>;

    /// Take over pending entries whose owner has been idle at least `idle`.
    /// Crash-recovery primitive for consumer-group members.
    async fn reclaim(
        &self,
        group: &str,
        consumer: &str,
        idle: Duration,
    ) -> Result<Vec<BusEntry>, FrameBusError>;

    /// Idempotently create a consumer group on a stream.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), FrameBusError>;

    /// Current stream length. Advisory: remote implementations report 0
    /// when the store is briefly unreachable rather than failing the
    /// caller's pipeline.
    async fn len(&self, camera_id: &str) -> usize;

    /// Current length over capacity, in [0, 1+slack]. Advisory, like
    /// [`FrameBus::len`].
    async fn fill_ratio(&self, camera_id: &str) -> f64;

    /// Entries discarded by the tail-drop trim since startup. Advisory.
    async fn dropped(&self, camera_id: &str) -> u64;

    /// All three advisory statistics in one call. Remote implementations
    /// override this so the per-frame pipeline pays one round trip.
    async fn stats(&self, camera_id: &str) -> StreamStats {
        StreamStats {
            len: self.len(camera_id).await,
            fill_ratio: self.fill_ratio(camera_id).await,
            dropped: self.dropped(camera_id).await,
        }
    }

    /// All stream keys currently known to the bus. Advisory.
    async fn stream_names(&self) -> Vec<String>;

    /// Store an opaque checkpoint blob (tracker state).
    async fn put_checkpoint(&self, key: &str, value: Vec<u8>) -> Result<(), FrameBusError>;

    async fn get_checkpoint(&self, key: &str) -> Result<Option<Vec<u8>>, FrameBusError>;
}
