//! Durable partitioned event log over RocksDB.
//!
//! Implements the event log contract: named topics split into a fixed
//! partition count, records hashed to a partition by key, per-partition
//! total order, consumer groups with manual offset commit, and time-based
//! retention. Delivery is at-least-once: records survive consumption and a
//! group that never commits re-reads everything after a restart.
//!
//! # Layout
//!
//! One column family per topic plus an `offsets` family:
//!
//! | CF | Key | Value |
//! |---|---|---|
//! | `<topic>` | partition (4B BE) + offset (8B BE) | bincode [`StoredRecord`] |
//! | `offsets` | group + NUL + topic + NUL + partition (4B BE) | offset (8B BE) |
//!
//! Big-endian composite keys keep per-partition records contiguous and
//! ordered for iterator scans.

mod rocks;

#[cfg(test)]
mod tests;

pub use rocks::{RocksEventLog, TopicSpec};
