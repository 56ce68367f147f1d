//! Micro-batch accumulation.

use std::time::{Duration, Instant};

use trinetra_core::traits::BusEntry;

/// Accumulates frames from multiple cameras into a fixed-size batch.
///
/// Flushes when either the size cap fills (throughput mode) or the timeout
/// since the first queued frame elapses (latency mode), whichever comes
/// first. Latency stays bounded even when cameras are quiet.
#[derive(Debug)]
pub struct MicroBatchAccumulator {
    batch: Vec<BusEntry>,
    batch_size: usize,
    timeout: Duration,
    started_at: Option<Instant>,
}

impl MicroBatchAccumulator {
    pub fn new(batch_size: usize, timeout: Duration) -> Self {
        Self {
            batch: Vec::with_capacity(batch_size),
            batch_size,
            timeout,
            started_at: None,
        }
    }

    /// Queue one frame. Returns true when the batch is ready to flush.
    pub fn add(&mut self, entry: BusEntry, now: Instant) -> bool {
        if self.batch.is_empty() {
            self.started_at = Some(now);
        }
        self.batch.push(entry);
        self.is_ready(now)
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        if self.batch.is_empty() {
            return false;
        }
        if self.batch.len() >= self.batch_size {
            return true;
        }
        self.started_at
            .map_or(false, |started| now.duration_since(started) >= self.timeout)
    }

    /// Fraction of the size cap currently queued.
    pub fn fill_ratio(&self) -> f64 {
        self.batch.len() as f64 / self.batch_size as f64
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Take the queued frames and reset the clock.
    pub fn flush(&mut self) -> Vec<BusEntry> {
        self.started_at = None;
        std::mem::take(&mut self.batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use trinetra_core::traits::EntryId;
    use trinetra_core::types::{CameraType, Frame, FrameMeta};

    fn entry(index: u64) -> BusEntry {
        BusEntry {
            stream: "frames:cam_01".into(),
            id: EntryId { ms: 1, seq: index },
            frame: Frame {
                meta: FrameMeta {
                    camera_id: "cam_01".into(),
                    camera_type: CameraType::Tracking,
                    frame_index: index,
                    ingest_ts: 0.0,
                    frame_ts: None,
                },
                jpeg: Vec::new(),
            },
        }
    }

    #[test]
    fn empty_batch_is_never_ready() {
        let acc = MicroBatchAccumulator::new(4, Duration::from_millis(20));
        assert!(!acc.is_ready(Instant::now()));
    }

    #[test]
    fn size_cap_triggers_flush() {
        let mut acc = MicroBatchAccumulator::new(4, Duration::from_secs(3600));
        let now = Instant::now();
        for i in 0..3 {
            assert!(!acc.add(entry(i), now));
        }
        assert!(acc.add(entry(3), now));
        assert_eq!(acc.flush().len(), 4);
        assert!(acc.is_empty());
        assert!(!acc.is_ready(now));
    }

    #[test]
    fn timeout_triggers_partial_flush() {
        let mut acc = MicroBatchAccumulator::new(4, Duration::from_millis(20));
        let start = Instant::now();
        assert!(!acc.add(entry(0), start));
        assert!(!acc.is_ready(start + Duration::from_millis(19)));
        assert!(acc.is_ready(start + Duration::from_millis(20)));
        assert_eq!(acc.flush().len(), 1);
    }

    #[test]
    fn timeout_counts_from_first_frame() {
        let mut acc = MicroBatchAccumulator::new(4, Duration::from_millis(20));
        let start = Instant::now();
        acc.add(entry(0), start);
        // A later frame does not reset the clock.
        acc.add(entry(1), start + Duration::from_millis(15));
        assert!(acc.is_ready(start + Duration::from_millis(20)));
    }

    #[test]
    fn fill_ratio_reflects_queue() {
        let mut acc = MicroBatchAccumulator::new(4, Duration::from_millis(20));
        assert_eq!(acc.fill_ratio(), 0.0);
        acc.add(entry(0), Instant::now());
        assert_eq!(acc.fill_ratio(), 0.25);
    }
}
