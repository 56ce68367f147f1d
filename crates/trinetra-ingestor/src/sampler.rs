//! Adaptive frame sampler.

use trinetra_core::config::constants::ingest;

use crate::analysis::motion_score;

/// Decides whether a decoded frame should be forwarded for inference.
///
/// Baseline is every Nth frame (N = capture fps over target fps). Bus
/// backpressure widens the interval toward 3x base; motion narrows it
/// toward every frame; calm scenes snap back to base. This trades compute
/// for recency during bursts and saves GPU during static scenes.
///
/// Priority cameras (billing, entrance) get a forward decision regardless
/// of the interval; only the burst suppressor may drop their frames.
#[derive(Debug)]
pub struct AdaptiveSampler {
    base_interval: u32,
    interval: u32,
    count: u64,
    priority: bool,
    prev_grid: Option<Vec<u8>>,
}

impl AdaptiveSampler {
    pub fn new(capture_fps: u32, target_fps: u32, priority: bool) -> Self {
        let base_interval = (capture_fps / target_fps.max(1)).max(1);
        Self {
            base_interval,
            interval: base_interval,
            count: 0,
            priority,
            prev_grid: None,
        }
    }

    /// Current skip interval, exposed for observability.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Observe one frame and decide whether to forward it.
    pub fn should_forward(&mut self, luma_grid: &[u8], fill_ratio: f64) -> bool {
        self.count += 1;

        if fill_ratio > ingest::HIGH_WATER_FILL {
            self.interval = (self.interval + 1).min(self.base_interval * ingest::SKIP_CAP_FACTOR);
            self.prev_grid = Some(luma_grid.to_vec());
        } else {
            let motion = motion_score(self.prev_grid.as_deref(), luma_grid);
            self.prev_grid = Some(luma_grid.to_vec());
            if motion > ingest::MOTION_THRESHOLD {
                self.interval = self.interval.saturating_sub(1).max(1);
            } else {
                self.interval = self.base_interval;
            }
        }

        if self.priority {
            return true;
        }
        self.count % u64::from(self.interval) == 0
    }
}
