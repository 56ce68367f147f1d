//! Frame statistics: validation inputs and the motion grid.

use trinetra_core::config::constants::ingest;
use trinetra_core::traits::RawFrame;

/// Edge of the downscaled luma grid used for motion scoring.
pub const MOTION_GRID: usize = 32;

/// One-pass statistics over a decoded frame.
#[derive(Debug, Clone)]
pub struct FrameStats {
    /// Mean luma over the full frame.
    pub mean: f64,
    /// Luma standard deviation over the full frame.
    pub std: f64,
    /// Block-averaged 32x32 luma grid for cheap frame-to-frame motion.
    pub luma_grid: Vec<u8>,
}

/// Compute luma statistics and the motion grid in a single pass.
pub fn analyze(frame: &RawFrame) -> FrameStats {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut grid_sum = vec![0u64; MOTION_GRID * MOTION_GRID];
    let mut grid_count = vec![0u32; MOTION_GRID * MOTION_GRID];

    for y in 0..h {
        let gy = y * MOTION_GRID / h.max(1);
        for x in 0..w {
            let at = (y * w + x) * 3;
            let r = frame.pixels[at] as f64;
            let g = frame.pixels[at + 1] as f64;
            let b = frame.pixels[at + 2] as f64;
            // ITU-R BT.601 luma weights.
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            sum += luma;
            sum_sq += luma * luma;

            let gx = x * MOTION_GRID / w.max(1);
            let cell = gy * MOTION_GRID + gx;
            grid_sum[cell] += luma as u64;
            grid_count[cell] += 1;
        }
    }

    let n = (w * h).max(1) as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);

    let luma_grid = grid_sum
        .iter()
        .zip(&grid_count)
        .map(|(&s, &c)| if c == 0 { 0 } else { (s / c as u64) as u8 })
        .collect();

    FrameStats {
        mean,
        std: variance.sqrt(),
        luma_grid,
    }
}

/// Validator: reject frames whose statistics indicate blank or corrupted
/// content (near-black, near-white, or flat).
pub fn is_valid(stats: &FrameStats) -> bool {
    stats.mean >= ingest::PIXEL_MEAN_MIN
        && stats.mean <= ingest::PIXEL_MEAN_MAX
        && stats.std >= ingest::PIXEL_STD_MIN
}

/// Mean absolute luma difference between two motion grids. Zero when no
/// previous grid exists yet.
pub fn motion_score(prev: Option<&[u8]>, current: &[u8]) -> f64 {
    let Some(prev) = prev else { return 0.0 };
    if prev.len() != current.len() || current.is_empty() {
        return 0.0;
    }
    let total: u64 = prev
        .iter()
        .zip(current)
        .map(|(&a, &b)| u64::from(a.abs_diff(b)))
        .sum();
    total as f64 / current.len() as f64
}
