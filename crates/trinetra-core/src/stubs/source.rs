//! Synthetic camera source.

use crate::error::SourceError;
use crate::traits::{CameraSource, RawFrame, SourceFactory};
use crate::types::Camera;

/// Generates mid-gray frames with a bright square that moves one step per
/// frame, giving the sampler real motion to react to. Disconnects after a
/// configured number of frames so reconnect paths get exercised too.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frames_left: u64,
    cursor: u32,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, frames: u64) -> Self {
        Self {
            width,
            height,
            frames_left: frames,
            cursor: 0,
        }
    }
}

impl CameraSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<RawFrame, SourceError> {
        if self.frames_left == 0 {
            return Err(SourceError::Disconnected("synthetic stream ended".into()));
        }
        self.frames_left -= 1;

        // Pace like a real 30 fps camera; readers expect to block here.
        std::thread::sleep(std::time::Duration::from_millis(33));

        let mut pixels = vec![128u8; (self.width * self.height * 3) as usize];
        let square = 32.min(self.width / 4);
        let x0 = self.cursor % self.width.saturating_sub(square).max(1);
        let y0 = (self.height / 2).saturating_sub(square / 2);
        for y in y0..(y0 + square).min(self.height) {
            for x in x0..(x0 + square).min(self.width) {
                let at = ((y * self.width + x) * 3) as usize;
                pixels[at] = 250;
                pixels[at + 1] = 250;
                pixels[at + 2] = 250;
            }
        }
        self.cursor += 8;

        Ok(RawFrame {
            width: self.width,
            height: self.height,
            pixels,
            frame_ts: None,
        })
    }

    fn capture_fps(&self) -> Option<u32> {
        Some(30)
    }
}

/// Opens a fresh [`SyntheticSource`] per connect.
#[derive(Debug, Clone)]
pub struct SyntheticFactory {
    pub width: u32,
    pub height: u32,
    pub frames_per_session: u64,
}

impl Default for SyntheticFactory {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            frames_per_session: u64::MAX,
        }
    }
}

impl SourceFactory for SyntheticFactory {
    fn open(&self, _camera: &Camera) -> Result<Box<dyn CameraSource>, SourceError> {
        Ok(Box::new(SyntheticSource::new(
            self.width,
            self.height,
            self.frames_per_session,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_then_disconnect() {
        let mut src = SyntheticSource::new(64, 48, 2);
        assert!(src.read_frame().is_ok());
        assert!(src.read_frame().is_ok());
        assert!(matches!(
            src.read_frame(),
            Err(SourceError::Disconnected(_))
        ));
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut src = SyntheticSource::new(64, 48, 3);
        let a = src.read_frame().unwrap();
        let b = src.read_frame().unwrap();
        assert_ne!(a.pixels, b.pixels);
    }
}
