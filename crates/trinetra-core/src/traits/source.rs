//! Camera source contract.
//!
//! The RTSP/FFmpeg decoder sits behind [`CameraSource`]; the ingestor owns
//! the reconnect policy around it. `read_frame` is blocking by design: each
//! camera's reader runs on a dedicated blocking task, the only place in the
//! ingestor where a thread blocks on network I/O.

use crate::error::SourceError;
use crate::types::Camera;

/// One decoded frame straight off the wire: packed RGB8.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major RGB.
    pub pixels: Vec<u8>,
    /// Camera-reported capture time, when the stream carries one.
    pub frame_ts: Option<f64>,
}

/// A live decoder session for one camera.
pub trait CameraSource: Send {
    /// Block until the next decoded frame, a read timeout, or stream loss.
    fn read_frame(&mut self) -> Result<RawFrame, SourceError>;

    /// Capture rate reported by the stream, if known.
    fn capture_fps(&self) -> Option<u32> {
        None
    }
}

/// Opens decoder sessions. The ingestor calls this on every (re)connect,
/// so implementations must be cheap to clone handles from.
pub trait SourceFactory: Send + Sync {
    fn open(&self, camera: &Camera) -> Result<Box<dyn CameraSource>, SourceError>;
}
