//! Bounded reader-to-pipeline handoff queue.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use trinetra_core::traits::RawFrame;

/// Bounded single-camera queue between the blocking reader and the async
/// pipeline. Overflow drops the oldest frame: when the pipeline lags, the
/// freshest frames win.
pub struct FrameQueue {
    inner: Mutex<VecDeque<(RawFrame, f64)>>,
    notify: Notify,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Push a frame with its ingest timestamp. Returns the number of
    /// frames displaced to make room (0 or 1).
    pub fn push(&self, frame: RawFrame, ingest_ts: f64) -> usize {
        let displaced = {
            let mut queue = self.inner.lock();
            let displaced = if queue.len() == self.capacity {
                queue.pop_front();
                1
            } else {
                0
            };
            queue.push_back((frame, ingest_ts));
            displaced
        };
        self.notify.notify_waiters();
        displaced
    }

    /// Pop the oldest frame, waiting up to `timeout` for one to arrive.
    pub async fn pop(&self, timeout: Duration) -> Option<(RawFrame, f64)> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.inner.lock().pop_front() {
                return Some(item);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
