//! The in-memory bus engine.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use trinetra_core::config::constants::framebus;
use trinetra_core::error::FrameBusError;
use trinetra_core::traits::{stream_key, BusEntry, EntryId, FrameBus};
use trinetra_core::types::Frame;

struct StoredEntry {
    id: EntryId,
    frame: Frame,
}

struct Pending {
    entry: Arc<StoredEntry>,
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Default)]
struct GroupState {
    /// Highest entry id handed to any consumer in this group.
    delivered_up_to: Option<EntryId>,
    pending: BTreeMap<EntryId, Pending>,
}

#[derive(Default)]
struct StreamState {
    entries: VecDeque<Arc<StoredEntry>>,
    next_seq: u64,
    last_ms: u64,
    groups: HashMap<String, GroupState>,
    drop_count: u64,
}

#[derive(Default)]
struct BusState {
    streams: HashMap<String, StreamState>,
    checkpoints: HashMap<String, Vec<u8>>,
}

/// Shared in-process frame bus.
///
/// All mutation happens under one mutex with short critical sections; the
/// [`Notify`] wakes blocked consumers after each publish.
pub struct MemoryFrameBus {
    state: Mutex<BusState>,
    notify: Notify,
    maxlen: usize,
    trim_slack: usize,
}

impl MemoryFrameBus {
    pub fn new(maxlen: usize) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            notify: Notify::new(),
            maxlen,
            trim_slack: framebus::TRIM_SLACK,
        }
    }

    /// Collect up to `count` new entries for `(group, consumer)` across the
    /// requested streams, round-robin so no camera starves the others.
    fn pop_new(
        state: &mut BusState,
        group: &str,
        consumer: &str,
        streams: &[String],
        count: usize,
    ) -> Result<Vec<BusEntry>, FrameBusError> {
        for key in streams {
            let stream = state
                .streams
                .get(key)
                .ok_or_else(|| FrameBusError::UnknownStream(key.clone()))?;
            if !stream.groups.contains_key(group) {
                return Err(FrameBusError::UnknownGroup {
                    stream: key.clone(),
                    group: group.to_string(),
                });
            }
        }

        let mut out = Vec::new();
        let mut exhausted = vec![false; streams.len()];
        while out.len() < count && exhausted.iter().any(|done| !done) {
            for (i, key) in streams.iter().enumerate() {
                if out.len() == count || exhausted[i] {
                    continue;
                }
                let stream = state.streams.get_mut(key).expect("checked above");
                let group_state = stream.groups.get_mut(group).expect("checked above");
                let next = stream
                    .entries
                    .iter()
                    .find(|e| group_state.delivered_up_to.map_or(true, |c| e.id > c))
                    .cloned();
                match next {
                    Some(entry) => {
                        group_state.delivered_up_to = Some(entry.id);
                        group_state.pending.insert(
                            entry.id,
                            Pending {
                                entry: entry.clone(),
                                consumer: consumer.to_string(),
                                delivered_at: Instant::now(),
                                delivery_count: 1,
                            },
                        );
                        out.push(BusEntry {
                            stream: key.clone(),
                            id: entry.id,
                            frame: entry.frame.clone(),
                        });
                    }
                    None => exhausted[i] = true,
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl FrameBus for MemoryFrameBus {
    async fn publish(&self, frame: Frame) -> Result<EntryId, FrameBusError> {
        let key = stream_key(&frame.meta.camera_id);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| FrameBusError::StoreUnreachable(e.to_string()))?
            .as_millis() as u64;

        let mut state = self.state.lock();
        let stream = state.streams.entry(key).or_default();

        // Ids must stay monotonic even if the clock steps backwards.
        let ms = now_ms.max(stream.last_ms);
        stream.last_ms = ms;
        let id = EntryId {
            ms,
            seq: stream.next_seq,
        };
        stream.next_seq += 1;

        stream.entries.push_back(Arc::new(StoredEntry { id, frame }));

        // Approximate trim: let the stream run `trim_slack` over cap, then
        // cut back to cap from the head. Pending copies survive via Arc.
        if stream.entries.len() > self.maxlen + self.trim_slack {
            while stream.entries.len() > self.maxlen {
                stream.entries.pop_front();
                stream.drop_count += 1;
            }
        }

        drop(state);
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn consume(
        &self,
        group: &str,
        consumer: &str,
        streams: &[String],
        count: usize,
        block: Duration,
    ) -> Result<Vec<BusEntry>, FrameBusError> {
        let deadline = Instant::now() + block;
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                let out = Self::pop_new(&mut state, group, consumer, streams, count)?;
                if !out.is_empty() {
                    return Ok(out);
                }
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

    async fn ack(
        &self,
        group: &str,
        stream: &str,
        ids: &[EntryId],
    ) -> Result<usize, FrameBusError> {
        let mut state = self.state.lock();
        let stream_state = state
            .streams
            .get_mut(stream)
            .ok_or_else(|| FrameBusError::UnknownStream(stream.to_string()))?;
        let group_state =
            stream_state
                .groups
                .get_mut(group)
                .ok_or_else(|| FrameBusError::UnknownGroup {
                    stream: stream.to_string(),
                    group: group.to_string(),
                })?;
        let mut acked = 0;
        for id in ids {
            if group_state.pending.remove(id).is_some() {
                acked += 1;
            }
        }
        Ok(acked)
    }

    async fn reclaim(
        &self,
        group: &str,
        consumer: &str,
        idle: Duration,
    ) -> Result<Vec<BusEntry>, FrameBusError> {
        let mut state = self.state.lock();
        let mut out = Vec::new();
        for (key, stream) in state.streams.iter_mut() {
            let Some(group_state) = stream.groups.get_mut(group) else {
                continue;
            };
            for pending in group_state.pending.values_mut() {
                if pending.delivered_at.elapsed() >= idle && pending.consumer != consumer {
                    pending.consumer = consumer.to_string();
                    pending.delivered_at = Instant::now();
                    pending.delivery_count += 1;
                    debug!(
                        id = %pending.entry.id,
                        deliveries = pending.delivery_count,
                        "pending entry reassigned"
                    );
                    out.push(BusEntry {
                        stream: key.clone(),
                        id: pending.entry.id,
                        frame: pending.entry.frame.clone(),
                    });
                }
            }
        }
        if !out.is_empty() {
            debug!(count = out.len(), consumer, "reclaimed idle pending entries");
        }
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), FrameBusError> {
        let mut state = self.state.lock();
        let stream_state = state.streams.entry(stream.to_string()).or_default();
        stream_state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn len(&self, camera_id: &str) -> usize {
        let state = self.state.lock();
        state
            .streams
            .get(&stream_key(camera_id))
            .map_or(0, |s| s.entries.len())
    }

    async fn fill_ratio(&self, camera_id: &str) -> f64 {
        self.len(camera_id).await as f64 / self.maxlen as f64
    }

    async fn dropped(&self, camera_id: &str) -> u64 {
        let state = self.state.lock();
        state
            .streams
            .get(&stream_key(camera_id))
            .map_or(0, |s| s.drop_count)
    }

    async fn stream_names(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.streams.keys().cloned().collect();
        names.sort();
        names
    }

    async fn put_checkpoint(&self, key: &str, value: Vec<u8>) -> Result<(), FrameBusError> {
        self.state.lock().checkpoints.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_checkpoint(&self, key: &str) -> Result<Option<Vec<u8>>, FrameBusError> {
        Ok(self.state.lock().checkpoints.get(key).cloned())
    }
}
