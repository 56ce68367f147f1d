//! Active-identity registry.

use std::collections::HashMap;

use crate::gate::LastSeen;

/// In-memory record of a currently-present customer.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub camera: String,
    pub last_seen_ts: f64,
    /// Most recent matched embedding, kept for the gallery EMA update.
    pub embedding: Vec<f32>,
    /// Track that produced the latest match, for the false-merge check.
    pub track_id: u32,
}

/// `customer_id -> (camera, ts, embedding)` for everyone believed to be in
/// the store right now.
///
/// Intentionally process-local: lookups sit on the per-event hot path. On
/// restart it repopulates as events replay. Mutated only from the single
/// consumer task, so no locking.
#[derive(Debug, Default)]
pub struct ActiveIdentityRegistry {
    records: HashMap<String, IdentityRecord>,
    ttl_s: f64,
}

impl ActiveIdentityRegistry {
    pub fn new(ttl_s: f64) -> Self {
        Self {
            records: HashMap::new(),
            ttl_s,
        }
    }

    /// Record a confirmed sighting.
    pub fn set(
        &mut self,
        customer_id: &str,
        camera: &str,
        ts: f64,
        embedding: Vec<f32>,
        track_id: u32,
    ) {
        self.records.insert(
            customer_id.to_string(),
            IdentityRecord {
                camera: camera.to_string(),
                last_seen_ts: ts,
                embedding,
                track_id,
            },
        );
    }

    pub fn get(&self, customer_id: &str) -> Option<&IdentityRecord> {
        self.records.get(customer_id)
    }

    /// The gate's view of a customer, `None` once the record has aged out
    /// relative to `now`.
    pub fn last_seen(&self, customer_id: &str, now: f64) -> Option<LastSeen> {
        self.records.get(customer_id).and_then(|r| {
            if now - r.last_seen_ts < self.ttl_s {
                Some(LastSeen {
                    camera: r.camera.clone(),
                    ts: r.last_seen_ts,
                })
            } else {
                None
            }
        })
    }

    /// Drop a single entry (lazy expiry from the gate path).
    pub fn evict(&mut self, customer_id: &str) {
        self.records.remove(customer_id);
    }

    /// Drop everything older than the TTL. Returns how many were removed.
    pub fn sweep_expired(&mut self, now: f64) -> usize {
        let before = self.records.len();
        let ttl = self.ttl_s;
        self.records.retain(|_, r| now - r.last_seen_ts < ttl);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate all live records (the false-merge reverse index).
    pub fn iter(&self) -> impl Iterator<Item = (&String, &IdentityRecord)> {
        self.records.iter()
    }
}
