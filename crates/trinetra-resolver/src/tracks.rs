//! Per-track resolution state.
//!
//! Each `(camera_id, track_id)` pair carries a history ring and a phase:
//!
//! ```text
//! NEW ──► COLLECTING ──► RESOLVED(customer) ──► STALE (30 s silence)
//!              ▲               │
//!              └── three consecutive disagreements (identity flicker)
//! ```

use std::collections::HashMap;

use trinetra_core::config::constants::resolver;
use trinetra_core::types::HistoryRing;

/// How many consecutive disagreeing events demote a resolved track.
const FLICKER_DISAGREEMENTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackPhase {
    New,
    Collecting,
    Resolved(String),
}

#[derive(Debug)]
pub struct TrackState {
    pub ring: HistoryRing,
    pub phase: TrackPhase,
    pub last_event_ts: f64,
    disagreements: u32,
}

impl TrackState {
    fn new(ts: f64) -> Self {
        Self {
            ring: HistoryRing::new(resolver::HISTORY_RING, resolver::HISTORY_MAJORITY),
            phase: TrackPhase::New,
            last_event_ts: ts,
            disagreements: 0,
        }
    }
}

/// All track state for the resolver, keyed `(camera_id, track_id)`.
/// Track ids are only stable within one camera.
#[derive(Debug, Default)]
pub struct TrackTable {
    tracks: HashMap<(String, u32), TrackState>,
    flicker_count: u64,
}

impl TrackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the state for a track, clearing the ring first if
    /// the track went stale.
    pub fn touch(&mut self, camera_id: &str, track_id: u32, ts: f64) -> &mut TrackState {
        touch_entry(&mut self.tracks, camera_id, track_id, ts)
    }

    /// Record the outcome of one event on a track: the candidate written
    /// to its ring and whether confirmation held. Handles the phase
    /// transitions, including flicker demotion.
    pub fn observe(
        &mut self,
        camera_id: &str,
        track_id: u32,
        ts: f64,
        candidate_id: &str,
        confirmed: Option<&str>,
    ) {
        let state = touch_entry(&mut self.tracks, camera_id, track_id, ts);

        match (&state.phase, confirmed) {
            (TrackPhase::Resolved(current), Some(winner)) if current == winner => {
                state.disagreements = 0;
            }
            (TrackPhase::Resolved(current), _) if candidate_id != current => {
                state.disagreements += 1;
                if state.disagreements >= FLICKER_DISAGREEMENTS {
                    state.phase = TrackPhase::Collecting;
                    state.disagreements = 0;
                    self.flicker_count += 1;
                }
            }
            (TrackPhase::Resolved(_), _) => {
                state.disagreements = 0;
            }
            (_, Some(winner)) => {
                state.phase = TrackPhase::Resolved(winner.to_string());
                state.disagreements = 0;
            }
            (TrackPhase::New, None) => {
                state.phase = TrackPhase::Collecting;
            }
            (TrackPhase::Collecting, None) => {}
        }
    }

    /// Identity-flicker demotions since startup.
    pub fn flicker_count(&self) -> u64 {
        self.flicker_count
    }

    /// Live resolved assignments: `(camera, track, customer, last_ts)` for
    /// tracks that have seen an event within the stale window. Input to
    /// the false-merge reverse index.
    pub fn resolved_assignments(&self, now: f64) -> Vec<(String, u32, String, f64)> {
        self.tracks
            .iter()
            .filter(|(_, s)| now - s.last_event_ts <= resolver::STALE_TRACK_S)
            .filter_map(|((camera, track), s)| match &s.phase {
                TrackPhase::Resolved(customer) => {
                    Some((camera.clone(), *track, customer.clone(), s.last_event_ts))
                }
                _ => None,
            })
            .collect()
    }

    /// Drop tracks idle for well over the stale window to bound memory.
    pub fn sweep(&mut self, now: f64) {
        self.tracks
            .retain(|_, s| now - s.last_event_ts <= resolver::STALE_TRACK_S * 10.0);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

fn touch_entry<'a>(
    tracks: &'a mut HashMap<(String, u32), TrackState>,
    camera_id: &str,
    track_id: u32,
    ts: f64,
) -> &'a mut TrackState {
    let state = tracks
        .entry((camera_id.to_string(), track_id))
        .or_insert_with(|| TrackState::new(ts));
    if ts - state.last_event_ts > resolver::STALE_TRACK_S {
        state.ring.clear();
        state.phase = TrackPhase::New;
        state.disagreements = 0;
    }
    state.last_event_ts = ts;
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_track_starts_collecting() {
        let mut table = TrackTable::new();
        table.observe("cam_01", 1, 1000.0, "cust_a", None);
        let state = table.touch("cam_01", 1, 1000.1);
        assert_eq!(state.phase, TrackPhase::Collecting);
    }

    #[test]
    fn confirmation_resolves_the_track() {
        let mut table = TrackTable::new();
        table.observe("cam_01", 1, 1000.0, "cust_a", Some("cust_a"));
        let state = table.touch("cam_01", 1, 1000.1);
        assert_eq!(state.phase, TrackPhase::Resolved("cust_a".into()));
    }

    #[test]
    fn three_disagreements_demote_to_collecting() {
        let mut table = TrackTable::new();
        table.observe("cam_01", 1, 1000.0, "cust_a", Some("cust_a"));
        for i in 0..2 {
            table.observe("cam_01", 1, 1000.1 + i as f64 * 0.1, "cust_b", None);
        }
        assert_eq!(
            table.touch("cam_01", 1, 1000.3).phase,
            TrackPhase::Resolved("cust_a".into())
        );
        table.observe("cam_01", 1, 1000.4, "cust_b", None);
        assert_eq!(table.touch("cam_01", 1, 1000.5).phase, TrackPhase::Collecting);
        assert_eq!(table.flicker_count(), 1);
    }

    #[test]
    fn agreement_resets_the_disagreement_run() {
        let mut table = TrackTable::new();
        table.observe("cam_01", 1, 1000.0, "cust_a", Some("cust_a"));
        table.observe("cam_01", 1, 1000.1, "cust_b", None);
        table.observe("cam_01", 1, 1000.2, "cust_a", Some("cust_a"));
        table.observe("cam_01", 1, 1000.3, "cust_b", None);
        table.observe("cam_01", 1, 1000.4, "cust_b", None);
        // Never three in a row: still resolved.
        assert_eq!(
            table.touch("cam_01", 1, 1000.5).phase,
            TrackPhase::Resolved("cust_a".into())
        );
        assert_eq!(table.flicker_count(), 0);
    }

    #[test]
    fn stale_track_clears_its_ring() {
        let mut table = TrackTable::new();
        table.observe("cam_01", 1, 1000.0, "cust_a", Some("cust_a"));
        let state = table.touch("cam_01", 1, 1000.0 + 31.0);
        assert_eq!(state.phase, TrackPhase::New);
        assert!(state.ring.is_empty());
    }

    #[test]
    fn resolved_assignments_skip_stale_tracks() {
        let mut table = TrackTable::new();
        table.observe("cam_01", 1, 1000.0, "cust_a", Some("cust_a"));
        table.observe("cam_02", 5, 1020.0, "cust_b", Some("cust_b"));
        let live = table.resolved_assignments(1025.0);
        assert_eq!(live.len(), 2);
        let live = table.resolved_assignments(1040.0);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].2, "cust_b");
    }
}
