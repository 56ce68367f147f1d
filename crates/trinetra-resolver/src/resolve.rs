//! The per-event resolution algorithm.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, error, warn};

use trinetra_core::config::constants::resolver as tuning;
use trinetra_core::metrics::Registry;
use trinetra_core::traits::{SearchHit, SimilaritySearch};
use trinetra_core::types::{
    l2_normalize, AlertEvent, AlertKind, CameraType, Detection, DetectionEvent, IdentityEvent,
    IdentitySource, Severity, TravelTimeMatrix,
};

use crate::gate::{GateDecision, SpatiotemporalGate};
use crate::metrics::ResolverMetrics;
use crate::registry::ActiveIdentityRegistry;
use crate::tracks::TrackTable;

/// Resolution thresholds, frozen at service start.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub cosine_threshold: f32,
    pub history_threshold: f32,
    pub window_s: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cosine_threshold: tuning::COSINE_THRESHOLD,
            history_threshold: tuning::HISTORY_THRESHOLD,
            window_s: tuning::TEMPORAL_GATE_WINDOW_S,
        }
    }
}

/// Outcome of resolving one detection.
#[derive(Debug)]
pub struct Resolution {
    pub identity: IdentityEvent,
    pub alerts: Vec<AlertEvent>,
    /// The similarity backend was unreachable; the caller must withhold
    /// the offset commit so this event replays after recovery.
    pub search_unavailable: bool,
}

/// Outcome of resolving one DetectionEvent.
#[derive(Debug, Default)]
pub struct EventOutcome {
    pub resolutions: Vec<Resolution>,
    /// Alerts raised by the periodic sweeps rather than one detection.
    pub sweep_alerts: Vec<AlertEvent>,
}

/// A gate rejection that implied the same customer on two cameras at once.
#[derive(Debug, Clone)]
struct GateConflict {
    customer_id: String,
    current_camera: String,
    current_track: u32,
    current_ts: f64,
    last_camera: String,
    last_ts: f64,
}

/// Orchestrates ANN search, gating, and history confirmation.
///
/// Owned by a single consumer task; no internal locking. All time
/// arithmetic uses event timestamps, so replaying a fixed input sequence
/// reproduces the same identity events.
pub struct IdentityResolver {
    gallery: Arc<dyn SimilaritySearch>,
    gate: SpatiotemporalGate,
    travel: TravelTimeMatrix,
    registry: ActiveIdentityRegistry,
    tracks: TrackTable,
    config: ResolverConfig,
    pub metrics: ResolverMetrics,
    events_seen: u64,
    gate_conflicts: Vec<GateConflict>,
    last_registry_sweep_events: u64,
    last_registry_sweep_ts: Option<f64>,
    flicker_seen: u64,
}

impl IdentityResolver {
    pub fn new(
        gallery: Arc<dyn SimilaritySearch>,
        travel: TravelTimeMatrix,
        config: ResolverConfig,
    ) -> Self {
        let gate = SpatiotemporalGate::new(
            travel.clone(),
            config.window_s,
            tuning::TRAVEL_SAFETY_FACTOR,
        );
        Self {
            gallery,
            gate,
            travel,
            registry: ActiveIdentityRegistry::new(config.window_s),
            tracks: TrackTable::new(),
            config,
            metrics: ResolverMetrics::new(Arc::new(Registry::new())),
            events_seen: 0,
            gate_conflicts: Vec::new(),
            last_registry_sweep_events: 0,
            last_registry_sweep_ts: None,
            flicker_seen: 0,
        }
    }

    pub fn registry(&self) -> &ActiveIdentityRegistry {
        &self.registry
    }

    /// Preload a registry entry (tests and warm-start tooling).
    pub fn seed_registry(
        &mut self,
        customer_id: &str,
        camera: &str,
        ts: f64,
        embedding: Vec<f32>,
        track_id: u32,
    ) {
        self.registry.set(customer_id, camera, ts, embedding, track_id);
    }

    /// Resolve every embedded detection of one event and run the periodic
    /// sweeps.
    pub async fn resolve_event(&mut self, event: &DetectionEvent) -> EventOutcome {
        let mut outcome = EventOutcome::default();
        for detection in &event.detections {
            if let Some(embedding) = detection.embedding.clone() {
                let resolution = self.resolve_detection(event, detection, embedding).await;
                outcome.resolutions.push(resolution);
            }
        }

        self.events_seen += 1;
        let now = event.effective_ts;
        if self.events_seen % tuning::FALSE_MERGE_CHECK_EVERY == 0 {
            outcome.sweep_alerts.extend(self.false_merge_sweep(now));
        }
        self.registry_sweep_if_due(now);
        outcome
    }

    async fn resolve_detection(
        &mut self,
        event: &DetectionEvent,
        detection: &Detection,
        mut embedding: Vec<f32>,
    ) -> Resolution {
        let started = Instant::now();
        let camera_id = event.camera_id.as_str();
        let track_id = detection.track_id.unwrap_or(0);
        let ts = event.effective_ts;
        let billing = event.camera_type == CameraType::Billing;

        let mut alerts = Vec::new();

        if !detection.embedding_is_unit_norm() {
            warn!(camera_id, track_id, "non-unit embedding on the wire; renormalizing");
            l2_normalize(&mut embedding);
            alerts.push(
                AlertEvent::new(AlertKind::DriftWarning, Severity::Low, camera_id, ts)
                    .with_detail("reason", json!("non_unit_embedding"))
                    .with_detail("track_id", json!(track_id)),
            );
        }

        // 1. ANN lookup, search effort raised for billing cameras.
        let ef = if billing {
            tuning::EF_BILLING
        } else {
            tuning::EF_DEFAULT
        };
        let ann_started = Instant::now();
        let search = tokio::time::timeout(
            Duration::from_millis(500),
            self.gallery.top_k(&embedding, tuning::TOP_K, ef),
        )
        .await;
        self.metrics
            .ann_latency
            .observe(ann_started.elapsed().as_secs_f64());

        let hits: Vec<SearchHit> = match search {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                error!(camera_id, error = %e, "similarity search unavailable");
                return self.unavailable_resolution(
                    camera_id, track_id, ts, billing, alerts, started,
                );
            }
            Err(_) => {
                error!(camera_id, "similarity search timed out");
                return self.unavailable_resolution(
                    camera_id, track_id, ts, billing, alerts, started,
                );
            }
        };

        // 2. Threshold filter.
        let candidates: Vec<&SearchHit> = hits
            .iter()
            .filter(|h| h.score >= self.config.cosine_threshold)
            .collect();

        if candidates.is_empty() {
            self.tracks.touch(camera_id, track_id, ts);
            return self.unknown_resolution(
                camera_id,
                track_id,
                ts,
                billing,
                IdentitySource::InsufficientHistory,
                alerts,
                started,
            );
        }

        // 3. Spatiotemporal gate per candidate.
        let mut survivors: Vec<&SearchHit> = Vec::new();
        for hit in candidates {
            let last_seen = self.registry.last_seen(&hit.customer_id, ts);
            match self.gate.evaluate(last_seen.as_ref(), camera_id, ts) {
                GateDecision::Accept => survivors.push(hit),
                GateDecision::AcceptExpired => {
                    // Lazy eviction: the session window passed, treat the
                    // candidate as a fresh entry.
                    self.registry.evict(&hit.customer_id);
                    survivors.push(hit);
                }
                GateDecision::RejectImpossible => {
                    self.metrics.gate_rejections("impossible_transition").inc();
                    if let Some(last) = last_seen {
                        debug!(
                            customer_id = %hit.customer_id,
                            from = %last.camera,
                            to = camera_id,
                            elapsed = ts - last.ts,
                            "gate rejected impossible transition"
                        );
                        self.gate_conflicts.push(GateConflict {
                            customer_id: hit.customer_id.clone(),
                            current_camera: camera_id.to_string(),
                            current_track: track_id,
                            current_ts: ts,
                            last_camera: last.camera,
                            last_ts: last.ts,
                        });
                    }
                }
            }
        }

        // 4. Pick the top survivor.
        let Some(top) = survivors
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
        else {
            self.tracks.touch(camera_id, track_id, ts);
            return self.unknown_resolution(
                camera_id,
                track_id,
                ts,
                billing,
                IdentitySource::GatedUnknown,
                alerts,
                started,
            );
        };
        let top = top.clone();

        // 5. History confirmation.
        let confirmed = {
            let state = self.tracks.touch(camera_id, track_id, ts);
            state.ring.push(&top.customer_id, top.score);
            state.ring.confirmed(self.config.history_threshold)
        };

        let resolution = match confirmed {
            Some(vote) => {
                self.tracks
                    .observe(camera_id, track_id, ts, &top.customer_id, Some(&vote.customer_id));

                // 6. Registry update plus drift-gated gallery EMA.
                self.registry.set(
                    &vote.customer_id,
                    camera_id,
                    ts,
                    embedding.clone(),
                    track_id,
                );
                self.metrics
                    .active_identities
                    .set(self.registry.len() as f64);
                if top.customer_id == vote.customer_id && top.score >= tuning::EMA_MIN_SCORE {
                    self.apply_gallery_ema(&vote.customer_id, &embedding).await;
                }

                self.metrics.matches(camera_id).inc();

                // 7. VIP trigger.
                if top.customer_id == vote.customer_id && top.payload.vip {
                    self.metrics.alerts(AlertKind::VipDetected.as_str()).inc();
                    alerts.push(
                        AlertEvent::new(AlertKind::VipDetected, Severity::Low, camera_id, ts)
                            .with_customer(&vote.customer_id)
                            .with_detail("score", json!(top.score)),
                    );
                }

                Resolution {
                    identity: IdentityEvent {
                        camera_id: camera_id.to_string(),
                        track_id,
                        effective_ts: ts,
                        customer_id: vote.customer_id.clone(),
                        confidence: vote.avg_score.clamp(0.0, 1.0),
                        source: IdentitySource::Matched,
                    },
                    alerts,
                    search_unavailable: false,
                }
            }
            None => {
                self.tracks
                    .observe(camera_id, track_id, ts, &top.customer_id, None);
                return self.unknown_resolution(
                    camera_id,
                    track_id,
                    ts,
                    billing,
                    IdentitySource::InsufficientHistory,
                    alerts,
                    started,
                );
            }
        };

        self.sync_flicker_metric();
        self.metrics
            .reid_latency
            .observe(started.elapsed().as_secs_f64());
        resolution
    }

    fn unavailable_resolution(
        &mut self,
        camera_id: &str,
        track_id: u32,
        ts: f64,
        billing: bool,
        mut alerts: Vec<AlertEvent>,
        started: Instant,
    ) -> Resolution {
        self.metrics.unknowns(camera_id).inc();
        if billing {
            alerts.push(self.billing_alert(camera_id, track_id, ts));
        }
        self.metrics
            .reid_latency
            .observe(started.elapsed().as_secs_f64());
        Resolution {
            identity: IdentityEvent::unknown(
                camera_id,
                track_id,
                ts,
                IdentitySource::QdrantUnavailable,
            ),
            alerts,
            search_unavailable: true,
        }
    }

    fn unknown_resolution(
        &mut self,
        camera_id: &str,
        track_id: u32,
        ts: f64,
        billing: bool,
        source: IdentitySource,
        mut alerts: Vec<AlertEvent>,
        started: Instant,
    ) -> Resolution {
        self.metrics.unknowns(camera_id).inc();
        if billing {
            alerts.push(self.billing_alert(camera_id, track_id, ts));
        }
        self.sync_flicker_metric();
        self.metrics
            .reid_latency
            .observe(started.elapsed().as_secs_f64());
        Resolution {
            identity: IdentityEvent::unknown(camera_id, track_id, ts, source),
            alerts,
            search_unavailable: false,
        }
    }

    fn billing_alert(&self, camera_id: &str, track_id: u32, ts: f64) -> AlertEvent {
        self.metrics
            .alerts(AlertKind::UnknownAtBilling.as_str())
            .inc();
        AlertEvent::new(AlertKind::UnknownAtBilling, Severity::Medium, camera_id, ts)
            .with_detail("track_id", json!(track_id))
    }

    /// Drift-gated gallery refresh: only scores at or above the strict
    /// threshold feed the stored embedding, preventing the update loop
    /// from amplifying its own matches.
    async fn apply_gallery_ema(&self, customer_id: &str, current: &[f32]) {
        match self.gallery.fetch(customer_id).await {
            Ok(Some((old, payload))) => {
                let alpha = tuning::EMA_ALPHA;
                let mut updated: Vec<f32> = old
                    .iter()
                    .zip(current)
                    .map(|(o, c)| (1.0 - alpha) * o + alpha * c)
                    .collect();
                l2_normalize(&mut updated);
                if let Err(e) = self.gallery.upsert(customer_id, &updated, payload).await {
                    warn!(customer_id, error = %e, "gallery EMA update failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(customer_id, error = %e, "gallery fetch for EMA failed"),
        }
    }

    /// Reverse-index check for one customer on two cameras at once.
    ///
    /// Two evidence sources: gate rejections recorded since the last sweep
    /// (a high-cosine candidate contradicted the registry), and resolved
    /// tracks on different cameras closer in time than the floor plan
    /// allows.
    fn false_merge_sweep(&mut self, now: f64) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();
        let mut flagged: HashSet<String> = HashSet::new();

        for conflict in std::mem::take(&mut self.gate_conflicts) {
            if !flagged.insert(conflict.customer_id.clone()) {
                continue;
            }
            self.metrics
                .alerts(AlertKind::FalseMergeSuspect.as_str())
                .inc();
            alerts.push(
                AlertEvent::new(
                    AlertKind::FalseMergeSuspect,
                    Severity::High,
                    &conflict.current_camera,
                    now,
                )
                .with_customer(&conflict.customer_id)
                .with_detail("track_id", json!(conflict.current_track))
                .with_detail("last_camera", json!(conflict.last_camera))
                .with_detail(
                    "elapsed_s",
                    json!(conflict.current_ts - conflict.last_ts),
                ),
            );
        }

        let mut by_customer: HashMap<String, Vec<(String, u32, f64)>> = HashMap::new();
        for (camera, track, customer, last_ts) in self.tracks.resolved_assignments(now) {
            by_customer
                .entry(customer)
                .or_default()
                .push((camera, track, last_ts));
        }
        for (customer, assignments) in by_customer {
            if flagged.contains(&customer) {
                continue;
            }
            for i in 0..assignments.len() {
                for j in (i + 1)..assignments.len() {
                    let (cam_a, _, ts_a) = &assignments[i];
                    let (cam_b, track_b, ts_b) = &assignments[j];
                    if cam_a == cam_b {
                        continue;
                    }
                    let elapsed = (ts_a - ts_b).abs();
                    let bound =
                        self.travel.min_travel(cam_a, cam_b) * tuning::TRAVEL_SAFETY_FACTOR;
                    if elapsed < bound {
                        self.metrics
                            .alerts(AlertKind::FalseMergeSuspect.as_str())
                            .inc();
                        alerts.push(
                            AlertEvent::new(
                                AlertKind::FalseMergeSuspect,
                                Severity::High,
                                cam_b,
                                now,
                            )
                            .with_customer(&customer)
                            .with_detail("track_id", json!(track_b))
                            .with_detail("other_camera", json!(cam_a))
                            .with_detail("elapsed_s", json!(elapsed)),
                        );
                        flagged.insert(customer.clone());
                    }
                }
                if flagged.contains(&customer) {
                    break;
                }
            }
        }
        alerts
    }

    /// Registry sweep: every 1000 events or 60 s of event time, whichever
    /// comes first.
    fn registry_sweep_if_due(&mut self, now: f64) {
        let events_due =
            self.events_seen - self.last_registry_sweep_events >= tuning::SWEEP_EVERY_EVENTS;
        let time_due = match self.last_registry_sweep_ts {
            Some(last) => now - last >= tuning::SWEEP_EVERY_S as f64,
            None => false,
        };
        if self.last_registry_sweep_ts.is_none() {
            self.last_registry_sweep_ts = Some(now);
        }
        if !(events_due || time_due) {
            return;
        }
        let removed = self.registry.sweep_expired(now);
        self.tracks.sweep(now);
        if removed > 0 {
            debug!(removed, "registry sweep evicted expired identities");
        }
        self.metrics
            .active_identities
            .set(self.registry.len() as f64);
        self.last_registry_sweep_events = self.events_seen;
        self.last_registry_sweep_ts = Some(now);
    }

    fn sync_flicker_metric(&mut self) {
        let total = self.tracks.flicker_count();
        if total > self.flicker_seen {
            self.metrics.identity_flicker.inc_by(total - self.flicker_seen);
            self.flicker_seen = total;
        }
    }
}
