//! End-to-end resolver scenarios: clean match confirmation, gate
//! rejection, backend outage replay, false-merge detection, EMA gating.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use trinetra_core::config::ResolverSettings;
use trinetra_core::stubs::MemoryGallery;
use trinetra_core::traits::{EventLog, GalleryPayload};
use trinetra_core::types::{
    AlertKind, CameraType, Detection, DetectionEvent, IdentityEvent, IdentitySource,
    TravelTimeMatrix, EMBEDDING_DIM, UNKNOWN_CUSTOMER,
};
use trinetra_eventlog::{RocksEventLog, TopicSpec};

use crate::resolve::{IdentityResolver, ResolverConfig};
use crate::service::ResolverService;

fn basis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[i] = 1.0;
    v
}

/// Unit vector at angle `cos` to basis(0), leaked into basis(1).
fn mixed(cos: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = cos;
    v[1] = (1.0 - cos * cos).sqrt();
    v
}

fn travel() -> TravelTimeMatrix {
    let mut m = TravelTimeMatrix::new();
    m.insert("cam_entrance_01", "cam_billing_01", 25.0);
    m.insert("cam_billing_01", "cam_entrance_01", 25.0);
    m
}

fn detection(track: u32, embedding: Vec<f32>) -> Detection {
    Detection {
        bbox: [100.0, 100.0, 200.0, 400.0],
        conf: 0.9,
        track_id: Some(track),
        embedding: Some(embedding),
    }
}

fn event(
    camera: &str,
    camera_type: CameraType,
    frame: u64,
    ts: f64,
    detections: Vec<Detection>,
) -> DetectionEvent {
    DetectionEvent {
        camera_id: camera.into(),
        camera_type,
        frame_index: frame,
        effective_ts: ts,
        detections,
    }
}

fn resolver_on(gallery: Arc<MemoryGallery>) -> IdentityResolver {
    IdentityResolver::new(gallery, travel(), ResolverConfig::default())
}

fn enrolled_gallery(entries: &[(&str, Vec<f32>, bool)]) -> Arc<MemoryGallery> {
    let gallery = Arc::new(MemoryGallery::new());
    for (id, vector, vip) in entries {
        gallery.insert(
            id,
            vector.clone(),
            GalleryPayload {
                vip: *vip,
                metadata: Default::default(),
            },
        );
    }
    gallery
}

// ---------------------------------------------------------------------------
// Clean match: five agreeing events confirm on the fifth.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_confirms_on_the_fifth_agreeing_event() {
    let gallery = enrolled_gallery(&[("cust_a", basis(0), false)]);
    let mut resolver = resolver_on(gallery);

    let mut identities: Vec<IdentityEvent> = Vec::new();
    for i in 0..5u64 {
        let e = event(
            "cam_entrance_01",
            CameraType::Entrance,
            i,
            1000.0 + i as f64 * 0.1,
            vec![detection(1, basis(0))],
        );
        let outcome = resolver.resolve_event(&e).await;
        identities.extend(outcome.resolutions.into_iter().map(|r| r.identity));
    }

    assert_eq!(identities.len(), 5);
    for early in &identities[..4] {
        assert_eq!(early.customer_id, UNKNOWN_CUSTOMER);
        assert_eq!(early.source, IdentitySource::InsufficientHistory);
    }
    let fifth = &identities[4];
    assert_eq!(fifth.source, IdentitySource::Matched);
    assert_eq!(fifth.customer_id, "cust_a");
    assert!(fifth.confidence >= 0.99);

    // The registry now carries the confirmed sighting.
    assert_eq!(resolver.registry().get("cust_a").unwrap().camera, "cam_entrance_01");
}

// ---------------------------------------------------------------------------
// Gate rejection: a billing sighting ten seconds ago vetoes an entrance
// match that would need twenty-five.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn impossible_transition_is_gated() {
    let gallery = enrolled_gallery(&[("cust_b", basis(1), false)]);
    let mut resolver = resolver_on(gallery);
    resolver.seed_registry("cust_b", "cam_billing_01", 1500.0, basis(1), 4);

    let e = event(
        "cam_entrance_01",
        CameraType::Entrance,
        0,
        1510.0,
        vec![detection(7, basis(1))],
    );
    let outcome = resolver.resolve_event(&e).await;

    let identity = &outcome.resolutions[0].identity;
    assert_eq!(identity.source, IdentitySource::GatedUnknown);
    assert_eq!(identity.customer_id, UNKNOWN_CUSTOMER);
    assert_eq!(
        resolver.metrics.gate_rejections("impossible_transition").get(),
        1
    );
}

// ---------------------------------------------------------------------------
// Unknown at billing raises an alert; matched VIP raises another.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_at_billing_raises_alert() {
    let gallery = enrolled_gallery(&[]);
    let mut resolver = resolver_on(gallery);

    let e = event(
        "cam_billing_01",
        CameraType::Billing,
        0,
        1000.0,
        vec![detection(1, basis(0))],
    );
    let outcome = resolver.resolve_event(&e).await;
    let resolution = &outcome.resolutions[0];
    assert_eq!(resolution.identity.source, IdentitySource::InsufficientHistory);
    assert_eq!(resolution.alerts.len(), 1);
    assert_eq!(resolution.alerts[0].kind, AlertKind::UnknownAtBilling);
}

#[tokio::test]
async fn vip_match_raises_alert_on_confirmation() {
    let gallery = enrolled_gallery(&[("cust_vip", basis(3), true)]);
    let mut resolver = resolver_on(gallery);

    let mut all_alerts = Vec::new();
    for i in 0..5u64 {
        let e = event(
            "cam_entrance_01",
            CameraType::Entrance,
            i,
            1000.0 + i as f64 * 0.1,
            vec![detection(2, basis(3))],
        );
        let outcome = resolver.resolve_event(&e).await;
        for r in outcome.resolutions {
            all_alerts.extend(r.alerts);
        }
    }
    let vip: Vec<_> = all_alerts
        .iter()
        .filter(|a| a.kind == AlertKind::VipDetected)
        .collect();
    assert_eq!(vip.len(), 1, "VIP fires once, on the confirming event");
    assert_eq!(vip[0].customer_id.as_deref(), Some("cust_vip"));
}

// ---------------------------------------------------------------------------
// False merge: gate conflict surfaces on the periodic sweep.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn false_merge_suspect_emitted_by_sweep() {
    let gallery = enrolled_gallery(&[("cust_z", basis(2), false)]);
    let mut resolver = resolver_on(gallery);
    resolver.seed_registry("cust_z", "cam_entrance_01", 2000.0, basis(2), 1);

    // A different track at billing matches cust_z one second later.
    let e = event(
        "cam_billing_01",
        CameraType::Billing,
        0,
        2001.0,
        vec![detection(9, basis(2))],
    );
    let outcome = resolver.resolve_event(&e).await;
    assert_eq!(
        outcome.resolutions[0].identity.source,
        IdentitySource::GatedUnknown
    );

    // Drive the event counter to the sweep boundary.
    let mut sweep_alerts = Vec::new();
    for i in 1..100u64 {
        let filler = event(
            "cam_tracking_01",
            CameraType::Tracking,
            i,
            2001.0 + i as f64,
            vec![],
        );
        let outcome = resolver.resolve_event(&filler).await;
        sweep_alerts.extend(outcome.sweep_alerts);
    }

    let suspects: Vec<_> = sweep_alerts
        .iter()
        .filter(|a| a.kind == AlertKind::FalseMergeSuspect)
        .collect();
    assert_eq!(suspects.len(), 1);
    assert_eq!(suspects[0].customer_id.as_deref(), Some("cust_z"));
}

// ---------------------------------------------------------------------------
// Gallery EMA: strict score gate controls the write-back.
// ---------------------------------------------------------------------------

async fn confirm_with_score(cos: f32) -> (Arc<MemoryGallery>, IdentityEvent) {
    let gallery = enrolled_gallery(&[("cust_a", basis(0), false)]);
    let mut resolver = resolver_on(gallery.clone());
    let mut last = None;
    for i in 0..5u64 {
        let e = event(
            "cam_entrance_01",
            CameraType::Entrance,
            i,
            1000.0 + i as f64 * 0.1,
            vec![detection(1, mixed(cos))],
        );
        let outcome = resolver.resolve_event(&e).await;
        last = outcome.resolutions.into_iter().next().map(|r| r.identity);
    }
    (gallery, last.unwrap())
}

#[tokio::test]
async fn high_score_match_applies_ema_and_renormalizes() {
    let (gallery, fifth) = confirm_with_score(0.95).await;
    assert_eq!(fifth.source, IdentitySource::Matched);

    let (stored, _) = gallery.fetch("cust_a").await.unwrap().unwrap();
    assert!(
        stored[1] > 0.0,
        "the stored vector must drift toward the observed embedding"
    );
    let norm: f32 = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn moderate_score_match_leaves_gallery_untouched() {
    let (gallery, fifth) = confirm_with_score(0.80).await;
    assert_eq!(fifth.source, IdentitySource::Matched);

    let (stored, _) = gallery.fetch("cust_a").await.unwrap().unwrap();
    assert_eq!(stored, basis(0), "scores under the EMA gate must not write back");
}

// ---------------------------------------------------------------------------
// Determinism: replaying the same inputs reproduces the same identities.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replay_is_deterministic() {
    let inputs: Vec<DetectionEvent> = (0..6u64)
        .map(|i| {
            event(
                "cam_entrance_01",
                CameraType::Entrance,
                i,
                1000.0 + i as f64 * 0.1,
                vec![detection(1, basis(0))],
            )
        })
        .collect();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let gallery = enrolled_gallery(&[("cust_a", basis(0), false)]);
        let mut resolver = resolver_on(gallery);
        let mut identities = Vec::new();
        for e in &inputs {
            let outcome = resolver.resolve_event(e).await;
            identities.extend(outcome.resolutions.into_iter().map(|r| r.identity));
        }
        runs.push(identities);
    }
    assert_eq!(runs[0], runs[1]);
}

// ---------------------------------------------------------------------------
// Backend outage: UNKNOWN events flow, offsets hold, recovery replays.
// ---------------------------------------------------------------------------

fn service_settings() -> ResolverSettings {
    ResolverSettings {
        event_log_bootstrap: "127.0.0.1:7171".into(),
        sim_search_url: "http://localhost:6333".into(),
        consumer_group: "identity-resolvers".into(),
        cosine_threshold: 0.72,
        history_threshold: 0.74,
        temporal_gate_window_s: 3600.0,
        max_uncommitted_events: 0,
        lag_alert_threshold: 5000,
        metrics_port: 0,
    }
}

async fn publish_detection(log: &RocksEventLog, frame: u64, ts: f64) {
    let e = event(
        "cam_entrance_01",
        CameraType::Entrance,
        frame,
        ts,
        vec![detection(1, basis(0))],
    );
    log.publish("detections", &e.camera_id, serde_json::to_vec(&e).unwrap())
        .await
        .unwrap();
}

async fn read_identities(log: &RocksEventLog) -> Vec<IdentityEvent> {
    log.consume(
        "identity-observer",
        &["identities".to_string()],
        1000,
        Duration::ZERO,
    )
    .await
    .unwrap()
    .iter()
    .map(|r| serde_json::from_slice(&r.payload).unwrap())
    .collect()
}

#[tokio::test]
async fn outage_withholds_commits_and_recovery_replays() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(RocksEventLog::open(dir.path(), TopicSpec::standard()).unwrap());
    let gallery = enrolled_gallery(&[("cust_a", basis(0), false)]);

    let mut service = ResolverService::new(
        log.clone(),
        gallery.clone(),
        travel(),
        service_settings(),
    );

    for i in 0..3u64 {
        publish_detection(&log, i, 1000.0 + i as f64 * 0.1).await;
    }

    // Outage: every event resolves to UNKNOWN, offsets stay put.
    gallery.set_available(false);
    service.poll_once().await.unwrap();

    let during = read_identities(&log).await;
    assert_eq!(during.len(), 3);
    assert!(during
        .iter()
        .all(|i| i.source == IdentitySource::QdrantUnavailable));
    assert_eq!(log.lag("identity-resolvers", "detections").await.unwrap(), 3);

    // Recovery: the next healthy record triggers a rewind, the withheld
    // window replays, and offsets advance.
    gallery.set_available(true);
    publish_detection(&log, 3, 1000.3).await;
    service.poll_once().await.unwrap(); // processes record 4, seeks back
    service.poll_once().await.unwrap(); // replays records 1..4, commits

    assert_eq!(log.lag("identity-resolvers", "detections").await.unwrap(), 0);

    let after = read_identities(&log).await;
    // 1 from the healthy record pre-seek + 4 replayed.
    assert_eq!(after.len(), 5);
    assert!(after.iter().all(|i| i.source != IdentitySource::QdrantUnavailable));
    let matched: Vec<_> = after
        .iter()
        .filter(|i| i.source == IdentitySource::Matched)
        .collect();
    assert_eq!(matched.len(), 1, "the fifth ring entry confirms on replay");
    assert_eq!(matched[0].customer_id, "cust_a");
}

#[tokio::test]
async fn malformed_event_is_skipped_and_committed() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(RocksEventLog::open(dir.path(), TopicSpec::standard()).unwrap());
    let gallery = enrolled_gallery(&[]);

    let mut service =
        ResolverService::new(log.clone(), gallery, travel(), service_settings());

    log.publish("detections", "cam_01", b"{not json".to_vec())
        .await
        .unwrap();
    service.poll_once().await.unwrap();

    assert_eq!(log.lag("identity-resolvers", "detections").await.unwrap(), 0);
    assert_eq!(service.resolver().metrics.deserialization_errors.get(), 1);
    assert!(read_identities(&log).await.is_empty());
}
