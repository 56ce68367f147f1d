//! Identity resolver binary.
//!
//! Dials the backbone broker for the event log, joins the detections
//! consumer group, resolves identities against the in-process HNSW
//! gallery, and serves health/metrics until interrupted. Deploy up to one
//! replica per detections partition; the group splits partitions between
//! them.
//!
//! The gallery starts empty unless an enrollment file is supplied; the
//! camera table provides the travel-time matrix.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trinetra_broker::RemoteEventLog;
use trinetra_core::config::{CamerasFile, CidrAllowlist, IngestorSettings, ResolverSettings};
use trinetra_core::traits::{GalleryPayload, SimilaritySearch};
use trinetra_core::types::TravelTimeMatrix;
use trinetra_resolver::gallery::HnswGallery;
use trinetra_resolver::http::{self, HttpState};
use trinetra_resolver::ResolverService;

#[derive(Parser)]
#[command(name = "trinetra-resolver")]
#[command(about = "TRINETRA identity resolver")]
struct Args {
    /// Camera table path (for the travel-time matrix); overrides
    /// CAMERAS_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON enrollment file: `{ "customer_id": {"embedding": [...],
    /// "vip": bool}, ... }`.
    #[arg(long)]
    gallery: Option<PathBuf>,

    /// Verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}

#[derive(serde::Deserialize)]
struct EnrollmentEntry {
    embedding: Vec<f32>,
    #[serde(default)]
    vip: bool,
}

async fn load_gallery(path: &PathBuf, gallery: &HnswGallery) -> Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("enrollment file {}", path.display()))?;
    let entries: std::collections::HashMap<String, EnrollmentEntry> =
        serde_json::from_str(&raw).context("enrollment parse")?;
    let count = entries.len();
    for (customer_id, entry) in entries {
        gallery
            .upsert(
                &customer_id,
                &entry.embedding,
                GalleryPayload {
                    vip: entry.vip,
                    metadata: Default::default(),
                },
            )
            .await
            .with_context(|| format!("enrolling {customer_id}"))?;
    }
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let settings = ResolverSettings::from_env().context("resolver settings")?;
    let log = Arc::new(RemoteEventLog::connect(&settings.event_log_bootstrap));
    info!(
        event_log = %log.endpoint(),
        sim_search = %settings.sim_search_url,
        group = %settings.consumer_group,
        "starting identity resolver"
    );

    // The travel-time matrix rides in the shared camera table.
    let travel = {
        let ingest = IngestorSettings::from_env().context("camera table settings")?;
        let path = args
            .config
            .unwrap_or_else(|| PathBuf::from(&ingest.cameras_config));
        match CidrAllowlist::parse(&ingest.cidr_allowlist)
            .and_then(|allow| CamerasFile::load(&path, &allow))
        {
            Ok(file) => file.travel_times,
            Err(e) => {
                warn!(error = %e, "camera table unavailable; using default travel times");
                TravelTimeMatrix::new()
            }
        }
    };

    let gallery = Arc::new(HnswGallery::new());
    if let Some(path) = &args.gallery {
        let enrolled = load_gallery(path, &gallery).await?;
        info!(enrolled, "gallery enrollment loaded");
    }

    let mut service = ResolverService::new(log, gallery, travel, settings.clone());

    let http_state = HttpState {
        registry: service.resolver().metrics.registry.clone(),
        healthy: service.healthy.clone(),
    };
    let http = tokio::spawn(http::serve(http_state, settings.metrics_port));

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    let result = service.run(stop).await;
    http.abort();
    result.context("resolver loop")
}
