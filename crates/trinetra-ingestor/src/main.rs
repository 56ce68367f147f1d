//! Stream ingestor binary.
//!
//! Loads the camera table, validates it against the CIDR allowlist, dials
//! the frame bus backbone at `FRAME_BUS_URL`, spawns one supervisor per
//! camera, and serves health/metrics until interrupted.
//!
//! The camera source is pluggable behind `SourceFactory`; this binary runs
//! the synthetic source when `--synthetic` is passed (the default decoder
//! integration ships separately from this workspace).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trinetra_broker::RemoteFrameBus;
use trinetra_core::config::{CamerasFile, CidrAllowlist, IngestorSettings};
use trinetra_core::traits::SourceFactory;
use trinetra_ingestor::http::{self, HttpState};
use trinetra_ingestor::IngestorService;

#[derive(Parser)]
#[command(name = "trinetra-ingestor")]
#[command(about = "TRINETRA stream ingestor")]
struct Args {
    /// Camera table path; overrides CAMERAS_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the synthetic camera source instead of a live decoder.
    #[arg(long)]
    synthetic: bool,

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

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let settings = IngestorSettings::from_env().context("ingestor settings")?;
    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(&settings.cameras_config));

    let allowlist = CidrAllowlist::parse(&settings.cidr_allowlist).context("CIDR allowlist")?;
    let cameras = CamerasFile::load(&config_path, &allowlist)
        .with_context(|| format!("camera table {}", config_path.display()))?;

    let bus = Arc::new(RemoteFrameBus::connect(&settings.frame_bus_url));
    info!(
        frame_bus = %bus.endpoint(),
        cameras = cameras.cameras.len(),
        "starting stream ingestor"
    );

    let factory: Arc<dyn SourceFactory> = if args.synthetic {
        Arc::new(trinetra_core::stubs::SyntheticFactory::default())
    } else {
        anyhow::bail!(
            "no live decoder linked into this binary; run with --synthetic or deploy \
             with a decoder-backed source factory"
        );
    };

    let service = IngestorService::start(&cameras, factory, bus);
    let registry = service.registry.clone();
    let healthy = service.healthy.clone();

    // Shared slot so /cameras reports live supervisor state while main
    // keeps ownership for shutdown.
    let slot = Arc::new(parking_lot::Mutex::new(Some(service)));
    let http_state = HttpState {
        registry,
        healthy,
        active_cameras: {
            let slot = slot.clone();
            Arc::new(move || {
                slot.lock()
                    .as_ref()
                    .map(|s| s.active_cameras())
                    .unwrap_or_default()
            })
        },
    };
    let http = tokio::spawn(http::serve(http_state, settings.metrics_port));

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("shutdown signal received");
    let service = slot.lock().take();
    if let Some(service) = service {
        service.shutdown().await;
    }
    http.abort();
    Ok(())
}
