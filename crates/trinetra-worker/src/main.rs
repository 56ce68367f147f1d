//! Inference worker binary.
//!
//! Dials the backbone broker for both shared contracts, joins the
//! `inference-workers` consumer group, runs the micro-batch inference
//! loop, and serves health/metrics until interrupted. Deploy N replicas of
//! this process; the group splits the frame streams between them.
//!
//! Operators are pluggable; this binary links the deterministic stubs for
//! environments without a GPU runtime (the engine-backed operators ship
//! separately from this workspace).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trinetra_broker::{RemoteEventLog, RemoteFrameBus};
use trinetra_core::config::WorkerSettings;
use trinetra_core::stubs::{StubDetector, StubEmbedder};
use trinetra_worker::http::{self, HttpState};
use trinetra_worker::InferenceWorker;

#[derive(Parser)]
#[command(name = "trinetra-worker")]
#[command(about = "TRINETRA inference worker")]
struct Args {
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

    let settings = WorkerSettings::from_env().context("worker settings")?;
    let bus = Arc::new(RemoteFrameBus::connect(&settings.frame_bus_url));
    let log = Arc::new(RemoteEventLog::connect(&settings.event_log_bootstrap));
    info!(
        frame_bus = %bus.endpoint(),
        event_log = %log.endpoint(),
        batch_size = settings.batch_size,
        "starting inference worker"
    );

    let mut worker = InferenceWorker::new(
        bus,
        log,
        Arc::new(StubDetector::default()),
        Arc::new(StubEmbedder::new()),
        None,
        settings.clone(),
    );

    let http_state = HttpState {
        registry: worker.metrics.registry.clone(),
        healthy: worker.healthy.clone(),
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

    worker.run(stop).await;
    http.abort();
    Ok(())
}
