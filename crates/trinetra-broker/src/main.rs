//! Backbone broker binary.
//!
//! Owns the per-camera frame streams and the durable event log, and serves
//! both contracts over HTTP. Exactly one broker runs per deployment (it
//! holds the event log's RocksDB lock); every ingestor, worker, and
//! resolver process dials it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trinetra_broker::server::{self, BrokerState};
use trinetra_core::config::BrokerSettings;
use trinetra_eventlog::{RocksEventLog, TopicSpec};
use trinetra_framebus::MemoryFrameBus;

#[derive(Parser)]
#[command(name = "trinetra-broker")]
#[command(about = "TRINETRA backbone broker")]
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

    let settings = BrokerSettings::from_env().context("broker settings")?;
    info!(
        bind = %settings.bind,
        data_dir = %settings.event_log_data_dir,
        maxlen = settings.frame_buffer_maxlen,
        "starting backbone broker"
    );

    let bus = Arc::new(MemoryFrameBus::new(settings.frame_buffer_maxlen));
    let log = Arc::new(
        RocksEventLog::open(
            &PathBuf::from(&settings.event_log_data_dir),
            TopicSpec::standard(),
        )
        .context("event log open")?,
    );
    log.spawn_retention();

    let state = BrokerState { bus, log };
    tokio::select! {
        served = server::serve(state, &settings.bind) => {
            served.context("backbone server")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("signal handler")?;
            info!("shutdown signal received");
        }
    }
    Ok(())
}
