use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod recorder;

use config::{Backend, Bus, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

#[derive(Parser)]
#[command(name = "rollcalld", about = "Rollcall attendance recording daemon")]
struct Args {
    /// Section tag for every record written this run (overrides ROLLCALL_SECTION)
    #[arg(short, long)]
    section: Option<String>,
    /// Ledger path (overrides ROLLCALL_LEDGER_PATH)
    #[arg(long)]
    ledger: Option<PathBuf>,
    /// Ledger backend (overrides ROLLCALL_BACKEND)
    #[arg(long, value_enum)]
    backend: Option<Backend>,
    /// Publish on the system bus instead of the session bus
    #[arg(long)]
    system: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(section) = args.section {
        config.section = section;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(ledger) = args.ledger {
        config.ledger_path = ledger;
    }
    if args.system {
        config.bus = Bus::System;
    }

    tracing::info!(
        ledger = %config.ledger_path.display(),
        backend = ?config.backend,
        section = %config.section,
        bus = ?config.bus,
        "rollcalld starting"
    );

    let ledger = config
        .open_ledger()
        .with_context(|| format!("opening ledger {}", config.ledger_path.display()))?;
    let recorder = recorder::spawn_recorder(ledger, config.section.clone())
        .context("starting recorder")?;

    let builder = match config.bus {
        Bus::Session => zbus::connection::Builder::session()?,
        Bus::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, AttendanceService::new(recorder))?
        .build()
        .await
        .context("registering D-Bus service")?;

    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
