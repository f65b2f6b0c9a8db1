//! HeartWave - live HRV and coherence from a heart rate sensor
//!
//! # Usage
//!
//! ```bash
//! # Scan, connect to the first simulated sensor, run until Ctrl+C
//! cargo run --release
//!
//! # Connect to a known device for two minutes with 5% glitched beats
//! cargo run --release -- --device 00:1A:7D:DA:71:02 --duration 120 --glitch-rate 0.05
//! ```
//!
//! # Environment Variables
//!
//! - `HEARTWAVE_CONFIG`: Path to a TOML config file (default: ./heartwave.toml)
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_STORE`: Set to "true" to forget the stored device on startup

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use heartwave::config::{self, MonitorConfig};
use heartwave::monitor::{HeartRateMonitor, MonitorEvent, MonitorHandle};
use heartwave::storage::SledDeviceStore;
use heartwave::stream::format_duration;
use heartwave::transport::{link_channel, SimulatedSensor};
use heartwave::types::DeviceDescriptor;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "heartwave")]
#[command(about = "HeartWave heart rate variability and coherence monitor")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides HEARTWAVE_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address of the sensor to connect to
    #[arg(long, value_name = "ADDRESS")]
    device: Option<String>,

    /// Scan for sensors before connecting
    #[arg(long)]
    scan: bool,

    /// Stop after this many seconds (default: run until Ctrl+C)
    #[arg(long, value_name = "SECONDS")]
    duration: Option<u64>,

    /// Fraction of simulated beats replaced with an implausible interval
    #[arg(long, value_name = "RATE")]
    glitch_rate: Option<f64>,

    /// Forget the stored device before starting.
    /// Can also be set via RESET_STORE=true environment variable.
    #[arg(long, env = "RESET_STORE")]
    reset_store: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

// ============================================================================
// Startup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<MonitorConfig> {
    let mut cfg = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MonitorConfig::load(),
    };
    if let Some(rate) = args.glitch_rate {
        cfg.simulator.glitch_rate = rate;
        cfg.validate().context("Invalid --glitch-rate")?;
    }
    Ok(cfg)
}

fn reset_store(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        info!("Device store does not exist, nothing to reset");
        return Ok(());
    }
    warn!(path = %path.display(), "Resetting device store");
    std::fs::remove_dir_all(path)
        .with_context(|| format!("Failed to remove {}", path.display()))
}

// ============================================================================
// Session
// ============================================================================

/// Log every monitor event until the bus closes.
async fn log_events(handle: MonitorHandle) {
    let mut rx = handle.subscribe();
    loop {
        match rx.recv().await {
            Ok(MonitorEvent::NewSamples { snapshot, .. }) => {
                info!(
                    hr = format!("{:.0}", snapshot.instant_heart_rate_bpm),
                    hrv = format!("{:.1}", snapshot.instant_hrv),
                    coherence = format!("{:.0}", snapshot.instant_coherence),
                    zone = %snapshot.zone,
                    samples = snapshot.size,
                    elapsed = %format_duration(snapshot.measured_time_ms),
                    "Beat"
                );
            }
            Ok(MonitorEvent::SamplesDropped { count }) => warn!(count, "RR intervals dropped"),
            Ok(MonitorEvent::ZoneChanged { from, to }) => info!(%from, %to, "Coherence zone"),
            Ok(MonitorEvent::BatteryLevelChanged { level }) => info!(level, "Battery"),
            Ok(MonitorEvent::DeviceInfoChanged { info }) => info!(
                manufacturer = info.manufacturer_or_unknown(),
                model = info.model_or_unknown(),
                "Device information"
            ),
            Ok(MonitorEvent::Disconnected { error: Some(e) }) => warn!(error = %e, "Link lost"),
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event logger lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Scan for one period and return everything found.
async fn discover(handle: &MonitorHandle) -> Result<Vec<DeviceDescriptor>> {
    let mut rx = handle.subscribe();
    if !handle.start_scan().await? {
        anyhow::bail!("Scan could not be started");
    }
    let mut found = Vec::new();
    loop {
        match rx.recv().await {
            Ok(MonitorEvent::DeviceFound { device }) => {
                info!(device = %device, "Found");
                found.push(device);
            }
            Ok(MonitorEvent::ScanStopped) | Err(RecvError::Closed) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
    Ok(found)
}

async fn choose_device(handle: &MonitorHandle, args: &CliArgs, stored: Option<String>) -> Result<()> {
    if let Some(address) = &args.device {
        let status = handle.status().await?;
        if status.state.is_active() && status.address.as_deref() != Some(address.as_str()) {
            handle.disconnect().await?;
        }
        if !handle.status().await?.state.is_active() && !handle.connect(address.clone()).await? {
            anyhow::bail!("Could not connect to {address}");
        }
        return Ok(());
    }

    if stored.is_some() && !args.scan {
        return Ok(());
    }

    let found = discover(handle).await?;
    let first = found.first().context("No heart rate devices found")?;
    if !handle.status().await?.state.is_active() && !handle.connect(first.address.clone()).await? {
        anyhow::bail!("Could not connect to {first}");
    }
    Ok(())
}

/// Block until Ctrl+C or, when given, until `duration` seconds have passed.
async fn wait_for_end(stop: &CancellationToken, duration: Option<u64>) {
    match duration {
        Some(secs) => {
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => stop.cancelled().await,
    }
}

/// Session summary printed on exit. The monitor must still be running.
async fn session_summary(handle: &MonitorHandle, started_at: DateTime<Utc>) -> Result<serde_json::Value> {
    let snapshot = handle.snapshot().await?;
    let status = handle.status().await?;
    Ok(serde_json::json!({
        "started_at": started_at,
        "ended_at": Utc::now(),
        "device": status.address,
        "device_info": status.device,
        "last_error": status.last_error,
        "measured_time": format_duration(snapshot.measured_time_ms),
        "stream": snapshot,
    }))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json);

    let cfg = load_config(&args)?;
    config::init(cfg.clone());

    if args.reset_store {
        reset_store(&cfg.storage.path)?;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  HeartWave - HRV & Coherence Monitor");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = Arc::new(
        SledDeviceStore::open(&cfg.storage.path).context("Failed to open device store")?,
    );
    let (link_tx, link_rx) = link_channel();
    let sensor = Arc::new(SimulatedSensor::new(link_tx, cfg.simulator.clone()));
    let (monitor, handle) = HeartRateMonitor::new(sensor, link_rx, store, &cfg);

    // Ctrl+C only ends the session wait; the monitor stays up for the summary
    let stop_token = CancellationToken::new();
    let ctrl_c_token = stop_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down");
        ctrl_c_token.cancel();
    });

    let monitor_token = CancellationToken::new();
    let monitor_task = tokio::spawn(monitor.run(monitor_token.clone()));
    tokio::spawn(log_events(handle.clone()));

    let started_at = Utc::now();
    let stored = handle.initialize().await?;
    if let Some(address) = &stored {
        info!(address = %address, "Stored device found");
    }
    choose_device(&handle, &args, stored).await?;

    wait_for_end(&stop_token, args.duration).await;

    let summary = session_summary(&handle, started_at).await;
    monitor_token.cancel();
    let summary = summary?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    monitor_task.await.context("Monitor task panicked")?;
    Ok(())
}
