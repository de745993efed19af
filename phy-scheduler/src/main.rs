/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use phy_scheduler::config::SchedulerConfig;
use phy_scheduler::radio::LoopbackRadio;
use phy_scheduler::record::{HandleRange, Interval, OpCompletion, Priority, ReceivedData, RxMode};
use phy_scheduler::scheduler::{Notification, Scheduler};
use phy_scheduler::time::{Clock, RadioClock, TimeBase};

const BEACON_HANDLE: u32 = 1;
const BEACON_HANDLE_LAST: u32 = 999;
const RX_HANDLE: u32 = 1_000;
const BEACON_PAYLOAD: &[u8] = b"NR+ BEACON";

// ── CLI argument definition ───────────────────────────────────────────────────

/// Radio operation scheduler driven against an in-process loopback radio.
///
/// Example:
///   phy-scheduler --config scheduler.yaml --run-ms 2000 \
///                 --beacon-interval-ms 100 --beacons 10
#[derive(Debug, Parser)]
#[command(
    name = "phy-scheduler",
    about = "Time-slotted radio operation scheduler – loopback demo",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scheduler configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// How long to run before shutting down, in milliseconds.
    #[arg(short = 'r', long = "run-ms", default_value_t = 2_000)]
    run_ms: u64,

    /// Beacon period in milliseconds.
    #[arg(short = 'i', long = "beacon-interval-ms", default_value_t = 100)]
    beacon_interval_ms: u64,

    /// Number of beacons to send (-1 = until shutdown).
    #[arg(short = 'b', long = "beacons", default_value_t = 10, allow_negative_numbers = true)]
    beacons: i32,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(
        config             = ?cli.config,
        run_ms             = cli.run_ms,
        beacon_interval_ms = cli.beacon_interval_ms,
        beacons            = cli.beacons,
        "Configuration"
    );

    if let Err(e) = run(cli).await {
        error!("phy-scheduler failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Load scheduler configuration ──────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => SchedulerConfig::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using default scheduler settings");
            SchedulerConfig::default()
        }
    };

    // ── Wire scheduler, worker and loopback radio ─────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(RadioClock::new(config.time_base.tick_rate_khz));

    let (radio, link) = LoopbackRadio::new(TimeBase::from_config(&config.time_base));
    let (scheduler, dispatcher) = Scheduler::new(&config, radio, Arc::clone(&clock));
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();

    tokio::spawn(dispatcher.with_notifications(notify_tx).run());
    tokio::spawn(link.run(scheduler.clone(), Arc::clone(&clock)));
    tokio::spawn(async move {
        while let Some(n) = notify_rx.recv().await {
            match n {
                Notification::OperationSubmitFailed { handle, status, time } => {
                    warn!(handle, ?status, time, "operation not submitted")
                }
                other => info!(notification = ?other, "scheduler notification"),
            }
        }
    });

    let tb = scheduler.time_base();
    let first_frame = (clock.now() / tb.frame_ticks() + 2) * tb.frame_ticks();

    // ── Continuous receive over the whole run ─────────────────────────────────
    // Inserted first: the beacons have the higher priority and win the overlap.
    let mut rx = scheduler.allocate_receive();
    rx.handle = RX_HANDLE;
    rx.frame_time = first_frame;
    rx.duration_override = Some(tb.ms_to_ticks(cli.run_ms));
    rx.silent = true;
    if let Some(params) = rx.rx_mut() {
        params.mode = RxMode::Continuous;
        params.expected_rssi_level_dbm = -60;
    }
    rx.callbacks.on_data_received = Some(Arc::new(|data: &ReceivedData| {
        info!(
            time = data.time,
            rssi_dbm = data.rssi_dbm,
            payload = %String::from_utf8_lossy(&data.data),
            "data received"
        );
    }));
    rx.callbacks.on_completion = Some(Arc::new(|done: &OpCompletion, _: u64| {
        info!(handle = done.handle, status = ?done.status, "receive window closed");
    }));
    scheduler
        .insert(rx)
        .context("Cannot schedule continuous receive")?;

    // ── Periodic beacon ───────────────────────────────────────────────────────
    let mut beacon = scheduler
        .allocate_transmit(BEACON_PAYLOAD.len())
        .context("Cannot allocate beacon")?;
    beacon.handle = BEACON_HANDLE;
    beacon.handle_range = Some(HandleRange::new(BEACON_HANDLE, BEACON_HANDLE_LAST));
    beacon.priority = Priority::HighTx;
    beacon.silent = true;
    beacon.frame_time = first_frame;
    beacon.interval = Interval::from_count(tb.ms_to_ticks(cli.beacon_interval_ms), cli.beacons);
    if let Some(tx) = beacon.tx_mut() {
        tx.payload.copy_from_slice(BEACON_PAYLOAD);
    }
    beacon.callbacks.on_submit = Some(Arc::new(|report: &OpCompletion, frame_time: u64| {
        info!(handle = report.handle, status = ?report.status, frame_time, "beacon submitted");
    }));
    beacon.callbacks.on_completion = Some(Arc::new(|done: &OpCompletion, _: u64| {
        info!(handle = done.handle, temperature = ?done.temperature, "beacon sent");
    }));
    beacon.callbacks.on_completion_final = Some(Arc::new(|handle: u32| {
        info!(handle, "beacon series finished");
    }));
    scheduler.insert(beacon).context("Cannot schedule beacon")?;

    // ── Run, then report and reset ────────────────────────────────────────────
    tokio::time::sleep(Duration::from_millis(cli.run_ms)).await;

    let status = scheduler.status().await?;
    info!(
        state     = ?status.state,
        pending   = status.pending,
        in_flight = status.in_flight,
        "Scheduler status"
    );
    scheduler.purge_all()?;
    let status = scheduler.status().await?;
    info!(pending = status.pending, in_flight = status.in_flight, "Scheduler purged");

    Ok(())
}
