//! Parkgate - vehicle access control for a parking facility
//!
//! Ingests OCR plate candidates per lane, resolves them by majority
//! vote, decides entry/exit against the session ledger, settles fees
//! from the payment terminal, and drives the barrier boards over serial.
//!
//! Module structure:
//! - `domain/` - Core business types (Plate, ParkingSession, Alert)
//! - `io/` - External interfaces (serial link, vision feed, egress)
//! - `services/` - Decision logic (entry, exit, settlement, gate)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use parkgate::infra::{Config, Metrics};
use parkgate::io::egress::Egress;
use parkgate::io::{start_vision_listener, SerialLink, VisionListenerConfig};
use parkgate::ledger::{Ledger, MemoryLedger};
use parkgate::services::{create_gate_worker, EntryEngine, ExitEngine, SettlementEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parkgate - automated parking gate control
#[derive(Parser, Debug)]
#[command(name = "parkgate", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "parkgate starting"
    );

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        plate_marker = %config.plate_marker(),
        vote_quorum = %config.vote_quorum(),
        entry_vision_port = %config.entry_vision_port(),
        exit_vision_port = %config.exit_vision_port(),
        rate_per_hour = %config.rate_per_hour(),
        gate_dwell_secs = %config.gate_dwell_secs(),
        egress_file = %config.egress_file(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared components
    let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
    let metrics = Arc::new(Metrics::new());
    let egress = Arc::new(Egress::new(config.egress_file()));

    let dwell = Duration::from_secs(config.gate_dwell_secs());
    let tick = Duration::from_millis(config.gate_tick_ms());

    // --- Entry lane ---
    if config.entry_enabled() {
        let (link_tx, link_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(1000);

        let link = SerialLink::new(config.entry_serial_device(), config.entry_serial_baud());
        let link_events = event_tx.clone();
        let link_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            link.run(link_rx, link_events, link_shutdown).await;
        });

        let (gate_tx, gate_worker) = create_gate_worker(link_tx, dwell, tick, 32);
        tokio::spawn(gate_worker.run());

        let vision_config = VisionListenerConfig {
            port: config.entry_vision_port(),
            enabled: true,
        };
        let vision_events = event_tx;
        let vision_metrics = metrics.clone();
        let vision_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                start_vision_listener(vision_config, vision_events, vision_metrics, vision_shutdown)
                    .await
            {
                tracing::error!(error = %e, "entry vision listener error");
            }
        });

        let mut engine = EntryEngine::new(&config, ledger.clone(), gate_tx, metrics.clone())
            .with_egress(egress.clone());
        tokio::spawn(async move {
            engine.run(event_rx).await;
        });
    }

    // --- Exit lane ---
    if config.exit_enabled() {
        let (link_tx, link_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(1000);

        // The exit board's companion reader reports plates on the same
        // serial line, so link events feed the engine alongside vision
        let link = SerialLink::new(config.exit_serial_device(), config.exit_serial_baud());
        let link_events = event_tx.clone();
        let link_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            link.run(link_rx, link_events, link_shutdown).await;
        });

        let (gate_tx, gate_worker) = create_gate_worker(link_tx, dwell, tick, 32);
        tokio::spawn(gate_worker.run());

        let vision_config = VisionListenerConfig {
            port: config.exit_vision_port(),
            enabled: true,
        };
        let vision_events = event_tx;
        let vision_metrics = metrics.clone();
        let vision_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                start_vision_listener(vision_config, vision_events, vision_metrics, vision_shutdown)
                    .await
            {
                tracing::error!(error = %e, "exit vision listener error");
            }
        });

        let mut engine = ExitEngine::new(&config, ledger.clone(), gate_tx, metrics.clone())
            .with_egress(egress.clone());
        tokio::spawn(async move {
            engine.run(event_rx).await;
        });
    }

    // --- Payment terminal ---
    if config.payment_enabled() {
        let (link_tx, link_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(1000);

        let link = SerialLink::new(config.payment_serial_device(), config.payment_serial_baud());
        let link_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            link.run(link_rx, event_tx, link_shutdown).await;
        });

        let mut engine = SettlementEngine::new(&config, ledger.clone(), link_tx, metrics.clone())
            .with_egress(egress.clone());
        tokio::spawn(async move {
            engine.run(event_rx).await;
        });
    }

    // Metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Block until Ctrl+C, then fan the shutdown out to every task
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    // Give the serial links a moment to observe the signal
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("parkgate shutdown complete");
    Ok(())
}
