//! Lane simulation - drives the decision engines without hardware
//!
//! Runs a scripted day-in-the-life against the in-memory ledger:
//! a vehicle enters by OCR vote, a duplicate entry is rejected, a
//! long-parked vehicle is denied exit while unpaid, settles its fee at
//! the terminal, and is released. Gate and terminal bytes that would go
//! out on the serial links are logged instead.
//!
//! Usage:
//!   cargo run --bin lane-sim
//!   cargo run --bin lane-sim -- --parked-minutes 90 --balance 1000

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use parkgate::domain::Plate;
use parkgate::infra::{Config, Metrics};
use parkgate::io::LinkCmd;
use parkgate::ledger::{Ledger, MemoryLedger};
use parkgate::services::{create_gate_worker, EntryEngine, ExitEngine, SettlementEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lane-sim", about = "Scripted lane scenario against the in-memory ledger")]
struct Args {
    /// How long the second vehicle has been parked when it tries to leave
    #[arg(long, default_value = "90")]
    parked_minutes: i64,

    /// Balance the card presents at the payment terminal
    #[arg(long, default_value = "1000")]
    balance: u64,
}

/// Log every byte that would hit a serial link
fn spawn_link_logger(lane: &'static str) -> mpsc::Sender<LinkCmd> {
    let (tx, mut rx) = mpsc::channel::<LinkCmd>(64);
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            info!(lane = lane, cmd = ?cmd, bytes = ?cmd.encode(), "link_out");
        }
    });
    tx
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::default();

    let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
    let metrics = Arc::new(Metrics::new());

    // Short dwell so the close byte shows up within the run
    let dwell = Duration::from_millis(400);
    let tick = Duration::from_millis(50);

    let (entry_gate_tx, entry_gate_worker) =
        create_gate_worker(spawn_link_logger("entry"), dwell, tick, 16);
    tokio::spawn(entry_gate_worker.run());

    let (exit_gate_tx, exit_gate_worker) =
        create_gate_worker(spawn_link_logger("exit"), dwell, tick, 16);
    tokio::spawn(exit_gate_worker.run());

    let mut entry = EntryEngine::new(&config, ledger.clone(), entry_gate_tx, metrics.clone());
    // Shortened violation window so the scripted run stays under a second
    let mut exit = ExitEngine::new(&config, ledger.clone(), exit_gate_tx, metrics.clone())
        .with_cooldown(Duration::from_millis(500));
    let mut settlement = SettlementEngine::new(
        &config,
        ledger.clone(),
        spawn_link_logger("payment"),
        metrics.clone(),
    );

    info!("scenario_started");

    // 1. A vehicle arrives at the entry camera; three frames of OCR,
    //    one of them a misread, resolve by majority vote.
    info!("step_1_entry_by_vote");
    entry.ingest_candidate("RAB123C").await;
    entry.ingest_candidate("RAB128C").await;
    entry.ingest_candidate("xxRAB123Cyy").await;

    // 2. The same plate is read again while the vehicle is inside.
    info!("step_2_duplicate_entry");
    for _ in 0..3 {
        entry.ingest_candidate("RAB123C").await;
    }

    // 3. A second vehicle has been parked for a while; its session is
    //    seeded directly to stand in for elapsed time.
    let parked = Plate::parse("RAD456E").expect("valid plate");
    let parked_entry = Utc::now() - ChronoDuration::minutes(args.parked_minutes);
    ledger
        .insert_session(&parked, parked_entry)
        .await
        .expect("seed session");

    // 4. It tries to leave without paying: alert, buzzer, lane cooldown.
    info!("step_4_unpaid_exit");
    let denied = exit.process_exit(parked.clone()).await;
    info!(outcome = ?denied, suppressed = exit.in_cooldown(), "exit_attempt");

    // 5. The driver walks to the terminal and taps the card.
    info!(
        parked_minutes = %args.parked_minutes,
        balance = %args.balance,
        "step_5_settlement"
    );
    let settled = settlement.handle_payment("RAD456E", args.balance).await;
    info!(outcome = ?settled, "settlement_attempt");

    // 6. Back at the barrier. The lane is still suppressed from the
    //    violation; wait the window out before retrying.
    info!("step_6_paid_exit");
    while exit.in_cooldown() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let released = exit.process_exit(parked).await;
    info!(outcome = ?released, "exit_attempt");

    // Let the gate workers run their dwell cycles to completion
    tokio::time::sleep(Duration::from_secs(1)).await;

    metrics.report().log();

    for session in ledger.recent_sessions(10).await.expect("sessions") {
        info!(
            plate = %session.plate,
            paid = %session.payment_status,
            amount = ?session.amount_paid,
            open = %session.is_open(),
            "session_row"
        );
    }
    for alert in ledger.recent_alerts(10).await.expect("alerts") {
        info!(
            alert_type = alert.alert_type.as_str(),
            plate = %alert.plate,
            "alert_row"
        );
    }

    info!("scenario_complete");
}
