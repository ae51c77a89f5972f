//! Exit lane decision engine
//!
//! Two ingestion paths converge on `process_exit`: vision candidates
//! (validated and majority-voted like the entry lane) and plate lines
//! from the serial companion reader. Exit is granted only when the
//! latest session for the plate is paid; a violation raises an
//! UNAUTHORIZED_EXIT alert, buzzes the warning train, and suppresses
//! all exit detection for a cooldown window so a vehicle idling at the
//! barrier cannot flood the alert table.

use crate::domain::types::{AlertType, LaneEvent};
use crate::domain::Plate;
use crate::infra::{Config, Metrics};
use crate::io::egress::Egress;
use crate::ledger::Ledger;
use crate::services::alerting::AlertSink;
use crate::services::gate::GateCmd;
use crate::services::voting::VotingBuffer;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Buzzer train for an unauthorized exit attempt
const UNAUTHORIZED_WARN_PULSES: u32 = 3;
const UNAUTHORIZED_WARN_PULSE: Duration = Duration::from_millis(100);

/// Outcome of one exit decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Session closed, gate cycling
    Released,
    /// Policy violation: alert raised, cooldown engaged
    Denied,
    /// Malformed plate or ledger failure; nothing decided this cycle
    Ignored,
}

pub struct ExitEngine {
    marker: String,
    votes: VotingBuffer,
    /// Post-violation suppression window for the whole lane
    cooldown: Duration,
    cooldown_until: Option<Instant>,
    ledger: Arc<dyn Ledger>,
    alerts: AlertSink,
    egress: Option<Arc<Egress>>,
    gate_tx: mpsc::Sender<GateCmd>,
    metrics: Arc<Metrics>,
}

impl ExitEngine {
    pub fn new(
        config: &Config,
        ledger: Arc<dyn Ledger>,
        gate_tx: mpsc::Sender<GateCmd>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            marker: config.plate_marker().to_string(),
            votes: VotingBuffer::new(config.vote_quorum()),
            cooldown: Duration::from_secs(config.exit_cooldown_secs()),
            cooldown_until: None,
            alerts: AlertSink::new(ledger.clone()),
            egress: None,
            ledger,
            gate_tx,
            metrics,
        }
    }

    /// Feed closed sessions and raised alerts into the JSONL egress file
    pub fn with_egress(mut self, egress: Arc<Egress>) -> Self {
        self.alerts = AlertSink::new(self.ledger.clone()).with_egress(egress.clone());
        self.egress = Some(egress);
        self
    }

    /// Override the post-violation suppression window
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Consume lane events until the channel closes (feed exhaustion,
    /// fatal for this lane)
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<LaneEvent>) {
        info!("exit_engine_started");

        while let Some(event) = event_rx.recv().await {
            if self.in_cooldown() {
                debug!(event = event.as_str(), "exit_event_suppressed_cooldown");
                continue;
            }

            match event {
                LaneEvent::PlateCandidate(raw) => self.ingest_candidate(&raw).await,
                LaneEvent::CompanionPlate(text) => {
                    // The companion reader sends exact plates, no marker hunt
                    match Plate::parse(text.trim()) {
                        Some(plate) => {
                            self.process_exit(plate).await;
                        }
                        None => debug!(text = %text, "exit_companion_rejected"),
                    }
                }
                other => debug!(event = other.as_str(), "exit_event_ignored"),
            }
        }

        info!("exit_engine_stopped");
    }

    /// True while the post-violation window is active; logs reactivation
    /// on expiry
    pub fn in_cooldown(&mut self) -> bool {
        match self.cooldown_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                info!("exit_scanner_reactivated");
                self.cooldown_until = None;
                false
            }
            None => false,
        }
    }

    /// Validate one raw OCR read and vote on it
    pub async fn ingest_candidate(&mut self, raw: &str) {
        let Some(plate) = Plate::extract(raw, &self.marker) else {
            debug!(raw = %raw, "exit_candidate_rejected");
            return;
        };

        if self.votes.offer(plate) {
            if let Some(resolved) = self.votes.resolve() {
                self.metrics.record_vote_resolved();
                self.process_exit(resolved).await;
            }
        }
    }

    /// Decide one exit attempt. Never propagates an error: every call
    /// resolves to a ledger mutation + actuation, an alert + cooldown,
    /// or a logged no-op.
    pub async fn process_exit(&mut self, plate: Plate) -> ExitOutcome {
        let paid = match self.ledger.is_payment_complete(&plate).await {
            Ok(paid) => paid,
            Err(e) => {
                warn!(plate = %plate, error = %e, "exit_payment_check_failed");
                return ExitOutcome::Ignored;
            }
        };

        if paid {
            match self.ledger.close_session(&plate, Utc::now()).await {
                Ok(Some(session)) => {
                    info!(plate = %plate, "exit_released");
                    self.metrics.record_exit();
                    if let Some(ref egress) = self.egress {
                        egress.write_session(&session);
                    }
                    self.send_gate(GateCmd::OpenCycle).await;
                    ExitOutcome::Released
                }
                Ok(None) => {
                    warn!(plate = %plate, "exit_close_no_session");
                    ExitOutcome::Ignored
                }
                Err(e) => {
                    // Fail closed: the barrier stays down
                    warn!(plate = %plate, error = %e, "exit_close_failed");
                    ExitOutcome::Ignored
                }
            }
        } else {
            info!(plate = %plate, "exit_denied_unpaid");
            self.metrics.record_unauthorized_exit();
            self.alerts
                .raise(
                    AlertType::UnauthorizedExit,
                    &plate,
                    format!("Vehicle {plate} attempted to exit without payment"),
                )
                .await;
            self.send_gate(GateCmd::WarnPulse {
                pulses: UNAUTHORIZED_WARN_PULSES,
                pulse: UNAUTHORIZED_WARN_PULSE,
            })
            .await;
            self.cooldown_until = Some(Instant::now() + self.cooldown);
            ExitOutcome::Denied
        }
    }

    async fn send_gate(&self, cmd: GateCmd) {
        if let Err(e) = self.gate_tx.send(cmd).await {
            warn!(error = %e, "exit_gate_send_failed");
        }
    }
}
