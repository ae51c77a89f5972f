//! Entry lane decision engine
//!
//! Consumes raw OCR candidates from the vision feed, resolves them by
//! majority vote, and decides admit / deny against the session ledger:
//!
//! 1. Plate already inside -> DUPLICATE_ENTRY alert + warning buzzer,
//!    no session.
//! 2. Same plate re-resolved within the admission cooldown -> detection
//!    noise, silently skipped.
//! 3. Otherwise a new unpaid session is inserted and the gate worker
//!    runs an open cycle. A failed insert fails closed: no actuation,
//!    no retry (the vehicle will be re-detected on a later frame).

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
use tracing::{debug, error, info, warn};

/// Buzzer train for a duplicate entry attempt
const DUPLICATE_WARN_PULSES: u32 = 3;
const DUPLICATE_WARN_PULSE: Duration = Duration::from_millis(500);

pub struct EntryEngine {
    marker: String,
    votes: VotingBuffer,
    /// Re-admission suppression window for the same plate
    cooldown: Duration,
    /// Plate and time of the last successful admission, owned by this
    /// engine instance (one instance per physical lane)
    last_admitted: Option<(Plate, Instant)>,
    ledger: Arc<dyn Ledger>,
    alerts: AlertSink,
    gate_tx: mpsc::Sender<GateCmd>,
    metrics: Arc<Metrics>,
}

impl EntryEngine {
    pub fn new(
        config: &Config,
        ledger: Arc<dyn Ledger>,
        gate_tx: mpsc::Sender<GateCmd>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            marker: config.plate_marker().to_string(),
            votes: VotingBuffer::new(config.vote_quorum()),
            cooldown: Duration::from_secs(config.entry_cooldown_secs()),
            last_admitted: None,
            alerts: AlertSink::new(ledger.clone()),
            ledger,
            gate_tx,
            metrics,
        }
    }

    /// Feed raised alerts into the JSONL egress file
    pub fn with_egress(mut self, egress: Arc<Egress>) -> Self {
        self.alerts = AlertSink::new(self.ledger.clone()).with_egress(egress);
        self
    }

    /// Consume lane events until the channel closes (feed exhaustion,
    /// fatal for this lane)
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<LaneEvent>) {
        info!("entry_engine_started");

        while let Some(event) = event_rx.recv().await {
            match event {
                LaneEvent::PlateCandidate(raw) => self.ingest_candidate(&raw).await,
                other => debug!(event = other.as_str(), "entry_event_ignored"),
            }
        }

        info!("entry_engine_stopped");
    }

    /// Validate one raw OCR read and vote on it
    pub async fn ingest_candidate(&mut self, raw: &str) {
        let Some(plate) = Plate::extract(raw, &self.marker) else {
            // Input noise, not an error
            debug!(raw = %raw, "entry_candidate_rejected");
            return;
        };

        if self.votes.offer(plate) {
            if let Some(resolved) = self.votes.resolve() {
                self.metrics.record_vote_resolved();
                self.process_entry(resolved).await;
            }
        }
    }

    /// Apply dedup and cooldown policy to a resolved plate
    pub async fn process_entry(&mut self, plate: Plate) {
        let inside = match self.ledger.is_vehicle_inside(&plate).await {
            Ok(inside) => inside,
            Err(e) => {
                // Fail closed: no decision without the ledger
                warn!(plate = %plate, error = %e, "entry_inside_check_failed");
                return;
            }
        };

        if inside {
            info!(plate = %plate, "entry_denied_duplicate");
            self.metrics.record_duplicate_entry();
            self.alerts
                .raise(
                    AlertType::DuplicateEntry,
                    &plate,
                    format!("Vehicle {plate} attempted to enter while already inside"),
                )
                .await;
            self.send_gate(GateCmd::WarnPulse {
                pulses: DUPLICATE_WARN_PULSES,
                pulse: DUPLICATE_WARN_PULSE,
            })
            .await;
            return;
        }

        if let Some((last_plate, admitted_at)) = &self.last_admitted {
            if *last_plate == plate && admitted_at.elapsed() < self.cooldown {
                // Same vehicle still in front of the camera, not a new entry
                debug!(plate = %plate, "entry_skipped_cooldown");
                return;
            }
        }

        let entry_time = Utc::now();
        match self.ledger.insert_session(&plate, entry_time).await {
            Ok(session_id) => {
                info!(
                    plate = %plate,
                    session_id = %session_id,
                    "entry_admitted"
                );
                self.metrics.record_admission();
                self.send_gate(GateCmd::OpenCycle).await;
                self.last_admitted = Some((plate, Instant::now()));
            }
            Err(e) => {
                // Fail closed, no retry: the next detection cycle will
                // see the same vehicle
                error!(plate = %plate, error = %e, "entry_session_insert_failed");
            }
        }
    }

    async fn send_gate(&self, cmd: GateCmd) {
        if let Err(e) = self.gate_tx.send(cmd).await {
            warn!(error = %e, "entry_gate_send_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    fn plate(s: &str) -> Plate {
        Plate::parse(s).unwrap()
    }

    fn engine(
        ledger: Arc<MemoryLedger>,
    ) -> (EntryEngine, mpsc::Receiver<GateCmd>) {
        let (gate_tx, gate_rx) = mpsc::channel(16);
        let engine = EntryEngine::new(
            &Config::default(),
            ledger,
            gate_tx,
            Arc::new(Metrics::new()),
        );
        (engine, gate_rx)
    }

    #[tokio::test]
    async fn test_admission_creates_session_and_opens_gate() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut gate_rx) = engine(ledger.clone());

        engine.process_entry(plate("RAB123C")).await;

        assert!(ledger.is_vehicle_inside(&plate("RAB123C")).await.unwrap());
        assert!(matches!(gate_rx.try_recv(), Ok(GateCmd::OpenCycle)));
    }

    #[tokio::test]
    async fn test_duplicate_entry_raises_alert_no_session() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut gate_rx) = engine(ledger.clone());
        let p = plate("RAB123C");

        ledger.insert_session(&p, Utc::now()).await.unwrap();
        engine.process_entry(p.clone()).await;

        // Still exactly one session
        assert_eq!(ledger.recent_sessions(10).await.unwrap().len(), 1);
        let alerts = ledger.recent_alerts(10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::DuplicateEntry);
        // Warning buzz, not an open cycle
        assert!(matches!(gate_rx.try_recv(), Ok(GateCmd::WarnPulse { .. })));
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_admission() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, _gate_rx) = engine(ledger.clone());
        let p = plate("RAB123C");

        engine.process_entry(p.clone()).await;
        // Simulate the vehicle having left so the dedup check passes
        ledger.close_session(&p, Utc::now()).await.unwrap();

        engine.process_entry(p.clone()).await;

        // Second resolve within the window produced no new session
        assert_eq!(ledger.recent_sessions(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_cooldown_admits_again() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, _gate_rx) = engine(ledger.clone());
        let p = plate("RAB123C");

        engine.process_entry(p.clone()).await;
        ledger.close_session(&p, Utc::now()).await.unwrap();

        // Age the admission stamp past the window
        engine.last_admitted =
            Some((p.clone(), Instant::now() - Duration::from_secs(301)));

        engine.process_entry(p.clone()).await;
        assert_eq!(ledger.recent_sessions(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_different_plate_not_cooled_down() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, _gate_rx) = engine(ledger.clone());

        engine.process_entry(plate("RAB123C")).await;
        engine.process_entry(plate("RAD456E")).await;

        assert_eq!(ledger.recent_sessions(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_failure_fails_closed() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut gate_rx) = engine(ledger.clone());
        ledger.fail_writes(true);

        engine.process_entry(plate("RAB123C")).await;

        // No actuation on a failed write
        assert!(gate_rx.try_recv().is_err());
        assert!(engine.last_admitted.is_none());
    }

    #[tokio::test]
    async fn test_ingest_votes_to_admission() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut gate_rx) = engine(ledger.clone());

        // Two matching reads plus one misread resolve to the plurality
        engine.ingest_candidate("RAB123C").await;
        engine.ingest_candidate("RAB128C").await;
        engine.ingest_candidate("xxRAB123C").await;

        assert!(ledger.is_vehicle_inside(&plate("RAB123C")).await.unwrap());
        assert!(matches!(gate_rx.try_recv(), Ok(GateCmd::OpenCycle)));
        assert!(engine.votes.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_ignores_noise() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, _gate_rx) = engine(ledger.clone());

        engine.ingest_candidate("no plate here").await;
        engine.ingest_candidate("RAB12").await;

        assert!(engine.votes.is_empty());
        assert_eq!(ledger.recent_sessions(10).await.unwrap().len(), 0);
    }
}
