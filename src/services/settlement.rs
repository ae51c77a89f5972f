//! Fee computation and balance settlement
//!
//! Triggered by payment-request lines from the payment terminal:
//! `"<plate>,<presented_balance>"`. The fee is time-based, charged per
//! started minute at `rate_per_hour / 60`, rounded half up to a whole
//! currency unit. Settlement marks the session paid; the gate is never
//! actuated here - exit remains a separate event gated on the payment
//! status.

use crate::domain::types::{AlertType, LaneEvent};
use crate::domain::Plate;
use crate::infra::{Config, Metrics};
use crate::io::egress::Egress;
use crate::io::serial_link::LinkCmd;
use crate::ledger::Ledger;
use crate::services::alerting::AlertSink;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reply sent for an invalid or insufficient payment request
const REPLY_INVALID: &str = "I";

/// Parking fee for a stay, rounded half up to a whole currency unit.
///
/// Computed in integer arithmetic: `round(minutes * rate / 60)` with
/// ties going up, so `fee(90, 500) == 750` and `fee(1, 500) == 8`.
pub fn compute_fee(minutes: u64, rate_per_hour: u64) -> u64 {
    (minutes * rate_per_hour + 30) / 60
}

/// Result of one settlement attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Session marked paid; carries the returned balance
    Settled { fee: u64, new_balance: u64 },
    /// Presented balance below the computed fee
    Insufficient { fee: u64 },
    /// No unpaid session, malformed plate, or lost settle race
    Invalid,
    /// Ledger unavailable; no reply sent, terminal will retry
    Aborted,
}

pub struct SettlementEngine {
    rate_per_hour: u64,
    ledger: Arc<dyn Ledger>,
    alerts: AlertSink,
    egress: Option<Arc<Egress>>,
    link_tx: mpsc::Sender<LinkCmd>,
    metrics: Arc<Metrics>,
}

impl SettlementEngine {
    pub fn new(
        config: &Config,
        ledger: Arc<dyn Ledger>,
        link_tx: mpsc::Sender<LinkCmd>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            rate_per_hour: config.rate_per_hour(),
            alerts: AlertSink::new(ledger.clone()),
            egress: None,
            ledger,
            link_tx,
            metrics,
        }
    }

    /// Feed settled sessions and raised alerts into the JSONL egress file
    pub fn with_egress(mut self, egress: Arc<Egress>) -> Self {
        self.alerts = AlertSink::new(self.ledger.clone()).with_egress(egress.clone());
        self.egress = Some(egress);
        self
    }

    /// Consume payment requests until the channel closes
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<LaneEvent>) {
        info!(rate_per_hour = %self.rate_per_hour, "settlement_engine_started");

        while let Some(event) = event_rx.recv().await {
            match event {
                LaneEvent::PaymentRequest { plate, balance } => {
                    self.handle_payment(&plate, balance).await;
                }
                other => debug!(event = other.as_str(), "settlement_event_ignored"),
            }
        }

        info!("settlement_engine_stopped");
    }

    /// Process one payment request and reply over the hardware channel
    pub async fn handle_payment(&mut self, plate_text: &str, balance: u64) -> SettlementOutcome {
        let Some(plate) = Plate::parse(plate_text.trim()) else {
            debug!(plate = %plate_text, "settlement_invalid_plate");
            self.reply(REPLY_INVALID.to_string()).await;
            return SettlementOutcome::Invalid;
        };

        let session = match self.ledger.last_unpaid_session(&plate).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!(plate = %plate, "settlement_no_unpaid_session");
                self.reply(REPLY_INVALID.to_string()).await;
                return SettlementOutcome::Invalid;
            }
            Err(e) => {
                // No reply: the terminal times out and retries
                warn!(plate = %plate, error = %e, "settlement_lookup_failed");
                return SettlementOutcome::Aborted;
            }
        };

        let now = Utc::now();
        let minutes = (now - session.entry_time).num_minutes().max(0) as u64;
        let fee = compute_fee(minutes, self.rate_per_hour);

        info!(
            plate = %plate,
            minutes = %minutes,
            fee = %fee,
            balance = %balance,
            "settlement_quoted"
        );

        if balance < fee {
            info!(plate = %plate, fee = %fee, balance = %balance, "settlement_insufficient");
            self.metrics.record_settlement_rejected();
            self.alerts
                .raise(
                    AlertType::InsufficientBalance,
                    &plate,
                    format!("Balance {balance} below fee {fee} for vehicle {plate}"),
                )
                .await;
            self.reply(REPLY_INVALID.to_string()).await;
            return SettlementOutcome::Insufficient { fee };
        }

        match self
            .ledger
            .settle_payment(&plate, session.entry_time, fee, now)
            .await
        {
            Ok(true) => {
                let new_balance = balance - fee;
                info!(
                    plate = %plate,
                    fee = %fee,
                    new_balance = %new_balance,
                    "settlement_completed"
                );
                self.metrics.record_settlement(fee);
                if let Some(ref egress) = self.egress {
                    let mut settled = session.clone();
                    settled.payment_status = true;
                    settled.payment_time = Some(now);
                    settled.amount_paid = Some(fee);
                    egress.write_session(&settled);
                }
                self.reply(new_balance.to_string()).await;
                SettlementOutcome::Settled { fee, new_balance }
            }
            Ok(false) => {
                // Guard predicate matched no row: already settled elsewhere
                info!(plate = %plate, "settlement_already_paid");
                self.reply(REPLY_INVALID.to_string()).await;
                SettlementOutcome::Invalid
            }
            Err(e) => {
                warn!(plate = %plate, error = %e, "settlement_update_failed");
                SettlementOutcome::Aborted
            }
        }
    }

    async fn reply(&self, line: String) {
        if let Err(e) = self.link_tx.send(LinkCmd::Reply(line)).await {
            warn!(error = %e, "settlement_reply_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use chrono::Duration as ChronoDuration;

    fn plate(s: &str) -> Plate {
        Plate::parse(s).unwrap()
    }

    fn engine(ledger: Arc<MemoryLedger>) -> (SettlementEngine, mpsc::Receiver<LinkCmd>) {
        let (link_tx, link_rx) = mpsc::channel(16);
        let engine = SettlementEngine::new(
            &Config::default(),
            ledger,
            link_tx,
            Arc::new(Metrics::new()),
        );
        (engine, link_rx)
    }

    #[test]
    fn test_fee_examples() {
        assert_eq!(compute_fee(90, 500), 750);
        assert_eq!(compute_fee(1, 500), 8); // 8.33 rounds down
        assert_eq!(compute_fee(0, 500), 0);
        assert_eq!(compute_fee(60, 500), 500);
    }

    #[test]
    fn test_fee_rounds_half_up() {
        // 3 min at 10/h = 0.5, ties go up
        assert_eq!(compute_fee(3, 10), 1);
        // 5 min at 500/h = 41.67 -> 42
        assert_eq!(compute_fee(5, 500), 42);
    }

    #[tokio::test]
    async fn test_settlement_success_replies_new_balance() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut link_rx) = engine(ledger.clone());
        let p = plate("RAB123C");
        let t0 = Utc::now() - ChronoDuration::minutes(90);
        ledger.insert_session(&p, t0).await.unwrap();

        let outcome = engine.handle_payment("RAB123C", 1000).await;
        assert_eq!(outcome, SettlementOutcome::Settled { fee: 750, new_balance: 250 });

        let session = &ledger.recent_sessions(1).await.unwrap()[0];
        assert!(session.payment_status);
        assert_eq!(session.amount_paid, Some(750));
        assert!(session.payment_time.is_some());

        assert_eq!(link_rx.try_recv().unwrap(), LinkCmd::Reply("250".to_string()));
    }

    #[tokio::test]
    async fn test_settlement_insufficient_balance() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut link_rx) = engine(ledger.clone());
        let p = plate("RAB123C");
        ledger
            .insert_session(&p, Utc::now() - ChronoDuration::minutes(90))
            .await
            .unwrap();

        let outcome = engine.handle_payment("RAB123C", 100).await;
        assert_eq!(outcome, SettlementOutcome::Insufficient { fee: 750 });

        // No ledger mutation beyond the alert
        let session = &ledger.recent_sessions(1).await.unwrap()[0];
        assert!(!session.payment_status);
        let alerts = ledger.recent_alerts(10).await.unwrap();
        assert_eq!(alerts[0].alert_type, AlertType::InsufficientBalance);

        assert_eq!(link_rx.try_recv().unwrap(), LinkCmd::Reply("I".to_string()));
    }

    #[tokio::test]
    async fn test_settlement_no_unpaid_session() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut link_rx) = engine(ledger.clone());

        let outcome = engine.handle_payment("RAB123C", 1000).await;
        assert_eq!(outcome, SettlementOutcome::Invalid);
        assert_eq!(link_rx.try_recv().unwrap(), LinkCmd::Reply("I".to_string()));
    }

    #[tokio::test]
    async fn test_settlement_idempotent_second_attempt() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut link_rx) = engine(ledger.clone());
        let p = plate("RAB123C");
        let t0 = Utc::now() - ChronoDuration::minutes(90);
        ledger.insert_session(&p, t0).await.unwrap();

        engine.handle_payment("RAB123C", 1000).await;
        let first = ledger.recent_sessions(1).await.unwrap()[0].clone();

        // Second attempt: no unpaid session remains, payment untouched
        let outcome = engine.handle_payment("RAB123C", 1000).await;
        assert_eq!(outcome, SettlementOutcome::Invalid);

        let second = ledger.recent_sessions(1).await.unwrap()[0].clone();
        assert_eq!(second.amount_paid, first.amount_paid);
        assert_eq!(second.payment_time, first.payment_time);

        // Drain replies: balance then invalid
        assert_eq!(link_rx.try_recv().unwrap(), LinkCmd::Reply("250".to_string()));
        assert_eq!(link_rx.try_recv().unwrap(), LinkCmd::Reply("I".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_plate_replies_invalid() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut link_rx) = engine(ledger.clone());

        let outcome = engine.handle_payment("garbage", 1000).await;
        assert_eq!(outcome, SettlementOutcome::Invalid);
        assert_eq!(link_rx.try_recv().unwrap(), LinkCmd::Reply("I".to_string()));
    }

    #[tokio::test]
    async fn test_ledger_failure_sends_no_reply() {
        let ledger = Arc::new(MemoryLedger::new());
        let (mut engine, mut link_rx) = engine(ledger.clone());
        let p = plate("RAB123C");
        ledger
            .insert_session(&p, Utc::now() - ChronoDuration::minutes(10))
            .await
            .unwrap();
        ledger.fail_writes(true);

        let outcome = engine.handle_payment("RAB123C", 1000).await;
        assert_eq!(outcome, SettlementOutcome::Aborted);
        assert!(link_rx.try_recv().is_err());
    }
}
