//! Best-effort anomaly alerting
//!
//! Alerts are diagnostic, not safety-critical: a failed insert is logged
//! and swallowed so the requesting decision engine is never blocked.

use crate::domain::types::{Alert, AlertType};
use crate::domain::Plate;
use crate::io::egress::Egress;
use crate::ledger::Ledger;
use std::sync::Arc;
use tracing::{info, warn};

pub struct AlertSink {
    ledger: Arc<dyn Ledger>,
    egress: Option<Arc<Egress>>,
}

impl AlertSink {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger, egress: None }
    }

    /// Also append raised alerts to the JSONL egress feed
    pub fn with_egress(mut self, egress: Arc<Egress>) -> Self {
        self.egress = Some(egress);
        self
    }

    /// Persist an anomaly record; failures are logged, never propagated
    pub async fn raise(&self, alert_type: AlertType, plate: &Plate, message: impl Into<String>) {
        let alert = Alert::new(alert_type, plate.clone(), message);
        info!(
            alert_type = alert.alert_type.as_str(),
            plate = %alert.plate,
            message = %alert.message,
            "alert_raised"
        );

        if let Some(ref egress) = self.egress {
            egress.write_alert(&alert);
        }

        if let Err(e) = self.ledger.insert_alert(alert).await {
            warn!(
                alert_type = alert_type.as_str(),
                plate = %plate,
                error = %e,
                "alert_persist_failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    #[tokio::test]
    async fn test_raise_persists_alert() {
        let ledger = Arc::new(MemoryLedger::new());
        let sink = AlertSink::new(ledger.clone());
        let plate = Plate::parse("RAB123C").unwrap();

        sink.raise(AlertType::DuplicateEntry, &plate, "already inside").await;

        let alerts = ledger.recent_alerts(10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::DuplicateEntry);
        assert_eq!(alerts[0].plate, plate);
    }

    #[tokio::test]
    async fn test_raise_swallows_store_failure() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.fail_writes(true);
        let sink = AlertSink::new(ledger.clone());
        let plate = Plate::parse("RAB123C").unwrap();

        // Must not panic or propagate
        sink.raise(AlertType::UnauthorizedExit, &plate, "no payment").await;
    }
}
