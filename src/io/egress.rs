//! Ledger event egress - appends closed sessions and alerts to file
//!
//! Records are written in JSONL format (one JSON object per line) so the
//! dashboard and list viewers can tail a flat feed without querying the
//! store.

use crate::domain::types::{Alert, ParkingSession};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EgressRecord<'a> {
    Session(&'a ParkingSession),
    Alert(&'a Alert),
}

/// Egress writer for session and alert records
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a closed session to the egress file
    pub fn write_session(&self, session: &ParkingSession) -> bool {
        let record = EgressRecord::Session(session);
        match self.append_record(&record) {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    plate = %session.plate,
                    paid = %session.payment_status,
                    "session_egressed"
                );
                true
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "session_egress_failed");
                false
            }
        }
    }

    /// Write an alert to the egress file
    pub fn write_alert(&self, alert: &Alert) -> bool {
        let record = EgressRecord::Alert(alert);
        match self.append_record(&record) {
            Ok(()) => {
                debug!(
                    alert_type = alert.alert_type.as_str(),
                    plate = %alert.plate,
                    "alert_egressed"
                );
                true
            }
            Err(e) => {
                error!(alert_type = alert.alert_type.as_str(), error = %e, "alert_egress_failed");
                false
            }
        }
    }

    fn append_record(&self, record: &EgressRecord<'_>) -> std::io::Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.append_line(&json)
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}
