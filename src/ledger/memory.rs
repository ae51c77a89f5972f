//! In-memory reference implementation of the ledger contract
//!
//! Backs the binaries when no external store is wired in and gives the
//! engine tests a real contract to run against. Row ordering follows the
//! store semantics: "latest session" means greatest entry time.

use super::{Ledger, LedgerError, LedgerResult};
use crate::domain::types::{Alert, ParkingSession, SessionId};
use crate::domain::Plate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Default)]
struct Inner {
    sessions: Vec<ParkingSession>,
    alerts: Vec<Alert>,
    next_id: i64,
    #[cfg(test)]
    fail_writes: bool,
}

/// Mutex-guarded session and alert tables
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent write operations fail, for exercising the
    /// fail-closed paths in the decision engines.
    #[cfg(test)]
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    fn check_writable(inner: &Inner) -> LedgerResult<()> {
        #[cfg(test)]
        if inner.fail_writes {
            return Err(LedgerError::Unavailable("write failure injected".into()));
        }
        let _ = inner;
        Ok(())
    }

    /// Index of the latest session for a plate (greatest entry time)
    fn latest_index(inner: &Inner, plate: &Plate) -> Option<usize> {
        inner
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| &s.plate == plate)
            .max_by_key(|(_, s)| s.entry_time)
            .map(|(i, _)| i)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn insert_session(
        &self,
        plate: &Plate,
        entry_time: DateTime<Utc>,
    ) -> LedgerResult<SessionId> {
        let mut inner = self.inner.lock();
        Self::check_writable(&inner)?;

        inner.next_id += 1;
        let id = SessionId(inner.next_id);
        inner.sessions.push(ParkingSession {
            id,
            plate: plate.clone(),
            entry_time,
            exit_time: None,
            payment_status: false,
            payment_time: None,
            amount_paid: None,
        });
        Ok(id)
    }

    async fn is_vehicle_inside(&self, plate: &Plate) -> LedgerResult<bool> {
        let inner = self.inner.lock();
        Ok(inner.sessions.iter().any(|s| &s.plate == plate && s.is_open()))
    }

    async fn is_payment_complete(&self, plate: &Plate) -> LedgerResult<bool> {
        let inner = self.inner.lock();
        Ok(Self::latest_index(&inner, plate)
            .map(|i| inner.sessions[i].payment_status)
            .unwrap_or(false))
    }

    async fn last_unpaid_session(&self, plate: &Plate) -> LedgerResult<Option<ParkingSession>> {
        let inner = self.inner.lock();
        Ok(inner
            .sessions
            .iter()
            .filter(|s| &s.plate == plate && !s.payment_status)
            .max_by_key(|s| s.entry_time)
            .cloned())
    }

    async fn close_session(
        &self,
        plate: &Plate,
        exit_time: DateTime<Utc>,
    ) -> LedgerResult<Option<ParkingSession>> {
        let mut inner = self.inner.lock();
        Self::check_writable(&inner)?;

        match Self::latest_index(&inner, plate) {
            Some(i) => {
                inner.sessions[i].exit_time = Some(exit_time);
                Ok(Some(inner.sessions[i].clone()))
            }
            None => Ok(None),
        }
    }

    async fn settle_payment(
        &self,
        plate: &Plate,
        entry_time: DateTime<Utc>,
        amount_paid: u64,
        paid_at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        Self::check_writable(&inner)?;

        // The payment_status guard makes a repeated settlement a no-op
        let row = inner.sessions.iter_mut().find(|s| {
            &s.plate == plate && s.entry_time == entry_time && !s.payment_status
        });
        match row {
            Some(s) => {
                s.payment_status = true;
                s.payment_time = Some(paid_at);
                s.amount_paid = Some(amount_paid);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_alert(&self, alert: Alert) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        Self::check_writable(&inner)?;
        inner.alerts.push(alert);
        Ok(())
    }

    async fn recent_sessions(&self, limit: usize) -> LedgerResult<Vec<ParkingSession>> {
        let inner = self.inner.lock();
        let mut rows: Vec<_> = inner.sessions.clone();
        rows.sort_by(|a, b| b.entry_time.cmp(&a.entry_time));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn recent_alerts(&self, limit: usize) -> LedgerResult<Vec<Alert>> {
        let inner = self.inner.lock();
        let mut rows: Vec<_> = inner.alerts.clone();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        Ok(rows)
    }
}
