//! Session ledger contract
//!
//! The persistent store (an ACID relational database) lives outside this
//! process; the core only depends on the query surface below. Every
//! operation returns a typed result so each decision engine can apply its
//! own recovery policy instead of a blanket catch-and-continue.

pub mod memory;

use crate::domain::types::{Alert, ParkingSession, SessionId};
use crate::domain::Plate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryLedger;

/// Failure reasons surfaced by the ledger contract
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The store is unreachable or rejected the connection
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// The store accepted the request but the statement failed
    #[error("ledger query failed: {0}")]
    Query(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Query surface the decision engines require from the session store.
///
/// Invariant the store must uphold: at most one session per plate has
/// `exit_time = NULL` at any instant. The dedup check and the subsequent
/// insert are intentionally not one transaction; entry and exit are
/// physically distinct lanes, so the same plate cannot be admitted twice
/// concurrently. Documented assumption, not enforced here.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Insert a new session with the given entry time, unpaid.
    /// Returns the store-assigned id.
    async fn insert_session(
        &self,
        plate: &Plate,
        entry_time: DateTime<Utc>,
    ) -> LedgerResult<SessionId>;

    /// True iff a session for this plate has no exit time yet
    async fn is_vehicle_inside(&self, plate: &Plate) -> LedgerResult<bool>;

    /// Payment status of the most recent session for the plate.
    /// False when the plate has no sessions at all.
    async fn is_payment_complete(&self, plate: &Plate) -> LedgerResult<bool>;

    /// Most recent session with `payment_status = false` for the plate
    async fn last_unpaid_session(&self, plate: &Plate) -> LedgerResult<Option<ParkingSession>>;

    /// Set `exit_time` on the most recent session for the plate.
    /// Returns the closed row, or None when the plate has no sessions.
    async fn close_session(
        &self,
        plate: &Plate,
        exit_time: DateTime<Utc>,
    ) -> LedgerResult<Option<ParkingSession>>;

    /// Mark the session identified by (plate, entry_time) as paid.
    ///
    /// Guarded by `payment_status = false`: a second settlement attempt
    /// after success matches no row and returns false, never double-charges.
    async fn settle_payment(
        &self,
        plate: &Plate,
        entry_time: DateTime<Utc>,
        amount_paid: u64,
        paid_at: DateTime<Utc>,
    ) -> LedgerResult<bool>;

    /// Append an anomaly record
    async fn insert_alert(&self, alert: Alert) -> LedgerResult<()>;

    /// Most recent sessions, newest first (dashboard read surface)
    async fn recent_sessions(&self, limit: usize) -> LedgerResult<Vec<ParkingSession>>;

    /// Most recent alerts, newest first (dashboard read surface)
    async fn recent_alerts(&self, limit: usize) -> LedgerResult<Vec<Alert>>;
}
