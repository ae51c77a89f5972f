//! Shared types for the parking access pipeline

use crate::domain::plate::Plate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Newtype wrapper for ledger-assigned session ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SessionId(pub i64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row per physical parking event.
///
/// `entry_time` is set once at creation; `exit_time` exactly once on
/// exit; `payment_status` is monotonic false -> true and the payment
/// fields are set atomically with that transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkingSession {
    pub id: SessionId,
    pub plate: Plate,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub payment_status: bool,
    pub payment_time: Option<DateTime<Utc>>,
    pub amount_paid: Option<u64>,
}

impl ParkingSession {
    /// The "vehicle is inside" predicate
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }
}

/// Classification of anomaly records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    DuplicateEntry,
    UnauthorizedExit,
    InsufficientBalance,
}

impl AlertType {
    pub fn as_str(&self) -> &str {
        match self {
            AlertType::DuplicateEntry => "DUPLICATE_ENTRY",
            AlertType::UnauthorizedExit => "UNAUTHORIZED_EXIT",
            AlertType::InsufficientBalance => "INSUFFICIENT_BALANCE",
        }
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DUPLICATE_ENTRY" => Ok(AlertType::DuplicateEntry),
            "UNAUTHORIZED_EXIT" => Ok(AlertType::UnauthorizedExit),
            "INSUFFICIENT_BALANCE" => Ok(AlertType::InsufficientBalance),
            other => Err(format!("unknown alert type: {other}")),
        }
    }
}

/// Append-only anomaly record.
///
/// `is_read` is owned by the dashboard consumer; the core always
/// creates alerts unread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub plate: Plate,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl Alert {
    pub fn new(alert_type: AlertType, plate: Plate, message: impl Into<String>) -> Self {
        Self {
            alert_type,
            plate,
            message: message.into(),
            timestamp: Utc::now(),
            is_read: false,
        }
    }
}

/// Event delivered to a lane's decision loop
#[derive(Debug, Clone)]
pub enum LaneEvent {
    /// Raw OCR text from the vision feed, not yet validated
    PlateCandidate(String),
    /// Plate line from the serial companion reader (exit lane)
    CompanionPlate(String),
    /// Payment request from the payment terminal: plate + presented balance
    PaymentRequest { plate: String, balance: u64 },
}

impl LaneEvent {
    pub fn as_str(&self) -> &str {
        match self {
            LaneEvent::PlateCandidate(_) => "plate_candidate",
            LaneEvent::CompanionPlate(_) => "companion_plate",
            LaneEvent::PaymentRequest { .. } => "payment_request",
        }
    }
}
