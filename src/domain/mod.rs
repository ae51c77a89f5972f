//! Domain models - core business types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Plate` - validated license plate with OCR extraction
//! - `ParkingSession` - one row per physical parking event
//! - `Alert` / `AlertType` - anomaly records
//! - `LaneEvent` - events delivered to a lane's decision loop

pub mod plate;
pub mod types;

pub use plate::Plate;
