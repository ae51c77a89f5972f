//! Services - business logic and state management
//!
//! This module contains the core decision logic:
//! - `voting` - majority vote over OCR plate candidates
//! - `entry` - entry lane decisions (dedup, cooldown, admit)
//! - `exit` - exit lane decisions (payment gating, violation cooldown)
//! - `settlement` - fee computation and balance settlement
//! - `gate` - gate state machine and async actuation worker
//! - `alerting` - best-effort anomaly alert persistence

pub mod alerting;
pub mod entry;
pub mod exit;
pub mod gate;
pub mod settlement;
pub mod voting;

// Re-export commonly used types
pub use entry::EntryEngine;
pub use exit::{ExitEngine, ExitOutcome};
pub use gate::{create_gate_worker, GateCmd, GateState, GateWorker};
pub use settlement::{compute_fee, SettlementEngine, SettlementOutcome};
pub use voting::VotingBuffer;
