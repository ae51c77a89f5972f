//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `serial_link` - duplex serial channel to the gate controller board
//! - `vision` - TCP listener ingesting raw OCR candidate lines
//! - `egress` - session/alert output to file (JSONL format)

pub mod egress;
pub mod serial_link;
pub mod vision;

// Re-export commonly used types
pub use serial_link::{parse_line, LinkCmd, SerialLink};
pub use vision::{start_vision_listener, VisionListenerConfig};
