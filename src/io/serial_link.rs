//! Serial channel to the gate controller board
//!
//! Protocol (9600 8N1):
//! - Core -> board: single-byte commands `'1'` (gate open), `'0'`
//!   (gate close / buzzer stop), `'2'` (warning buzz); settlement
//!   replies as newline-terminated lines (`"<new_balance>"` or `"I"`).
//! - Board -> core: newline-terminated lines, either a 7-character
//!   plate from the companion RFID reader or `"<plate>,<digits>"` for a
//!   payment request. The board prints a banner line on reset which is
//!   ignored.

use crate::domain::types::LaneEvent;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

const GATE_OPEN_BYTE: u8 = b'1';
const GATE_CLOSE_BYTE: u8 = b'0';
const WARN_BYTE: u8 = b'2';

/// Reset banner printed by the board firmware
const BANNER_MARKER: &str = "MODE RFID";

/// Outbound command on the serial link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCmd {
    GateOpen,
    GateClose,
    Warn,
    /// Newline-terminated settlement reply
    Reply(String),
}

impl LinkCmd {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            LinkCmd::GateOpen => vec![GATE_OPEN_BYTE],
            LinkCmd::GateClose => vec![GATE_CLOSE_BYTE],
            LinkCmd::Warn => vec![WARN_BYTE],
            LinkCmd::Reply(line) => format!("{line}\n").into_bytes(),
        }
    }
}

/// Parse one inbound line into a lane event.
///
/// Banner lines and anything unrecognizable yield `None`; validation of
/// plate text is left to the decision engines.
pub fn parse_line(line: &str) -> Option<LaneEvent> {
    let line = line.trim();
    if line.is_empty() || line.contains(BANNER_MARKER) {
        return None;
    }

    if let Some((plate_part, balance_part)) = line.split_once(',') {
        let plate = plate_part.trim().to_string();
        // The card reader pads the balance with control characters
        let digits: String = balance_part.chars().filter(|c| c.is_ascii_digit()).collect();
        if plate.is_empty() || digits.is_empty() {
            return None;
        }
        let balance = digits.parse::<u64>().ok()?;
        return Some(LaneEvent::PaymentRequest { plate, balance });
    }

    Some(LaneEvent::CompanionPlate(line.to_string()))
}

/// Duplex serial link for one lane
pub struct SerialLink {
    device: String,
    baud: u32,
}

impl SerialLink {
    pub fn new(device: &str, baud: u32) -> Self {
        Self { device: device.to_string(), baud }
    }

    /// Run the link: forward outbound commands, parse inbound lines.
    ///
    /// A missing device degrades the lane to detection-only: commands are
    /// consumed and dropped so senders never block, nothing is actuated.
    pub async fn run(
        self,
        mut cmd_rx: mpsc::Receiver<LinkCmd>,
        event_tx: mpsc::Sender<LaneEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(device = %self.device, baud = %self.baud, "serial_link_started");

        let port = tokio_serial::new(&self.device, self.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async();

        let port = match port {
            Ok(p) => {
                info!(device = %self.device, "serial_port_opened");
                p
            }
            Err(e) => {
                error!(device = %self.device, error = %e, "serial_port_open_failed");
                // Detection-only degradation
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                        cmd = cmd_rx.recv() => match cmd {
                            Some(cmd) => debug!(cmd = ?cmd, "serial_cmd_dropped_no_port"),
                            None => return,
                        }
                    }
                }
            }
        };

        let (reader, mut writer) = tokio::io::split(port);
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(device = %self.device, "serial_link_shutdown");
                        return;
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            let bytes = cmd.encode();
                            if let Err(e) = writer.write_all(&bytes).await {
                                warn!(error = %e, "serial_write_error");
                            } else if let Err(e) = writer.flush().await {
                                warn!(error = %e, "serial_flush_error");
                            } else {
                                debug!(cmd = ?cmd, "serial_cmd_sent");
                            }
                        }
                        None => {
                            info!(device = %self.device, "serial_cmd_channel_closed");
                            return;
                        }
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            debug!(line = %line, "serial_line_received");
                            if let Some(event) = parse_line(&line) {
                                match event_tx.try_send(event) {
                                    Ok(()) => {}
                                    Err(TrySendError::Full(e)) => {
                                        warn!(event = e.as_str(), "serial_event_dropped: channel full");
                                    }
                                    Err(TrySendError::Closed(_)) => {
                                        info!(device = %self.device, "serial_event_channel_closed");
                                        return;
                                    }
                                }
                            }
                        }
                        // EOF: the device went away, fatal for this lane
                        Ok(None) => {
                            error!(device = %self.device, "serial_eof");
                            return;
                        }
                        Err(e) => {
                            warn!(error = %e, "serial_read_error");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command_bytes() {
        assert_eq!(LinkCmd::GateOpen.encode(), vec![b'1']);
        assert_eq!(LinkCmd::GateClose.encode(), vec![b'0']);
        assert_eq!(LinkCmd::Warn.encode(), vec![b'2']);
    }

    #[test]
    fn test_encode_reply_line() {
        assert_eq!(LinkCmd::Reply("250".to_string()).encode(), b"250\n".to_vec());
        assert_eq!(LinkCmd::Reply("I".to_string()).encode(), b"I\n".to_vec());
    }

    #[test]
    fn test_parse_companion_plate_line() {
        match parse_line("RAB123C\r") {
            Some(LaneEvent::CompanionPlate(p)) => assert_eq!(p, "RAB123C"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_payment_request() {
        match parse_line("RAB123C,1000") {
            Some(LaneEvent::PaymentRequest { plate, balance }) => {
                assert_eq!(plate, "RAB123C");
                assert_eq!(balance, 1000);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_payment_request_with_noise_in_balance() {
        // Card readers pad the balance with control characters
        match parse_line("RAB123C, 10\x0200 ") {
            Some(LaneEvent::PaymentRequest { balance, .. }) => assert_eq!(balance, 1000),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ignores_banner() {
        assert!(parse_line("EXIT MODE RFID").is_none());
        assert!(parse_line("PAYMENT MODE RFID v1.2").is_none());
    }

    #[test]
    fn test_parse_ignores_empty_and_garbage_payment() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line(",1000").is_none());
        assert!(parse_line("RAB123C,").is_none());
        assert!(parse_line("RAB123C,abc").is_none());
    }
}
