//! Gate actuation: state machine plus async worker
//!
//! Decision engines never sleep through a gate cycle. They enqueue a
//! command and the worker drives the barrier through
//! `Closed -> Opening -> Open(deadline) -> Closing -> Closed` on a tick
//! interval, emitting single-byte commands on the serial link.

use crate::io::serial_link::LinkCmd;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

/// A command enqueued by a decision engine
#[derive(Debug)]
pub enum GateCmd {
    /// Full admit cycle: open, hold for the dwell time, close
    OpenCycle,
    /// Warning buzzer train, distinguishable from a gate-open pulse
    WarnPulse { pulses: u32, pulse: Duration },
}

/// Barrier position as driven by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl GateState {
    pub fn as_str(&self) -> &str {
        match self {
            GateState::Closed => "closed",
            GateState::Opening => "opening",
            GateState::Open => "open",
            GateState::Closing => "closing",
        }
    }
}

/// Pure transition logic, driven by the worker's tick.
///
/// Opening and Closing are instantaneous from the controller's point of
/// view (the board acknowledges nothing), so they collapse into the next
/// state within the same call while still being logged as transitions.
pub struct GateStateMachine {
    state: GateState,
    dwell: Duration,
    deadline: Option<Instant>,
}

impl GateStateMachine {
    pub fn new(dwell: Duration) -> Self {
        Self { state: GateState::Closed, dwell, deadline: None }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Request an open cycle. Emits the open byte when the gate was
    /// closed; a cycle already in progress has its dwell extended.
    pub fn request_open(&mut self, now: Instant) -> Option<LinkCmd> {
        match self.state {
            GateState::Closed => {
                self.state = GateState::Opening;
                info!(state = self.state.as_str(), "gate_transition");
                self.state = GateState::Open;
                self.deadline = Some(now + self.dwell);
                Some(LinkCmd::GateOpen)
            }
            GateState::Open => {
                // Vehicle re-detected mid-dwell: keep the barrier up
                self.deadline = Some(now + self.dwell);
                None
            }
            GateState::Opening | GateState::Closing => None,
        }
    }

    /// Advance time. Emits the close byte when the dwell expires.
    pub fn tick(&mut self, now: Instant) -> Option<LinkCmd> {
        match (self.state, self.deadline) {
            (GateState::Open, Some(deadline)) if now >= deadline => {
                self.state = GateState::Closing;
                info!(state = self.state.as_str(), "gate_transition");
                self.state = GateState::Closed;
                self.deadline = None;
                Some(LinkCmd::GateClose)
            }
            _ => None,
        }
    }
}

/// Worker that processes gate commands off the decision hot path
pub struct GateWorker {
    machine: GateStateMachine,
    cmd_rx: mpsc::Receiver<GateCmd>,
    link_tx: mpsc::Sender<LinkCmd>,
    tick: Duration,
}

impl GateWorker {
    pub fn new(
        cmd_rx: mpsc::Receiver<GateCmd>,
        link_tx: mpsc::Sender<LinkCmd>,
        dwell: Duration,
        tick: Duration,
    ) -> Self {
        Self { machine: GateStateMachine::new(dwell), cmd_rx, link_tx, tick }
    }

    /// Run until the command channel closes
    pub async fn run(mut self) {
        info!("gate_worker_started");
        let mut ticker = interval(self.tick);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(GateCmd::OpenCycle) => {
                            if let Some(link_cmd) = self.machine.request_open(Instant::now()) {
                                self.send(link_cmd).await;
                            }
                        }
                        Some(GateCmd::WarnPulse { pulses, pulse }) => {
                            // Runs in its own task so the tick keeps
                            // driving the dwell expiry
                            let link_tx = self.link_tx.clone();
                            tokio::spawn(warn_pulses(link_tx, pulses, pulse));
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if let Some(link_cmd) = self.machine.tick(Instant::now()) {
                        self.send(link_cmd).await;
                    }
                }
            }
        }

        info!("gate_worker_stopped");
    }

    async fn send(&self, cmd: LinkCmd) {
        if let Err(e) = self.link_tx.send(cmd).await {
            warn!(error = %e, "gate_link_send_failed");
        }
    }
}

/// Buzz-stop train; spawned off the worker loop so neither a lane loop
/// nor the dwell tick ever sleeps through it
async fn warn_pulses(link_tx: mpsc::Sender<LinkCmd>, pulses: u32, pulse: Duration) {
    for _ in 0..pulses {
        for cmd in [LinkCmd::Warn, LinkCmd::GateClose] {
            if let Err(e) = link_tx.send(cmd).await {
                warn!(error = %e, "gate_link_send_failed");
                return;
            }
            tokio::time::sleep(pulse).await;
        }
    }
    info!(pulses = %pulses, "gate_warn_pulses_sent");
}

/// Create a gate command channel and worker.
/// Returns the sender (for a lane engine) and the worker (to be spawned).
pub fn create_gate_worker(
    link_tx: mpsc::Sender<LinkCmd>,
    dwell: Duration,
    tick: Duration,
    buffer_size: usize,
) -> (mpsc::Sender<GateCmd>, GateWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    let worker = GateWorker::new(cmd_rx, link_tx, dwell, tick);
    (cmd_tx, worker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_cycle_transitions() {
        let mut machine = GateStateMachine::new(Duration::from_secs(15));
        let t0 = Instant::now();

        assert_eq!(machine.state(), GateState::Closed);
        assert!(matches!(machine.request_open(t0), Some(LinkCmd::GateOpen)));
        assert_eq!(machine.state(), GateState::Open);

        // Dwell not yet expired
        assert!(machine.tick(t0 + Duration::from_secs(14)).is_none());
        assert_eq!(machine.state(), GateState::Open);

        // Dwell expired: close and return to rest
        assert!(matches!(
            machine.tick(t0 + Duration::from_secs(15)),
            Some(LinkCmd::GateClose)
        ));
        assert_eq!(machine.state(), GateState::Closed);
    }

    #[test]
    fn test_reopen_extends_dwell() {
        let mut machine = GateStateMachine::new(Duration::from_secs(15));
        let t0 = Instant::now();

        machine.request_open(t0);
        // Second request mid-dwell emits nothing but pushes the deadline
        assert!(machine.request_open(t0 + Duration::from_secs(10)).is_none());

        assert!(machine.tick(t0 + Duration::from_secs(20)).is_none());
        assert!(machine.tick(t0 + Duration::from_secs(25)).is_some());
    }

    #[test]
    fn test_tick_when_closed_is_noop() {
        let mut machine = GateStateMachine::new(Duration::from_secs(15));
        assert!(machine.tick(Instant::now()).is_none());
        assert_eq!(machine.state(), GateState::Closed);
    }

    #[tokio::test]
    async fn test_worker_emits_open_then_close() {
        let (link_tx, mut link_rx) = mpsc::channel(16);
        let (cmd_tx, worker) = create_gate_worker(
            link_tx,
            Duration::from_millis(30),
            Duration::from_millis(10),
            8,
        );
        let handle = tokio::spawn(worker.run());

        cmd_tx.send(GateCmd::OpenCycle).await.unwrap();

        assert!(matches!(link_rx.recv().await, Some(LinkCmd::GateOpen)));
        assert!(matches!(link_rx.recv().await, Some(LinkCmd::GateClose)));

        drop(cmd_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_warn_train_does_not_delay_dwell_close() {
        let (link_tx, mut link_rx) = mpsc::channel(64);
        let (cmd_tx, worker) = create_gate_worker(
            link_tx,
            Duration::from_millis(40),
            Duration::from_millis(10),
            8,
        );
        let handle = tokio::spawn(worker.run());

        // A slow train (1.2 s total) queued right after the open cycle
        cmd_tx.send(GateCmd::OpenCycle).await.unwrap();
        cmd_tx
            .send(GateCmd::WarnPulse { pulses: 3, pulse: Duration::from_millis(200) })
            .await
            .unwrap();

        // The dwell-expiry close byte must land long before the train's
        // first stop byte at ~200 ms
        let start = std::time::Instant::now();
        loop {
            match link_rx.recv().await.unwrap() {
                LinkCmd::GateClose => break,
                _ => {}
            }
        }
        assert!(start.elapsed() < Duration::from_millis(150));

        drop(cmd_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_warn_train() {
        let (link_tx, mut link_rx) = mpsc::channel(16);
        let (cmd_tx, worker) = create_gate_worker(
            link_tx,
            Duration::from_secs(15),
            Duration::from_millis(50),
            8,
        );
        let handle = tokio::spawn(worker.run());

        cmd_tx
            .send(GateCmd::WarnPulse { pulses: 2, pulse: Duration::from_millis(5) })
            .await
            .unwrap();

        let mut cmds = Vec::new();
        for _ in 0..4 {
            cmds.push(link_rx.recv().await.unwrap());
        }
        assert!(matches!(cmds[0], LinkCmd::Warn));
        assert!(matches!(cmds[1], LinkCmd::GateClose));
        assert!(matches!(cmds[2], LinkCmd::Warn));
        assert!(matches!(cmds[3], LinkCmd::GateClose));

        drop(cmd_tx);
        handle.await.unwrap();
    }
}
