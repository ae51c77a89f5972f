//! Vision feed listener
//!
//! The detection/OCR process runs out of band (it owns the camera, the
//! proximity trigger, and the model) and connects here per lane, writing
//! one raw candidate string per line. The core only ever sees text.
//!
//! Lines are forwarded with try_send so a slow lane never blocks the
//! socket task; drops are counted in metrics.

use crate::domain::types::LaneEvent;
use crate::infra::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Vision listener configuration for one lane
#[derive(Debug, Clone)]
pub struct VisionListenerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for VisionListenerConfig {
    fn default() -> Self {
        Self { port: 25901, enabled: true }
    }
}

/// Start the vision feed listener for a lane
pub async fn start_vision_listener(
    config: VisionListenerConfig,
    event_tx: mpsc::Sender<LaneEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("vision_listener_disabled");
        return Ok(());
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %config.port, "vision_listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("vision_listener_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let tx = event_tx.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_vision_connection(socket, addr, tx, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "vision_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_vision_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    event_tx: mpsc::Sender<LaneEvent>,
    metrics: Arc<Metrics>,
) {
    let peer_ip = addr.ip().to_string();
    debug!(ip = %peer_ip, "vision_connection_accepted");

    let reader = BufReader::new(socket);
    let mut lines = reader.lines();

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    while let Ok(Some(line)) = lines.next_line().await {
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        metrics.record_candidate_received();
        match event_tx.try_send(LaneEvent::PlateCandidate(raw.to_string())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_candidate_dropped();
                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(peer_ip = %peer_ip, "vision_candidate_dropped: channel full");
                    last_drop_warn = Instant::now();
                }
            }
            Err(TrySendError::Closed(_)) => {
                warn!(peer_ip = %peer_ip, "vision_event_channel_closed");
                break;
            }
        }
    }

    debug!(peer_ip = %peer_ip, "vision_connection_closed");
}
