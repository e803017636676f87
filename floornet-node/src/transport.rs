//! UDP broadcast transport
//!
//! Stands in for the radio link on a LAN. A background task receives
//! datagrams into a bounded queue which the coordinator drains each tick;
//! sends are non-blocking.

use floornet_core::error::TransportError;
use floornet_core::hal::{Frame, Transport};
use floornet_core::types::MAX_FRAME_LEN;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Default UDP port for floor traffic
pub const DEFAULT_PORT: u16 = 9520;

/// Inbound queue depth; frames past this are dropped
const QUEUE_DEPTH: usize = 256;

/// Pause after a receive error, doubled per consecutive error up to the cap
const RECV_ERROR_BACKOFF_MS: u64 = 10;
const RECV_ERROR_BACKOFF_MAX_MS: u64 = 1000;

fn recv_error_delay(consecutive: u32) -> Duration {
    let factor = 1u64 << consecutive.saturating_sub(1).min(16);
    Duration::from_millis((RECV_ERROR_BACKOFF_MS * factor).min(RECV_ERROR_BACKOFF_MAX_MS))
}

pub struct UdpTransport {
    port: u16,
    targets: Vec<SocketAddr>,
    socket: Option<Arc<UdpSocket>>,
    incoming_tx: mpsc::Sender<Frame>,
    incoming_rx: mpsc::Receiver<Frame>,
    receiver: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Bind `port` and broadcast to `targets`. Must run inside a tokio
    /// runtime.
    pub fn new(port: u16, targets: Vec<SocketAddr>) -> Result<Self, TransportError> {
        let (incoming_tx, incoming_rx) = mpsc::channel(QUEUE_DEPTH);
        let mut transport = Self {
            port,
            targets,
            socket: None,
            incoming_tx,
            incoming_rx,
            receiver: None,
        };
        transport.bind()?;
        Ok(transport)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref()?.local_addr().ok()
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }

    fn bind(&mut self) -> Result<(), TransportError> {
        let io = |e: std::io::Error| TransportError::Io(e.to_string());

        let std_socket = std::net::UdpSocket::bind(("0.0.0.0", self.port)).map_err(io)?;
        std_socket.set_broadcast(true).map_err(io)?;
        std_socket.set_nonblocking(true).map_err(io)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket).map_err(io)?);

        self.receiver = Some(spawn_receiver(socket.clone(), self.incoming_tx.clone()));
        self.socket = Some(socket);
        info!("UDP transport listening on 0.0.0.0:{}", self.port);
        Ok(())
    }
}

fn spawn_receiver(socket: Arc<UdpSocket>, tx: mpsc::Sender<Frame>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_FRAME_LEN + 1];
        let mut errors = 0u32;

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    errors = 0;
                    trace!("Received {} bytes from {}", len, src);
                    match tx.try_send(Frame::new(src.to_string(), &buf[..len])) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("Inbound queue full, dropping frame from {}", src);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Err(e) => {
                    if tx.is_closed() {
                        break;
                    }
                    errors = errors.saturating_add(1);
                    let delay = recv_error_delay(errors);
                    error!("UDP receive error ({} in a row, retrying in {:?}): {}", errors, delay, e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    })
}

impl Transport for UdpTransport {
    fn send_broadcast(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotReady)?;

        let mut sent = 0;
        for addr in &self.targets {
            match socket.try_send_to(frame, *addr) {
                Ok(_) => sent += 1,
                Err(e) => warn!("Failed to send to {}: {}", addr, e),
            }
        }
        if sent == 0 && !self.targets.is_empty() {
            return Err(TransportError::Io("no target reachable".into()));
        }
        debug!("Broadcast {} bytes to {} target(s)", frame.len(), sent);
        Ok(())
    }

    /// Rebinds only if the socket is gone; a bound UDP socket has no
    /// session state to reset
    fn reinit(&mut self) -> Result<(), TransportError> {
        if self.socket.is_some() && self.receiver.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        warn!("Reinitializing UDP transport");
        if let Some(old) = self.receiver.take() {
            old.abort();
        }
        self.socket = None;
        self.bind()
    }

    fn try_recv(&mut self) -> Option<Frame> {
        self.incoming_rx.try_recv().ok()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.receiver.take() {
            handle.abort();
        }
    }
}
