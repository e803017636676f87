//! Collaborator interfaces the coordinator drives
//!
//! The core performs no I/O itself. A platform supplies:
//! - [`Clock`]: monotonic milliseconds (and wall-clock seconds if known)
//! - [`Transport`]: single-hop broadcast medium shared by all floor nodes
//! - [`NetworkSession`]: long-range broker session, only used while leader
//! - [`SensorBus`]: room sensor boards, each answering with one text line
//!
//! # Implementing a Transport
//!
//! Receive callbacks may fire asynchronously with respect to the tick. Do
//! not touch the coordinator from them: queue the frame and hand it out
//! from [`Transport::try_recv`], which the coordinator drains each tick.
//!
//! ```ignore
//! struct RadioTransport { rx: Receiver<Frame>, radio: Radio }
//!
//! impl Transport for RadioTransport {
//!     fn send_broadcast(&mut self, frame: &[u8]) -> Result<(), TransportError> {
//!         self.radio.send(BROADCAST, frame).map_err(|_| TransportError::NotReady)
//!     }
//!     fn reinit(&mut self) -> Result<(), TransportError> { self.radio.restart() }
//!     fn try_recv(&mut self) -> Option<Frame> { self.rx.try_recv().ok() }
//! }
//! ```

use crate::config::BrokerConfig;
use crate::error::{SessionError, TransportError};
use crate::types::{Millis, UnixSeconds};

/// Time source
pub trait Clock {
    /// Monotonic milliseconds
    fn now_ms(&self) -> Millis;

    /// Wall-clock seconds, if the platform has a synchronized clock
    fn unix_seconds(&self) -> Option<UnixSeconds> {
        None
    }
}

/// A frame received from the broadcast medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Link-level sender description, for logging only
    pub source: String,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn new(source: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            bytes: bytes.into(),
        }
    }
}

/// Single-hop broadcast medium
pub trait Transport {
    /// Broadcast a frame to every node in range
    fn send_broadcast(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Tear down and bring the transport back up
    fn reinit(&mut self) -> Result<(), TransportError>;

    /// Next queued inbound frame (non-blocking)
    fn try_recv(&mut self) -> Option<Frame>;
}

/// Long-range broker session.
///
/// `connect` must be a bounded attempt, not a blocking wait: it shares the
/// thread with gossip and sensor polling.
pub trait NetworkSession {
    fn connect(&mut self, broker: &BrokerConfig) -> Result<(), SessionError>;

    fn disconnect(&mut self);

    fn connected(&self) -> bool;

    fn publish(&mut self, topic: &str, payload: &str) -> bool;

    /// Service the session (keepalives, inbound traffic)
    fn poll(&mut self);
}

/// Room sensor bus
pub trait SensorBus {
    /// Ask `endpoint` for `request_len` bytes and return the line it
    /// answered, at most `max_len` bytes. Empty means no data.
    fn read_line(&mut self, endpoint: u8, request_len: usize, max_len: usize) -> Vec<u8>;
}
