//! In-memory collaborators
//!
//! Deterministic stand-ins for the platform: a manual clock, a shared
//! broadcast medium several nodes can attach to, a recording broker session
//! and a scripted sensor bus. Used by tests and by multi-node simulation.

use crate::config::BrokerConfig;
use crate::error::{SessionError, TransportError};
use crate::hal::{Clock, Frame, NetworkSession, SensorBus, Transport};
use crate::types::{Millis, UnixSeconds};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Clock advanced by hand
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
    unix: Rc<Cell<Option<UnixSeconds>>>,
}

impl ManualClock {
    pub fn new(now: Millis) -> Self {
        let clock = Self::default();
        clock.set(now);
        clock
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set_unix(&self, seconds: Option<UnixSeconds>) {
        self.unix.set(seconds);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }

    fn unix_seconds(&self) -> Option<UnixSeconds> {
        self.unix.get()
    }
}

#[derive(Debug, Default)]
struct Station {
    name: String,
    inbox: VecDeque<Frame>,
    linked: bool,
}

/// Shared broadcast medium. Every frame sent by one attached port is queued
/// at every other linked port.
#[derive(Debug, Clone, Default)]
pub struct Medium {
    stations: Rc<RefCell<Vec<Station>>>,
}

impl Medium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, name: impl Into<String>) -> MediumPort {
        let mut stations = self.stations.borrow_mut();
        stations.push(Station {
            name: name.into(),
            inbox: VecDeque::new(),
            linked: true,
        });
        MediumPort {
            stations: Rc::clone(&self.stations),
            index: stations.len() - 1,
            ready: true,
            sent: Vec::new(),
            reinits: 0,
        }
    }

    /// Cut a station off (or reconnect it). Frames to or from an unlinked
    /// station are lost.
    pub fn set_linked(&self, index: usize, linked: bool) {
        if let Some(station) = self.stations.borrow_mut().get_mut(index) {
            station.linked = linked;
        }
    }
}

/// One node's attachment to a [`Medium`]
#[derive(Debug)]
pub struct MediumPort {
    stations: Rc<RefCell<Vec<Station>>>,
    index: usize,
    ready: bool,
    /// Every frame this port put on the air
    pub sent: Vec<Vec<u8>>,
    pub reinits: u32,
}

impl MediumPort {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Simulate a transport that dropped out; the next send fails with
    /// [`TransportError::NotReady`] until [`Transport::reinit`]
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Queue a frame at this port as if a remote node had sent it
    pub fn inject(&self, frame: Frame) {
        if let Some(station) = self.stations.borrow_mut().get_mut(self.index) {
            station.inbox.push_back(frame);
        }
    }
}

impl Transport for MediumPort {
    fn send_broadcast(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.ready {
            return Err(TransportError::NotReady);
        }
        self.sent.push(frame.to_vec());

        let mut stations = self.stations.borrow_mut();
        if !stations[self.index].linked {
            return Ok(());
        }
        let source = stations[self.index].name.clone();
        for (i, station) in stations.iter_mut().enumerate() {
            if i != self.index && station.linked {
                station.inbox.push_back(Frame::new(source.clone(), frame));
            }
        }
        Ok(())
    }

    fn reinit(&mut self) -> Result<(), TransportError> {
        self.reinits += 1;
        self.ready = true;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Frame> {
        self.stations.borrow_mut().get_mut(self.index)?.inbox.pop_front()
    }
}

/// Broker session that records publishes
#[derive(Debug, Default)]
pub struct RecordingSession {
    connected: bool,
    failures_left: u32,
    pub connect_attempts: u32,
    pub polls: u32,
    pub published: Vec<(String, String)>,
}

impl RecordingSession {
    /// Session whose first `failures` connect attempts fail
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: failures,
            ..Default::default()
        }
    }

    /// Simulate the broker dropping the session
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }
}

impl NetworkSession for RecordingSession {
    fn connect(&mut self, _broker: &BrokerConfig) -> Result<(), SessionError> {
        self.connect_attempts += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(SessionError::Unavailable);
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &str) -> bool {
        if !self.connected {
            return false;
        }
        self.published.push((topic.to_string(), payload.to_string()));
        true
    }

    fn poll(&mut self) {
        self.polls += 1;
    }
}

/// Sensor bus answering from per-endpoint queues
#[derive(Debug, Default)]
pub struct ScriptedBus {
    lines: HashMap<u8, VecDeque<Vec<u8>>>,
    pub reads: u32,
    /// `(endpoint, request_len)` of the latest read
    pub last_request: Option<(u8, usize)>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, endpoint: u8, line: impl Into<Vec<u8>>) {
        self.lines.entry(endpoint).or_default().push_back(line.into());
    }
}

impl SensorBus for ScriptedBus {
    fn read_line(&mut self, endpoint: u8, request_len: usize, _max_len: usize) -> Vec<u8> {
        self.reads += 1;
        self.last_request = Some((endpoint, request_len));
        self.lines
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default()
    }
}
