//! Floor node coordinator
//!
//! Owns the state model, election, dedup cache and broker link, and drives
//! the platform collaborators from a single cooperative [`Coordinator::tick`].
//! Each tick, in order:
//!
//! 1. drain inbound frames (gossip feeds the election, other payloads are
//!    deduplicated and decoded as room lines)
//! 2. re-evaluate leadership
//! 3. bring the broker session in line with the role
//! 4. gossip, if the jittered period elapsed
//! 5. poll the room sensor bus and flood fresh lines
//! 6. re-broadcast one cached room line (round robin)
//! 7. leader only: publish one summary per present floor
//!
//! Nothing here blocks; timers are "has the period elapsed" checks against
//! the clock.

use crate::codec::{decode_room, encode_floor, floor_summary_topic, RoomKey, COMPACT_LITERALS};
use crate::config::{NodeConfig, SensorConfig};
use crate::dedup::DedupCache;
use crate::election::Election;
use crate::error::{ConfigError, DecodeError, TransportError};
use crate::gossip::{is_gossip, GossipMessage};
use crate::hal::{Clock, Frame, NetworkSession, SensorBus, Transport};
use crate::model::StateModel;
use crate::session::BrokerLink;
use crate::types::{CloudNamespace, Millis, NodeAddress, Role, MAX_FRAME_LEN};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub gossip_sent: u64,
    pub gossip_received: u64,
    pub foreign_site: u64,
    pub rooms_sent: u64,
    pub rooms_received: u64,
    pub duplicates: u64,
    pub decode_errors: u64,
    pub send_errors: u64,
    pub summaries: u64,
}

fn due(last: Option<Millis>, now: Millis, period: Millis) -> bool {
    last.map_or(true, |at| now.saturating_sub(at) >= period)
}

/// One floor controller node
pub struct Coordinator<T, S, B, C> {
    config: NodeConfig,
    namespace: CloudNamespace,
    model: StateModel,
    election: Election,
    dedup: DedupCache,
    link: BrokerLink,
    stats: NodeStats,

    transport: T,
    session: S,
    bus: B,
    clock: C,

    gossip_period: Millis,
    heartbeat: u32,
    room_cache: Vec<Option<String>>,
    regossip_cursor: usize,

    last_gossip: Option<Millis>,
    last_poll: Option<Millis>,
    last_regossip: Option<Millis>,
    last_summary: Option<Millis>,
    last_status: Option<Millis>,
}

impl<T, S, B, C> Coordinator<T, S, B, C>
where
    T: Transport,
    S: NetworkSession,
    B: SensorBus,
    C: Clock,
{
    /// Build a node. Rejects an invalid configuration.
    pub fn new(
        config: NodeConfig,
        address: NodeAddress,
        transport: T,
        session: S,
        bus: B,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let election = Election::new(address, config.election());
        let gossip_period = config.timing.gossip_base_ms
            + Millis::from(election.rank()) % config.timing.gossip_jitter_ms;

        info!(
            "Node {} floor={} rank={} gossip every {}ms",
            address,
            config.floor_id,
            election.rank(),
            gossip_period
        );

        Ok(Self {
            namespace: config.namespace(),
            model: StateModel::new(config.capacity),
            dedup: DedupCache::new(config.dedup.capacity, config.dedup.ttl_ms),
            link: BrokerLink::new(config.broker.clone(), config.backoff()),
            stats: NodeStats::default(),
            room_cache: vec![None; config.capacity.rooms],
            regossip_cursor: 0,
            election,
            gossip_period,
            heartbeat: 0,
            transport,
            session,
            bus,
            clock,
            last_gossip: None,
            last_poll: None,
            last_regossip: None,
            last_summary: None,
            last_status: None,
            config,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn model(&self) -> &StateModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut StateModel {
        &mut self.model
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    pub fn role(&self) -> Role {
        self.election.role()
    }

    pub fn is_leader(&self) -> bool {
        self.election.is_leader()
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    pub fn link(&self) -> &BrokerLink {
        &self.link
    }

    /// Gossip period after jitter
    pub fn gossip_period(&self) -> Millis {
        self.gossip_period
    }

    /// Cached room line for a slot
    pub fn cached_room(&self, slot: usize) -> Option<&str> {
        self.room_cache.get(slot)?.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one cooperative step
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        while let Some(frame) = self.transport.try_recv() {
            self.handle_frame(&frame, now);
        }

        if let Some(role) = self.election.tick(now) {
            info!("Floor {} node is now {}", self.config.floor_id, role);
        }

        self.link.ensure(self.election.role(), &mut self.session, now);

        if due(self.last_gossip, now, self.gossip_period) {
            self.last_gossip = Some(now);
            self.send_gossip();
        }

        if due(self.last_poll, now, self.config.timing.sensor_poll_ms) {
            self.last_poll = Some(now);
            self.poll_sensors(now);
        }

        if due(self.last_regossip, now, self.config.timing.room_regossip_ms) {
            self.last_regossip = Some(now);
            self.regossip_room(now);
        }

        if self.election.is_leader()
            && self.session.connected()
            && due(self.last_summary, now, self.config.timing.summary_ms)
        {
            self.last_summary = Some(now);
            self.publish_summaries();
        }

        if self.session.connected() {
            self.session.poll();
        }

        if due(self.last_status, now, self.config.timing.status_interval_ms) {
            self.last_status = Some(now);
            info!(
                "Status: [{}] floor={} addr={} lowest={} broker={}",
                self.election.role(),
                self.config.floor_id,
                self.election.address(),
                self.election.lowest_seen(),
                if self.session.connected() { "up" } else { "down" }
            );
            debug!("Stats: {:?}", self.stats);
        }
    }

    /// Process one frame from the broadcast medium
    pub fn handle_frame(&mut self, frame: &Frame, now: Millis) {
        let bytes = frame.bytes.as_slice();
        if bytes.is_empty() || bytes.len() > MAX_FRAME_LEN {
            trace!("Dropping {}-byte frame from {}", bytes.len(), frame.source);
            return;
        }

        if is_gossip(bytes) {
            let Some(msg) = GossipMessage::from_bytes(bytes) else {
                return;
            };
            if !msg.same_site(&self.config.site) {
                self.stats.foreign_site += 1;
                trace!("Ignoring gossip from foreign site ({})", frame.source);
                return;
            }
            self.stats.gossip_received += 1;
            trace!(
                "Gossip from {} floor={} leader={} hb={}",
                msg.address,
                msg.floor_id,
                msg.is_leader,
                msg.heartbeat
            );
            self.election.observe_peer(msg.address, now);
            return;
        }

        if !self.dedup.admit(bytes, now) {
            self.stats.duplicates += 1;
            trace!("Duplicate payload from {} suppressed", frame.source);
            return;
        }

        let Ok(line) = std::str::from_utf8(bytes) else {
            self.stats.decode_errors += 1;
            debug!("Non-UTF-8 payload from {}", frame.source);
            return;
        };
        match decode_room(&mut self.model, line, COMPACT_LITERALS) {
            Ok(key) => {
                self.stats.rooms_received += 1;
                debug!("Room f{}/r{} updated from {}", key.floor, key.room, frame.source);
            }
            Err(e) => {
                self.stats.decode_errors += 1;
                debug!("Rejected room payload from {}: {}", frame.source, e);
            }
        }
    }

    /// Broadcast with one reinit-and-retry when the transport dropped out
    fn broadcast(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }
        match self.transport.send_broadcast(frame) {
            Err(TransportError::NotReady) => {
                error!("Broadcast failed: transport not initialized, reinitializing");
                self.transport.reinit()?;
                self.transport.send_broadcast(frame)
            }
            other => other,
        }
    }

    fn send_gossip(&mut self) {
        self.heartbeat = self.heartbeat.wrapping_add(1);
        let msg = GossipMessage::new(
            &self.config.site,
            self.config.floor_id,
            self.election.address(),
            self.election.is_leader(),
            self.heartbeat,
        );
        match self.broadcast(&msg.to_bytes()) {
            Ok(()) => self.stats.gossip_sent += 1,
            Err(e) => {
                self.stats.send_errors += 1;
                warn!("Gossip send failed: {}", e);
            }
        }
    }

    /// Flood a room line unless it was sent or heard within the dedup window
    fn send_room_line(&mut self, line: &str, now: Millis) {
        if !self.dedup.admit(line.as_bytes(), now) {
            trace!("Room line suppressed (recent duplicate)");
            return;
        }
        match self.broadcast(line.as_bytes()) {
            Ok(()) => self.stats.rooms_sent += 1,
            Err(e) => {
                self.stats.send_errors += 1;
                warn!("Room broadcast failed: {}", e);
            }
        }
    }

    fn poll_sensors(&mut self, now: Millis) {
        let rooms = self.room_cache.len().max(1);
        let SensorConfig { room_endpoints, line_max, request_len } = self.config.sensors.clone();

        for (slot, endpoint) in room_endpoints.into_iter().enumerate() {
            if endpoint == 0 {
                continue;
            }
            let raw = self.bus.read_line(endpoint, request_len, line_max);
            if raw.is_empty() {
                continue;
            }

            let line = match self.ingest_sensor_line(&raw, line_max) {
                Ok(Some((key, line))) => {
                    debug!("Sensor 0x{:02X}: f{}/r{}", endpoint, key.floor, key.room);
                    line
                }
                Ok(None) => continue,
                Err(e) => {
                    self.stats.decode_errors += 1;
                    warn!("Sensor 0x{:02X}: rejected line: {}", endpoint, e);
                    continue;
                }
            };

            self.room_cache[slot % rooms] = Some(line.clone());
            self.send_room_line(&line, now);
        }
    }

    /// Decode one raw bus line into the model and stamp it with the wall
    /// clock. Returns the trimmed line, or `None` if it was only padding.
    fn ingest_sensor_line(&mut self, raw: &[u8], line_max: usize) -> Result<Option<(RoomKey, String)>, DecodeError> {
        if raw.len() > line_max {
            return Err(DecodeError::TooLong { len: raw.len(), max: line_max });
        }
        let text = std::str::from_utf8(raw)
            .map_err(|_| DecodeError::MalformedToken(String::from_utf8_lossy(raw).into_owned()))?;
        let line = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if line.is_empty() {
            return Ok(None);
        }

        let key = decode_room(&mut self.model, line, COMPACT_LITERALS)?;
        if let Some(ts) = self.clock.unix_seconds() {
            self.model.set_room_timestamp(key.floor, key.room, ts)?;
            self.model.set_floor_timestamp(key.floor, ts)?;
        }
        Ok(Some((key, line.to_string())))
    }

    fn regossip_room(&mut self, now: Millis) {
        if self.room_cache.is_empty() {
            return;
        }
        let slot = self.regossip_cursor;
        self.regossip_cursor = (self.regossip_cursor + 1) % self.room_cache.len();
        if let Some(line) = self.room_cache[slot].clone() {
            self.send_room_line(&line, now);
        }
    }

    fn publish_summaries(&mut self) {
        let floors: Vec<u8> = self.model.floors().map(|(id, _)| id).collect();
        for floor in floors {
            let Some(payload) = encode_floor(&self.model, &self.namespace, floor, COMPACT_LITERALS) else {
                continue;
            };
            let topic = floor_summary_topic(&self.namespace, floor);
            if self.session.publish(&topic, &payload) {
                self.stats.summaries += 1;
                debug!("Published {} ({} bytes)", topic, payload.len());
            } else {
                warn!("Publish to {} failed", topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ManualClock, Medium, MediumPort, RecordingSession, ScriptedBus};

    type Node = Coordinator<MediumPort, RecordingSession, ScriptedBus, ManualClock>;

    fn addr(last: u8) -> NodeAddress {
        NodeAddress([0x24, 0x6F, 0x28, 0x00, 0x00, last])
    }

    fn node(medium: &Medium, last: u8, clock: &ManualClock) -> Node {
        let config = NodeConfig::default();
        Coordinator::new(
            config,
            addr(last),
            medium.attach(format!("n{}", last)),
            RecordingSession::default(),
            ScriptedBus::new(),
            clock.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_gossip_period_jitter() {
        let medium = Medium::new();
        let clock = ManualClock::new(0);
        let n = node(&medium, 77, &clock);
        assert_eq!(n.gossip_period(), 100 + 77 % 50);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let medium = Medium::new();
        let result = Coordinator::new(
            NodeConfig::default().with_floor(200),
            addr(1),
            medium.attach("x"),
            RecordingSession::default(),
            ScriptedBus::new(),
            ManualClock::new(0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_sensor_line_is_decoded_cached_and_flooded() {
        let medium = Medium::new();
        let clock = ManualClock::new(0);
        clock.set_unix(Some(1_700_000_000));
        let mut a = node(&medium, 1, &clock);
        let mut listener = medium.attach("listener");

        a.bus_mut().push(0x22, b"f/1/r/1/cs:1;u/0:87;h/0:1\0\0".to_vec());
        a.tick();

        let room = a.model().room(1, 1).unwrap();
        assert!(room.connected);
        assert_eq!(room.ultra(0).unwrap().value, 87);
        assert_eq!(room.last_update, Some(1_700_000_000));
        assert_eq!(a.model().floor(1).unwrap().last_update, Some(1_700_000_000));
        assert_eq!(a.cached_room(1), Some("f/1/r/1/cs:1;u/0:87;h/0:1"));

        let mut lines = Vec::new();
        while let Some(frame) = listener.try_recv() {
            if !is_gossip(&frame.bytes) {
                lines.push(frame.bytes);
            }
        }
        assert_eq!(lines, vec![b"f/1/r/1/cs:1;u/0:87;h/0:1".to_vec()]);
    }

    #[test]
    fn test_oversized_sensor_line_rejected() {
        let medium = Medium::new();
        let clock = ManualClock::new(0);
        let mut a = node(&medium, 1, &clock);

        let mut line = b"f/1/r/0/cs:1;".to_vec();
        line.resize(200, b'u');
        a.bus_mut().push(0x21, line);
        a.tick();

        assert!(a.model().room(1, 0).is_none());
        assert_eq!(a.cached_room(0), None);
        assert_eq!(a.stats().decode_errors, 1);
        assert_eq!(a.stats().rooms_sent, 0);
        assert_eq!(a.bus_mut().last_request.map(|(_, len)| len), Some(64));
    }

    #[test]
    fn test_ingest_rejects_long_line_and_stamps_time() {
        let medium = Medium::new();
        let clock = ManualClock::new(0);
        let mut a = node(&medium, 1, &clock);

        assert_eq!(
            a.ingest_sensor_line(&[b'x'; 129], 128),
            Err(DecodeError::TooLong { len: 129, max: 128 })
        );
        assert_eq!(a.ingest_sensor_line(b"\0\0 \n", 128), Ok(None));

        clock.set_unix(Some(1_700_000_000));
        let (key, line) = a.ingest_sensor_line(b"f/1/r/2/cs:1\0\0", 128).unwrap().unwrap();
        assert_eq!((key.floor, key.room), (1, 2));
        assert_eq!(line, "f/1/r/2/cs:1");
        assert_eq!(a.model().room(1, 2).unwrap().last_update, Some(1_700_000_000));
        assert_eq!(a.model().floor(1).unwrap().last_update, Some(1_700_000_000));
    }

    #[test]
    fn test_duplicate_room_payload_suppressed() {
        let medium = Medium::new();
        let clock = ManualClock::new(0);
        let mut a = node(&medium, 1, &clock);

        let frame = Frame::new("peer", b"f/2/r/0/cs:1".to_vec());
        a.handle_frame(&frame, 0);
        a.model_mut().set_room_connected(2, 0, false).unwrap();
        a.handle_frame(&frame, 400);

        assert!(!a.model().room(2, 0).unwrap().connected);
        assert_eq!(a.stats().duplicates, 1);

        a.handle_frame(&frame, 1000);
        assert!(a.model().room(2, 0).unwrap().connected);
    }

    #[test]
    fn test_foreign_site_gossip_ignored() {
        let medium = Medium::new();
        let clock = ManualClock::new(0);
        let mut a = node(&medium, 5, &clock);

        let gossip = GossipMessage::new("OTHER", 1, addr(1), true, 1);
        a.handle_frame(&Frame::new("peer", gossip.to_bytes().to_vec()), 0);

        assert_eq!(a.election().last_peer_seen(), None);
        assert_eq!(a.stats().foreign_site, 1);
    }

    #[test]
    fn test_reinit_and_retry_on_not_ready() {
        let medium = Medium::new();
        let clock = ManualClock::new(0);
        let mut a = node(&medium, 1, &clock);
        a.transport_mut().set_ready(false);

        a.tick();

        assert_eq!(a.transport().reinits, 1);
        assert_eq!(a.stats().gossip_sent, 1);
    }

    #[test]
    fn test_leader_publishes_floor_summary() {
        let medium = Medium::new();
        let clock = ManualClock::new(0);
        let mut a = node(&medium, 1, &clock);
        a.bus_mut().push(0x21, b"f/1/r/0/cs:1;u/0:42".to_vec());

        a.tick();

        assert!(a.session().connected());
        assert_eq!(
            a.session().published,
            vec![(
                "ELEC520/security/f/1".to_string(),
                "ELEC520/security/f/1/cs:0;/r/0/cs:1;u/0:42".to_string()
            )]
        );
    }
}
