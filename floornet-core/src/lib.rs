//! Floornet Core Library
//!
//! Coordination core for floor controller nodes in a building security
//! system. Nodes on one floor share a lossy broadcast medium, elect a single
//! leader without a bootstrap node, flood room sensor readings to each other,
//! and the leader forwards per-floor summaries to a cloud broker.
//!
//! Platform I/O is reached only through the traits in [`hal`]; [`sim`]
//! provides in-memory implementations.

pub mod types;
pub mod error;
pub mod model;
pub mod codec;
pub mod dedup;
pub mod gossip;
pub mod election;
pub mod hal;
pub mod session;
pub mod config;
pub mod coordinator;
pub mod sim;

pub use types::*;
pub use error::{ConfigError, DecodeError, Error, ModelError, Result, SessionError, TransportError};
pub use model::{ArmState, KeypadState, StateModel, Update};
pub use codec::{BoolLiterals, Header, RoomKey, COMPACT_LITERALS, TOPIC_LITERALS};
pub use dedup::DedupCache;
pub use gossip::GossipMessage;
pub use election::{Election, ElectionConfig};
pub use hal::{Clock, Frame, NetworkSession, SensorBus, Transport};
pub use session::BrokerLink;
pub use config::{BrokerConfig, NodeConfig};
pub use coordinator::{Coordinator, NodeStats};
