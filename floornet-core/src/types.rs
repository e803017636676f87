//! Core types for the floornet protocol

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default capacity per level (floors, rooms per floor, sensors per kind)
pub const DEFAULT_CAPACITY: usize = 8;

/// Largest capacity an id of one byte can address
pub const MAX_CAPACITY: usize = 256;

/// Hard payload cap of the broadcast radio link
pub const MAX_FRAME_LEN: usize = 250;

/// Maximum number of `/`-separated segments in a topic
pub const MAX_TOPIC_SEGMENTS: usize = 12;

// ============================================================================
// Basic Types
// ============================================================================

/// Monotonic milliseconds since process start
pub type Millis = u64;

/// Wall-clock seconds, as carried in `ts` fields
pub type UnixSeconds = u32;

/// Election rank derived from the node address (lower is preferred)
pub type Rank = u32;

/// Six-byte hardware address of a floor node.
///
/// Ordering is lexicographic over the bytes, which is what the election
/// compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeAddress(pub [u8; 6]);

impl NodeAddress {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Rank is the low three bytes as a 24-bit integer
    pub fn rank(&self) -> Rank {
        ((self.0[3] as u32) << 16) | ((self.0[4] as u32) << 8) | self.0[5] as u32
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl std::str::FromStr for NodeAddress {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for slot in out.iter_mut() {
            let part = parts.next().ok_or(())?;
            if part.len() != 2 {
                return Err(());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ())?;
        }
        if parts.next().is_some() {
            return Err(());
        }
        Ok(Self(out))
    }
}

/// Leadership role of a floor node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Leader,
    Follower,
}

impl Role {
    pub fn from_leader(is_leader: bool) -> Self {
        if is_leader {
            Role::Leader
        } else {
            Role::Follower
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => write!(f, "LEADER"),
            Role::Follower => write!(f, "FOLLOWER"),
        }
    }
}

/// Fan-out limits of the state model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capacity {
    pub floors: usize,
    pub rooms: usize,
    pub sensors: usize,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            floors: DEFAULT_CAPACITY,
            rooms: DEFAULT_CAPACITY,
            sensors: DEFAULT_CAPACITY,
        }
    }
}

/// Site and namespace that prefix every cloud topic (`<site>/<namespace>/`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudNamespace {
    pub site: String,
    pub namespace: String,
}

impl CloudNamespace {
    pub fn new(site: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            namespace: namespace.into(),
        }
    }

    /// Prefix including the trailing slash
    pub fn prefix(&self) -> String {
        format!("{}/{}/", self.site, self.namespace)
    }
}

impl Default for CloudNamespace {
    fn default() -> Self {
        Self::new("ELEC520", "security")
    }
}
