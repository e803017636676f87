//! Gossip frame exchanged between floor nodes
//!
//! Fixed 25-byte little-endian layout, small enough for any radio frame:
//!
//! | field     | bytes |
//! |-----------|-------|
//! | proto     | 1     |
//! | site      | 8     |
//! | floor_id  | 1     |
//! | rank      | 4     |
//! | mac       | 6     |
//! | is_leader | 1     |
//! | hb        | 4     |
//!
//! A frame of exactly this length starting with [`GOSSIP_PROTO`] is gossip;
//! every other frame is an application payload.

use crate::types::{NodeAddress, Rank};

/// Protocol version byte
pub const GOSSIP_PROTO: u8 = 1;

/// Width of the site field (NUL padded)
pub const SITE_LEN: usize = 8;

/// Encoded frame length
pub const GOSSIP_FRAME_LEN: usize = 1 + SITE_LEN + 1 + 4 + 6 + 1 + 4;

/// Periodic election/heartbeat broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipMessage {
    pub site: [u8; SITE_LEN],
    pub floor_id: u8,
    pub rank: Rank,
    pub address: NodeAddress,
    /// Sender's own view of its role (hint only)
    pub is_leader: bool,
    pub heartbeat: u32,
}

/// Pack a site name into the fixed-width field, truncating past 8 bytes
pub fn site_field(site: &str) -> [u8; SITE_LEN] {
    let mut out = [0u8; SITE_LEN];
    let bytes = site.as_bytes();
    let n = bytes.len().min(SITE_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

impl GossipMessage {
    pub fn new(site: &str, floor_id: u8, address: NodeAddress, is_leader: bool, heartbeat: u32) -> Self {
        Self {
            site: site_field(site),
            floor_id,
            rank: address.rank(),
            address,
            is_leader,
            heartbeat,
        }
    }

    /// Site name with NUL padding stripped
    pub fn site(&self) -> &[u8] {
        let end = self.site.iter().position(|b| *b == 0).unwrap_or(SITE_LEN);
        &self.site[..end]
    }

    pub fn same_site(&self, site: &str) -> bool {
        self.site == site_field(site)
    }

    pub fn to_bytes(&self) -> [u8; GOSSIP_FRAME_LEN] {
        let mut out = [0u8; GOSSIP_FRAME_LEN];
        out[0] = GOSSIP_PROTO;
        out[1..9].copy_from_slice(&self.site);
        out[9] = self.floor_id;
        out[10..14].copy_from_slice(&self.rank.to_le_bytes());
        out[14..20].copy_from_slice(&self.address.octets());
        out[20] = self.is_leader as u8;
        out[21..25].copy_from_slice(&self.heartbeat.to_le_bytes());
        out
    }

    /// `None` unless the frame has gossip length and version
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if !is_gossip(bytes) {
            return None;
        }
        let mut site = [0u8; SITE_LEN];
        site.copy_from_slice(&bytes[1..9]);
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[14..20]);

        Some(Self {
            site,
            floor_id: bytes[9],
            rank: u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]),
            address: NodeAddress(mac),
            is_leader: bytes[20] != 0,
            heartbeat: u32::from_le_bytes([bytes[21], bytes[22], bytes[23], bytes[24]]),
        })
    }
}

/// Classify a received frame
pub fn is_gossip(bytes: &[u8]) -> bool {
    bytes.len() == GOSSIP_FRAME_LEN && bytes[0] == GOSSIP_PROTO
}
