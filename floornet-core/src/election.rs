//! Leaderless-bootstrap leader election over periodic gossip.
//!
//! Every node starts as leader and backs off once it hears a peer with a
//! lexicographically lower address. Rules per tick:
//! - no peer heard for `peer_timeout`: desire leadership (sole survivor)
//! - lowest address not heard for `peer_timeout`: forget it, so a lost
//!   leader is replaced even while other peers keep gossiping
//! - otherwise: desire leadership iff own address <= lowest address heard
//!
//! A desired role only takes effect once it has held continuously for
//! `role_switch`; any tick where the desire matches the current role cancels
//! the pending switch. One dropped gossip packet therefore never flips a
//! role. Brief dual leadership during partition/merge is tolerated.
//!
//! Convergence: one leader per partition within
//! `peer_timeout + role_switch` of the last topology change.

use crate::types::{Millis, NodeAddress, Rank, Role};
use tracing::{debug, info, trace, warn};

/// Fall back to self after this long without hearing any peer (ms)
pub const PEER_TIMEOUT_MS: Millis = 3000;

/// A desired role change must hold this long before it commits (ms)
pub const ROLE_SWITCH_MS: Millis = 1000;

/// Election timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionConfig {
    pub peer_timeout: Millis,
    pub role_switch: Millis,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            peer_timeout: PEER_TIMEOUT_MS,
            role_switch: ROLE_SWITCH_MS,
        }
    }
}

/// Role change waiting out the hysteresis window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSwitch {
    pub desired_leader: bool,
    pub since: Millis,
}

/// Election state machine
#[derive(Debug, Clone)]
pub struct Election {
    address: NodeAddress,
    rank: Rank,
    lowest_seen: NodeAddress,
    lowest_seen_at: Option<Millis>,
    last_peer_seen: Option<Millis>,
    is_leader: bool,
    pending: Option<PendingSwitch>,
    config: ElectionConfig,
}

impl Election {
    pub fn new(address: NodeAddress, config: ElectionConfig) -> Self {
        Self {
            address,
            rank: address.rank(),
            lowest_seen: address,
            lowest_seen_at: None,
            last_peer_seen: None,
            is_leader: true,
            pending: None,
            config,
        }
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn role(&self) -> Role {
        Role::from_leader(self.is_leader)
    }

    /// Best (lowest) address heard within the peer timeout
    pub fn lowest_seen(&self) -> NodeAddress {
        self.lowest_seen
    }

    /// When gossip from [`Election::lowest_seen`] last arrived
    pub fn lowest_seen_at(&self) -> Option<Millis> {
        self.lowest_seen_at
    }

    pub fn last_peer_seen(&self) -> Option<Millis> {
        self.last_peer_seen
    }

    pub fn pending(&self) -> Option<PendingSwitch> {
        self.pending
    }

    /// Record gossip from a peer in our site. Our own looped-back
    /// broadcasts are ignored.
    pub fn observe_peer(&mut self, peer: NodeAddress, now: Millis) {
        if peer == self.address {
            trace!("Election: ignoring own gossip");
            return;
        }
        if self.lowest_stale(now) {
            debug!("Election: lowest address {} went silent", self.lowest_seen);
            self.lowest_seen = self.address;
            self.lowest_seen_at = None;
        }
        if peer < self.lowest_seen {
            debug!("Election: new lowest address {} (was {})", peer, self.lowest_seen);
            self.lowest_seen = peer;
        }
        if peer == self.lowest_seen {
            self.lowest_seen_at = Some(now);
        }
        self.last_peer_seen = Some(now);
    }

    fn timed_out(&self, seen: Option<Millis>, now: Millis) -> bool {
        match seen {
            None => true,
            Some(seen) => now.saturating_sub(seen) > self.config.peer_timeout,
        }
    }

    fn peer_timed_out(&self, now: Millis) -> bool {
        self.timed_out(self.last_peer_seen, now)
    }

    /// A lower address we have not heard from for `peer_timeout`
    fn lowest_stale(&self, now: Millis) -> bool {
        self.lowest_seen != self.address && self.timed_out(self.lowest_seen_at, now)
    }

    /// Role this node would take if there were no hysteresis
    pub fn desired_leader(&self, now: Millis) -> bool {
        if self.peer_timed_out(now) || self.lowest_stale(now) {
            true
        } else {
            self.address <= self.lowest_seen
        }
    }

    /// Re-evaluate leadership. Returns the new role when a switch commits.
    pub fn tick(&mut self, now: Millis) -> Option<Role> {
        let desired = self.desired_leader(now);

        if desired == self.is_leader {
            if self.pending.take().is_some() {
                trace!("Election: pending switch cancelled, desired role already held");
            }
            return None;
        }

        match self.pending {
            Some(p) if p.desired_leader == desired => {
                if now.saturating_sub(p.since) < self.config.role_switch {
                    return None;
                }
            }
            _ => {
                if desired && self.peer_timed_out(now) && self.last_peer_seen.is_some() {
                    info!("Election: peer timeout exceeded, candidate leadership");
                } else if desired && self.lowest_stale(now) {
                    info!("Election: leader {} silent, candidate leadership", self.lowest_seen);
                }
                info!(
                    "Election: role change pending -> {} (waiting {}ms)",
                    Role::from_leader(desired),
                    self.config.role_switch
                );
                self.pending = Some(PendingSwitch { desired_leader: desired, since: now });
                return None;
            }
        }

        self.is_leader = desired;
        self.pending = None;
        if self.is_leader {
            self.lowest_seen = self.address;
            self.lowest_seen_at = None;
        }
        warn!("Election: role changed to {} at t={}ms", self.role(), now);
        Some(self.role())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> NodeAddress {
        NodeAddress([0x24, 0x6F, 0x28, 0x00, 0x00, last])
    }

    #[test]
    fn test_starts_as_leader() {
        let election = Election::new(addr(5), ElectionConfig::default());
        assert!(election.is_leader());
        assert_eq!(election.lowest_seen(), addr(5));
        assert_eq!(election.rank(), 5);
    }

    #[test]
    fn test_lone_node_stays_leader() {
        let mut election = Election::new(addr(5), ElectionConfig::default());
        for t in (0..10_000).step_by(100) {
            assert_eq!(election.tick(t), None);
        }
        assert!(election.is_leader());
    }

    #[test]
    fn test_steps_down_after_hysteresis() {
        let mut election = Election::new(addr(5), ElectionConfig::default());

        election.observe_peer(addr(1), 0);
        assert!(!election.desired_leader(0));
        assert_eq!(election.tick(0), None);
        assert!(election.is_leader());

        election.observe_peer(addr(1), 500);
        assert_eq!(election.tick(999), None);
        assert!(election.is_leader());

        assert_eq!(election.tick(1000), Some(Role::Follower));
        assert!(!election.is_leader());
    }

    #[test]
    fn test_higher_peer_does_not_demote() {
        let mut election = Election::new(addr(5), ElectionConfig::default());
        election.observe_peer(addr(9), 0);
        assert!(election.desired_leader(0));
        assert_eq!(election.tick(2000), None);
        assert!(election.is_leader());
    }

    #[test]
    fn test_own_gossip_ignored() {
        let mut election = Election::new(addr(5), ElectionConfig::default());
        election.observe_peer(addr(5), 0);
        assert_eq!(election.last_peer_seen(), None);
    }

    #[test]
    fn test_reclaims_leadership_after_peer_timeout() {
        let mut election = Election::new(addr(5), ElectionConfig::default());
        election.observe_peer(addr(1), 0);
        election.tick(0);
        assert_eq!(election.tick(1000), Some(Role::Follower));

        // lower peer goes silent
        assert_eq!(election.tick(3000), None);
        assert!(election.desired_leader(3001));
        assert_eq!(election.tick(3001), None);
        assert_eq!(election.tick(4000), None);
        assert_eq!(election.tick(4001), Some(Role::Leader));
        assert_eq!(election.lowest_seen(), addr(5));
    }

    #[test]
    fn test_silent_lowest_expires_while_others_gossip() {
        // 1 < 5 < 9: node 5 keeps hearing 9 after 1 disappears
        let mut election = Election::new(addr(5), ElectionConfig::default());
        election.observe_peer(addr(1), 0);
        election.observe_peer(addr(9), 0);
        election.tick(0);
        assert_eq!(election.tick(1000), Some(Role::Follower));

        let mut t = 1000;
        while t <= 3000 {
            election.observe_peer(addr(9), t);
            assert_eq!(election.tick(t), None);
            t += 100;
        }
        assert!(!election.desired_leader(3000));
        assert!(election.desired_leader(3001));

        election.observe_peer(addr(9), 3100);
        assert_eq!(election.lowest_seen(), addr(5));
        assert_eq!(election.tick(3100), None);
        election.observe_peer(addr(9), 4100);
        assert_eq!(election.tick(4100), Some(Role::Leader));
    }

    #[test]
    fn test_higher_survivor_follows_next_lowest() {
        let mut election = Election::new(addr(9), ElectionConfig::default());
        election.observe_peer(addr(1), 0);
        election.observe_peer(addr(5), 0);
        assert_eq!(election.lowest_seen(), addr(1));
        assert_eq!(election.lowest_seen_at(), Some(0));

        // 1 silent, 5 still gossiping: 5 takes over as the lowest heard
        election.observe_peer(addr(5), 3500);
        assert_eq!(election.lowest_seen(), addr(5));
        assert_eq!(election.lowest_seen_at(), Some(3500));
        assert!(!election.desired_leader(3500));
    }

    #[test]
    fn test_pending_cancelled_when_desire_reverts() {
        let config = ElectionConfig { peer_timeout: 3000, role_switch: 1000 };
        let mut election = Election::new(addr(5), config);

        election.observe_peer(addr(1), 0);
        election.tick(0);
        election.tick(1000);
        assert!(!election.is_leader());

        // follower starts wanting leadership after timeout...
        election.tick(3500);
        assert!(election.pending().is_some());
        // ...then hears the lower peer again before the window closes
        election.observe_peer(addr(1), 3800);
        assert_eq!(election.tick(3800), None);
        assert!(election.pending().is_none());
        assert_eq!(election.tick(4600), None);
        assert!(!election.is_leader());
    }
}
