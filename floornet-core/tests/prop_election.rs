//! Property tests for the election state machine
//!
//! Tests invariants for:
//! - Ordering: the lowest address in a partition ends up sole leader
//! - Hysteresis: no role change commits faster than the switch window
//! - Recovery: a silenced follower reclaims leadership

use floornet_core::election::*;
use floornet_core::types::*;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn address() -> impl Strategy<Value = NodeAddress> {
    any::<[u8; 6]>().prop_map(NodeAddress)
}

fn distinct_addresses(n: usize) -> impl Strategy<Value = Vec<NodeAddress>> {
    prop::collection::btree_set(address(), n..=n).prop_map(|s| s.into_iter().collect())
}

/// Drive a fully connected set of nodes that all gossip every `period` ms
fn run_partition(addresses: &[NodeAddress], period: Millis, until: Millis) -> Vec<Election> {
    let mut nodes: Vec<Election> = addresses
        .iter()
        .map(|a| Election::new(*a, ElectionConfig::default()))
        .collect();

    let mut now = 0;
    while now <= until {
        for i in 0..nodes.len() {
            for j in 0..nodes.len() {
                if i != j {
                    let peer = nodes[j].address();
                    nodes[i].observe_peer(peer, now);
                }
            }
        }
        for node in nodes.iter_mut() {
            node.tick(now);
        }
        now += period;
    }
    nodes
}

// ============================================================================
// Convergence
// ============================================================================

proptest! {
    /// CORE INVARIANT: exactly one leader, and it is the lowest address
    #[test]
    fn partition_converges_to_lowest(addresses in (2usize..6).prop_flat_map(distinct_addresses)) {
        let nodes = run_partition(&addresses, 100, PEER_TIMEOUT_MS + ROLE_SWITCH_MS + 200);

        let lowest = addresses.iter().min().copied().unwrap();
        let leaders: Vec<NodeAddress> = nodes.iter().filter(|n| n.is_leader()).map(|n| n.address()).collect();
        prop_assert_eq!(leaders, vec![lowest]);
    }

    /// Rank is a pure function of the address
    #[test]
    fn rank_from_address(addr in address()) {
        let e = Election::new(addr, ElectionConfig::default());
        let o = addr.octets();
        prop_assert_eq!(e.rank(), (o[3] as u32) << 16 | (o[4] as u32) << 8 | o[5] as u32);
    }
}

// ============================================================================
// Hysteresis
// ============================================================================

proptest! {
    /// A lower peer never demotes us before the switch window elapses
    #[test]
    fn no_switch_inside_window(
        addrs in distinct_addresses(2),
        start in 0u64..1_000_000,
        step in 1u64..ROLE_SWITCH_MS,
    ) {
        let (low, high) = (addrs[0], addrs[1]);
        let mut e = Election::new(high, ElectionConfig::default());

        let mut now = start;
        while now < start + ROLE_SWITCH_MS {
            e.observe_peer(low, now);
            prop_assert_eq!(e.tick(now), None);
            prop_assert!(e.is_leader());
            now += step;
        }
        e.observe_peer(low, start + ROLE_SWITCH_MS);
        prop_assert_eq!(e.tick(start + ROLE_SWITCH_MS), Some(Role::Follower));
    }

    /// A single gossip from a lower peer among silence never flips the role
    #[test]
    fn single_packet_tolerated(addrs in distinct_addresses(2), at in 0u64..10_000) {
        let (low, high) = (addrs[0], addrs[1]);

        // peer times out before the window would commit a demotion
        let config = ElectionConfig { peer_timeout: 500, role_switch: 1000 };
        let mut e = Election::new(high, config);
        e.observe_peer(low, at);
        for t in (at..at + 3000).step_by(50) {
            prop_assert_eq!(e.tick(t), None);
        }
        prop_assert!(e.is_leader());
    }

    /// A follower whose lower peer disappears reclaims leadership within
    /// peer_timeout + role_switch (plus one tick)
    #[test]
    fn silenced_follower_reclaims(addrs in distinct_addresses(2)) {
        let (low, high) = (addrs[0], addrs[1]);
        let mut e = Election::new(high, ElectionConfig::default());

        e.observe_peer(low, 0);
        e.tick(0);
        e.tick(ROLE_SWITCH_MS);
        prop_assert!(!e.is_leader());

        let deadline = PEER_TIMEOUT_MS + ROLE_SWITCH_MS + 100;
        let mut t = ROLE_SWITCH_MS;
        while t <= deadline && !e.is_leader() {
            e.tick(t);
            t += 50;
        }
        prop_assert!(e.is_leader());
        prop_assert_eq!(e.lowest_seen(), high);
    }
}
