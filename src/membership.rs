//! Process-local, mutable membership list (§4.3). Read-heavy, written by
//! few paths (heartbeat receipt, election completion, join); a single lock
//! is sufficient and is never held across a network call.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::RwLock;

use crate::error::ReplicaId;

#[derive(Debug, Clone)]
struct State {
    addresses: BTreeMap<ReplicaId, SocketAddr>,
    current_leader_address: Option<SocketAddr>,
}

/// Thread-safe membership list plus the currently-known leader address.
pub struct Membership {
    self_id: ReplicaId,
    self_address: SocketAddr,
    state: RwLock<State>,
}

impl Membership {
    pub fn new(
        self_id: ReplicaId,
        self_address: SocketAddr,
        initial: impl IntoIterator<Item = (ReplicaId, SocketAddr)>,
    ) -> Self {
        let mut addresses: BTreeMap<_, _> = initial.into_iter().collect();
        addresses.insert(self_id, self_address);
        Membership {
            self_id,
            self_address,
            state: RwLock::new(State {
                addresses,
                current_leader_address: None,
            }),
        }
    }

    pub fn self_id(&self) -> ReplicaId {
        self.self_id
    }

    pub fn self_address(&self) -> SocketAddr {
        self.self_address
    }

    /// Snapshot of all known `(id, address)` pairs, including self, sorted
    /// by id.
    pub fn peers(&self) -> Vec<(ReplicaId, SocketAddr)> {
        self.state
            .read()
            .unwrap()
            .addresses
            .iter()
            .map(|(id, addr)| (*id, *addr))
            .collect()
    }

    /// All known peers other than self.
    pub fn other_peers(&self) -> Vec<(ReplicaId, SocketAddr)> {
        self.peers().into_iter().filter(|(id, _)| *id != self.self_id).collect()
    }

    /// Peers with an id strictly lower than self's, used by the elector.
    pub fn lower_id_peers(&self) -> Vec<(ReplicaId, SocketAddr)> {
        self.peers()
            .into_iter()
            .filter(|(id, _)| *id < self.self_id)
            .collect()
    }

    pub fn current_leader_address(&self) -> Option<SocketAddr> {
        self.state.read().unwrap().current_leader_address
    }

    pub fn set_current_leader_address(&self, addr: SocketAddr) {
        self.state.write().unwrap().current_leader_address = Some(addr);
    }

    pub fn set_self_as_leader(&self) {
        self.set_current_leader_address(self.self_address);
    }

    /// Adds (or overwrites the address of) a peer. Used by `JoinCluster` on
    /// the leader and by `membership_update` replication on followers.
    pub fn add_peer(&self, id: ReplicaId, address: SocketAddr) {
        self.state.write().unwrap().addresses.insert(id, address);
    }

    /// Replaces the entire peer list, preserving the known leader address.
    pub fn replace_all(&self, peers: impl IntoIterator<Item = (ReplicaId, SocketAddr)>) {
        let mut state = self.state.write().unwrap();
        state.addresses = peers.into_iter().collect();
        state.addresses.insert(self.self_id, self.self_address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn new_includes_self() {
        let m = Membership::new(1, addr(9001), []);
        assert_eq!(m.peers(), vec![(1, addr(9001))]);
    }

    #[test]
    fn lower_id_peers_excludes_self_and_higher() {
        let m = Membership::new(
            2,
            addr(9002),
            [(1, addr(9001)), (3, addr(9003))],
        );
        assert_eq!(m.lower_id_peers(), vec![(1, addr(9001))]);
    }

    #[test]
    fn other_peers_excludes_self() {
        let m = Membership::new(2, addr(9002), [(1, addr(9001)), (3, addr(9003))]);
        let others: Vec<_> = m.other_peers().into_iter().map(|(id, _)| id).collect();
        assert_eq!(others, vec![1, 3]);
    }

    #[test]
    fn add_peer_then_replace_all() {
        let m = Membership::new(1, addr(9001), []);
        m.add_peer(2, addr(9002));
        assert_eq!(m.peers().len(), 2);

        m.replace_all([(5, addr(9005))]);
        let ids: Vec<_> = m.peers().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 5]);
    }

    #[test]
    fn current_leader_address_tracks_updates() {
        let m = Membership::new(1, addr(9001), []);
        assert_eq!(m.current_leader_address(), None);
        m.set_self_as_leader();
        assert_eq!(m.current_leader_address(), Some(addr(9001)));
    }
}
