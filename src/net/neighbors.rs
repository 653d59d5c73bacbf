//! Neighbor table: ordered, deduplicated peer addresses.
//!
//! Insertion order is preserved because the operator menu addresses
//! neighbors by index. The local address is never admitted.

use super::types::PeerAddr;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

pub struct NeighborTable {
    local: PeerAddr,
    peers: Mutex<Vec<PeerAddr>>,
}

impl NeighborTable {
    pub fn new(local: PeerAddr) -> Self {
        Self { local, peers: Mutex::new(Vec::new()) }
    }

    /// Insert if absent. Returns true when the table changed.
    pub async fn add(&self, addr: PeerAddr) -> bool {
        if addr == self.local {
            debug!("refusing to add self to the neighbor table");
            return false;
        }
        let mut peers = self.peers.lock().await;
        if peers.contains(&addr) {
            return false;
        }
        debug!("neighbor added: {addr}");
        peers.push(addr);
        true
    }

    /// Delete if present. Returns true when the table changed.
    pub async fn remove(&self, addr: &PeerAddr) -> bool {
        let mut peers = self.peers.lock().await;
        if let Some(pos) = peers.iter().position(|p| p == addr) {
            peers.remove(pos);
            debug!("neighbor removed: {addr}");
            true
        } else {
            false
        }
    }

    /// Snapshot in insertion order.
    pub async fn list(&self) -> Vec<PeerAddr> {
        self.peers.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Neighbor at the given insertion index, for operator commands.
    pub async fn get(&self, index: usize) -> Option<PeerAddr> {
        self.peers.lock().await.get(index).cloned()
    }

    /// Uniformly random member, if any.
    pub async fn choose_random(&self) -> Option<PeerAddr> {
        let peers = self.peers.lock().await;
        if peers.is_empty() {
            return None;
        }
        let i = rand::thread_rng().gen_range(0..peers.len());
        Some(peers[i].clone())
    }

    /// Uniformly random member whose port differs from `port`, if any.
    pub async fn choose_random_excluding(&self, port: u16) -> Option<PeerAddr> {
        let peers = self.peers.lock().await;
        let eligible: Vec<&PeerAddr> = peers.iter().filter(|p| p.port != port).collect();
        if eligible.is_empty() {
            return None;
        }
        let i = rand::thread_rng().gen_range(0..eligible.len());
        Some(eligible[i].clone())
    }

    /// First neighbor listening on `port`, if any.
    pub async fn find_by_port(&self, port: u16) -> Option<PeerAddr> {
        self.peers.lock().await.iter().find(|p| p.port == port).cloned()
    }
}
