//! Consumer registry for broadcast fan-out
//!
//! Tracks which address each admitted consumer receives broadcasts at.
//! The admission loop is the only writer; the broadcast loop only takes
//! snapshots, so the lock is never held across network I/O.

use log::info;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Outcome of an upsert: fresh registration or a replaced address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Identity was not registered before
    Inserted,
    /// Identity was already registered; carries the evicted address
    Replaced(SocketAddr),
}

/// Identity -> address map shared by the admission and broadcast loops.
///
/// At most one address is associated with an identity at any instant; a
/// later handshake with the same identity supersedes the earlier one, so a
/// stale consumer process stops receiving broadcasts as soon as its
/// replacement connects.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<String, SocketAddr>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity` at `addr`, replacing any previous address.
    pub fn upsert(&self, identity: &str, addr: SocketAddr) -> UpsertOutcome {
        let mut peers = self.peers.lock();
        match peers.insert(identity.to_string(), addr) {
            Some(previous) if previous != addr => {
                info!(
                    "Consumer {} re-registered: {} evicted in favor of {}",
                    identity, previous, addr
                );
                UpsertOutcome::Replaced(previous)
            }
            Some(previous) => UpsertOutcome::Replaced(previous),
            None => UpsertOutcome::Inserted,
        }
    }

    /// Remove `identity` if registered. Removing an unknown identity is a
    /// no-op, not an error (disconnects are fire-and-forget and may repeat).
    pub fn remove(&self, identity: &str) {
        if self.peers.lock().remove(identity).is_some() {
            info!("Consumer {} unregistered", identity);
        }
    }

    /// Copy of the current fan-out set, for iterating without the lock.
    pub fn snapshot(&self) -> Vec<SocketAddr> {
        self.peers.lock().values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Whether `identity` currently maps to an address.
    pub fn contains(&self, identity: &str) -> bool {
        self.peers.lock().contains_key(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let registry = PeerRegistry::new();

        assert_eq!(registry.upsert("a", addr(7001)), UpsertOutcome::Inserted);
        assert_eq!(registry.len(), 1);

        // Same identity from a new address: exactly one entry, second wins
        assert_eq!(
            registry.upsert("a", addr(7002)),
            UpsertOutcome::Replaced(addr(7001))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot(), vec![addr(7002)]);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = PeerRegistry::new();
        registry.upsert("a", addr(7001));

        registry.remove("a");
        assert!(registry.is_empty());

        // Removing again (or an unknown identity) is a no-op
        registry.remove("a");
        registry.remove("never-seen");
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_holds_one_address_per_identity() {
        let registry = PeerRegistry::new();
        registry.upsert("a", addr(7001));
        registry.upsert("b", addr(7002));
        registry.upsert("c", addr(7003));

        let mut addrs = registry.snapshot();
        addrs.sort();
        assert_eq!(addrs, vec![addr(7001), addr(7002), addr(7003)]);
        assert!(registry.contains("b"));
        assert!(!registry.contains("d"));
    }
}
