//! Peer table and address set
//!
//! Both are owned by the reconciliation task and never shared, so they need
//! no locking.

use std::collections::{BTreeSet, HashMap};

use kubegroup_core::types::{peer_address, PeerChange, PeerInfo};

/// Pod name → last known IP.
///
/// Holds an entry only for pods seen at least once with an address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerTable {
    entries: HashMap<String, String>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, address: &str) {
        if address.is_empty() {
            return;
        }
        self.entries.insert(name.to_string(), address.to_string());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Peer addresses (`host:port`) of the currently ready pods.
///
/// The local address is always part of the published set; changes naming it
/// are ignored.
#[derive(Debug, Clone)]
pub struct AddressSet {
    port_suffix: String,
    self_address: String,
    peers: BTreeSet<String>,
}

impl AddressSet {
    /// `self_ip` is the bare local IP, `port_suffix` e.g. ":5000"
    pub fn new(self_ip: &str, port_suffix: &str) -> Self {
        Self {
            port_suffix: port_suffix.to_string(),
            self_address: peer_address(self_ip, port_suffix),
            peers: BTreeSet::new(),
        }
    }

    /// Apply one change. Returns whether membership actually changed.
    pub fn apply(&mut self, change: &PeerChange) -> bool {
        let address = peer_address(&change.address, &self.port_suffix);
        if address == self.self_address {
            return false;
        }
        if change.added {
            self.peers.insert(address)
        } else {
            self.peers.remove(&address)
        }
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// Number of published peers, self included
    pub fn peer_count(&self) -> usize {
        self.peers.len() + 1
    }

    pub fn contains(&self, address: &str) -> bool {
        address == self.self_address || self.peers.contains(address)
    }

    /// Full sorted list of peer addresses, self included
    pub fn addresses(&self) -> Vec<String> {
        let mut all: BTreeSet<&str> = self.peers.iter().map(String::as_str).collect();
        all.insert(&self.self_address);
        all.into_iter().map(str::to_string).collect()
    }

    /// Full list with the local entry tagged
    pub fn peer_infos(&self) -> Vec<PeerInfo> {
        self.addresses()
            .into_iter()
            .map(|address| {
                let is_self = address == self.self_address;
                PeerInfo { address, is_self }
            })
            .collect()
    }
}
