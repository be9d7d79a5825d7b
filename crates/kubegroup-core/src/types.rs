//! Membership data shapes shared by the cluster capability and the engine

use serde::{Deserialize, Serialize};

/// A pod as seen by the discovery engine.
///
/// Rebuilt from raw orchestrator data on every list or watch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    /// Pod IP, empty when the orchestrator did not report one
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ready: bool,
}

impl PodRecord {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        address: impl Into<String>,
        ready: bool,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            address: address.into(),
            ready,
        }
    }

    pub fn has_address(&self) -> bool {
        !self.address.is_empty()
    }
}

/// Watch event type reported by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Bookmark => "BOOKMARK",
            Self::Error => "ERROR",
        }
    }

    /// Parse the wire representation, `None` for unknown types
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADDED" => Some(Self::Added),
            "MODIFIED" => Some(Self::Modified),
            "DELETED" => Some(Self::Deleted),
            "BOOKMARK" => Some(Self::Bookmark),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object carried by a watch event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Pod(PodRecord),
    /// Anything that is not a pod (status objects, undecodable data)
    Unexpected(String),
}

/// One raw membership event from a watch stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub payload: EventPayload,
}

impl WatchEvent {
    pub fn pod(kind: EventKind, pod: PodRecord) -> Self {
        Self {
            kind,
            payload: EventPayload::Pod(pod),
        }
    }

    pub fn unexpected(kind: EventKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            payload: EventPayload::Unexpected(description.into()),
        }
    }
}

/// Add/remove decision for a single peer address (bare IP)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerChange {
    pub address: String,
    pub added: bool,
}

impl PeerChange {
    pub fn added(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            added: true,
        }
    }

    pub fn removed(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            added: false,
        }
    }
}

/// Peer entry handed to self-aware sinks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    pub address: String,
    pub is_self: bool,
}

/// Identity of the local process, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIdentity {
    pub pod_name: String,
    pub namespace: String,
    pub address: String,
}

/// Build the peer address for a pod IP, e.g. `10.0.0.1` + `:5000`
pub fn peer_address(ip: &str, port_suffix: &str) -> String {
    format!("{}{}", ip, port_suffix)
}

/// Build a peer URL, e.g. `http://10.0.0.1:5000`
pub fn peer_url(ip: &str, port_suffix: &str) -> String {
    format!("http://{}{}", ip, port_suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_wire_names() {
        for kind in [
            EventKind::Added,
            EventKind::Modified,
            EventKind::Deleted,
            EventKind::Bookmark,
            EventKind::Error,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("SYNC"), None);
    }

    #[test]
    fn test_peer_address_formatting() {
        assert_eq!(peer_address("10.0.0.1", ":5000"), "10.0.0.1:5000");
        assert_eq!(peer_url("10.0.0.1", ":5000"), "http://10.0.0.1:5000");
    }

    #[test]
    fn test_pod_record_address() {
        let pod = PodRecord::new("pod-a", "default", "", true);
        assert!(!pod.has_address());
        let pod = PodRecord::new("pod-a", "default", "1.1.1.1", true);
        assert!(pod.has_address());
    }
}
