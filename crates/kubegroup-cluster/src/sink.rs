//! Peer sink adapter
//!
//! The engine always hands the sink a complete snapshot of the peer set,
//! never incremental additions or removals.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use kubegroup_core::types::PeerInfo;

use crate::table::AddressSet;

/// Target that replaces its whole peer list at once
pub trait PeerGroup: Send + Sync {
    fn set(&self, peers: &[String]);
}

/// Target that receives every ready peer tagged with whether it is the
/// local process, and decides its own role from that
#[async_trait]
pub trait PeerSet: Send + Sync {
    async fn set_peers(&self, peers: Vec<PeerInfo>) -> anyhow::Result<()>;
}

/// Where converged peer sets are delivered
#[derive(Clone)]
pub enum PeerSink {
    /// Full-replace shape, self included
    Pool(Arc<dyn PeerGroup>),
    /// Self-aware shape
    Peers(Arc<dyn PeerSet>),
}

impl PeerSink {
    pub fn pool(pool: Arc<dyn PeerGroup>) -> Self {
        PeerSink::Pool(pool)
    }

    pub fn peers(peers: Arc<dyn PeerSet>) -> Self {
        PeerSink::Peers(peers)
    }

    /// Deliver the current snapshot. Sink errors are logged, not returned;
    /// the result tells whether the sink accepted it.
    pub async fn publish(&self, set: &AddressSet) -> bool {
        match self {
            PeerSink::Pool(pool) => {
                let addresses = set.addresses();
                pool.set(&addresses);
                true
            }
            PeerSink::Peers(peers) => match peers.set_peers(set.peer_infos()).await {
                Ok(()) => true,
                Err(e) => {
                    error!("set peers: error: {:#}", e);
                    false
                }
            },
        }
    }
}

impl std::fmt::Debug for PeerSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerSink::Pool(_) => f.write_str("PeerSink::Pool"),
            PeerSink::Peers(_) => f.write_str("PeerSink::Peers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingPeers, RecordingPool};
    use kubegroup_core::types::PeerChange;

    struct FailingPeers;

    #[async_trait]
    impl PeerSet for FailingPeers {
        async fn set_peers(&self, _peers: Vec<PeerInfo>) -> anyhow::Result<()> {
            anyhow::bail!("pool closed")
        }
    }

    #[tokio::test]
    async fn test_pool_receives_full_snapshot() {
        let pool = Arc::new(RecordingPool::default());
        let sink = PeerSink::pool(pool.clone());

        let mut set = AddressSet::new("10.0.0.1", ":5000");
        set.apply(&PeerChange::added("10.0.0.2"));
        assert!(sink.publish(&set).await);

        assert_eq!(pool.count(), 1);
        assert!(pool.last_is(&["10.0.0.1:5000", "10.0.0.2:5000"]));
    }

    #[tokio::test]
    async fn test_peer_set_receives_tagged_self() {
        let peers = Arc::new(RecordingPeers::default());
        let sink = PeerSink::peers(peers.clone());

        let mut set = AddressSet::new("10.0.0.2", ":5000");
        set.apply(&PeerChange::added("10.0.0.1"));
        sink.publish(&set).await;

        let calls = peers.calls.lock();
        assert_eq!(
            calls[0],
            vec![
                PeerInfo { address: "10.0.0.1:5000".into(), is_self: false },
                PeerInfo { address: "10.0.0.2:5000".into(), is_self: true },
            ]
        );
    }

    #[tokio::test]
    async fn test_peer_set_errors_are_swallowed() {
        let sink = PeerSink::peers(Arc::new(FailingPeers));
        let set = AddressSet::new("10.0.0.1", ":5000");
        assert!(!sink.publish(&set).await);
    }
}
