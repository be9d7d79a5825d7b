//! Cluster capability
//!
//! The engine talks to the orchestrator only through [`Cluster`]. Four
//! implementations are provided:
//!
//! - [`RealCluster`]: the live orchestrator API
//! - [`MockCluster`]: a fixed set of synthetic peers plus the local process
//! - [`BogusCluster`]: the local process alone, for lifecycle and leak testing
//! - [`StaticCluster`]: caller-supplied addresses, for hosts without an orchestrator

mod kube;
mod model;
mod synthetic;

use async_trait::async_trait;
use tokio::sync::mpsc;

use kubegroup_core::types::{PodRecord, WatchEvent};

use crate::error::ClusterResult;

pub use kube::{KubeConfig, RealCluster};
pub use model::decode_watch_line;
pub use synthetic::{BogusCluster, MockCluster, StaticCluster};

/// Access to pod membership in the orchestrator
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Prepare the client. Returns whether the process runs inside the
    /// cluster; not finding in-cluster configuration is not an error.
    async fn initialize(&self) -> ClusterResult<bool>;

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodRecord>;

    async fn list_pods(&self, namespace: &str, label_selector: &str)
        -> ClusterResult<Vec<PodRecord>>;

    async fn watch_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> ClusterResult<Box<dyn PodWatch>>;

    async fn find_namespace(&self) -> ClusterResult<String>;

    async fn find_self_address(&self) -> ClusterResult<String>;
}

/// An open watch on pod membership
#[async_trait]
pub trait PodWatch: Send {
    /// Wait for the next event. `None` means the stream is closed, either
    /// by the remote side or by [`PodWatch::stop`].
    async fn recv(&mut self) -> Option<WatchEvent>;

    /// Release the underlying connection. Later `recv` calls return `None`.
    fn stop(&mut self);
}

/// Watch backed by an in-process channel
pub struct ChannelWatch {
    rx: Option<mpsc::Receiver<WatchEvent>>,
    /// Held by idle watches so the channel never closes on its own
    keepalive: Option<mpsc::Sender<WatchEvent>>,
}

impl ChannelWatch {
    /// A watch that stays open and never emits
    pub fn idle() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            rx: Some(rx),
            keepalive: Some(tx),
        }
    }

    /// A watch fed by the returned sender. Dropping every sender closes it.
    pub fn pair(capacity: usize) -> (Self, mpsc::Sender<WatchEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let watch = Self {
            rx: Some(rx),
            keepalive: None,
        };
        (watch, tx)
    }

    pub fn is_stopped(&self) -> bool {
        self.rx.is_none()
    }
}

#[async_trait]
impl PodWatch for ChannelWatch {
    async fn recv(&mut self) -> Option<WatchEvent> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    fn stop(&mut self) {
        self.keepalive = None;
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
    }
}
