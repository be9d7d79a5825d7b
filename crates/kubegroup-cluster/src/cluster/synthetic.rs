//! Synthetic clusters for testing and orchestrator-less environments

use async_trait::async_trait;

use kubegroup_core::resolver;
use kubegroup_core::types::PodRecord;
use kubegroup_core::DEFAULT_NAMESPACE;

use super::{ChannelWatch, Cluster, PodWatch};
use crate::error::ClusterResult;

/// The local process is the only pod, at 127.0.0.1.
///
/// Watches stay open and never emit, which makes it suitable for exercising
/// group start/stop cycles without a live cluster.
#[derive(Debug, Default)]
pub struct BogusCluster;

impl BogusCluster {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Cluster for BogusCluster {
    fn name(&self) -> &'static str {
        "bogus"
    }

    async fn initialize(&self) -> ClusterResult<bool> {
        Ok(true)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodRecord> {
        let address = self.find_self_address().await?;
        Ok(PodRecord::new(name, namespace, address, true))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        _label_selector: &str,
    ) -> ClusterResult<Vec<PodRecord>> {
        let name = resolver::self_pod_name()?;
        Ok(vec![self.get_pod(namespace, &name).await?])
    }

    async fn watch_pods(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> ClusterResult<Box<dyn PodWatch>> {
        Ok(Box::new(ChannelWatch::idle()))
    }

    async fn find_namespace(&self) -> ClusterResult<String> {
        Ok(DEFAULT_NAMESPACE.to_string())
    }

    async fn find_self_address(&self) -> ClusterResult<String> {
        Ok("127.0.0.1".to_string())
    }
}

/// Fixed peers named `pod-0`, `pod-1`, ... plus the local process at `my_addr`
#[derive(Debug, Clone)]
pub struct MockCluster {
    my_addr: String,
    addresses: Vec<String>,
}

impl MockCluster {
    pub fn new(my_addr: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            my_addr: my_addr.into(),
            addresses,
        }
    }
}

#[async_trait]
impl Cluster for MockCluster {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn initialize(&self) -> ClusterResult<bool> {
        Ok(true)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodRecord> {
        Ok(PodRecord::new(name, namespace, self.my_addr.clone(), true))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        _label_selector: &str,
    ) -> ClusterResult<Vec<PodRecord>> {
        Ok(synthetic_pods("pod", namespace, &self.addresses))
    }

    async fn watch_pods(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> ClusterResult<Box<dyn PodWatch>> {
        Ok(Box::new(ChannelWatch::idle()))
    }

    async fn find_namespace(&self) -> ClusterResult<String> {
        Ok(DEFAULT_NAMESPACE.to_string())
    }

    async fn find_self_address(&self) -> ClusterResult<String> {
        Ok(self.my_addr.clone())
    }
}

/// Caller-supplied peer addresses, for local clusters without an orchestrator.
///
/// The local address is resolved from the hostname like on a real node.
#[derive(Debug, Clone)]
pub struct StaticCluster {
    addresses: Vec<String>,
}

impl StaticCluster {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl Cluster for StaticCluster {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn initialize(&self) -> ClusterResult<bool> {
        Ok(false)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodRecord> {
        let address = self.find_self_address().await?;
        Ok(PodRecord::new(name, namespace, address, true))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        _label_selector: &str,
    ) -> ClusterResult<Vec<PodRecord>> {
        Ok(synthetic_pods("static", namespace, &self.addresses))
    }

    async fn watch_pods(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> ClusterResult<Box<dyn PodWatch>> {
        Ok(Box::new(ChannelWatch::idle()))
    }

    async fn find_namespace(&self) -> ClusterResult<String> {
        Ok(DEFAULT_NAMESPACE.to_string())
    }

    async fn find_self_address(&self) -> ClusterResult<String> {
        Ok(resolver::resolve_self_address().await?.address)
    }
}

fn synthetic_pods(prefix: &str, namespace: &str, addresses: &[String]) -> Vec<PodRecord> {
    addresses
        .iter()
        .enumerate()
        .map(|(i, addr)| PodRecord::new(format!("{}-{}", prefix, i), namespace, addr.clone(), true))
        .collect()
}
