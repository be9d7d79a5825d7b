//! Fakes shared by the unit tests of this crate

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use kubegroup_core::types::{PeerInfo, PodRecord, WatchEvent};

use crate::cluster::{ChannelWatch, Cluster, PodWatch};
use crate::error::{ClusterError, ClusterResult};
use crate::recorder::{Labels, MetricsSink};
use crate::sink::{PeerGroup, PeerSet};

/// Poll `cond` until it holds, failing the test after two seconds
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Full-replace sink keeping every snapshot
#[derive(Default)]
pub struct RecordingPool {
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingPool {
    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last(&self) -> Option<Vec<String>> {
        self.calls.lock().last().cloned()
    }

    pub fn last_is(&self, expected: &[&str]) -> bool {
        self.last()
            .map(|peers| peers == expected.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .unwrap_or(false)
    }
}

impl PeerGroup for RecordingPool {
    fn set(&self, peers: &[String]) {
        self.calls.lock().push(peers.to_vec());
    }
}

/// Self-aware sink keeping every snapshot
#[derive(Default)]
pub struct RecordingPeers {
    pub calls: Mutex<Vec<Vec<PeerInfo>>>,
}

#[async_trait]
impl PeerSet for RecordingPeers {
    async fn set_peers(&self, peers: Vec<PeerInfo>) -> anyhow::Result<()> {
        self.calls.lock().push(peers);
        Ok(())
    }
}

/// Self-aware sink that rejects the `fail_on`-th delivery (1-based)
pub struct FlakyPeers {
    fail_on: usize,
    pub attempts: AtomicUsize,
    pub delivered: Mutex<Vec<Vec<String>>>,
}

impl FlakyPeers {
    pub fn failing_on(fail_on: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_on,
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn last_is(&self, expected: &[&str]) -> bool {
        self.delivered
            .lock()
            .last()
            .map(|peers| peers.iter().map(String::as_str).eq(expected.iter().copied()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl PeerSet for FlakyPeers {
    async fn set_peers(&self, peers: Vec<PeerInfo>) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.fail_on {
            anyhow::bail!("peer set unavailable");
        }
        self.delivered
            .lock()
            .push(peers.into_iter().map(|p| p.address).collect());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Gauge(String, f64, Vec<(String, String)>),
    Count(String, Vec<(String, String)>),
}

/// Metrics sink that keeps every sample for inspection
#[derive(Default)]
pub struct RecordingSink {
    pub samples: Mutex<Vec<Sample>>,
}

impl RecordingSink {
    pub fn counts(&self, name: &str) -> usize {
        self.samples
            .lock()
            .iter()
            .filter(|s| matches!(s, Sample::Count(n, _) if n == name))
            .count()
    }

    pub fn last_gauge(&self, name: &str) -> Option<f64> {
        self.samples.lock().iter().rev().find_map(|s| match s {
            Sample::Gauge(n, v, _) if n == name => Some(*v),
            _ => None,
        })
    }
}

impl MetricsSink for RecordingSink {
    fn gauge(&self, name: &str, value: f64, labels: &Labels) -> anyhow::Result<()> {
        self.samples
            .lock()
            .push(Sample::Gauge(name.to_string(), value, labels.to_vec()));
        Ok(())
    }

    fn counter_inc(&self, name: &str, labels: &Labels) -> anyhow::Result<()> {
        self.samples
            .lock()
            .push(Sample::Count(name.to_string(), labels.to_vec()));
        Ok(())
    }
}

/// Scriptable cluster: pods and watches are handed out from queues the test
/// controls.
pub struct ScriptedCluster {
    pub self_address: String,
    pub pods: Mutex<Vec<PodRecord>>,
    pub fail_list: AtomicBool,
    pub fail_address: AtomicBool,
    watches: Mutex<VecDeque<ChannelWatch>>,
    pub lists: AtomicUsize,
    pub watch_opens: AtomicUsize,
}

impl ScriptedCluster {
    pub fn new(self_address: &str, pods: Vec<PodRecord>) -> Arc<Self> {
        Arc::new(Self {
            self_address: self_address.to_string(),
            pods: Mutex::new(pods),
            fail_list: AtomicBool::new(false),
            fail_address: AtomicBool::new(false),
            watches: Mutex::new(VecDeque::new()),
            lists: AtomicUsize::new(0),
            watch_opens: AtomicUsize::new(0),
        })
    }

    /// Queue a watch for the next `watch_pods` call and return its feed.
    /// Once the queue is drained, further watches are idle.
    pub fn push_watch(&self) -> mpsc::Sender<WatchEvent> {
        let (watch, tx) = ChannelWatch::pair(1);
        self.watches.lock().push_back(watch);
        tx
    }

    pub fn set_pods(&self, pods: Vec<PodRecord>) {
        *self.pods.lock() = pods;
    }
}

#[async_trait]
impl Cluster for ScriptedCluster {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn initialize(&self) -> ClusterResult<bool> {
        Ok(true)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodRecord> {
        Ok(PodRecord::new(name, namespace, self.self_address.clone(), true))
    }

    async fn list_pods(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> ClusterResult<Vec<PodRecord>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ClusterError::Transport("connection refused".into()));
        }
        Ok(self.pods.lock().clone())
    }

    async fn watch_pods(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> ClusterResult<Box<dyn PodWatch>> {
        self.watch_opens.fetch_add(1, Ordering::SeqCst);
        let next = self.watches.lock().pop_front();
        Ok(Box::new(next.unwrap_or_else(ChannelWatch::idle)))
    }

    async fn find_namespace(&self) -> ClusterResult<String> {
        Ok("cache".to_string())
    }

    async fn find_self_address(&self) -> ClusterResult<String> {
        if self.fail_address.load(Ordering::SeqCst) {
            return Err(kubegroup_core::Error::NoAddress("my-pod".into()).into());
        }
        Ok(self.self_address.clone())
    }
}
