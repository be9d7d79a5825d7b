//! Group lifecycle
//!
//! A [`Group`] resolves the local identity once, then runs one background
//! reconciliation task until [`Group::stop`] is called or the group is
//! dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use kubegroup_core::resolver;
use kubegroup_core::types::{peer_url, SelfIdentity};
use kubegroup_core::{DiscoveryConfig, Strategy};

use crate::cluster::{Cluster, RealCluster};
use crate::error::{ClusterError, ClusterResult};
use crate::recorder::{MetricsRecorder, MetricsSink};
use crate::reconcile::{LoopSettings, Reconciler};
use crate::sink::PeerSink;

/// Immutable snapshot of everything a group needs to start
#[derive(Clone)]
pub struct Options {
    pub config: DiscoveryConfig,
    pub cluster: Arc<dyn Cluster>,
    pub sink: PeerSink,
    pub metrics: MetricsRecorder,
    pub cooldown: Duration,
    pub poll_interval: Duration,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("config", &self.config)
            .field("cluster", &self.cluster.name())
            .field("sink", &self.sink)
            .field("cooldown", &self.cooldown)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// Assembles [`Options`] from a [`DiscoveryConfig`] and the runtime
/// collaborators that cannot be serialized.
pub struct GroupBuilder {
    config: DiscoveryConfig,
    cluster: Option<Arc<dyn Cluster>>,
    sink: Option<PeerSink>,
    metrics_sinks: Vec<Arc<dyn MetricsSink>>,
    cooldown: Option<Duration>,
    poll_interval: Option<Duration>,
}

impl GroupBuilder {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            cluster: None,
            sink: None,
            metrics_sinks: Vec::new(),
            cooldown: None,
            poll_interval: None,
        }
    }

    /// Cluster capability to use. Defaults to [`RealCluster`].
    pub fn cluster(mut self, cluster: Arc<dyn Cluster>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn sink(mut self, sink: PeerSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sinks.push(sink);
        self
    }

    /// Override the configured cooldown with sub-second precision
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Override the configured poll interval with sub-second precision
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn build(self) -> ClusterResult<Options> {
        self.config.validate()?;

        let sink = self
            .sink
            .ok_or_else(|| ClusterError::InvalidConfig("peer sink is required".into()))?;

        let cooldown = self.cooldown.unwrap_or_else(|| self.config.cooldown());
        let poll_interval = self
            .poll_interval
            .unwrap_or_else(|| self.config.poll_interval());
        if cooldown.is_zero() || poll_interval.is_zero() {
            return Err(ClusterError::InvalidConfig(
                "cooldown and poll interval must be positive".into(),
            ));
        }

        let cluster = self
            .cluster
            .unwrap_or_else(|| Arc::new(RealCluster::new()));
        let metrics = MetricsRecorder::new(&self.config.metrics, self.metrics_sinks);

        Ok(Options {
            config: self.config,
            cluster,
            sink,
            metrics,
            cooldown,
            poll_interval,
        })
    }

    pub async fn start(self) -> ClusterResult<Group> {
        Group::start(self.build()?).await
    }
}

/// A running peer discovery group
pub struct Group {
    identity: SelfIdentity,
    port_suffix: String,
    strategy: Strategy,
    in_cluster: bool,
    cancel: CancellationToken,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Group {
    /// Resolve the local identity and spawn the reconciliation task.
    ///
    /// Fails when the identity cannot be resolved; nothing is spawned then.
    pub async fn start(options: Options) -> ClusterResult<Self> {
        let Options {
            config,
            cluster,
            sink,
            metrics,
            cooldown,
            poll_interval,
        } = options;

        let in_cluster = cluster.initialize().await?;
        let identity = resolve_identity(cluster.as_ref(), config.force_namespace.as_deref()).await?;

        info!(
            "group: cluster={} in_cluster={} pod={} namespace={} address={}",
            cluster.name(),
            in_cluster,
            identity.pod_name,
            identity.namespace,
            identity.address
        );

        let cancel = CancellationToken::new();
        let reconciler = Reconciler::new(
            cluster,
            sink,
            metrics,
            identity.clone(),
            LoopSettings {
                label_selector: config.label_selector.clone(),
                port_suffix: config.cache_port_suffix.clone(),
                cooldown,
                poll_interval,
                debug: config.debug,
            },
            cancel.clone(),
        );
        let task = tokio::spawn(reconciler.run(config.strategy));

        Ok(Self {
            identity,
            port_suffix: config.cache_port_suffix,
            strategy: config.strategy,
            in_cluster,
            cancel,
            closed: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        })
    }

    /// Raise the stop signal. Returns true only for the call that raised it.
    pub fn stop(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        info!("group: stopping pod={}", self.identity.pod_name);
        self.cancel.cancel();
        true
    }

    /// Wait for the background task to exit. Only the first caller waits.
    pub async fn wait(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("group: reconciliation task failed: {}", e);
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn identity(&self) -> &SelfIdentity {
        &self.identity
    }

    pub fn in_cluster(&self) -> bool {
        self.in_cluster
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// URL other peers use to reach this process
    pub fn my_url(&self) -> String {
        peer_url(&self.identity.address, &self.port_suffix)
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("identity", &self.identity)
            .field("strategy", &self.strategy)
            .field("in_cluster", &self.in_cluster)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

async fn resolve_identity(
    cluster: &dyn Cluster,
    force_namespace: Option<&str>,
) -> ClusterResult<SelfIdentity> {
    let pod_name = resolver::self_pod_name()?;

    let namespace = match force_namespace {
        Some(namespace) => namespace.to_string(),
        None => cluster.find_namespace().await?,
    };

    let resolved = cluster.find_self_address().await?;
    let pod = cluster.get_pod(&namespace, &pod_name).await?;

    // The orchestrator's view wins when it reports an IP
    let address = if pod.has_address() {
        pod.address
    } else {
        resolved
    };

    Ok(SelfIdentity {
        pod_name,
        namespace,
        address,
    })
}
