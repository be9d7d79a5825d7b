//! Kubegroup - Kubernetes peer discovery for distributed caches
//!
//! Example node: discovers its peers and logs every converged peer set.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use kubegroup_cluster::{
    find_my_url, BogusCluster, Cluster, DiscoveryConfig, GroupBuilder, LogSink, MockCluster,
    PeerGroup, PeerSink, PrometheusSink, RealCluster, StaticCluster, Strategy,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kubegroup")]
#[command(author = "Kubegroup Team")]
#[command(version = kubegroup_core::VERSION)]
#[command(about = "Kubernetes peer discovery for distributed caches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Label selector for peer pods
    #[arg(long, env = "KUBEGROUP_LABEL_SELECTOR")]
    label_selector: Option<String>,

    /// Suffix appended to pod IPs, e.g. ":5000"
    #[arg(long, env = "KUBEGROUP_CACHE_PORT_SUFFIX")]
    port_suffix: Option<String>,

    /// Discovery strategy (watch, poll)
    #[arg(long, env = "KUBEGROUP_STRATEGY")]
    strategy: Option<Strategy>,

    /// Cluster backend
    #[arg(long, value_enum, default_value = "real")]
    cluster: ClusterKind,

    /// Peer IPs for the mock and static backends
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Local IP reported by the mock backend
    #[arg(long, default_value = "127.0.0.1")]
    mock_self: String,

    /// Use this namespace instead of detecting it
    #[arg(long, env = "KUBEGROUP_FORCE_NAMESPACE")]
    namespace: Option<String>,

    /// Verbose reconciliation logging
    #[arg(long)]
    debug: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "KUBEGROUP_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Also emit every metric sample as a log record
    #[arg(long)]
    log_metrics: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KUBEGROUP_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover peers until interrupted
    Run,

    /// Print the URL peers would use to reach this host
    Url,

    /// Show version information
    Version,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ClusterKind {
    Real,
    Bogus,
    Mock,
    Static,
}

/// Peer group that only logs what it is given
struct LogPeerGroup;

impl PeerGroup for LogPeerGroup {
    fn set(&self, peers: &[String]) {
        info!(count = peers.len(), "peers: {:?}", peers);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    // Load config
    let mut config = if let Some(config_path) = &cli.config {
        DiscoveryConfig::from_file(config_path)?
    } else {
        DiscoveryConfig::from_env()
    };

    // Override with CLI args
    if let Some(selector) = cli.label_selector.clone() {
        config.label_selector = selector;
    }
    if let Some(suffix) = cli.port_suffix.clone() {
        config.cache_port_suffix = suffix;
    }
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(namespace) = cli.namespace.clone() {
        config.force_namespace = Some(namespace);
    }
    if cli.debug {
        config.debug = true;
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("kubegroup {}", kubegroup_core::VERSION);
        }
        Some(Commands::Url) => {
            println!("{}", find_my_url(&config.cache_port_suffix).await?);
        }
        Some(Commands::Run) | None => {
            run(&cli, config).await?;
        }
    }

    Ok(())
}

async fn run(cli: &Cli, config: DiscoveryConfig) -> anyhow::Result<()> {
    let cluster: Arc<dyn Cluster> = match cli.cluster {
        ClusterKind::Real => Arc::new(RealCluster::new()),
        ClusterKind::Bogus => Arc::new(BogusCluster::new()),
        ClusterKind::Mock => Arc::new(MockCluster::new(cli.mock_self.clone(), cli.peers.clone())),
        ClusterKind::Static => Arc::new(StaticCluster::new(cli.peers.clone())),
    };

    let mut builder = GroupBuilder::new(config)
        .cluster(cluster)
        .sink(PeerSink::pool(Arc::new(LogPeerGroup)));

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Metrics available at http://{}/metrics", addr);
        builder = builder.metrics_sink(Arc::new(PrometheusSink));
    }
    if cli.log_metrics {
        builder = builder.metrics_sink(Arc::new(LogSink));
    }

    let group = builder.start().await?;
    info!(
        "kubegroup {} started: url={} strategy={:?} in_cluster={}",
        kubegroup_core::VERSION,
        group.my_url(),
        group.strategy(),
        group.in_cluster()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    group.stop();
    group.wait().await;

    Ok(())
}
