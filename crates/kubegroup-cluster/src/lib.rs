//! Kubegroup Cluster - peer discovery and reconciliation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Group                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌───────────────┐   capacity-1   ┌───────────────────────┐ │
//! │  │ Watch receiver│ ─────────────▶ │      Reconciler       │ │
//! │  │  (PodWatch)   │    channel     │                       │ │
//! │  └───────┬───────┘                │ - classify events     │ │
//! │          │                        │ - PeerTable           │ │
//! │          │          list / tick   │ - AddressSet          │ │
//! │          │        ┌─────────────▶ │ - diff on poll        │ │
//! │          │        │               └───────┬───────┬───────┘ │
//! │  ┌───────┴────────┴──┐                    │       │         │
//! │  │      Cluster      │            ┌───────┴──┐ ┌──┴───────┐ │
//! │  │ Real/Mock/Bogus/  │            │ PeerSink │ │ Metrics  │ │
//! │  │      Static       │            └──────────┘ └──────────┘ │
//! │  └───────────────────┘                                      │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Watch or poll**: stream membership events or diff periodic lists
//! - **Readiness driven**: a pod that stops being ready is removed at once
//! - **Full snapshots**: the sink always receives the complete peer set
//! - **Restart safe**: broken watches are reopened after a cooldown
//! - **Idempotent stop**: concurrent stops raise a single signal

mod classify;
mod cluster;
mod error;
mod group;
mod recorder;
mod reconcile;
mod sink;
mod table;

#[cfg(test)]
mod testing;

pub use classify::classify;
pub use cluster::{
    decode_watch_line, BogusCluster, ChannelWatch, Cluster, KubeConfig, MockCluster, PodWatch,
    RealCluster, StaticCluster,
};
pub use error::{ClusterError, ClusterResult};
pub use group::{Group, GroupBuilder, Options};
pub use recorder::{names, Decision, Labels, LogSink, MetricsRecorder, MetricsSink, PrometheusSink};
pub use sink::{PeerGroup, PeerSet, PeerSink};
pub use table::{AddressSet, PeerTable};

// Re-export types from core
pub use kubegroup_core::resolver::{find_my_address, find_my_url};
pub use kubegroup_core::types::{
    EventKind, EventPayload, PeerChange, PeerInfo, PodRecord, SelfIdentity, WatchEvent,
};
pub use kubegroup_core::{DiscoveryConfig, Strategy};
