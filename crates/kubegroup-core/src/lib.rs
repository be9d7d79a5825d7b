//! Kubegroup Core Library
//!
//! Core types, configuration and self-identity resolution shared by the
//! Kubegroup peer discovery engine.

pub mod config;
pub mod error;
pub mod resolver;
pub mod types;

pub use config::{DiscoveryConfig, Strategy};
pub use error::{Error, Result};

/// Kubegroup version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File where the orchestrator mounts the pod namespace
pub const NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Namespace used by synthetic clusters and forced-namespace testing
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default wait before reopening a broken watch (seconds)
pub const DEFAULT_COOLDOWN_SECS: u64 = 5;

/// Default tick period of the polling strategy (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 20;
