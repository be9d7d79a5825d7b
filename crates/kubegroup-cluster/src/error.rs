//! Cluster error types

use thiserror::Error;

/// Result type for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Cluster-related errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("In-cluster configuration error: {0}")]
    InClusterConfig(String),

    #[error("Orchestrator API error: {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Pod not found: {namespace}/{name}")]
    PodNotFound { namespace: String, name: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] kubegroup_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// Failure to determine this process's own address or namespace
    pub fn is_resolution(&self) -> bool {
        matches!(self, ClusterError::Core(e) if e.is_resolution())
    }
}
