//! Error types for Kubegroup

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing required option: {0}")]
    MissingOption(&'static str),

    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    ConfigParse { path: String, message: String },

    // Resolution Errors
    #[error("Could not determine hostname: {0}")]
    Hostname(std::io::Error),

    #[error("Hostname '{host}' lookup failed: {source}")]
    AddressLookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Hostname '{0}': no address found")]
    NoAddress(String),

    #[error("Could not read namespace from {path}: {source}")]
    Namespace {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Namespace file {0} is empty")]
    EmptyNamespace(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error comes from self-identity resolution
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::Hostname(_)
                | Error::AddressLookup { .. }
                | Error::NoAddress(_)
                | Error::Namespace { .. }
                | Error::EmptyNamespace(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_classification() {
        assert!(Error::NoAddress("pod-a".into()).is_resolution());
        assert!(Error::EmptyNamespace("/tmp/ns".into()).is_resolution());
        assert!(!Error::MissingOption("label_selector").is_resolution());
        assert!(!Error::InvalidConfig("bad".into()).is_resolution());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::NoAddress("pod-a".into());
        assert_eq!(err.to_string(), "Hostname 'pod-a': no address found");

        let err = Error::MissingOption("cache_port_suffix");
        assert_eq!(err.to_string(), "Missing required option: cache_port_suffix");
    }
}
