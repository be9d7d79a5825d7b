//! Self address and namespace resolution
//!
//! The local pod is identified by its hostname. Its address is whatever the
//! hostname resolves to, and its namespace comes from the file the
//! orchestrator mounts into every pod.

use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};
use crate::types::peer_url;
use crate::NAMESPACE_FILE;

/// Result of resolving the local hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfAddress {
    /// Address to use (the first one returned by the resolver)
    pub address: String,
    /// Every distinct address found for the hostname
    pub candidates: Vec<String>,
}

impl SelfAddress {
    /// More than one address was found; `address` is only the first of them
    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }
}

/// Local hostname, which doubles as the pod name inside the orchestrator
pub fn self_pod_name() -> Result<String> {
    let host = hostname::get().map_err(Error::Hostname)?;
    Ok(host.to_string_lossy().to_string())
}

/// Resolve the local hostname to its network address.
///
/// Fails when no address is found. When several are found the first one is
/// returned and the ambiguity is reported through [`SelfAddress::is_ambiguous`].
pub async fn resolve_self_address() -> Result<SelfAddress> {
    let host = self_pod_name()?;
    resolve_host(&host).await
}

/// Resolve a hostname the same way [`resolve_self_address`] does
pub async fn resolve_host(host: &str) -> Result<SelfAddress> {
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| Error::AddressLookup {
            host: host.to_string(),
            source,
        })?;

    let mut candidates: Vec<String> = Vec::new();
    for addr in addrs {
        let ip = addr.ip().to_string();
        if !candidates.contains(&ip) {
            candidates.push(ip);
        }
    }

    select_address(host, candidates)
}

fn select_address(host: &str, candidates: Vec<String>) -> Result<SelfAddress> {
    let address = candidates
        .first()
        .cloned()
        .ok_or_else(|| Error::NoAddress(host.to_string()))?;

    let resolved = SelfAddress {
        address,
        candidates,
    };

    if resolved.is_ambiguous() {
        warn!(
            "Hostname '{}' resolved to multiple addresses {:?}, using {}",
            host, resolved.candidates, resolved.address
        );
    }

    Ok(resolved)
}

/// Read the namespace the orchestrator mounted for this pod
pub async fn resolve_self_namespace() -> Result<String> {
    resolve_namespace_from(NAMESPACE_FILE).await
}

/// Read a namespace file. Fails when it is absent, e.g. outside the cluster.
pub async fn resolve_namespace_from(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::Namespace {
            path: path.display().to_string(),
            source,
        })?;

    let namespace = content.trim();
    if namespace.is_empty() {
        return Err(Error::EmptyNamespace(path.display().to_string()));
    }
    Ok(namespace.to_string())
}

/// Local address only
pub async fn find_my_address() -> Result<String> {
    Ok(resolve_self_address().await?.address)
}

/// Local peer URL for the cache pool, e.g. `http://10.0.0.1:5000`
pub async fn find_my_url(port_suffix: &str) -> Result<String> {
    let address = find_my_address().await?;
    Ok(peer_url(&address, port_suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_single_address() {
        let resolved = select_address("pod-a", vec!["10.0.0.1".into()]).unwrap();
        assert_eq!(resolved.address, "10.0.0.1");
        assert!(!resolved.is_ambiguous());
    }

    #[test]
    fn test_select_multiple_addresses_keeps_first() {
        let resolved =
            select_address("pod-a", vec!["10.0.0.1".into(), "10.0.0.2".into()]).unwrap();
        assert_eq!(resolved.address, "10.0.0.1");
        assert!(resolved.is_ambiguous());
    }

    #[test]
    fn test_select_no_address() {
        let err = select_address("pod-a", vec![]).unwrap_err();
        assert!(matches!(err, Error::NoAddress(ref h) if h == "pod-a"));
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let resolved = resolve_host("localhost").await.unwrap();
        assert!(!resolved.address.is_empty());
    }

    #[tokio::test]
    async fn test_namespace_file_trimmed() {
        let path = std::env::temp_dir().join(format!("kubegroup-ns-{}", std::process::id()));
        tokio::fs::write(&path, "cache-system\n").await.unwrap();

        let ns = resolve_namespace_from(&path).await.unwrap();
        assert_eq!(ns, "cache-system");

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_namespace_file_missing() {
        let err = resolve_namespace_from("/nonexistent/kubegroup/namespace")
            .await
            .unwrap_err();
        assert!(err.is_resolution());
    }
}
