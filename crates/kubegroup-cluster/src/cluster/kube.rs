//! Live orchestrator API client
//!
//! Talks to the pod endpoints of the API server over HTTPS with the
//! service account credentials mounted into the pod:
//! - `GET /api/v1/namespaces/{ns}/pods/{name}`
//! - `GET /api/v1/namespaces/{ns}/pods?labelSelector=...`
//! - `GET /api/v1/namespaces/{ns}/pods?labelSelector=...&watch=true`
//!
//! Without in-cluster configuration the cluster runs in a degraded mode where
//! the local process is the only pod and watches never emit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use kubegroup_core::resolver;
use kubegroup_core::types::{PodRecord, WatchEvent};
use kubegroup_core::NAMESPACE_FILE;

use super::model::{decode_watch_line, Pod, PodList};
use super::{ChannelWatch, Cluster, PodWatch};
use crate::error::{ClusterError, ClusterResult};

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
/// Longest watch line held while waiting for its newline
const MAX_WATCH_LINE: usize = 4 * 1024 * 1024;

/// Connection settings for the orchestrator API
#[derive(Debug, Clone)]
pub struct KubeConfig {
    /// Base URL, e.g. "https://10.96.0.1:443"
    pub api_server: String,
    /// Bearer token file, re-read on every request so rotation is honoured
    pub token_path: Option<PathBuf>,
    /// CA bundle for the API server certificate
    pub ca_path: Option<PathBuf>,
    /// File holding the local namespace
    pub namespace_path: PathBuf,
    /// Timeout for get and list requests (watches are unbounded)
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl KubeConfig {
    /// Settings for a process running inside a pod
    pub fn in_cluster() -> ClusterResult<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            ClusterError::InClusterConfig("KUBERNETES_SERVICE_HOST is not set".into())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").map_err(|_| {
            ClusterError::InClusterConfig("KUBERNETES_SERVICE_PORT is not set".into())
        })?;

        let token_path = PathBuf::from(SERVICE_ACCOUNT_TOKEN);
        if !token_path.exists() {
            return Err(ClusterError::InClusterConfig(format!(
                "service account token not found: {}",
                token_path.display()
            )));
        }

        // IPv6 service hosts need brackets
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };

        Ok(Self {
            api_server: format!("https://{}:{}", host, port),
            token_path: Some(token_path),
            ca_path: Some(PathBuf::from(SERVICE_ACCOUNT_CA)),
            ..Self::proxy("")
        })
    }

    /// Settings for an unauthenticated endpoint such as `kubectl proxy`
    pub fn proxy(api_server: impl Into<String>) -> Self {
        Self {
            api_server: api_server.into(),
            token_path: None,
            ca_path: None,
            namespace_path: PathBuf::from(NAMESPACE_FILE),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

struct KubeClient {
    http: Client,
    config: KubeConfig,
}

impl KubeClient {
    fn new(config: KubeConfig) -> ClusterResult<Self> {
        let mut builder = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(4);

        if let Some(ca_path) = &config.ca_path {
            let pem = std::fs::read(ca_path).map_err(|e| {
                ClusterError::InClusterConfig(format!(
                    "failed to read CA {}: {}",
                    ca_path.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ClusterError::InClusterConfig(format!("invalid CA: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        Ok(Self { http, config })
    }

    async fn request(&self, path: &str) -> ClusterResult<RequestBuilder> {
        let url = format!("{}{}", self.config.api_server.trim_end_matches('/'), path);
        let mut request = self.http.get(url);

        if let Some(token_path) = &self.config.token_path {
            let token = tokio::fs::read_to_string(token_path).await?;
            request = request.bearer_auth(token.trim());
        }

        Ok(request)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ClusterResult<T> {
        let response = self
            .request(path)
            .await?
            .query(query)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClusterError::Decode(e.to_string()))
    }

    async fn watch(&self, path: &str, label_selector: &str) -> ClusterResult<KubeWatch> {
        let response = self
            .request(path)
            .await?
            .query(&[("labelSelector", label_selector), ("watch", "true")])
            .send()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(KubeWatch {
            stream: Some(response.bytes_stream().boxed()),
            buffer: Vec::new(),
            max_line: MAX_WATCH_LINE,
        })
    }
}

/// Live watch over a chunked response body of newline-delimited events
struct KubeWatch {
    stream: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    buffer: Vec<u8>,
    max_line: usize,
}

impl KubeWatch {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        Some(line)
    }
}

#[async_trait]
impl PodWatch for KubeWatch {
    async fn recv(&mut self) -> Option<WatchEvent> {
        loop {
            while let Some(line) = self.next_line() {
                if line.iter().all(|b| b.is_ascii_whitespace()) {
                    continue;
                }
                return Some(decode_watch_line(&line));
            }

            if self.buffer.len() > self.max_line {
                warn!(
                    "Watch line exceeds {} bytes without a newline, closing stream",
                    self.max_line
                );
                self.stop();
                return None;
            }

            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    warn!("Watch stream error: {}", e);
                    self.stop();
                    return None;
                }
                None => {
                    debug!("Watch stream ended by server");
                    self.stop();
                    return None;
                }
            }
        }
    }

    fn stop(&mut self) {
        // Dropping the body stream closes the connection
        self.stream = None;
        self.buffer.clear();
    }
}

/// Cluster backed by the live orchestrator API
pub struct RealCluster {
    explicit: Option<KubeConfig>,
    client: RwLock<Option<Arc<KubeClient>>>,
}

impl RealCluster {
    /// Use in-cluster configuration, discovered at initialization
    pub fn new() -> Self {
        Self {
            explicit: None,
            client: RwLock::new(None),
        }
    }

    /// Use the given connection settings instead of in-cluster discovery
    pub fn with_config(config: KubeConfig) -> Self {
        Self {
            explicit: Some(config),
            client: RwLock::new(None),
        }
    }

    fn client(&self) -> Option<Arc<KubeClient>> {
        self.client.read().clone()
    }

    async fn local_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodRecord> {
        let address = self.find_self_address().await?;
        Ok(PodRecord::new(name, namespace, address, true))
    }

    fn pods_path(namespace: &str) -> String {
        format!("/api/v1/namespaces/{}/pods", namespace)
    }
}

impl Default for RealCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cluster for RealCluster {
    fn name(&self) -> &'static str {
        "real"
    }

    async fn initialize(&self) -> ClusterResult<bool> {
        let config = match &self.explicit {
            Some(config) => config.clone(),
            None => match KubeConfig::in_cluster() {
                Ok(config) => config,
                Err(e) => {
                    error!("running OUT-OF-CLUSTER: {}", e);
                    return Ok(false);
                }
            },
        };

        info!("running IN-CLUSTER against {}", config.api_server);
        let client = KubeClient::new(config)?;
        *self.client.write() = Some(Arc::new(client));
        Ok(true)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodRecord> {
        let Some(client) = self.client() else {
            return self.local_pod(namespace, name).await;
        };

        let path = format!("{}/{}", Self::pods_path(namespace), name);
        match client.get_json::<Pod>(&path, &[]).await {
            Ok(pod) => Ok(pod.into_record()),
            Err(ClusterError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(ClusterError::PodNotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> ClusterResult<Vec<PodRecord>> {
        let Some(client) = self.client() else {
            let name = resolver::self_pod_name()?;
            return Ok(vec![self.local_pod(namespace, &name).await?]);
        };

        let list: PodList = client
            .get_json(
                &Self::pods_path(namespace),
                &[("labelSelector", label_selector)],
            )
            .await?;

        Ok(list.items.into_iter().map(Pod::into_record).collect())
    }

    async fn watch_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> ClusterResult<Box<dyn PodWatch>> {
        let Some(client) = self.client() else {
            return Ok(Box::new(ChannelWatch::idle()));
        };

        let watch = client
            .watch(&Self::pods_path(namespace), label_selector)
            .await?;
        Ok(Box::new(watch))
    }

    async fn find_namespace(&self) -> ClusterResult<String> {
        let path = match &self.explicit {
            Some(config) => config.namespace_path.clone(),
            None => PathBuf::from(NAMESPACE_FILE),
        };
        Ok(resolver::resolve_namespace_from(path).await?)
    }

    async fn find_self_address(&self) -> ClusterResult<String> {
        Ok(resolver::resolve_self_address().await?.address)
    }
}

impl std::fmt::Debug for RealCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealCluster")
            .field("explicit", &self.explicit)
            .field("initialized", &self.client.read().is_some())
            .finish()
    }
}
