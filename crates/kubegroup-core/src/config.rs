//! Configuration for Kubegroup

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::{DEFAULT_COOLDOWN_SECS, DEFAULT_POLL_INTERVAL_SECS};

/// How the reconciliation loop learns about membership changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Stream watch events and classify them one by one
    #[default]
    Watch,
    /// List pods on a fixed tick and diff against the previous list
    Poll,
}

impl std::str::FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "watch" => Ok(Strategy::Watch),
            "poll" => Ok(Strategy::Poll),
            other => Err(Error::InvalidConfig(format!("unknown strategy: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Label selector for peer pods, e.g. "app=my-cache"
    #[serde(default)]
    pub label_selector: String,

    /// Appended to a pod IP to form its peer address, e.g. ":5000"
    #[serde(default)]
    pub cache_port_suffix: String,

    /// Wait before reopening a broken watch
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Tick period of the polling strategy
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub strategy: Strategy,

    /// Skip namespace detection and use this namespace (testing)
    #[serde(default)]
    pub force_namespace: Option<String>,

    /// Enable non-error logging of the reconciliation loop
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            label_selector: String::new(),
            cache_port_suffix: String::new(),
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            strategy: Strategy::default(),
            force_namespace: None,
            debug: false,
            metrics: MetricsConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn new(label_selector: impl Into<String>, cache_port_suffix: impl Into<String>) -> Self {
        Self {
            label_selector: label_selector.into(),
            cache_port_suffix: cache_port_suffix.into(),
            ..Default::default()
        }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_string(),
            source,
        })?;

        Self::from_toml(path, &content)
    }

    fn from_toml(path: &str, content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(selector) = var("KUBEGROUP_LABEL_SELECTOR") {
            self.label_selector = selector;
        }
        if let Some(suffix) = var("KUBEGROUP_CACHE_PORT_SUFFIX") {
            self.cache_port_suffix = suffix;
        }
        if let Some(secs) = var("KUBEGROUP_COOLDOWN_SECS") {
            if let Ok(s) = secs.parse() {
                self.cooldown_secs = s;
            }
        }
        if let Some(secs) = var("KUBEGROUP_POLL_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                self.poll_interval_secs = s;
            }
        }
        if let Some(strategy) = var("KUBEGROUP_STRATEGY") {
            if let Ok(s) = strategy.parse() {
                self.strategy = s;
            }
        }
        if let Some(ns) = var("KUBEGROUP_FORCE_NAMESPACE") {
            if !ns.is_empty() {
                self.force_namespace = Some(ns);
            }
        }
        if var("KUBEGROUP_DEBUG").map(|v| v == "true").unwrap_or(false) {
            self.debug = true;
        }
        if let Some(ns) = var("KUBEGROUP_METRICS_NAMESPACE") {
            self.metrics.namespace = ns;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.label_selector.trim().is_empty() {
            return Err(Error::MissingOption("label_selector"));
        }
        if self.cache_port_suffix.is_empty() {
            return Err(Error::MissingOption("cache_port_suffix"));
        }
        if self.cooldown_secs == 0 {
            return Err(Error::InvalidConfig("cooldown_secs must be positive".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Metrics labelling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prefix for metric names, e.g. "myapp" gives "myapp_kubegroup_peers"
    #[serde(default)]
    pub namespace: String,

    /// Label key carrying the local hostname
    #[serde(default = "default_hostname_label")]
    pub hostname_label: String,

    /// Do not add the hostname label
    #[serde(default)]
    pub disable_hostname_label: bool,

    /// Extra labels added to every sample
    #[serde(default)]
    pub extra_labels: BTreeMap<String, String>,
}

fn default_hostname_label() -> String {
    "pod_name".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            hostname_label: default_hostname_label(),
            disable_hostname_label: false,
            extra_labels: BTreeMap::new(),
        }
    }
}
