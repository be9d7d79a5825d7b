//! Discovery metrics
//!
//! The recorder fans samples out to any number of [`MetricsSink`]s. Sink
//! failures are logged and dropped so recording never disturbs the
//! reconciliation loop.

use std::sync::Arc;

use tracing::{error, info, warn};

use kubegroup_core::config::MetricsConfig;

/// Metric names, before the optional namespace prefix
pub mod names {
    pub const PEERS: &str = "kubegroup_peers";
    pub const EVENTS: &str = "kubegroup_events";
    pub const DECISIONS: &str = "kubegroup_decisions";
}

/// Label set attached to a sample
pub type Labels = [(String, String)];

/// Exporter for discovery metrics
pub trait MetricsSink: Send + Sync {
    fn gauge(&self, name: &str, value: f64, labels: &Labels) -> anyhow::Result<()>;
    fn counter_inc(&self, name: &str, labels: &Labels) -> anyhow::Result<()>;
}

/// Forwards samples to the `metrics` facade, exported by whatever recorder
/// the process installed (Prometheus in the bundled binary)
#[derive(Debug, Default, Clone)]
pub struct PrometheusSink;

impl PrometheusSink {
    fn labels(labels: &Labels) -> Vec<metrics::Label> {
        labels
            .iter()
            .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
            .collect()
    }
}

impl MetricsSink for PrometheusSink {
    fn gauge(&self, name: &str, value: f64, labels: &Labels) -> anyhow::Result<()> {
        metrics::gauge!(name.to_string(), Self::labels(labels)).set(value);
        Ok(())
    }

    fn counter_inc(&self, name: &str, labels: &Labels) -> anyhow::Result<()> {
        metrics::counter!(name.to_string(), Self::labels(labels)).increment(1);
        Ok(())
    }
}

/// Emits every sample as a structured log record
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn gauge(&self, name: &str, value: f64, labels: &Labels) -> anyhow::Result<()> {
        info!(
            target: "kubegroup::metrics",
            metric = name,
            kind = "gauge",
            value,
            labels = ?labels
        );
        Ok(())
    }

    fn counter_inc(&self, name: &str, labels: &Labels) -> anyhow::Result<()> {
        info!(
            target: "kubegroup::metrics",
            metric = name,
            kind = "count",
            value = 1u64,
            labels = ?labels
        );
        Ok(())
    }
}

/// Outcome of classifying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted { added: bool },
    Ignored,
}

impl Decision {
    fn labels(&self) -> [(String, String); 2] {
        let (decision, action) = match self {
            Decision::Accepted { added: true } => ("accepted", "add"),
            Decision::Accepted { added: false } => ("accepted", "remove"),
            Decision::Ignored => ("ignored", "none"),
        };
        [
            ("decision".to_string(), decision.to_string()),
            ("action".to_string(), action.to_string()),
        ]
    }
}

/// Records peer count, events and classifier decisions
#[derive(Clone)]
pub struct MetricsRecorder {
    sinks: Vec<Arc<dyn MetricsSink>>,
    peers_name: String,
    events_name: String,
    decisions_name: String,
    labels: Vec<(String, String)>,
}

impl MetricsRecorder {
    pub fn new(config: &MetricsConfig, sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        let prefixed = |name: &str| {
            if config.namespace.is_empty() {
                name.to_string()
            } else {
                format!("{}_{}", config.namespace, name)
            }
        };

        let mut labels: Vec<(String, String)> = config
            .extra_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if !config.disable_hostname_label {
            match hostname::get() {
                Ok(host) => labels.push((
                    config.hostname_label.clone(),
                    host.to_string_lossy().to_string(),
                )),
                Err(e) => warn!("metrics: could not read hostname for labels: {}", e),
            }
        }

        Self {
            sinks,
            peers_name: prefixed(names::PEERS),
            events_name: prefixed(names::EVENTS),
            decisions_name: prefixed(names::DECISIONS),
            labels,
        }
    }

    /// Recorder without exporters
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(
            &MetricsConfig {
                disable_hostname_label: true,
                ..Default::default()
            },
            Vec::new(),
        )
    }

    pub fn record_peers(&self, count: usize) {
        for sink in &self.sinks {
            if let Err(e) = sink.gauge(&self.peers_name, count as f64, &self.labels) {
                error!("metrics: export gauge {}: {:#}", self.peers_name, e);
            }
        }
    }

    pub fn record_event(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.counter_inc(&self.events_name, &self.labels) {
                error!("metrics: export counter {}: {:#}", self.events_name, e);
            }
        }
    }

    pub fn record_decision(&self, decision: Decision) {
        if self.sinks.is_empty() {
            return;
        }
        let mut labels = self.labels.clone();
        labels.extend(decision.labels());
        for sink in &self.sinks {
            if let Err(e) = sink.counter_inc(&self.decisions_name, &labels) {
                error!("metrics: export counter {}: {:#}", self.decisions_name, e);
            }
        }
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("sinks", &self.sinks.len())
            .field("peers_name", &self.peers_name)
            .field("labels", &self.labels)
            .finish()
    }
}
