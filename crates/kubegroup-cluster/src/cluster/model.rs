//! Orchestrator API wire model
//!
//! Only the fields the engine reads are modelled; everything else in the
//! pod object is ignored during deserialization.

use serde::Deserialize;

use kubegroup_core::types::{EventKind, PodRecord, WatchEvent};

#[derive(Debug, Deserialize)]
pub(crate) struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<PodStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PodStatus {
    #[serde(default, rename = "podIP")]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct RawWatchEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    object: serde_json::Value,
}

impl Pod {
    /// Ready condition reported as "True"
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.condition_type == "Ready" && c.status == "True")
            })
            .unwrap_or(false)
    }

    pub fn into_record(self) -> PodRecord {
        let ready = self.is_ready();
        let address = self
            .status
            .and_then(|s| s.pod_ip)
            .unwrap_or_default();
        PodRecord {
            name: self.metadata.name,
            namespace: self.metadata.namespace,
            address,
            ready,
        }
    }
}

/// Decode one line of a watch response body.
///
/// Never fails: anything that is not a pod event becomes an
/// [`kubegroup_core::types::EventPayload::Unexpected`] payload so the
/// classifier can log and skip it.
pub fn decode_watch_line(line: &[u8]) -> WatchEvent {
    let raw: RawWatchEvent = match serde_json::from_slice(line) {
        Ok(raw) => raw,
        Err(e) => {
            return WatchEvent::unexpected(EventKind::Error, format!("undecodable event: {}", e))
        }
    };

    let kind = match EventKind::parse(&raw.event_type) {
        Some(kind) => kind,
        None => {
            return WatchEvent::unexpected(
                EventKind::Error,
                format!("unknown event type: {}", raw.event_type),
            )
        }
    };

    let object_kind = raw
        .object
        .get("kind")
        .and_then(|k| k.as_str())
        .unwrap_or("Pod")
        .to_string();

    if kind == EventKind::Error || object_kind != "Pod" {
        return WatchEvent::unexpected(kind, format!("{} object: {}", object_kind, raw.object));
    }

    match serde_json::from_value::<Pod>(raw.object) {
        Ok(pod) => WatchEvent::pod(kind, pod.into_record()),
        Err(e) => WatchEvent::unexpected(kind, format!("undecodable pod: {}", e)),
    }
}
