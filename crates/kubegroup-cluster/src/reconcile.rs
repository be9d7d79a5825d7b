//! Reconciliation loop
//!
//! Keeps the peer sink converged with the ready pods of the cluster. Two
//! strategies share the same state and sink contract:
//!
//! - watch: a receiver task forwards raw events over a capacity-1 channel,
//!   the reconciler classifies them one at a time
//! - poll: the pod list is fetched on a fixed tick and diffed against the
//!   previous tick
//!
//! The reconciler owns the peer table and the address set; nothing else
//! touches them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kubegroup_core::types::{PeerChange, PodRecord, SelfIdentity, WatchEvent};
use kubegroup_core::Strategy;

use crate::classify::classify;
use crate::cluster::{Cluster, PodWatch};
use crate::recorder::{Decision, MetricsRecorder};
use crate::sink::PeerSink;
use crate::table::{AddressSet, PeerTable};

/// Timing and selection knobs of one reconciler
#[derive(Debug, Clone)]
pub(crate) struct LoopSettings {
    pub label_selector: String,
    pub port_suffix: String,
    pub cooldown: Duration,
    pub poll_interval: Duration,
    pub debug: bool,
}

pub(crate) struct Reconciler {
    cluster: Arc<dyn Cluster>,
    sink: PeerSink,
    metrics: MetricsRecorder,
    identity: SelfIdentity,
    settings: LoopSettings,
    cancel: CancellationToken,
    table: PeerTable,
    set: AddressSet,
    /// Set while the sink holds an older snapshot than `set`
    dirty: bool,
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        sink: PeerSink,
        metrics: MetricsRecorder,
        identity: SelfIdentity,
        settings: LoopSettings,
        cancel: CancellationToken,
    ) -> Self {
        let set = AddressSet::new(&identity.address, &settings.port_suffix);
        Self {
            cluster,
            sink,
            metrics,
            identity,
            settings,
            cancel,
            table: PeerTable::new(),
            set,
            dirty: false,
        }
    }

    /// Run until the stop signal is raised
    pub async fn run(mut self, strategy: Strategy) {
        info!(
            "reconcile: starting strategy={:?} namespace={} selector={} self={}",
            strategy,
            self.identity.namespace,
            self.settings.label_selector,
            self.set.self_address()
        );

        let initial = self.initial_sync().await;

        match strategy {
            Strategy::Watch => self.run_watch().await,
            Strategy::Poll => self.run_poll(initial).await,
        }

        info!("reconcile: stopped strategy={:?}", strategy);
    }

    /// List once, seed the table and publish the first snapshot.
    ///
    /// Returns the ready addresses seen, empty when the list failed.
    async fn initial_sync(&mut self) -> BTreeSet<String> {
        let pods = self.list().await.unwrap_or_default();

        for pod in &pods {
            if pod.has_address() && pod.name != self.identity.pod_name {
                self.table.insert(&pod.name, &pod.address);
            }
        }

        let ready = ready_addresses(&pods);
        for address in &ready {
            self.set.apply(&PeerChange::added(address.as_str()));
        }

        self.publish().await;
        self.metrics.record_peers(self.set.peer_count());
        ready
    }

    async fn run_watch(&mut self) {
        let cancel = self.cancel.clone();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                opened = self
                    .cluster
                    .watch_pods(&self.identity.namespace, &self.settings.label_selector) => opened,
            };

            let watch = match opened {
                Ok(watch) => watch,
                Err(e) => {
                    error!(
                        "watch: open error: {}, retrying in {:?}",
                        e, self.settings.cooldown
                    );
                    if !self.cooldown().await {
                        break;
                    }
                    continue;
                }
            };

            let (tx, mut rx) = mpsc::channel(1);
            let receiver = tokio::spawn(forward_events(watch, tx, cancel.clone()));

            loop {
                let dirty = self.dirty;
                let received = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    event = rx.recv() => event.map(Some),
                    _ = tokio::time::sleep(self.settings.cooldown), if dirty => Some(None),
                };
                match received {
                    Some(Some(event)) => self.handle_event(event).await,
                    Some(None) => self.publish().await,
                    None => break,
                }
            }

            drop(rx);
            if let Err(e) = receiver.await {
                error!("watch: receiver task failed: {}", e);
            }

            if cancel.is_cancelled() {
                break;
            }

            error!(
                "watch: stream closed, retrying in {:?}",
                self.settings.cooldown
            );
            if !self.cooldown().await {
                break;
            }
        }
    }

    async fn handle_event(&mut self, event: WatchEvent) {
        self.metrics.record_event();

        let change = classify(&mut self.table, &event, &self.identity.pod_name);
        self.metrics.record_decision(match &change {
            Some(change) => Decision::Accepted {
                added: change.added,
            },
            None => Decision::Ignored,
        });

        let changed = change.is_some_and(|change| self.set.apply(&change));
        if changed || self.dirty {
            self.publish().await;
        }

        self.metrics.record_peers(self.set.peer_count());
    }

    async fn run_poll(&mut self, mut previous: BTreeSet<String>) {
        let cancel = self.cancel.clone();
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // First tick completes immediately; the initial sync already listed
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let listed = tokio::select! {
                _ = cancel.cancelled() => break,
                listed = self.list() => listed,
            };
            let Some(pods) = listed else {
                continue;
            };
            self.metrics.record_event();

            let current = ready_addresses(&pods);
            let changes = diff(&previous, &current);

            let mut changed = false;
            for change in &changes {
                self.metrics.record_decision(Decision::Accepted {
                    added: change.added,
                });
                changed |= self.set.apply(change);
            }
            if changed || self.dirty {
                self.publish().await;
            }
            self.metrics.record_peers(self.set.peer_count());

            previous = current;
        }
    }

    async fn list(&self) -> Option<Vec<PodRecord>> {
        match self
            .cluster
            .list_pods(&self.identity.namespace, &self.settings.label_selector)
            .await
        {
            Ok(pods) => Some(pods),
            Err(e) => {
                error!(
                    "list: namespace={} selector={} error: {}",
                    self.identity.namespace, self.settings.label_selector, e
                );
                None
            }
        }
    }

    /// Push the current set to the sink. A rejected snapshot leaves the
    /// reconciler dirty so the next event or tick delivers it again.
    async fn publish(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.settings.debug {
            debug!("publish: peers={:?}", self.set.addresses());
        }
        self.dirty = !self.sink.publish(&self.set).await;
        if self.dirty {
            warn!("publish: sink rejected snapshot, will retry");
        }
    }

    /// Sleep for the cooldown. Returns false when stopped meanwhile.
    async fn cooldown(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.settings.cooldown) => true,
        }
    }
}

/// Pump events from the watch into the handoff channel, then release the
/// watch.
async fn forward_events(
    mut watch: Box<dyn PodWatch>,
    tx: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = watch.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    watch.stop();
}

/// Addresses of the ready pods that carry one
pub(crate) fn ready_addresses(pods: &[PodRecord]) -> BTreeSet<String> {
    pods.iter()
        .filter(|pod| pod.ready && pod.has_address())
        .map(|pod| pod.address.clone())
        .collect()
}

/// Changes turning `previous` into `current`, removals first
pub(crate) fn diff(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Vec<PeerChange> {
    let removed = previous
        .difference(current)
        .map(|address| PeerChange::removed(address.as_str()));
    let added = current
        .difference(previous)
        .map(|address| PeerChange::added(address.as_str()));
    removed.chain(added).collect()
}
