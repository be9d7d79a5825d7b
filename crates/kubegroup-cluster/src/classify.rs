//! Watch event classification
//!
//! Turns one raw membership event into an add/remove decision for a peer
//! address, keeping the pod name → address table up to date so that
//! deletion events without an IP can still be resolved.

use tracing::debug;

use kubegroup_core::types::{EventKind, EventPayload, PeerChange, WatchEvent};

use crate::table::PeerTable;

/// Classify a single event.
///
/// Returns `None` when the event must be ignored: payload is not a pod, the
/// pod is this process, or no address is known for it. Readiness decides
/// between add and remove; the event type only decides table cleanup.
pub fn classify(table: &mut PeerTable, event: &WatchEvent, self_name: &str) -> Option<PeerChange> {
    let pod = match &event.payload {
        EventPayload::Pod(pod) => pod,
        EventPayload::Unexpected(what) => {
            debug!("classify: event={} unexpected object: {}", event.kind, what);
            return None;
        }
    };

    let name = pod.name.as_str();
    let ready = pod.ready;

    // Some deletion events do not carry the pod IP
    let address = if pod.address.is_empty() {
        table.get(name).map(str::to_string).unwrap_or_default()
    } else {
        pod.address.clone()
    };

    if name == self_name {
        debug!(
            "classify: event={} pod={} addr={} ready={}: ignoring my own pod",
            event.kind, name, address, ready
        );
        return None;
    }

    let deleted = event.kind == EventKind::Deleted;
    if deleted {
        debug!(
            "classify: event={} pod={} addr={} ready={}: removing address from table",
            event.kind, name, address, ready
        );
        table.remove(name);
    }

    if address.is_empty() {
        debug!(
            "classify: event={} pod={} ready={}: ignoring, cannot add/remove unknown address",
            event.kind, name, ready
        );
        return None;
    }

    if !deleted {
        table.insert(name, &address);
    }

    debug!(
        "classify: event={} pod={} addr={} ready={}: accepted",
        event.kind, name, address, ready
    );

    Some(PeerChange {
        address,
        added: ready,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegroup_core::types::PodRecord;

    const SELF: &str = "my-pod";

    fn event(kind: EventKind, name: &str, addr: &str, ready: bool) -> WatchEvent {
        WatchEvent::pod(kind, PodRecord::new(name, "default", addr, ready))
    }

    fn table_of(entries: &[(&str, &str)]) -> PeerTable {
        let mut table = PeerTable::new();
        for (name, addr) in entries {
            table.insert(name, addr);
        }
        table
    }

    struct Case {
        name: &'static str,
        table: &'static [(&'static str, &'static str)],
        kind: EventKind,
        pod: &'static str,
        ip: &'static str,
        ready: bool,
        expect: Option<(&'static str, bool)>,
    }

    const CASES: &[Case] = &[
        Case {
            name: "same pod name is ignored",
            table: &[],
            kind: EventKind::Deleted,
            pod: "my-pod",
            ip: "1.1.1.1",
            ready: true,
            expect: None,
        },
        Case {
            name: "other pod name is accepted",
            table: &[],
            kind: EventKind::Modified,
            pod: "other-pod",
            ip: "1.1.1.1",
            ready: true,
            expect: Some(("1.1.1.1", true)),
        },
        Case {
            name: "deleted event with ready pod is an addition",
            table: &[],
            kind: EventKind::Deleted,
            pod: "other-pod",
            ip: "1.1.1.1",
            ready: true,
            expect: Some(("1.1.1.1", true)),
        },
        Case {
            name: "deleted event with not ready pod is a removal",
            table: &[],
            kind: EventKind::Deleted,
            pod: "other-pod",
            ip: "1.1.1.1",
            ready: false,
            expect: Some(("1.1.1.1", false)),
        },
        Case {
            name: "not ready pod is a removal",
            table: &[],
            kind: EventKind::Modified,
            pod: "other-pod",
            ip: "1.1.1.1",
            ready: false,
            expect: Some(("1.1.1.1", false)),
        },
        Case {
            name: "missing address retrieved from table",
            table: &[("other-pod", "2.2.2.2")],
            kind: EventKind::Modified,
            pod: "other-pod",
            ip: "",
            ready: false,
            expect: Some(("2.2.2.2", false)),
        },
        Case {
            name: "added event without address or table entry is ignored",
            table: &[],
            kind: EventKind::Added,
            pod: "other-pod",
            ip: "",
            ready: true,
            expect: None,
        },
    ];

    #[test]
    fn test_classify_table() {
        for case in CASES {
            let mut table = table_of(case.table);
            let ev = event(case.kind, case.pod, case.ip, case.ready);
            let result = classify(&mut table, &ev, SELF);
            let got = result.as_ref().map(|c| (c.address.as_str(), c.added));
            assert_eq!(got, case.expect, "{}", case.name);
        }
    }

    #[test]
    fn test_non_delete_ready_records_addresses() {
        let mut table = PeerTable::new();
        for i in 1..=3 {
            let addr = format!("{0}.{0}.{0}.{0}", i);
            let change = classify(
                &mut table,
                &event(EventKind::Modified, &format!("other-pod-{}", i), &addr, true),
                "this-pod",
            )
            .unwrap();
            assert!(change.added);
            assert_eq!(change.address, addr);
        }
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_non_delete_not_ready_keeps_table_entries() {
        let mut table = PeerTable::new();
        for i in 1..=3 {
            let addr = format!("{0}.{0}.{0}.{0}", i);
            let change = classify(
                &mut table,
                &event(EventKind::Modified, &format!("other-pod-{}", i), &addr, false),
                "this-pod",
            )
            .unwrap();
            assert!(!change.added);
            assert_eq!(change.address, addr);
        }
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_delete_events_leave_table_empty() {
        for ready in [true, false] {
            let mut table = PeerTable::new();
            for i in 1..=3 {
                let addr = format!("{0}.{0}.{0}.{0}", i);
                let change = classify(
                    &mut table,
                    &event(EventKind::Deleted, &format!("other-pod-{}", i), &addr, ready),
                    "this-pod",
                )
                .unwrap();
                assert_eq!(change.added, ready);
                assert_eq!(change.address, addr);
            }
            assert!(table.is_empty());
        }
    }

    #[test]
    fn test_delete_without_address_resolves_from_table() {
        let mut table = table_of(&[("other-pod", "3.3.3.3"), ("another-pod", "4.4.4.4")]);
        let ev = event(EventKind::Deleted, "other-pod", "", false);
        let change = classify(&mut table, &ev, SELF).unwrap();

        assert_eq!(change, PeerChange::removed("3.3.3.3"));
        assert_eq!(table.len(), 1);
        assert!(table.get("other-pod").is_none());
    }

    #[test]
    fn test_delete_without_address_or_entry_is_noop() {
        let mut table = table_of(&[("another-pod", "4.4.4.4")]);
        let result = classify(&mut table, &event(EventKind::Deleted, "other-pod", "", false), SELF);
        assert!(result.is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_self_events_never_touch_table() {
        for kind in [EventKind::Added, EventKind::Modified, EventKind::Deleted] {
            for ready in [true, false] {
                let mut table = table_of(&[("my-pod", "9.9.9.9")]);
                let result = classify(&mut table, &event(kind, SELF, "1.1.1.1", ready), SELF);
                assert!(result.is_none());
                assert_eq!(table.get("my-pod"), Some("9.9.9.9"));
            }
        }
    }

    #[test]
    fn test_missing_address_ignored() {
        let mut table = PeerTable::new();
        let ev = event(EventKind::Modified, "other-pod", "", true);
        let result = classify(&mut table, &ev, "this-pod");
        assert!(result.is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_missing_address_solved_from_table() {
        let mut table = table_of(&[("other-pod", "1.1.1.1")]);
        let ev = event(EventKind::Modified, "other-pod", "", true);
        let change = classify(&mut table, &ev, "this-pod").unwrap();
        assert_eq!(change, PeerChange::added("1.1.1.1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_repeated_event_is_idempotent() {
        let mut table = PeerTable::new();
        let ev = event(EventKind::Modified, "other-pod", "1.1.1.1", true);

        let first = classify(&mut table, &ev, SELF);
        let snapshot = table.clone();
        let second = classify(&mut table, &ev, SELF);

        assert_eq!(first, second);
        assert_eq!(table, snapshot);
    }

    #[test]
    fn test_unexpected_payload_ignored() {
        let mut table = PeerTable::new();
        let ev = WatchEvent::unexpected(EventKind::Error, "Status object");
        assert!(classify(&mut table, &ev, SELF).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_scenario_add_then_table_updated() {
        let mut table = PeerTable::new();
        let ev = event(EventKind::Modified, "other-pod", "1.1.1.1", true);
        let change = classify(&mut table, &ev, SELF);
        assert_eq!(change, Some(PeerChange::added("1.1.1.1")));
        assert_eq!(table, table_of(&[("other-pod", "1.1.1.1")]));
    }
}
