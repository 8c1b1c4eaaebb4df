//! End-to-end delivery tests.
//!
//! These exercise the public API the way widgets use it: subscribe under a
//! namespace, release events with each delivery mode and check exactly which
//! listeners ran, in which order, with which payload.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use widget_bus::{Bus, BusConfig, BusError, DeliveryMode, EventDescriptor, ListenerHandle};

/// Records `(listener tag, payload)` pairs in invocation order.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<(&'static str, Value)>>>,
}

impl Recorder {
    fn subscribe(&self, bus: &Bus, ns: &str, name: &str, tag: &'static str) -> ListenerHandle {
        let calls = Arc::clone(&self.calls);
        bus.subscribe(ns, name, move |payload| calls.lock().push((tag, payload.clone())))
    }

    fn calls(&self) -> Vec<(&'static str, Value)> {
        self.calls.lock().clone()
    }

    fn tags(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|(tag, _)| *tag).collect()
    }
}

#[test]
fn broadcast_reaches_every_namespace_once() {
    let bus = Bus::default();
    let rec = Recorder::default();
    rec.subscribe(&bus, "A", "ping", "f1");
    rec.subscribe(&bus, "B", "ping", "f2");

    bus.release(&EventDescriptor::new("A", "ping", json!("hi"))).unwrap();

    assert_eq!(rec.calls(), vec![("f1", json!("hi")), ("f2", json!("hi"))]);
}

#[test]
fn broadcast_follows_namespace_order_then_list_order() {
    let bus = Bus::default();
    let rec = Recorder::default();
    rec.subscribe(&bus, "second", "tick", "s1");
    rec.subscribe(&bus, "first", "tick", "f1");
    rec.subscribe(&bus, "second", "tick", "s2");
    rec.subscribe(&bus, "third", "tock", "unrelated");

    bus.release(&EventDescriptor::broadcast("any", "tick", json!(0))).unwrap();

    assert_eq!(rec.tags(), vec!["s2", "s1", "f1"]);
}

#[test]
fn unicast_delivers_to_newest_listener_only() {
    let bus = Bus::default();
    let rec = Recorder::default();
    rec.subscribe(&bus, "A", "x", "f1");
    rec.subscribe(&bus, "A", "x", "f2");

    let event = EventDescriptor::new("A", "x", json!(5)).with_mode(DeliveryMode::Unicast);
    bus.release(&event).unwrap();

    assert_eq!(rec.calls(), vec![("f2", json!(5))]);
}

#[test]
fn unicast_falls_back_after_newest_unsubscribes() {
    let bus = Bus::default();
    let rec = Recorder::default();
    rec.subscribe(&bus, "A", "x", "f1");
    let newest = rec.subscribe(&bus, "A", "x", "f2");

    assert!(bus.unsubscribe("A", "x", &newest));
    bus.release(&EventDescriptor::unicast("A", "x", json!(1))).unwrap();

    assert_eq!(rec.tags(), vec!["f1"]);
}

#[test]
fn multicast_stays_in_its_namespace() {
    let bus = Bus::default();
    let rec = Recorder::default();
    rec.subscribe(&bus, "A", "x", "l1");
    rec.subscribe(&bus, "A", "x", "l2");
    rec.subscribe(&bus, "B", "x", "elsewhere");

    let report = bus
        .release(&EventDescriptor::multicast("A", "x", json!({"k": "v"})))
        .unwrap();

    assert_eq!(report.delivered, 2);
    assert_eq!(rec.tags(), vec!["l2", "l1"]);
}

#[test]
fn subscribe_then_unsubscribe_leaves_no_binding() {
    let bus = Bus::default();

    for (ns, name) in [("A", "x"), ("", ""), ("10.0.0.1", "onClick")] {
        let handle = bus.subscribe(ns, name, |_| {});
        assert!(bus.unsubscribe(ns, name, &handle));
        assert_eq!(bus.handles(ns, name), None);
    }

    assert!(bus.namespaces().is_empty());
}

#[test]
fn unsubscribing_a_stranger_changes_nothing() {
    let bus = Bus::default();
    let rec = Recorder::default();
    let h1 = rec.subscribe(&bus, "A", "x", "f1");
    let h2 = rec.subscribe(&bus, "A", "x", "f2");

    assert!(!bus.unsubscribe("A", "x", &ListenerHandle::new()));
    assert!(!bus.unsubscribe("A", "y", &h1));
    assert!(!bus.unsubscribe("Z", "x", &h1));

    assert_eq!(bus.handles("A", "x"), Some(vec![h2, h1]));
}

#[test]
fn unknown_mode_invokes_nothing() {
    let bus = Bus::default();
    let rec = Recorder::default();
    rec.subscribe(&bus, "A", "x", "f1");

    let report = bus
        .release(&EventDescriptor::new("A", "x", json!(1)).with_mode(42u8))
        .unwrap();

    assert_eq!(report.invoked(), 0);
    assert!(rec.calls().is_empty());
}

#[test]
fn strict_bus_rejects_unknown_mode() {
    let bus = Bus::new(BusConfig::default().with_strict_modes(true));

    let err = bus
        .release_value(json!({"namespace": "A", "event_name": "x", "payload": 1, "mode": 4}))
        .unwrap_err();

    assert_eq!(err.error_code(), "UNKNOWN_DELIVERY_MODE");
}

#[test]
fn malformed_input_is_rejected_before_dispatch() {
    let bus = Bus::default();
    let rec = Recorder::default();
    rec.subscribe(&bus, "A", "x", "f1");

    let err = bus
        .release_value(json!({"namespace": "A", "event_name": "x"}))
        .unwrap_err();

    assert!(matches!(err, BusError::InvalidEvent(_)));
    assert!(rec.calls().is_empty());
    assert_eq!(bus.stats().events_rejected, 1);
    assert_eq!(bus.stats().events_released, 0);
}

#[test]
fn listeners_can_unsubscribe_themselves() {
    let bus = Arc::new(Bus::default());
    let hits = Arc::new(Mutex::new(0u32));
    let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::default();

    let handle = {
        let bus_ref = Arc::clone(&bus);
        let hits = Arc::clone(&hits);
        let slot = Arc::clone(&slot);
        bus.subscribe("A", "once", move |_| {
            *hits.lock() += 1;
            if let Some(handle) = slot.lock().take() {
                bus_ref.unsubscribe("A", "once", &handle);
            }
        })
    };
    *slot.lock() = Some(handle);

    bus.release(&EventDescriptor::multicast("A", "once", json!(null))).unwrap();
    bus.release(&EventDescriptor::multicast("A", "once", json!(null))).unwrap();

    assert_eq!(*hits.lock(), 1);
    assert_eq!(bus.handles("A", "once"), None);
}

#[test]
fn bus_is_shareable_across_threads() {
    let bus = Arc::new(Bus::default());
    let rec = Recorder::default();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let bus = Arc::clone(&bus);
            let calls = Arc::clone(&rec.calls);
            std::thread::spawn(move || {
                bus.subscribe(&format!("ns-{i}"), "load", move |payload| {
                    calls.lock().push(("worker", payload.clone()));
                })
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let report = bus.release(&EventDescriptor::new("ns-0", "load", json!(1))).unwrap();
    assert_eq!(report.delivered, 4);
    assert_eq!(rec.calls().len(), 4);
}
