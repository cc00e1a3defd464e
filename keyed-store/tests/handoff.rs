//! Hand-off mode: dispatch applies state, the owner notifies later

use std::sync::{Arc, Mutex};

use keyed_store::debug::DispatchLogConfig;
use keyed_store::prelude::*;
use keyed_store::testing::{ListenerProbe, RecordingMiddleware};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[test]
fn test_hand_off_fires_nothing_until_executed() {
    let store = StoreBuilder::new(json!({"a": 0})).hand_off(true).build();
    let probe = ListenerProbe::new();
    let _sub = store.subscribe(probe.listener(), "a");
    let notified = Arc::new(Mutex::new(false));
    let n = notified.clone();

    let outcome = store.dispatch(json!({"a": 1}), move |_: &Record| {
        *n.lock().unwrap() = true;
    });

    assert_eq!(outcome.status, DispatchStatus::Deferred);
    assert_eq!(store.field("a"), Some(json!(1)));
    assert_eq!(probe.count(), 0);
    assert!(!*notified.lock().unwrap());

    store.execute_listeners(outcome.batch, &json!({"a": 1}).into_record(), None);
    assert_eq!(probe.count(), 1);
    assert!(*notified.lock().unwrap());
}

#[test]
fn test_second_execute_for_batch_warns_but_still_notifies() {
    let recorder = RecordingMiddleware::new();
    let store = StoreBuilder::new(json!({"a": 0}))
        .hand_off(true)
        .middleware(recorder.clone())
        .build();
    let probe = ListenerProbe::new();
    let _sub = store.subscribe(probe.listener(), "a");
    let on_changed_calls = Arc::new(Mutex::new(0));
    let c = on_changed_calls.clone();

    let outcome = store.dispatch(
        json!({"a": 1}),
        DispatchOptions::new().with_on_changed(move |_| *c.lock().unwrap() += 1),
    );

    store.execute_listeners(outcome.batch, &outcome.changed, None);
    store.execute_listeners(outcome.batch, &outcome.changed, None);

    // Listeners and the after hook run both times, on_changed only once
    assert_eq!(probe.count(), 2);
    assert_eq!(*on_changed_calls.lock().unwrap(), 1);
    assert_eq!(recorder.after_count(), 2);
}

#[test]
fn test_forged_batch_is_tolerated() {
    let store = StoreBuilder::new(json!({"a": 0})).hand_off(true).build();
    let probe = ListenerProbe::new();
    let _sub = store.subscribe(probe.listener(), "a");

    store.execute_listeners(Batch(999), &json!({"a": 5}).into_record(), None);
    assert_eq!(probe.count(), 1);
}

#[test]
fn test_batches_notified_out_of_order() {
    let store = StoreBuilder::new(json!({"a": 0, "b": 0})).hand_off(true).build();
    let a = ListenerProbe::new();
    let b = ListenerProbe::new();
    let _a = store.subscribe(a.listener(), "a");
    let _b = store.subscribe(b.listener(), "b");

    let first = store.dispatch(json!({"a": 1}), DispatchOptions::new());
    let second = store.dispatch(json!({"b": 1}), DispatchOptions::new());
    assert_eq!(store.pending_batches(), vec![first.batch, second.batch]);

    store.execute_listeners(second.batch, &second.changed, None);
    assert_eq!((a.count(), b.count()), (0, 1));
    assert_eq!(store.pending_batches(), vec![first.batch]);

    store.execute_listeners(first.batch, &first.changed, None);
    assert_eq!((a.count(), b.count()), (1, 1));
}

#[test]
fn test_switching_hand_off_off_keeps_pending_batches() {
    let store = Store::new(json!({"a": 0}));
    let probe = ListenerProbe::new();
    let _sub = store.subscribe(probe.listener(), "a");

    store.set_hand_off(true);
    let deferred = store.dispatch(json!({"a": 1}), DispatchOptions::new());
    store.set_hand_off(false);
    let direct = store.dispatch(json!({"a": 2}), DispatchOptions::new());

    assert_eq!(direct.status, DispatchStatus::Notified);
    assert_eq!(probe.count(), 1);
    assert_eq!(store.pending_batches(), vec![deferred.batch]);
}

#[test]
fn test_dispatch_log_tracks_deferred_notification() {
    let store = StoreBuilder::new(json!({"a": 0}))
        .hand_off(true)
        .dispatch_log(DispatchLogConfig::default())
        .build();
    let log = store.dispatch_log().unwrap();

    let outcome = store.dispatch(json!({"a": 1}), DispatchOptions::new());
    assert!(log.recent(1)[0].notified.is_none());

    store.execute_listeners(outcome.batch, &outcome.changed, None);
    assert_eq!(log.recent(1)[0].notified, Some(vec!["a".to_string()]));
}

#[test]
fn test_pending_notification_crosses_a_serialized_boundary() {
    let store = StoreBuilder::new(json!({"a": 0})).hand_off(true).build();
    let probe = ListenerProbe::new();
    let _sub = store.subscribe(probe.listener(), "a");

    let outcome = store.dispatch(json!({"a": 1}), DispatchOptions::new());
    let wire = serde_json::to_string(&outcome.pending().unwrap()).unwrap();

    let received: PendingNotification = serde_json::from_str(&wire).unwrap();
    store.execute_listeners(received.batch, &received.changed, None);
    assert_eq!(probe.count(), 1);
}

#[tokio::test]
async fn test_notifier_task_drives_listeners() {
    let store = StoreBuilder::new(json!({"count": 0})).hand_off(true).build();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let reader = store.clone();
    let _sub = store.subscribe(
        listener(move || {
            s.lock().unwrap().push(reader.field("count"));
        }),
        "count",
    );

    let (tx, rx) = handoff_channel();
    let cancel = CancellationToken::new();
    let notifier = spawn_notifier(store.clone(), rx, cancel.clone());

    for i in 1..=2 {
        let outcome = store.dispatch(json!({"count": i}), DispatchOptions::new());
        tx.send(outcome.pending().unwrap()).unwrap();
    }
    drop(tx);
    notifier.await.unwrap();

    // State was already final when the deferred listeners ran
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(json!(2)), Some(json!(2))]
    );
}
