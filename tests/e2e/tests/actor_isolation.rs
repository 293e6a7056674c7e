//! Cross-actor isolation: lazy registry growth and per-actor stores.

use cache_runtime::{ActorId, ExecuteConfig, OperationAvailability, ReaderSelector, ResponsePayload};
use cache_runtime_e2e_tests::framework::{operation, Harness, StreamCollector};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[test]
fn registry_grows_lazily_and_subscriptions_register_silently() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let bob = ActorId::new("bob");
    assert_eq!(harness.router.actor_count(), 0);

    // First reference to alice creates her environment.
    let collector = StreamCollector::new();
    let stream = harness
        .router
        .execute(&alice, ExecuteConfig::new(operation("FeedQuery", "req-1")))
        .unwrap();
    let _subscription = stream.subscribe(collector.observer());
    assert_eq!(harness.router.actor_count(), 1);
    assert!(harness.router.has_actor(&alice));
    assert!(!harness.router.has_actor(&bob));

    // Registering a snapshot callback for bob creates his environment and
    // fires nothing during registration.
    let fired = Arc::new(Mutex::new(0usize));
    let fired_ref = Arc::clone(&fired);
    let snapshot = harness
        .router
        .lookup(&bob, &ReaderSelector::new("user:bob"))
        .unwrap();
    let _handle = harness
        .router
        .subscribe(&bob, snapshot, Arc::new(move |_| *fired_ref.lock() += 1))
        .unwrap();

    assert_eq!(harness.router.actor_count(), 2);
    assert_eq!(harness.factory.invocations(), 2);
    assert_eq!(*fired.lock(), 0);
}

#[test]
fn payloads_commit_only_to_the_target_actor() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let bob = ActorId::new("bob");
    let op = operation("UserQuery", "req-1");

    let collector = StreamCollector::new();
    let stream = harness
        .router
        .execute(&alice, ExecuteConfig::new(op.clone()))
        .unwrap();
    let _subscription = stream.subscribe(collector.observer());

    let network = harness.network(&alice);
    network.push(
        op.request_id(),
        ResponsePayload::new(json!({"user:1": {"name": "ada"}})),
    );
    network.complete(op.request_id());

    assert_eq!(collector.payload_count(), 1);
    assert!(collector.completed());

    // Alice's cache can now fulfill the operation; bob's never saw it.
    assert_eq!(
        harness.router.check(&alice, &op).unwrap(),
        OperationAvailability::Available
    );
    assert_eq!(
        harness.router.check(&bob, &op).unwrap(),
        OperationAvailability::Missing
    );
    let alice_view = harness
        .router
        .lookup(&alice, &ReaderSelector::new("user:1"))
        .unwrap();
    assert_eq!(alice_view.data, Some(json!({"name": "ada"})));
    let bob_view = harness
        .router
        .lookup(&bob, &ReaderSelector::new("user:1"))
        .unwrap();
    assert!(bob_view.is_missing_data);
}

#[test]
fn same_request_id_under_two_actors_is_tracked_independently() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let bob = ActorId::new("bob");
    let op = operation("InboxQuery", "req-shared");

    let stream_a = harness
        .router
        .execute(&alice, ExecuteConfig::new(op.clone()))
        .unwrap();
    let stream_b = harness
        .router
        .execute(&bob, ExecuteConfig::new(op.clone()))
        .unwrap();
    let sub_a = stream_a.subscribe(StreamCollector::new().observer());
    let _sub_b = stream_b.subscribe(StreamCollector::new().observer());

    assert!(harness.router.is_request_active(&alice, op.request_id()));
    assert!(harness.router.is_request_active(&bob, op.request_id()));
    assert_eq!(harness.router.active_request_count(), 2);

    // Ending alice's execution leaves bob's untouched.
    sub_a.unsubscribe();
    assert!(!harness.router.is_request_active(&alice, op.request_id()));
    assert!(harness.router.is_request_active(&bob, op.request_id()));
}
