//! Full request lifecycles: cancellation, retention, and eviction drain.

use assert_matches::assert_matches;
use cache_runtime::{ActorId, ExecuteConfig, ReaderSelector, ResponsePayload, RuntimeError};
use cache_runtime_e2e_tests::framework::{operation, Harness, StreamCollector};
use serde_json::json;

#[test]
fn cancellation_before_first_payload_leaves_no_trace() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let op = operation("ProfileQuery", "req-1");

    let collector = StreamCollector::new();
    let stream = harness
        .router
        .execute(&alice, ExecuteConfig::new(op.clone()))
        .unwrap();
    let subscription = stream.subscribe(collector.observer());
    assert!(harness.router.is_request_active(&alice, op.request_id()));

    subscription.unsubscribe();

    // Cleared synchronously, transport told, nothing committed.
    assert!(!harness.router.is_request_active(&alice, op.request_id()));
    let network = harness.network(&alice);
    assert!(network.was_cancelled(op.request_id()));
    assert_eq!(harness.store(&alice).record_count(), 0);

    // A late payload from the transport is dropped on the floor.
    network.push(
        op.request_id(),
        ResponsePayload::new(json!({"user:1": {"name": "ada"}})),
    );
    assert_eq!(collector.payload_count(), 0);
    assert!(!collector.completed());
    assert_eq!(harness.store(&alice).record_count(), 0);
}

#[test]
fn two_executions_of_one_request_cancel_independently() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let op = operation("FeedQuery", "req-1");

    let stream = harness
        .router
        .execute(&alice, ExecuteConfig::new(op.clone()))
        .unwrap();
    let first = stream.subscribe(StreamCollector::new().observer());
    let second_collector = StreamCollector::new();
    let second = stream.subscribe(second_collector.observer());

    let network = harness.network(&alice);
    assert_eq!(network.open_request_count(), 2);

    // Cancelling the first execution keeps the pair active: the second is
    // still streaming.
    first.unsubscribe();
    assert!(harness.router.is_request_active(&alice, op.request_id()));
    assert_eq!(network.open_request_count(), 1);

    // The surviving execution still delivers.
    network.push(
        op.request_id(),
        ResponsePayload::new(json!({"feed:1": {"items": 2}})),
    );
    network.complete(op.request_id());
    assert_eq!(second_collector.payload_count(), 1);
    assert!(second_collector.completed());
    assert!(!harness.router.is_request_active(&alice, op.request_id()));
    assert!(second.is_closed());
}

#[test]
fn transport_failure_surfaces_on_the_stream_only() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let op = operation("FeedQuery", "req-1");

    let collector = StreamCollector::new();
    let stream = harness
        .router
        .execute(&alice, ExecuteConfig::new(op.clone()))
        .unwrap();
    let _subscription = stream.subscribe(collector.observer());

    harness
        .network(&alice)
        .fail(op.request_id(), RuntimeError::network("connection reset"));

    let errors = collector.errors();
    assert_eq!(errors.len(), 1);
    assert_matches!(&errors[0], RuntimeError::Network(_));
    assert!(!collector.completed());
    assert!(!harness.router.is_request_active(&alice, op.request_id()));
}

#[test]
fn retention_is_refcounted_per_actor() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let bob = ActorId::new("bob");
    let op = operation("PinnedQuery", "req-1");

    let alice_first = harness.router.retain(&alice, &op).unwrap();
    let alice_second = harness.router.retain(&alice, &op).unwrap();
    let bob_only = harness.router.retain(&bob, &op).unwrap();

    assert_eq!(harness.store(&alice).retain_count(op.request_id()), 2);
    assert_eq!(harness.store(&bob).retain_count(op.request_id()), 1);

    alice_first.dispose();
    assert!(harness.store(&alice).is_retained(op.request_id()));
    alice_second.dispose();
    assert!(!harness.store(&alice).is_retained(op.request_id()));

    // Bob's retention never depended on alice's handles.
    assert!(harness.store(&bob).is_retained(op.request_id()));
    bob_only.dispose();
    assert!(!harness.store(&bob).is_retained(op.request_id()));
}

#[test]
fn eviction_lets_in_flight_requests_drain() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let op = operation("FeedQuery", "req-1");

    let collector = StreamCollector::new();
    let stream = harness
        .router
        .execute(&alice, ExecuteConfig::new(op.clone()))
        .unwrap();
    let _subscription = stream.subscribe(collector.observer());

    // Keep direct handles before eviction; the registry forgets the actor
    // but the environment stays alive for its in-flight work.
    let network = harness.network(&alice);
    let retain_handle = harness.router.retain(&alice, &op).unwrap();
    let evicted = harness.router.evict_actor(&alice);
    assert!(evicted.is_some());
    assert!(!harness.router.has_actor(&alice));

    network.push(
        op.request_id(),
        ResponsePayload::new(json!({"feed:1": {"items": 1}})),
    );
    network.complete(op.request_id());
    assert_eq!(collector.payload_count(), 1);
    assert!(collector.completed());
    assert!(!harness.router.is_request_active(&alice, op.request_id()));

    // Release handles issued before eviction still work.
    retain_handle.dispose();

    // The next reference builds a fresh environment.
    let view = harness
        .router
        .lookup(&alice, &ReaderSelector::new("feed:1"))
        .unwrap();
    assert!(view.is_missing_data);
    assert_eq!(harness.factory.invocations(), 2);
}
