//! Optimistic mutation flows: apply, revert, and settle on terminal.

use cache_runtime::test_utils::MemoryStore;
use cache_runtime::{ActorId, MutationConfig, ReaderSelector, ResponsePayload};
use cache_runtime_e2e_tests::framework::{operation, Harness, StreamCollector};
use serde_json::json;

#[test]
fn applied_mutation_reverts_without_cross_actor_residue() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let bob = ActorId::new("bob");

    // Bob exists before the mutation so residue checks are meaningful.
    harness.router.registry().resolve(&bob).unwrap();

    let config = MutationConfig::new(operation("SetStatusMutation", "req-1"))
        .with_optimistic_response(ResponsePayload::new(
            json!({"viewer:alice": {"status": "away"}}),
        ));
    let handle = harness.router.apply_mutation(&alice, config).unwrap();

    let optimistic_view = harness
        .router
        .lookup(&alice, &ReaderSelector::new("viewer:alice"))
        .unwrap();
    assert_eq!(optimistic_view.data, Some(json!({"status": "away"})));
    assert!(harness
        .router
        .lookup(&bob, &ReaderSelector::new("viewer:alice"))
        .unwrap()
        .is_missing_data);

    handle.dispose();

    // Reverted on alice; still absent on bob; nothing committed anywhere.
    assert!(harness
        .router
        .lookup(&alice, &ReaderSelector::new("viewer:alice"))
        .unwrap()
        .is_missing_data);
    assert_eq!(harness.store(&alice).record_count(), 0);
    assert_eq!(harness.store(&bob).record_count(), 0);
}

#[test]
fn concurrent_optimistic_updates_revert_independently() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");

    let status = harness
        .router
        .apply_update(
            &alice,
            MemoryStore::updater(|store| {
                store.write_record("viewer:alice", json!({"status": "away"}));
            }),
        )
        .unwrap();
    let draft = harness
        .router
        .apply_update(
            &alice,
            MemoryStore::updater(|store| {
                store.write_record("draft:1", json!({"body": "hello"}));
            }),
        )
        .unwrap();

    status.dispose();

    // Only the status update is gone; the draft layer survives the rebuild.
    let store = harness.store(&alice);
    assert_eq!(store.read_record("viewer:alice"), None);
    assert_eq!(store.read_record("draft:1"), Some(json!({"body": "hello"})));
    draft.dispose();
    assert_eq!(store.read_record("draft:1"), None);
}

#[test]
fn executed_mutation_masks_until_settled_on_completion() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let op = operation("RenameMutation", "req-1");

    let collector = StreamCollector::new();
    let config = MutationConfig::new(op.clone()).with_optimistic_response(ResponsePayload::new(
        json!({"user:1": {"name": "optimistic"}}),
    ));
    let stream = harness.router.execute_mutation(&alice, config).unwrap();
    let _subscription = stream.subscribe(collector.observer());

    // Optimistic data is visible the moment streaming begins.
    let store = harness.store(&alice);
    assert_eq!(
        store.read_record("user:1"),
        Some(json!({"name": "optimistic"}))
    );
    assert!(harness.router.is_request_active(&alice, op.request_id()));

    // The server payload commits underneath, but the optimistic layer keeps
    // masking it until the mutation settles.
    let network = harness.network(&alice);
    network.push(
        op.request_id(),
        ResponsePayload::new(json!({"user:1": {"name": "final"}})),
    );
    assert_eq!(
        store.read_record("user:1"),
        Some(json!({"name": "optimistic"}))
    );
    assert_eq!(collector.payload_count(), 1);

    network.complete(op.request_id());
    assert_eq!(store.read_record("user:1"), Some(json!({"name": "final"})));
    assert!(collector.completed());
    assert!(!harness.router.is_request_active(&alice, op.request_id()));
}

#[test]
fn cancelled_mutation_reverts_its_optimistic_state() {
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let op = operation("RenameMutation", "req-1");

    let config = MutationConfig::new(op.clone()).with_optimistic_response(ResponsePayload::new(
        json!({"user:1": {"name": "optimistic"}}),
    ));
    let stream = harness.router.execute_mutation(&alice, config).unwrap();
    let subscription = stream.subscribe(StreamCollector::new().observer());

    let store = harness.store(&alice);
    assert_eq!(
        store.read_record("user:1"),
        Some(json!({"name": "optimistic"}))
    );

    subscription.unsubscribe();

    assert_eq!(store.read_record("user:1"), None);
    assert!(harness.network(&alice).was_cancelled(op.request_id()));
    assert!(!harness.router.is_request_active(&alice, op.request_id()));
}
