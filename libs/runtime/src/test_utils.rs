//! Deterministic in-memory environment implementation.
//!
//! A complete [`ActorEnvironment`] over an in-memory store and a manually
//! driven network, used by the crate's own tests and usable as executable
//! documentation of the capability contract. The network keeps requests
//! pending until the test pushes payloads, completes, or fails them, so
//! every stream transition can be asserted deterministically.

use crate::disposable::Disposable;
use crate::environment::{
    ActorEnvironment, EnvironmentFactory, ExecuteConfig, ExecuteWithSourceConfig, MutationConfig,
    NetworkLayer, OperationTracker, RecordStore, SnapshotCallback, StoreUpdater,
};
use crate::error::RuntimeError;
use crate::observable::{Observable, Observer, Sink};
use crate::registry::ActorId;
use crate::router::RouterHandle;
use crate::types::{
    DataSnapshot, OperationAvailability, OperationDescriptor, ReaderSelector, RequestId,
    ResponsePayload,
};
use crate::Result;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Normalized record store with an optimistic layer.
///
/// Committed records live in a base map; optimistic updates are kept as an
/// ordered list of layers replayed over the base, so reverting one layer
/// recomputes the view without disturbing the others.
pub struct MemoryStore {
    base: Mutex<HashMap<String, Value>>,
    /// Live view: base plus optimistic layers, rebuilt on every change.
    records: Mutex<HashMap<String, Value>>,
    optimistic: Mutex<Vec<(u64, StoreUpdater)>>,
    retained: Mutex<HashMap<RequestId, usize>>,
    next_layer_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            base: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            optimistic: Mutex::new(Vec::new()),
            retained: Mutex::new(HashMap::new()),
            next_layer_id: AtomicU64::new(0),
        }
    }

    /// Write one record into the live view. Inside a committing updater
    /// this lands in the base; inside an optimistic updater it lands in
    /// that updater's layer.
    pub fn write_record(&self, data_id: impl Into<String>, value: Value) {
        self.records.lock().insert(data_id.into(), value);
    }

    /// Read one record from the live view.
    pub fn read_record(&self, data_id: &str) -> Option<Value> {
        self.records.lock().get(data_id).cloned()
    }

    /// Number of records in the live view.
    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Current retention count for an operation's records.
    pub fn retain_count(&self, request: &RequestId) -> usize {
        self.retained.lock().get(request).copied().unwrap_or(0)
    }

    /// Check whether an operation's records are protected from collection.
    pub fn is_retained(&self, request: &RequestId) -> bool {
        self.retain_count(request) > 0
    }

    /// Wrap a typed closure as an opaque [`StoreUpdater`].
    pub fn updater(f: impl Fn(&MemoryStore) + Send + Sync + 'static) -> StoreUpdater {
        Arc::new(move |store: &dyn RecordStore| {
            if let Some(memory) = store.as_any().downcast_ref::<MemoryStore>() {
                f(memory);
            } else {
                warn!("Store updater applied to a non-memory store");
            }
        })
    }

    pub(crate) fn retain_request(&self, request: &RequestId) {
        *self.retained.lock().entry(request.clone()).or_insert(0) += 1;
    }

    pub(crate) fn release_request(&self, request: &RequestId) {
        let mut retained = self.retained.lock();
        if let Some(count) = retained.get_mut(request) {
            *count -= 1;
            if *count == 0 {
                retained.remove(request);
            }
        }
    }

    /// Apply an optimistic layer on top of the current view.
    pub(crate) fn apply_optimistic(&self, updater: StoreUpdater) -> u64 {
        let layer_id = self.next_layer_id.fetch_add(1, Ordering::Relaxed);
        self.optimistic.lock().push((layer_id, Arc::clone(&updater)));
        updater(self);
        layer_id
    }

    /// Remove one optimistic layer and rebuild the view from the base,
    /// replaying the remaining layers in order.
    pub(crate) fn remove_optimistic(&self, layer_id: u64) {
        self.optimistic.lock().retain(|(id, _)| *id != layer_id);
        self.rebuild();
    }

    /// Commit an updater into the base, then replay optimistic layers.
    pub(crate) fn commit(&self, updater: &StoreUpdater) {
        {
            let base = self.base.lock().clone();
            *self.records.lock() = base;
        }
        updater(self);
        {
            let records = self.records.lock().clone();
            *self.base.lock() = records;
        }
        self.replay_optimistic();
    }

    /// Commit records into the base, then rebuild the view.
    pub(crate) fn commit_records(&self, entries: Vec<(String, Value)>) {
        {
            let mut base = self.base.lock();
            for (data_id, value) in entries {
                base.insert(data_id, value);
            }
        }
        self.rebuild();
    }

    fn rebuild(&self) {
        {
            let base = self.base.lock().clone();
            *self.records.lock() = base;
        }
        self.replay_optimistic();
    }

    fn replay_optimistic(&self) {
        // Snapshot the layer list first: updaters re-enter the store.
        let layers = self.optimistic.lock().clone();
        for (_, updater) in layers {
            updater(self);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.record_count())
            .field("optimistic_layers", &self.optimistic.lock().len())
            .finish()
    }
}

/// One scripted network event, replayed to every new subscription.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// Deliver a payload.
    Payload(ResponsePayload),
    /// Complete the request.
    Complete,
    /// Fail the request.
    Fail(RuntimeError),
}

#[derive(Clone)]
struct OpenEntry {
    id: u64,
    request: RequestId,
    sink: Sink<ResponsePayload>,
    on_payload: Arc<dyn Fn(&ResponsePayload) + Send + Sync>,
    on_terminal: Arc<dyn Fn() + Send + Sync>,
}

/// Manually driven transport.
///
/// A request stays pending until the test pushes payloads or terminates
/// it, unless events were scripted for its id, in which case they replay
/// synchronously to each new subscription.
pub struct MemoryNetwork {
    open: Mutex<Vec<OpenEntry>>,
    scripted: Mutex<HashMap<RequestId, Vec<NetworkEvent>>>,
    cancelled: Mutex<Vec<RequestId>>,
    next_open_id: AtomicU64,
}

impl MemoryNetwork {
    /// Create a network with no open or scripted requests.
    pub fn new() -> Self {
        Self {
            open: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(Vec::new()),
            next_open_id: AtomicU64::new(0),
        }
    }

    /// Script events to replay to every future subscription of `request`.
    pub fn script(&self, request: &RequestId, events: Vec<NetworkEvent>) {
        self.scripted.lock().insert(request.clone(), events);
    }

    /// Deliver a payload to every open subscription of `request`.
    pub fn push(&self, request: &RequestId, payload: ResponsePayload) {
        let targets: Vec<OpenEntry> = self
            .open
            .lock()
            .iter()
            .filter(|entry| &entry.request == request)
            .cloned()
            .collect();
        for entry in targets {
            (entry.on_payload)(&payload);
            entry.sink.next(payload.clone());
        }
    }

    /// Complete every open subscription of `request`.
    pub fn complete(&self, request: &RequestId) {
        for entry in self.take_open(request) {
            (entry.on_terminal)();
            entry.sink.complete();
        }
    }

    /// Fail every open subscription of `request`.
    pub fn fail(&self, request: &RequestId, error: RuntimeError) {
        for entry in self.take_open(request) {
            (entry.on_terminal)();
            entry.sink.error(error.clone());
        }
    }

    /// Number of currently open subscriptions, across all requests.
    pub fn open_request_count(&self) -> usize {
        self.open.lock().len()
    }

    /// Check whether any subscription of `request` was cancelled.
    pub fn was_cancelled(&self, request: &RequestId) -> bool {
        self.cancelled.lock().contains(request)
    }

    fn take_open(&self, request: &RequestId) -> Vec<OpenEntry> {
        let mut open = self.open.lock();
        let (done, rest): (Vec<_>, Vec<_>) =
            open.drain(..).partition(|entry| &entry.request == request);
        *open = rest;
        done
    }

    pub(crate) fn open(
        &self,
        request: RequestId,
        sink: Sink<ResponsePayload>,
        on_payload: Arc<dyn Fn(&ResponsePayload) + Send + Sync>,
        on_terminal: Arc<dyn Fn() + Send + Sync>,
    ) -> u64 {
        let id = self.next_open_id.fetch_add(1, Ordering::Relaxed);
        let entry = OpenEntry {
            id,
            request: request.clone(),
            sink,
            on_payload,
            on_terminal,
        };
        self.open.lock().push(entry.clone());

        let events = self.scripted.lock().get(&request).cloned().unwrap_or_default();
        for event in events {
            match event {
                NetworkEvent::Payload(payload) => {
                    (entry.on_payload)(&payload);
                    entry.sink.next(payload);
                }
                NetworkEvent::Complete => {
                    self.remove_open(id);
                    (entry.on_terminal)();
                    entry.sink.complete();
                    break;
                }
                NetworkEvent::Fail(error) => {
                    self.remove_open(id);
                    (entry.on_terminal)();
                    entry.sink.error(error);
                    break;
                }
            }
        }
        id
    }

    /// Cancel one subscription; called from stream teardown.
    pub(crate) fn cancel(&self, open_id: u64) {
        if let Some(entry) = self.remove_open(open_id) {
            self.cancelled.lock().push(entry.request.clone());
            (entry.on_terminal)();
        }
    }

    fn remove_open(&self, open_id: u64) -> Option<OpenEntry> {
        let mut open = self.open.lock();
        let position = open.iter().position(|entry| entry.id == open_id)?;
        Some(open.remove(position))
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLayer for MemoryNetwork {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("open", &self.open_request_count())
            .field("cancelled", &self.cancelled.lock().len())
            .finish()
    }
}

/// Records which operations an environment executed.
#[derive(Debug, Default)]
pub struct MemoryOperationTracker {
    executed: Mutex<Vec<String>>,
}

impl MemoryOperationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all executed operations, in execution order.
    pub fn executed_operations(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    fn record(&self, name: &str) {
        self.executed.lock().push(name.to_string());
    }
}

impl OperationTracker for MemoryOperationTracker {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SnapshotSubscription {
    selector: ReaderSelector,
    last: Option<Value>,
    callback: SnapshotCallback,
}

/// Complete in-memory [`ActorEnvironment`].
pub struct MemoryEnvironment {
    actor: ActorId,
    store: Arc<MemoryStore>,
    network: Arc<MemoryNetwork>,
    tracker: Arc<MemoryOperationTracker>,
    subscriptions: Mutex<HashMap<u64, SnapshotSubscription>>,
    published: Mutex<HashSet<RequestId>>,
    next_subscription_id: AtomicU64,
    router: RouterHandle,
    weak: Weak<MemoryEnvironment>,
}

impl MemoryEnvironment {
    /// Create an environment for `actor`, keeping the router back-reference
    /// for cross-actor coordination.
    pub fn new(actor: ActorId, router: RouterHandle) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            actor,
            store: Arc::new(MemoryStore::new()),
            network: Arc::new(MemoryNetwork::new()),
            tracker: Arc::new(MemoryOperationTracker::new()),
            subscriptions: Mutex::new(HashMap::new()),
            published: Mutex::new(HashSet::new()),
            next_subscription_id: AtomicU64::new(0),
            router,
            weak: weak.clone(),
        })
    }

    /// Concrete store, for assertions.
    pub fn memory_store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Concrete network, for driving pending requests.
    pub fn memory_network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    /// Concrete tracker, for assertions.
    pub fn memory_tracker(&self) -> &Arc<MemoryOperationTracker> {
        &self.tracker
    }

    /// The router this environment was created under.
    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    /// Fire callbacks for snapshots whose data changed since last notify.
    /// At most one callback per subscription per commit.
    fn notify_subscribers(&self) {
        let mut fired = Vec::new();
        {
            let mut subscriptions = self.subscriptions.lock();
            for subscription in subscriptions.values_mut() {
                let current = self.store.read_record(&subscription.selector.data_id);
                if current != subscription.last {
                    subscription.last = current.clone();
                    fired.push((
                        subscription.selector.clone(),
                        current,
                        Arc::clone(&subscription.callback),
                    ));
                }
            }
        }
        for (selector, data, callback) in fired {
            let snapshot = DataSnapshot {
                selector,
                is_missing_data: data.is_none(),
                data,
            };
            callback(&snapshot);
        }
    }

    /// Commit one response payload (and the config's updater, if any) into
    /// the store as it streams through.
    fn ingest(
        &self,
        operation: &OperationDescriptor,
        payload: ResponsePayload,
        updater: Option<&StoreUpdater>,
    ) {
        let _ = self.commit_payload(operation, payload);
        if let Some(updater) = updater {
            let _ = self.commit_update(Arc::clone(updater));
        }
    }
}

fn payload_records(payload: &ResponsePayload) -> Vec<(String, Value)> {
    match &payload.data {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => Vec::new(),
    }
}

impl ActorEnvironment for MemoryEnvironment {
    fn actor_id(&self) -> &ActorId {
        &self.actor
    }

    fn check(&self, operation: &OperationDescriptor) -> Result<OperationAvailability> {
        if self.published.lock().contains(operation.request_id()) {
            Ok(OperationAvailability::Available)
        } else {
            Ok(OperationAvailability::Missing)
        }
    }

    fn lookup(&self, selector: &ReaderSelector) -> Result<DataSnapshot> {
        let data = self.store.read_record(&selector.data_id);
        Ok(DataSnapshot {
            selector: selector.clone(),
            is_missing_data: data.is_none(),
            data,
        })
    }

    fn subscribe(&self, snapshot: DataSnapshot, callback: SnapshotCallback) -> Disposable {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.lock().insert(
            id,
            SnapshotSubscription {
                selector: snapshot.selector,
                last: snapshot.data,
                callback,
            },
        );
        let weak = Weak::clone(&self.weak);
        Disposable::new(move || {
            if let Some(environment) = weak.upgrade() {
                environment.subscriptions.lock().remove(&id);
            }
        })
    }

    fn retain(&self, operation: &OperationDescriptor) -> Disposable {
        let request = operation.request_id().clone();
        self.store.retain_request(&request);
        let store = Arc::clone(&self.store);
        Disposable::new(move || store.release_request(&request))
    }

    fn apply_update(&self, updater: StoreUpdater) -> Disposable {
        let layer_id = self.store.apply_optimistic(updater);
        self.notify_subscribers();
        let weak = Weak::clone(&self.weak);
        Disposable::new(move || {
            if let Some(environment) = weak.upgrade() {
                environment.store.remove_optimistic(layer_id);
                environment.notify_subscribers();
            }
        })
    }

    fn apply_mutation(&self, config: MutationConfig) -> Disposable {
        let response = config.optimistic_response;
        let updater = config.optimistic_updater;
        let composed: StoreUpdater = Arc::new(move |store: &dyn RecordStore| {
            if let Some(payload) = &response {
                if let Some(memory) = store.as_any().downcast_ref::<MemoryStore>() {
                    for (data_id, value) in payload_records(payload) {
                        memory.write_record(data_id, value);
                    }
                }
            }
            if let Some(updater) = &updater {
                updater(store);
            }
        });
        self.apply_update(composed)
    }

    fn commit_update(&self, updater: StoreUpdater) -> Result<()> {
        self.store.commit(&updater);
        self.notify_subscribers();
        Ok(())
    }

    fn commit_payload(
        &self,
        operation: &OperationDescriptor,
        payload: ResponsePayload,
    ) -> Result<()> {
        let mut entries = payload_records(&payload);
        if entries.is_empty() && !payload.data.is_null() {
            // Non-object payloads are stored under the request's own id.
            entries.push((operation.request_id().as_str().to_string(), payload.data));
        }
        self.store.commit_records(entries);
        self.published.lock().insert(operation.request_id().clone());
        self.notify_subscribers();
        Ok(())
    }

    fn network(&self) -> Arc<dyn NetworkLayer> {
        Arc::clone(&self.network) as Arc<dyn NetworkLayer>
    }

    fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store) as Arc<dyn RecordStore>
    }

    fn operation_tracker(&self) -> Arc<dyn OperationTracker> {
        Arc::clone(&self.tracker) as Arc<dyn OperationTracker>
    }

    fn execute(&self, config: ExecuteConfig) -> Observable<ResponsePayload> {
        let weak = Weak::clone(&self.weak);
        Observable::new(move |sink: Sink<ResponsePayload>| {
            let Some(environment) = weak.upgrade() else {
                sink.error(RuntimeError::environment("environment dropped"));
                return Disposable::noop();
            };
            environment.tracker.record(config.operation.name());

            let operation = config.operation.clone();
            let updater = config.updater.clone();
            let ingest_environment = Arc::clone(&environment);
            let on_payload: Arc<dyn Fn(&ResponsePayload) + Send + Sync> =
                Arc::new(move |payload| {
                    ingest_environment.ingest(&operation, payload.clone(), updater.as_ref());
                });
            let on_terminal: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});

            let open_id = environment.network.open(
                config.operation.request_id().clone(),
                sink,
                on_payload,
                on_terminal,
            );
            let network = Arc::clone(&environment.network);
            Disposable::new(move || network.cancel(open_id))
        })
    }

    fn execute_mutation(&self, config: MutationConfig) -> Observable<ResponsePayload> {
        let weak = Weak::clone(&self.weak);
        Observable::new(move |sink: Sink<ResponsePayload>| {
            let Some(environment) = weak.upgrade() else {
                sink.error(RuntimeError::environment("environment dropped"));
                return Disposable::noop();
            };
            environment.tracker.record(config.operation.name());

            // Optimistic state lives for the duration of the request and is
            // settled (reverted) on any terminal, including cancellation.
            let optimistic = if config.optimistic_response.is_some()
                || config.optimistic_updater.is_some()
            {
                Some(environment.apply_mutation(config.clone()))
            } else {
                None
            };

            let operation = config.operation.clone();
            let updater = config.updater.clone();
            let ingest_environment = Arc::clone(&environment);
            let on_payload: Arc<dyn Fn(&ResponsePayload) + Send + Sync> =
                Arc::new(move |payload| {
                    ingest_environment.ingest(&operation, payload.clone(), updater.as_ref());
                });
            let on_terminal: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                if let Some(handle) = &optimistic {
                    handle.dispose();
                }
            });

            let open_id = environment.network.open(
                config.operation.request_id().clone(),
                sink,
                on_payload,
                on_terminal,
            );
            let network = Arc::clone(&environment.network);
            Disposable::new(move || network.cancel(open_id))
        })
    }

    fn execute_with_source(&self, config: ExecuteWithSourceConfig) -> Observable<ResponsePayload> {
        let weak = Weak::clone(&self.weak);
        Observable::new(move |sink: Sink<ResponsePayload>| {
            let Some(environment) = weak.upgrade() else {
                sink.error(RuntimeError::environment("environment dropped"));
                return Disposable::noop();
            };
            environment.tracker.record(config.operation.name());

            let operation = config.operation.clone();
            let ingest_environment = Arc::clone(&environment);
            let next_sink = sink.clone();
            let error_sink = sink.clone();
            let complete_sink = sink;

            let inner = config.source.subscribe(
                Observer::new()
                    .on_next(move |payload: ResponsePayload| {
                        ingest_environment.ingest(&operation, payload.clone(), None);
                        next_sink.next(payload);
                    })
                    .on_error(move |err| error_sink.error(err))
                    .on_complete(move || complete_sink.complete()),
            );
            Disposable::new(move || inner.unsubscribe())
        })
    }
}

impl fmt::Debug for MemoryEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEnvironment")
            .field("actor", &self.actor)
            .field("store", &self.store)
            .field("network", &self.network)
            .finish()
    }
}

/// Factory producing [`MemoryEnvironment`]s, with knobs for exercising
/// registry failure paths.
pub struct MemoryEnvironmentFactory {
    invocations: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    resolve_self_next: AtomicBool,
    resolve_sibling_next: Mutex<Option<ActorId>>,
    environments: Mutex<HashMap<ActorId, Arc<MemoryEnvironment>>>,
}

impl MemoryEnvironmentFactory {
    /// Create a factory with no scripted behavior.
    pub fn new() -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            resolve_self_next: AtomicBool::new(false),
            resolve_sibling_next: Mutex::new(None),
            environments: Mutex::new(HashMap::new()),
        }
    }

    /// Total number of factory invocations.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Make the next `create` fail with a resolution error.
    pub fn fail_next_create(&self, reason: impl Into<String>) {
        *self.fail_next.lock() = Some(reason.into());
    }

    /// Make the next `create` recursively resolve its own actor, to
    /// exercise the registry's re-entrancy guard.
    pub fn resolve_self_on_next_create(&self) {
        self.resolve_self_next.store(true, Ordering::Relaxed);
    }

    /// Make the next `create` resolve another actor first (legal).
    pub fn resolve_sibling_on_next_create(&self, sibling: ActorId) {
        *self.resolve_sibling_next.lock() = Some(sibling);
    }

    /// The concrete environment created for `actor`, if any.
    pub fn environment_of(&self, actor: &ActorId) -> Option<Arc<MemoryEnvironment>> {
        self.environments.lock().get(actor).cloned()
    }

    /// The concrete store created for `actor`, if any.
    pub fn store_of(&self, actor: &ActorId) -> Option<Arc<MemoryStore>> {
        self.environment_of(actor)
            .map(|environment| Arc::clone(environment.memory_store()))
    }

    /// The concrete network created for `actor`, if any.
    pub fn network_of(&self, actor: &ActorId) -> Option<Arc<MemoryNetwork>> {
        self.environment_of(actor)
            .map(|environment| Arc::clone(environment.memory_network()))
    }

    /// The concrete tracker created for `actor`, if any.
    pub fn tracker_of(&self, actor: &ActorId) -> Option<Arc<MemoryOperationTracker>> {
        self.environment_of(actor)
            .map(|environment| Arc::clone(environment.memory_tracker()))
    }
}

impl Default for MemoryEnvironmentFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentFactory for MemoryEnvironmentFactory {
    fn create(&self, actor: &ActorId, router: RouterHandle) -> Result<Arc<dyn ActorEnvironment>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        if let Some(reason) = self.fail_next.lock().take() {
            return Err(RuntimeError::resolution(actor, reason));
        }
        if self.resolve_self_next.swap(false, Ordering::Relaxed) {
            if let Some(owner) = router.upgrade() {
                owner.registry().resolve(actor)?;
            }
        }
        let sibling_to_resolve = self.resolve_sibling_next.lock().take();
        if let Some(sibling) = sibling_to_resolve {
            if let Some(owner) = router.upgrade() {
                owner.registry().resolve(&sibling)?;
            }
        }

        let environment = MemoryEnvironment::new(actor.clone(), router);
        self.environments
            .lock()
            .insert(actor.clone(), Arc::clone(&environment));
        Ok(environment)
    }
}
