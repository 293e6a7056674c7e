//! Multi-actor routing facade.
//!
//! [`MultiActorRouter`] exposes the full single-actor capability surface,
//! parameterized by a leading [`ActorId`] on every call. Each operation
//! resolves (or lazily creates) the target sub-environment through the
//! registry and delegates, returning the sub-environment's result
//! unchanged. The router performs no retries and swallows nothing; its
//! only added behavior is cross-actor request-activity bookkeeping around
//! the execute family.

use crate::activity::{ActivityGuard, RequestActivityIndex};
use crate::disposable::Disposable;
use crate::environment::{
    ActorEnvironment, EnvironmentFactory, ExecuteConfig, ExecuteWithSourceConfig, MutationConfig,
    NetworkLayer, OperationTracker, RecordStore, SnapshotCallback, StoreUpdater,
};
use crate::observable::{Observable, Observer, Sink};
use crate::registry::{ActorId, ActorRegistry};
use crate::types::{
    DataSnapshot, OperationAvailability, OperationDescriptor, ReaderSelector, RequestId,
    ResponsePayload,
};
use crate::Result;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

/// Weak back-reference to a router, handed to environment factories so
/// sub-environments can coordinate across actors without owning the router.
#[derive(Clone)]
pub struct RouterHandle {
    inner: Weak<MultiActorRouter>,
}

impl RouterHandle {
    /// Get the router, if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<MultiActorRouter>> {
        self.inner.upgrade()
    }
}

impl fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Uniform entry point over any number of isolated actor environments.
pub struct MultiActorRouter {
    registry: ActorRegistry,
    activity: Arc<RequestActivityIndex>,
    router_id: String,
}

impl MultiActorRouter {
    /// Create a router backed by `factory`. No environments exist until
    /// the first operation references their actor.
    pub fn new(factory: Arc<dyn EnvironmentFactory>) -> Arc<Self> {
        let router_id = format!("router-{}", Uuid::new_v4().simple());
        debug!(router_id = %router_id, "Creating multi-actor router");
        Arc::new_cyclic(|weak| Self {
            registry: ActorRegistry::new(
                factory,
                RouterHandle {
                    inner: weak.clone(),
                },
            ),
            activity: Arc::new(RequestActivityIndex::new()),
            router_id,
        })
    }

    /// Identifier of this router instance, for logging.
    pub fn router_id(&self) -> &str {
        &self.router_id
    }

    /// The registry owning the actor-to-environment mapping.
    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    /// A weak back-reference to this router.
    pub fn handle(self: &Arc<Self>) -> RouterHandle {
        RouterHandle {
            inner: Arc::downgrade(self),
        }
    }

    /// Compute cache availability of an operation for one actor.
    pub fn check(
        &self,
        actor: &ActorId,
        operation: &OperationDescriptor,
    ) -> Result<OperationAvailability> {
        self.registry.resolve(actor)?.check(operation)
    }

    /// Read a selector out of one actor's store.
    pub fn lookup(&self, actor: &ActorId, selector: &ReaderSelector) -> Result<DataSnapshot> {
        self.registry.resolve(actor)?.lookup(selector)
    }

    /// Register a snapshot-change callback with one actor's environment.
    /// The callback fires at most once per commit that changes the
    /// snapshot's data, never synchronously during registration.
    pub fn subscribe(
        &self,
        actor: &ActorId,
        snapshot: DataSnapshot,
        callback: SnapshotCallback,
    ) -> Result<Disposable> {
        Ok(self.registry.resolve(actor)?.subscribe(snapshot, callback))
    }

    /// Retain an operation's records in one actor's store. Retaining the
    /// same operation under two actors holds two independent references.
    pub fn retain(&self, actor: &ActorId, operation: &OperationDescriptor) -> Result<Disposable> {
        Ok(self.registry.resolve(actor)?.retain(operation))
    }

    /// Apply an optimistic store update to one actor's environment; the
    /// returned handle reverts exactly that update.
    pub fn apply_update(&self, actor: &ActorId, updater: StoreUpdater) -> Result<Disposable> {
        Ok(self.registry.resolve(actor)?.apply_update(updater))
    }

    /// Apply a mutation optimistically to one actor's environment; the
    /// returned handle reverts it.
    pub fn apply_mutation(&self, actor: &ActorId, config: MutationConfig) -> Result<Disposable> {
        Ok(self.registry.resolve(actor)?.apply_mutation(config))
    }

    /// Commit a store update to one actor's environment. Irreversible.
    pub fn commit_update(&self, actor: &ActorId, updater: StoreUpdater) -> Result<()> {
        self.registry.resolve(actor)?.commit_update(updater)
    }

    /// Commit a server payload to one actor's environment. Irreversible.
    pub fn commit_payload(
        &self,
        actor: &ActorId,
        operation: &OperationDescriptor,
        payload: ResponsePayload,
    ) -> Result<()> {
        self.registry.resolve(actor)?.commit_payload(operation, payload)
    }

    /// Read-only view of one actor's network transport.
    pub fn network(&self, actor: &ActorId) -> Result<Arc<dyn NetworkLayer>> {
        Ok(self.registry.resolve(actor)?.network())
    }

    /// Read-only view of one actor's record store.
    pub fn store(&self, actor: &ActorId) -> Result<Arc<dyn RecordStore>> {
        Ok(self.registry.resolve(actor)?.store())
    }

    /// Read-only view of one actor's operation tracker.
    pub fn operation_tracker(&self, actor: &ActorId) -> Result<Arc<dyn OperationTracker>> {
        Ok(self.registry.resolve(actor)?.operation_tracker())
    }

    /// Execute a query against one actor's environment.
    ///
    /// The returned observable is cold: nothing runs until a subscription
    /// begins. Each subscription re-executes independently, is registered
    /// in the activity index while streaming, and is cleared on complete,
    /// error, or unsubscription. Factory errors during resolution propagate
    /// synchronously from this call.
    pub fn execute(
        &self,
        actor: &ActorId,
        config: ExecuteConfig,
    ) -> Result<Observable<ResponsePayload>> {
        let environment = self.registry.resolve(actor)?;
        debug!(
            router_id = %self.router_id,
            actor_id = %actor,
            operation = config.operation.name(),
            request_id = %config.operation.request_id(),
            "Routing execute"
        );
        let request = config.operation.request_id().clone();
        Ok(self.tracked(actor.clone(), request, move || {
            environment.execute(config.clone())
        }))
    }

    /// Execute a mutation against one actor's environment. Same stream and
    /// activity semantics as [`execute`](Self::execute).
    pub fn execute_mutation(
        &self,
        actor: &ActorId,
        config: MutationConfig,
    ) -> Result<Observable<ResponsePayload>> {
        let environment = self.registry.resolve(actor)?;
        debug!(
            router_id = %self.router_id,
            actor_id = %actor,
            operation = config.operation.name(),
            request_id = %config.operation.request_id(),
            "Routing execute_mutation"
        );
        let request = config.operation.request_id().clone();
        Ok(self.tracked(actor.clone(), request, move || {
            environment.execute_mutation(config.clone())
        }))
    }

    /// Execute an operation fed from an external payload source against one
    /// actor's environment. Same stream and activity semantics as
    /// [`execute`](Self::execute).
    pub fn execute_with_source(
        &self,
        actor: &ActorId,
        config: ExecuteWithSourceConfig,
    ) -> Result<Observable<ResponsePayload>> {
        let environment = self.registry.resolve(actor)?;
        debug!(
            router_id = %self.router_id,
            actor_id = %actor,
            operation = config.operation.name(),
            request_id = %config.operation.request_id(),
            "Routing execute_with_source"
        );
        let request = config.operation.request_id().clone();
        Ok(self.tracked(actor.clone(), request, move || {
            environment.execute_with_source(config.clone())
        }))
    }

    /// Check whether any execution of `(actor, request)` is currently
    /// streaming. False for pairs never registered or already cleared.
    pub fn is_request_active(&self, actor: &ActorId, request: &RequestId) -> bool {
        self.activity.is_active(actor, request)
    }

    /// Number of distinct `(actor, request)` pairs currently streaming.
    pub fn active_request_count(&self) -> usize {
        self.activity.len()
    }

    /// Evict one actor's environment. See [`ActorRegistry::evict`] for the
    /// drain semantics.
    pub fn evict_actor(&self, actor: &ActorId) -> Option<Arc<dyn ActorEnvironment>> {
        self.registry.evict(actor)
    }

    /// Number of live actor environments.
    pub fn actor_count(&self) -> usize {
        self.registry.len()
    }

    /// Check whether an environment exists for `actor`.
    pub fn has_actor(&self, actor: &ActorId) -> bool {
        self.registry.contains(actor)
    }

    /// Wrap a delegated execution in activity bookkeeping: the pair is
    /// marked active the moment streaming begins and cleared exactly once
    /// per subscription on complete, error, or cancellation.
    fn tracked(
        &self,
        actor: ActorId,
        request: RequestId,
        run: impl Fn() -> Observable<ResponsePayload> + Send + Sync + 'static,
    ) -> Observable<ResponsePayload> {
        let activity = Arc::clone(&self.activity);
        Observable::new(move |sink: Sink<ResponsePayload>| {
            let guard =
                ActivityGuard::begin(Arc::clone(&activity), actor.clone(), request.clone());

            let next_sink = sink.clone();
            let error_sink = sink.clone();
            let complete_sink = sink;
            let error_guard = guard.clone();
            let complete_guard = guard.clone();

            let inner = run().subscribe(
                Observer::new()
                    .on_next(move |payload| next_sink.next(payload))
                    .on_error(move |err| {
                        error_guard.clear();
                        error_sink.error(err);
                    })
                    .on_complete(move || {
                        complete_guard.clear();
                        complete_sink.complete();
                    }),
            );

            Disposable::new(move || {
                guard.clear();
                inner.unsubscribe();
            })
        })
    }
}

impl fmt::Debug for MultiActorRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiActorRouter")
            .field("router_id", &self.router_id)
            .field("actors", &self.registry.len())
            .field("active_requests", &self.activity.len())
            .finish()
    }
}
