//! Capability contract for single-actor sub-environments.
//!
//! Each actor's cache/network runtime is supplied externally and only has
//! to satisfy [`ActorEnvironment`]. The router composes these capabilities
//! without reaching into their internals: the store, transport and tracker
//! accessors hand back opaque, read-only views.

use crate::disposable::Disposable;
use crate::observable::Observable;
use crate::registry::ActorId;
use crate::router::RouterHandle;
use crate::types::{
    DataSnapshot, OperationAvailability, OperationDescriptor, ReaderSelector, ResponsePayload,
};
use crate::Result;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque view of an actor's normalized record store.
///
/// The router treats this as read-only; concrete implementations may offer
/// richer access via [`as_any`](RecordStore::as_any) downcasts.
pub trait RecordStore: fmt::Debug + Send + Sync {
    /// Downcast escape hatch for concrete store implementations.
    fn as_any(&self) -> &dyn Any;
}

/// Opaque view of an actor's network transport.
pub trait NetworkLayer: fmt::Debug + Send + Sync {
    /// Downcast escape hatch for concrete transport implementations.
    fn as_any(&self) -> &dyn Any;
}

/// Opaque view of an actor's operation tracker.
pub trait OperationTracker: fmt::Debug + Send + Sync {
    /// Downcast escape hatch for concrete tracker implementations.
    fn as_any(&self) -> &dyn Any;
}

/// Callback invoked when a subscribed snapshot's data changes.
///
/// Fires at most once per commit that changes the snapshot's data, never
/// synchronously during registration.
pub type SnapshotCallback = Arc<dyn Fn(&DataSnapshot) + Send + Sync>;

/// Opaque store mutation, executed by the owning environment against its
/// own store. The router never runs these itself.
pub type StoreUpdater = Arc<dyn Fn(&dyn RecordStore) + Send + Sync>;

/// Configuration for executing a query operation.
#[derive(Clone)]
pub struct ExecuteConfig {
    /// The compiled operation to execute.
    pub operation: OperationDescriptor,
    /// Optional updater applied as response payloads are committed.
    pub updater: Option<StoreUpdater>,
}

impl ExecuteConfig {
    /// Execute an operation with no custom updater.
    pub fn new(operation: OperationDescriptor) -> Self {
        Self {
            operation,
            updater: None,
        }
    }
}

impl fmt::Debug for ExecuteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteConfig")
            .field("operation", &self.operation)
            .field("has_updater", &self.updater.is_some())
            .finish()
    }
}

/// Configuration for applying or executing a mutation.
#[derive(Clone)]
pub struct MutationConfig {
    /// The compiled mutation to execute.
    pub operation: OperationDescriptor,
    /// Optimistic payload applied before the server responds.
    pub optimistic_response: Option<ResponsePayload>,
    /// Optimistic store updater applied before the server responds.
    pub optimistic_updater: Option<StoreUpdater>,
    /// Updater applied when the final server payload is committed.
    pub updater: Option<StoreUpdater>,
}

impl MutationConfig {
    /// Mutation with no optimistic behavior.
    pub fn new(operation: OperationDescriptor) -> Self {
        Self {
            operation,
            optimistic_response: None,
            optimistic_updater: None,
            updater: None,
        }
    }

    /// Attach an optimistic payload.
    pub fn with_optimistic_response(mut self, payload: ResponsePayload) -> Self {
        self.optimistic_response = Some(payload);
        self
    }

    /// Attach an optimistic store updater.
    pub fn with_optimistic_updater(mut self, updater: StoreUpdater) -> Self {
        self.optimistic_updater = Some(updater);
        self
    }
}

impl fmt::Debug for MutationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationConfig")
            .field("operation", &self.operation)
            .field("has_optimistic_response", &self.optimistic_response.is_some())
            .field("has_optimistic_updater", &self.optimistic_updater.is_some())
            .field("has_updater", &self.updater.is_some())
            .finish()
    }
}

/// Configuration for executing an operation against an externally supplied
/// payload source instead of the environment's own transport.
#[derive(Clone)]
pub struct ExecuteWithSourceConfig {
    /// The compiled operation the payloads belong to.
    pub operation: OperationDescriptor,
    /// The payload source to drive execution from.
    pub source: Observable<ResponsePayload>,
}

impl fmt::Debug for ExecuteWithSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteWithSourceConfig")
            .field("operation", &self.operation)
            .finish()
    }
}

/// The full capability surface of one actor's cache/network runtime.
///
/// Implementations own their store, transport and tracker exclusively; no
/// cross-actor sharing happens through this contract.
pub trait ActorEnvironment: Send + Sync {
    /// The actor this environment belongs to.
    fn actor_id(&self) -> &ActorId;

    /// Compute cache availability for an operation.
    fn check(&self, operation: &OperationDescriptor) -> Result<OperationAvailability>;

    /// Read a selector out of the store.
    fn lookup(&self, selector: &ReaderSelector) -> Result<DataSnapshot>;

    /// Register a callback for changes to a snapshot's data.
    fn subscribe(&self, snapshot: DataSnapshot, callback: SnapshotCallback) -> Disposable;

    /// Hold a reference-counted retention on an operation's records,
    /// protecting them from collection until the handle is released.
    fn retain(&self, operation: &OperationDescriptor) -> Disposable;

    /// Apply an optimistic store update; the handle reverts exactly this
    /// update, leaving concurrent optimistic updates untouched.
    fn apply_update(&self, updater: StoreUpdater) -> Disposable;

    /// Apply a mutation optimistically; the handle reverts it.
    fn apply_mutation(&self, config: MutationConfig) -> Disposable;

    /// Commit a store update. Irreversible.
    fn commit_update(&self, updater: StoreUpdater) -> Result<()>;

    /// Commit a server payload for an operation. Irreversible.
    fn commit_payload(&self, operation: &OperationDescriptor, payload: ResponsePayload)
        -> Result<()>;

    /// Read-only view of the environment's network transport.
    fn network(&self) -> Arc<dyn NetworkLayer>;

    /// Read-only view of the environment's record store.
    fn store(&self) -> Arc<dyn RecordStore>;

    /// Read-only view of the environment's operation tracker.
    fn operation_tracker(&self) -> Arc<dyn OperationTracker>;

    /// Execute a query. Cold: no network or store activity happens until
    /// the returned observable is subscribed.
    fn execute(&self, config: ExecuteConfig) -> Observable<ResponsePayload>;

    /// Execute a mutation. Cold; optimistic state is applied when a
    /// subscription begins and settled on its terminal.
    fn execute_mutation(&self, config: MutationConfig) -> Observable<ResponsePayload>;

    /// Execute an operation fed from an external payload source. Cold.
    fn execute_with_source(&self, config: ExecuteWithSourceConfig) -> Observable<ResponsePayload>;
}

impl fmt::Debug for dyn ActorEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorEnvironment")
            .field("actor_id", self.actor_id())
            .finish_non_exhaustive()
    }
}

/// Produces sub-environments on first reference to an actor.
///
/// Invoked exactly once per distinct actor id over a registry's lifetime,
/// absent external eviction. The [`RouterHandle`] lets the environment
/// coordinate back through the router that owns it.
pub trait EnvironmentFactory: Send + Sync {
    /// Build the environment for `actor`.
    fn create(&self, actor: &ActorId, router: RouterHandle) -> Result<Arc<dyn ActorEnvironment>>;
}
