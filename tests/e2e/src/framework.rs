//! Shared harness for end-to-end scenarios.

use bytes::Bytes;
use cache_runtime::test_utils::{MemoryEnvironmentFactory, MemoryNetwork, MemoryStore};
use cache_runtime::{
    ActorId, MultiActorRouter, Observer, OperationDescriptor, RequestId, ResponsePayload,
    RuntimeError,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// One router over in-memory environments, plus handles for driving and
/// inspecting each actor's transport and store.
pub struct Harness {
    pub router: Arc<MultiActorRouter>,
    pub factory: Arc<MemoryEnvironmentFactory>,
}

impl Harness {
    /// Build a fresh router with no environments created yet.
    pub fn new() -> Self {
        init_tracing();
        let factory = Arc::new(MemoryEnvironmentFactory::new());
        let router = MultiActorRouter::new(factory.clone());
        Self { router, factory }
    }

    /// The network driving `actor`'s pending requests. Panics if the actor
    /// has not been resolved yet.
    pub fn network(&self, actor: &ActorId) -> Arc<MemoryNetwork> {
        match self.factory.network_of(actor) {
            Some(network) => network,
            None => panic!("no environment created for actor '{actor}'"),
        }
    }

    /// The store backing `actor`'s environment. Panics if the actor has not
    /// been resolved yet.
    pub fn store(&self, actor: &ActorId) -> Arc<MemoryStore> {
        match self.factory.store_of(actor) {
            Some(store) => store,
            None => panic!("no environment created for actor '{actor}'"),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a descriptor with an empty plan body; routing only ever reads the
/// name and request id.
pub fn operation(name: &str, request: &str) -> OperationDescriptor {
    OperationDescriptor::new(name, RequestId::new(request), Bytes::new())
}

/// Records every event one stream subscription delivers.
#[derive(Clone, Default)]
pub struct StreamCollector {
    payloads: Arc<Mutex<Vec<ResponsePayload>>>,
    errors: Arc<Mutex<Vec<RuntimeError>>>,
    completions: Arc<Mutex<usize>>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer feeding this collector.
    pub fn observer(&self) -> Observer<ResponsePayload> {
        let payloads = Arc::clone(&self.payloads);
        let errors = Arc::clone(&self.errors);
        let completions = Arc::clone(&self.completions);
        Observer::new()
            .on_next(move |payload| payloads.lock().push(payload))
            .on_error(move |err| errors.lock().push(err))
            .on_complete(move || *completions.lock() += 1)
    }

    pub fn payloads(&self) -> Vec<ResponsePayload> {
        self.payloads.lock().clone()
    }

    pub fn payload_count(&self) -> usize {
        self.payloads.lock().len()
    }

    pub fn errors(&self) -> Vec<RuntimeError> {
        self.errors.lock().clone()
    }

    pub fn completed(&self) -> bool {
        *self.completions.lock() > 0
    }
}

fn init_tracing() {
    // Ignore the error when another test already installed a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
