//! Cross-actor request activity bookkeeping.
//!
//! The one piece of state shared across otherwise isolated actors: which
//! `(actor, request)` pairs are currently streaming. Updated only at
//! stream-subscription and stream-termination/cancellation boundaries,
//! never polled from sub-environment internals.

use crate::registry::ActorId;
use crate::types::RequestId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Table of currently active requests, keyed by `(actor, request)`.
///
/// Externally boolean (a pair is active or it is not); internally
/// reference-counted so two concurrent executions of the same request stay
/// independently tracked. Entries are removed when their count reaches
/// zero, so no stale entries survive completion.
#[derive(Debug, Default)]
pub struct RequestActivityIndex {
    active: Mutex<HashMap<(ActorId, RequestId), usize>>,
}

impl RequestActivityIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that one execution of `(actor, request)` began streaming.
    pub fn begin(&self, actor: &ActorId, request: &RequestId) {
        let mut active = self.active.lock();
        let count = active
            .entry((actor.clone(), request.clone()))
            .or_insert(0);
        *count += 1;
        trace!(actor_id = %actor, request_id = %request, executions = *count, "Request active");
    }

    /// Record that one execution of `(actor, request)` reached a terminal
    /// state (complete, error, or cancellation).
    pub fn end(&self, actor: &ActorId, request: &RequestId) {
        let mut active = self.active.lock();
        let key = (actor.clone(), request.clone());
        if let Some(count) = active.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                active.remove(&key);
            }
        }
        trace!(actor_id = %actor, request_id = %request, "Request execution ended");
    }

    /// Check whether any execution of `(actor, request)` is streaming.
    /// False for pairs never registered or already cleared.
    pub fn is_active(&self, actor: &ActorId, request: &RequestId) -> bool {
        self.active
            .lock()
            .contains_key(&(actor.clone(), request.clone()))
    }

    /// Number of distinct `(actor, request)` pairs currently active.
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// Check whether no requests are active.
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

/// One-shot clear token for a single stream subscription.
///
/// Completion, error delivery and unsubscribe teardown may each try to
/// clear the same subscription's entry; the guard makes sure exactly one
/// of them decrements the index.
#[derive(Debug, Clone)]
pub(crate) struct ActivityGuard {
    inner: Arc<GuardInner>,
}

#[derive(Debug)]
struct GuardInner {
    index: Arc<RequestActivityIndex>,
    actor: ActorId,
    request: RequestId,
    cleared: AtomicBool,
}

impl ActivityGuard {
    /// Register the subscription as active and return its clear token.
    pub(crate) fn begin(
        index: Arc<RequestActivityIndex>,
        actor: ActorId,
        request: RequestId,
    ) -> Self {
        index.begin(&actor, &request);
        Self {
            inner: Arc::new(GuardInner {
                index,
                actor,
                request,
                cleared: AtomicBool::new(false),
            }),
        }
    }

    /// Clear the subscription's entry. Idempotent.
    pub(crate) fn clear(&self) {
        if self.inner.cleared.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.index.end(&self.inner.actor, &self.inner.request);
    }
}
