//! Actor identifiers and the lazy environment registry.
//!
//! The registry owns the mapping from actor id to sub-environment. Entries
//! are created on first reference through the factory, cached for the
//! registry's lifetime, and only removed by an explicit, externally driven
//! eviction. `resolve` never replaces an existing entry in place.

use crate::environment::{ActorEnvironment, EnvironmentFactory};
use crate::error::RuntimeError;
use crate::router::RouterHandle;
use crate::Result;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opaque token naming one logical actor (a user, session, or connection
/// sharing the process with other actors).
///
/// Two ids compare equal iff they denote the same actor; this is the sole
/// registry key. No ordering semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor id from an opaque token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lazily instantiating map from actor id to its sub-environment.
pub struct ActorRegistry {
    environments: RwLock<HashMap<ActorId, Arc<dyn ActorEnvironment>>>,
    /// Ids whose factory invocation is currently on the stack; used to fail
    /// fast on re-entrant resolution instead of recursing.
    constructing: Mutex<HashSet<ActorId>>,
    factory: Arc<dyn EnvironmentFactory>,
    router: RouterHandle,
}

impl ActorRegistry {
    /// Create a registry backed by `factory`. Each factory invocation
    /// receives `router` so environments can coordinate across actors.
    pub fn new(factory: Arc<dyn EnvironmentFactory>, router: RouterHandle) -> Self {
        Self {
            environments: RwLock::new(HashMap::new()),
            constructing: Mutex::new(HashSet::new()),
            factory,
            router,
        }
    }

    /// Resolve the environment for `actor`, creating it on first use.
    ///
    /// Every call for the same id returns the identical instance until
    /// eviction. A factory failure leaves the registry unmodified for that
    /// id, so the next call retries resolution from scratch.
    ///
    /// Re-entrant resolution of an id whose factory call is still running is
    /// an error. The guard cannot tell re-entry apart from a concurrent first
    /// resolution of the same id on another thread, so callers must not race
    /// first resolutions of one id; resolve sequentially instead.
    pub fn resolve(&self, actor: &ActorId) -> Result<Arc<dyn ActorEnvironment>> {
        if let Some(environment) = self.environments.read().get(actor) {
            return Ok(Arc::clone(environment));
        }

        {
            let mut constructing = self.constructing.lock();
            if !constructing.insert(actor.clone()) {
                warn!(actor_id = %actor, "Re-entrant environment resolution detected");
                return Err(RuntimeError::ReentrantResolution {
                    actor: actor.clone(),
                });
            }
        }

        debug!(actor_id = %actor, "Creating environment for actor");
        let created = self.factory.create(actor, self.router.clone());
        self.constructing.lock().remove(actor);

        let environment = created?;
        if environment.actor_id() != actor {
            return Err(RuntimeError::resolution(
                actor,
                format!(
                    "factory returned environment for actor '{}'",
                    environment.actor_id()
                ),
            ));
        }

        let mut environments = self.environments.write();
        let entry = environments
            .entry(actor.clone())
            .or_insert_with(|| Arc::clone(&environment));
        Ok(Arc::clone(entry))
    }

    /// Remove an actor's environment from the registry.
    ///
    /// Externally driven policy. In-flight requests for the actor drain to
    /// their natural terminal (their subscriptions own references to the
    /// environment), and previously issued release handles remain valid.
    pub fn evict(&self, actor: &ActorId) -> Option<Arc<dyn ActorEnvironment>> {
        let removed = self.environments.write().remove(actor);
        if removed.is_some() {
            debug!(actor_id = %actor, "Evicted environment from registry");
        }
        removed
    }

    /// Check whether an environment exists for `actor`.
    pub fn contains(&self, actor: &ActorId) -> bool {
        self.environments.read().contains_key(actor)
    }

    /// Number of live environments.
    pub fn len(&self) -> usize {
        self.environments.read().len()
    }

    /// Check whether no environments have been created yet.
    pub fn is_empty(&self) -> bool {
        self.environments.read().is_empty()
    }

    /// Ids of all live environments.
    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.environments.read().keys().cloned().collect()
    }
}

impl fmt::Debug for ActorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRegistry")
            .field("environments", &self.len())
            .finish()
    }
}
