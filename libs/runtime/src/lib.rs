//! Multi-actor routing layer for a normalized-cache query runtime.
//!
//! A single process often hosts several logical actors (users, sessions,
//! connections) that must share one client runtime without sharing cached
//! state. This crate provides the routing facade over per-actor
//! sub-environments: every operation names its target actor, environments
//! are created lazily on first reference, and all data isolation falls out
//! of each actor owning its own store and transport.
//!
//! ```text
//!                   ┌────────────────────┐
//!     execute ────► │  MultiActorRouter  │
//!     check         │                    │
//!     lookup        │  RequestActivity   │  cross-actor bookkeeping
//!     retain        │      Index         │
//!                   └─────────┬──────────┘
//!                             │ resolve(actor)
//!                   ┌─────────▼──────────┐
//!                   │   ActorRegistry    │  lazy creation, eviction
//!                   └─────────┬──────────┘
//!                             │ create via EnvironmentFactory
//!              ┌──────────────┼──────────────┐
//!      ┌───────▼──────┐ ┌─────▼────────┐ ┌───▼──────────┐
//!      │ ActorEnv (a) │ │ ActorEnv (b) │ │ ActorEnv (c) │
//!      │ store · net  │ │ store · net  │ │ store · net  │
//!      └──────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`router`]: the [`MultiActorRouter`] facade and [`RouterHandle`]
//! - [`registry`]: [`ActorId`] and the lazily instantiating [`ActorRegistry`]
//! - [`environment`]: the [`ActorEnvironment`] capability contract and
//!   [`EnvironmentFactory`]
//! - [`activity`]: the cross-actor [`RequestActivityIndex`]
//! - [`observable`]: cold [`Observable`] streams with synchronous teardown
//! - [`disposable`]: idempotent [`Disposable`] release handles
//! - [`types`]: opaque value types shared across the runtime
//! - [`error`]: [`RuntimeError`]
//! - [`test_utils`]: a complete in-memory environment for tests
//!
//! The router adds no caching, retrying, or merging of its own; it resolves
//! the target environment, delegates, and keeps the activity index current
//! around the execute family.

pub mod activity;
pub mod disposable;
pub mod environment;
pub mod error;
pub mod observable;
pub mod registry;
pub mod router;
pub mod test_utils;
pub mod types;

pub use activity::RequestActivityIndex;
pub use disposable::Disposable;
pub use environment::{
    ActorEnvironment, EnvironmentFactory, ExecuteConfig, ExecuteWithSourceConfig, MutationConfig,
    NetworkLayer, OperationTracker, RecordStore, SnapshotCallback, StoreUpdater,
};
pub use error::RuntimeError;
pub use observable::{EventStream, Observable, Observer, Sink, Subscription};
pub use registry::{ActorId, ActorRegistry};
pub use router::{MultiActorRouter, RouterHandle};
pub use types::{
    DataSnapshot, OperationAvailability, OperationDescriptor, ReaderSelector, RequestId,
    ResponsePayload,
};

/// Canonical result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
