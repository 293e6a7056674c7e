//! End-to-end scenario tests for the multi-actor cache runtime.
//!
//! The harness wires a [`MultiActorRouter`](cache_runtime::MultiActorRouter)
//! to the in-memory reference environments and drives full request
//! lifecycles across several actors the way an embedding application would.

pub mod framework;

pub use framework::{Harness, StreamCollector};
