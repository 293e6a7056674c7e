//! Error taxonomy for the multi-actor runtime.
//!
//! The router is a pass-through layer: it never retries, transforms, or
//! swallows errors. Synchronous failures propagate to the caller of the
//! triggering operation; failures inside an execution surface on the
//! stream's error channel.

use crate::registry::ActorId;

/// Errors surfaced by the multi-actor runtime.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// The environment factory failed (or returned invalid state) while
    /// constructing a sub-environment. The registry is left unmodified for
    /// that actor, so the next call retries resolution from scratch.
    #[error("Environment resolution failed for actor '{actor}': {reason}")]
    Resolution { actor: ActorId, reason: String },

    /// A factory invocation recursively triggered resolution for the actor
    /// it is currently constructing.
    #[error("Re-entrant resolution for actor '{actor}' during environment construction")]
    ReentrantResolution { actor: ActorId },

    /// A delegated synchronous environment operation failed.
    #[error("Environment operation failed: {0}")]
    Environment(String),

    /// A transport-originated failure delivered through a response stream.
    #[error("Network error: {0}")]
    Network(String),

    /// The underlying request was cancelled by the transport.
    #[error("Request cancelled")]
    Cancelled,
}

impl RuntimeError {
    /// Create a resolution error for a failed factory invocation.
    pub fn resolution(actor: &ActorId, reason: impl Into<String>) -> Self {
        RuntimeError::Resolution {
            actor: actor.clone(),
            reason: reason.into(),
        }
    }

    /// Create a delegated environment operation error.
    pub fn environment(msg: impl Into<String>) -> Self {
        RuntimeError::Environment(msg.into())
    }

    /// Create a transport error.
    pub fn network(msg: impl Into<String>) -> Self {
        RuntimeError::Network(msg.into())
    }

    /// Stable category label for structured logging.
    pub fn category(&self) -> &'static str {
        match self {
            RuntimeError::Resolution { .. } => "resolution",
            RuntimeError::ReentrantResolution { .. } => "reentrant_resolution",
            RuntimeError::Environment(_) => "environment",
            RuntimeError::Network(_) => "network",
            RuntimeError::Cancelled => "cancelled",
        }
    }

    /// Check if this error originated during environment resolution.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            RuntimeError::Resolution { .. } | RuntimeError::ReentrantResolution { .. }
        )
    }

    /// Check if this error was delivered by a transport.
    pub fn is_network_error(&self) -> bool {
        matches!(self, RuntimeError::Network(_) | RuntimeError::Cancelled)
    }
}
