//! Value types shared across the runtime.
//!
//! These are the opaque tokens the router passes through: it never inspects
//! an operation plan or a payload beyond the identifiers needed for routing
//! and bookkeeping.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single request execution, unique within one actor's
/// namespace. Requests across actors are distinguished by the compound
/// `(ActorId, RequestId)` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Create a request identifier from an opaque token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compiled plan for a query, mutation, or subscription.
///
/// The plan body is opaque to the routing layer; only the request identifier
/// (for activity bookkeeping) and the name (for logging) are read here.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    name: String,
    request_id: RequestId,
    plan: Bytes,
}

impl OperationDescriptor {
    /// Create a descriptor from a compiled plan.
    pub fn new(name: impl Into<String>, request_id: RequestId, plan: Bytes) -> Self {
        Self {
            name: name.into(),
            request_id,
            plan,
        }
    }

    /// Operation name, for logging only.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the request this operation executes.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// The opaque compiled plan.
    pub fn plan(&self) -> &Bytes {
        &self.plan
    }
}

/// One payload delivered on a response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Normalized response data, opaque to the router.
    pub data: serde_json::Value,
}

impl ResponsePayload {
    /// Wrap response data in a payload.
    pub fn new(data: serde_json::Value) -> Self {
        Self { data }
    }
}

/// Pointer to a readable region of a normalized store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReaderSelector {
    /// Identifier of the record the selector starts from.
    pub data_id: String,
}

impl ReaderSelector {
    /// Create a selector rooted at the given record.
    pub fn new(data_id: impl Into<String>) -> Self {
        Self {
            data_id: data_id.into(),
        }
    }
}

/// Result of reading a selector out of a store at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    /// The selector this snapshot was read from.
    pub selector: ReaderSelector,
    /// The data at the selector, if any was present.
    pub data: Option<serde_json::Value>,
    /// True when some of the selected data was absent from the store.
    pub is_missing_data: bool,
}

impl DataSnapshot {
    /// Snapshot for a selector with no data in the store.
    pub fn missing(selector: ReaderSelector) -> Self {
        Self {
            selector,
            data: None,
            is_missing_data: true,
        }
    }
}

/// Cache availability of an operation, as computed by a sub-environment.
/// The algorithm behind this is a black-box capability of each environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationAvailability {
    /// All data required by the operation is present and current.
    Available,
    /// Data is present but marked stale.
    Stale,
    /// Some required data is absent.
    Missing,
}

impl OperationAvailability {
    /// Check whether the operation can be fulfilled from cache.
    pub fn is_available(&self) -> bool {
        matches!(self, OperationAvailability::Available)
    }
}
