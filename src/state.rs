//! State and shared-value contracts.
//!
//! The engine never shares a state between concurrently running nodes.
//! Instead it requires two operations of every state type: a *dump* to a
//! nested mapping ([`serde_json::Value`], built with ordered maps) and a
//! *validate* back from one. Deep copies are plain clones; reconciliation
//! happens through [`crate::diff`] over the dumped mappings, so state
//! equality is equality of the dumped value.
//!
//! The shared value is the opposite: one instance, handed by reference to
//! every node and branch, never snapshotted and never diffed. The engine
//! performs no synchronization on it; shared types bring their own interior
//! mutability, like [`SharedMap`] does.

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Contract for graph states: serializable to a nested mapping and
/// reconstructible from one, deep-copyable, and movable across tasks.
///
/// Blanket-implemented for every type with the required capabilities; user
/// code never implements this directly.
pub trait GraphState: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> GraphState for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Contract for the shared value passed by reference to every node.
///
/// Blanket-implemented; the engine only needs to hand `&S` to concurrent
/// tasks, so interior mutability is the shared type's own business.
pub trait GraphShared: Send + Sync + 'static {}

impl<S> GraphShared for S where S: Send + Sync + 'static {}

/// Errors from the dump/validate round-trip.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The state could not be serialized to a nested mapping.
    #[error("failed to dump state to a nested mapping: {0}")]
    Dump(#[source] serde_json::Error),

    /// A nested mapping could not be validated back into the state type.
    #[error("failed to validate state from a nested mapping: {0}")]
    Validate(#[source] serde_json::Error),
}

/// Dumps a state to its nested-mapping representation.
///
/// # Errors
///
/// Returns [`StateError::Dump`] when serialization fails.
pub fn dump<T: GraphState>(state: &T) -> Result<Value, StateError> {
    serde_json::to_value(state).map_err(StateError::Dump)
}

/// Validates a nested mapping back into a state value.
///
/// # Errors
///
/// Returns [`StateError::Validate`] when the mapping does not conform to
/// the state type.
pub fn validate<T: GraphState>(value: Value) -> Result<T, StateError> {
    serde_json::from_value(value).map_err(StateError::Validate)
}

/// A minimal ready-made shared value: a lock-guarded string-keyed map.
///
/// Useful when a graph only needs a scratch space visible to every node.
/// All operations take the internal lock for their duration; nodes that
/// need read-modify-write atomicity should keep their own richer shared
/// type instead.
#[derive(Debug, Default)]
pub struct SharedMap {
    entries: Mutex<HashMap<String, Value>>,
}

impl SharedMap {
    /// Creates an empty shared map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under a key, returning the previous value if any.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.lock().insert(key.into(), value)
    }

    /// Returns a clone of the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.lock().remove(key)
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
