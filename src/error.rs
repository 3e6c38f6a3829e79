//! The engine's error surface.
//!
//! Construction-time problems are [`BuildError`]s and abort graph
//! creation. Everything that can go wrong while a graph runs is an
//! [`ExecutionError`]; node errors themselves are routed along error edges
//! first and only become [`UnhandledNodeErrors`] when no edge consumes
//! them.

use core::fmt;

use crate::diff::{ApplyError, ChangeConflict};
use crate::node::NodeError;
use crate::state::StateError;

/// Structural errors detected while indexing a graph's edges.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// An edge is malformed.
    #[error("invalid edge at index {index}: {reason}")]
    InvalidEdge {
        /// The edge's position in its branch's edge list.
        index: usize,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A node source was paired with an error config, or vice versa.
    #[error("config kind does not match source kind for edge at index {index}")]
    InvalidConfigKind {
        /// The edge's position in its branch's edge list.
        index: usize,
    },
}

/// A group of node errors no error edge consumed.
#[derive(Debug)]
pub struct UnhandledNodeErrors {
    /// The unconsumed errors, in step order.
    pub errors: Vec<NodeError>,
}

impl fmt::Display for UnhandledNodeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unhandled node error(s): ", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnhandledNodeErrors {}

/// Errors that can occur while a graph runs.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Two or more sibling changesets touched the same path.
    #[error(transparent)]
    Conflict(#[from] ChangeConflict),

    /// Applying a changeset to a state mapping failed.
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// A state failed to dump or validate.
    #[error(transparent)]
    State(#[from] StateError),

    /// One or more node errors had no matching, textually-later error edge.
    #[error(transparent)]
    Unhandled(#[from] UnhandledNodeErrors),

    /// A dynamic router failed. Router errors are not recoverable by error
    /// edges; they surface to `on_error` hooks and then propagate.
    #[error("dynamic router failed: {source}")]
    Router {
        /// The router's error.
        #[source]
        source: NodeError,
    },

    /// The run was cancelled by its owning scope.
    #[error("graph execution was cancelled")]
    Cancelled,

    /// A joined sub-branch terminated before publishing its result; the
    /// sub-branch's own task carries the root cause.
    #[error("sub-branch terminated before publishing its result")]
    BranchLost,

    /// A branch container target was not registered during graph
    /// construction.
    #[error("branch container was not registered during graph construction")]
    UnknownBranch,
}
