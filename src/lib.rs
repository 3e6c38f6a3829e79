//! Structured concurrent graph execution.
//!
//! `braid` runs computations declared as directed graphs of async nodes.
//! Within a step, targets run concurrently — each against a private deep
//! copy of the state — and their writes are reconciled by structural diff,
//! with conflicting writes rejected instead of silently overwritten.
//! Errors route along dedicated error edges with positional scoping, and
//! whole sub-graphs can run as concurrent branches that join back into
//! their spawner at a nominated node.
//!
//! # Core Concepts
//!
//! - [`Node`] / [`NodeRef`] - Async units of computation with identity
//! - [`Edge`] - The edge language connecting sources to targets
//! - [`BranchContainer`] - A start source, an edge list, and a join target
//! - [`Graph`] - The indexed, executable graph
//! - [`GraphHook`] - Lifecycle observation and error intervention
//! - [`diff`] - The structural diff/patch/conflict engine behind merges
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use braid::prelude::*;
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct Counter { value: i64 }
//!
//! struct Increment;
//!
//! #[async_trait::async_trait]
//! impl Node<Counter, SharedMap> for Increment {
//!     async fn run(&self, state: &mut Counter, _shared: &SharedMap) -> Result<(), NodeError> {
//!         state.value += 1;
//!         Ok(())
//!     }
//! }
//!
//! let increment = NodeRef::new(Increment);
//! let graph = Graph::new(BranchContainer::new(
//!     Start,
//!     vec![Edge::new(Start, &increment), Edge::new(&increment, End)],
//!     End,
//! ))?;
//!
//! let (state, _shared) = graph.run(Counter { value: 0 }, Arc::new(SharedMap::new())).await?;
//! assert_eq!(state.value, 1);
//! ```
//!
//! # Concurrency Model
//!
//! Each branch is one task; the nodes of one step fan out as tasks of a
//! step-scoped set, where the first failure aborts its siblings and the
//! raised errors are pooled for routing. States are never shared between
//! concurrent nodes. The shared value is shared by reference everywhere
//! and left entirely to user-side synchronization.

/// Structural diff, patch, and conflict detection over nested mappings.
pub mod diff;

/// The edge language: sources, targets, routers, configs, containers.
pub mod edge;

/// Engine error surface.
pub mod error;

/// Graph construction and run orchestration.
pub mod graph;

/// Lifecycle hooks.
pub mod hooks;

/// Per-branch routing tables.
pub mod index;

/// User nodes and the start/end sentinels.
pub mod node;

/// Next-step resolution.
pub mod resolver;

/// Error routing along error edges.
pub(crate) mod router;

/// State and shared-value contracts.
pub mod state;

/// Branch runtime: step loop, fan-out, merges, joins.
pub mod branch;

/// Re-export of the commonly used surface.
pub mod prelude {
    pub use crate::branch::{BranchId, BranchInfo, JoinRegistry};
    pub use crate::diff::{Change, ChangeConflict, ChangeKind, ChangeSet, Path};
    pub use crate::edge::{
        BranchContainer, Edge, EdgeConfig, ErrorConfig, ErrorType, Next, NodeConfig, ResolvedNext,
        Router, SingleNext, SingleSource,
    };
    pub use crate::error::{BuildError, ExecutionError, UnhandledNodeErrors};
    pub use crate::graph::Graph;
    pub use crate::hooks::{GraphHook, TraceHook};
    pub use crate::node::{End, Node, NodeError, NodeRef, Start};
    pub use crate::resolver::{NextNode, ReachedBy};
    pub use crate::state::{GraphShared, GraphState, SharedMap};
}

// Re-export key types at the crate root for convenience.
pub use edge::{BranchContainer, Edge, ErrorType, Router};
pub use error::{BuildError, ExecutionError};
pub use graph::Graph;
pub use hooks::{GraphHook, TraceHook};
pub use node::{End, Node, NodeError, NodeRef, Start};
pub use state::{GraphShared, GraphState, SharedMap};
