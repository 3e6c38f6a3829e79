//! Lifecycle hooks for graph execution.
//!
//! Hooks observe — and at one point intervene in — a run: graph start/end,
//! step boundaries, sub-branch spawns, merges and their conflicts, and
//! branch errors. Every registered hook is awaited sequentially in
//! registration order at each point. All methods default to no-ops, so
//! implementations override only what they care about.
//!
//! Hooks must not mutate the state or shared value except intentionally;
//! the engine does not re-validate after hook calls. The only intervention
//! point is [`GraphHook::on_error`], which may absorb a branch error by
//! returning `None` or replace it by returning a different one.

use async_trait::async_trait;

use crate::branch::{BranchInfo, JoinRegistry};
use crate::diff::{ChangeConflict, ChangeSet};
use crate::error::ExecutionError;
use crate::resolver::{NextNode, ReachedBy};
use crate::state::{GraphState, GraphShared};

/// Observability and intervention callbacks for a graph run.
#[async_trait]
pub trait GraphHook<T: GraphState, S: GraphShared>: Send + Sync {
    /// Called once when a run begins, before any branch is spawned.
    async fn on_graph_start(&self, _state: &T, _shared: &S) {}

    /// Called once when a run completed, with the final state.
    async fn on_graph_end(&self, _state: &T, _shared: &S) {}

    /// Called at the top of every step with the nodes about to run.
    async fn on_step_start(&self, _state: &T, _shared: &S, _next_nodes: &[NextNode<T, S>]) {}

    /// Called at the bottom of every step.
    ///
    /// On success this receives the *newly computed* next nodes; when an
    /// error escapes the step it receives the nodes of the step that
    /// failed.
    async fn on_step_end(&self, _state: &T, _shared: &S, _next_nodes: &[NextNode<T, S>]) {}

    /// Called before a sub-branch is spawned.
    async fn on_spawn_branch_start(
        &self,
        _state: &T,
        _shared: &S,
        _branch: &BranchInfo<T, S>,
        _trigger: &ReachedBy<T, S>,
        _registry: &JoinRegistry<T, S>,
    ) {
    }

    /// Called right after a sub-branch was spawned and registered under its
    /// join target.
    async fn on_spawn_branch_end(
        &self,
        _state: &T,
        _shared: &S,
        _branch: &BranchInfo<T, S>,
        _trigger: &ReachedBy<T, S>,
        _registry: &JoinRegistry<T, S>,
    ) {
    }

    /// Called after a step's changesets were computed, before they are
    /// checked and applied.
    async fn on_merge_start(&self, _state: &T, _result_states: &[T], _changes: &[ChangeSet]) {}

    /// Called when sibling changesets touch the same path, right before
    /// the step fails with the conflict.
    async fn on_merge_conflict(
        &self,
        _state: &T,
        _changes: &[ChangeSet],
        _conflicts: &ChangeConflict,
    ) {
    }

    /// Called after a successful merge, with the state before and after.
    async fn on_merge_end(
        &self,
        _state: &T,
        _result_states: &[T],
        _changes: &[ChangeSet],
        _merged_state: &T,
    ) {
    }

    /// Called when an error escapes a branch's step loop.
    ///
    /// Returning `None` absorbs the error: the branch completes normally
    /// and publishes the changes it accumulated so far. Returning an error
    /// (the same or a replacement) passes it on to the next hook; an error
    /// surviving every hook aborts the branch.
    async fn on_error(&self, error: ExecutionError, _state: &T, _shared: &S) -> Option<ExecutionError> {
        Some(error)
    }
}

/// A built-in hook that logs the run lifecycle through `tracing`.
///
/// Step, merge, and spawn events are logged at debug level, conflicts and
/// surviving errors at warn. Attach with
/// [`Graph::with_hook`](crate::graph::Graph::with_hook).
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceHook;

#[async_trait]
impl<T: GraphState, S: GraphShared> GraphHook<T, S> for TraceHook {
    async fn on_graph_start(&self, _state: &T, _shared: &S) {
        tracing::debug!("graph run starting");
    }

    async fn on_graph_end(&self, _state: &T, _shared: &S) {
        tracing::debug!("graph run finished");
    }

    async fn on_step_start(&self, _state: &T, _shared: &S, next_nodes: &[NextNode<T, S>]) {
        let nodes: Vec<&str> = next_nodes.iter().map(|next| next.node.name()).collect();
        tracing::debug!(?nodes, "step starting");
    }

    async fn on_step_end(&self, _state: &T, _shared: &S, next_nodes: &[NextNode<T, S>]) {
        tracing::debug!(upcoming = next_nodes.len(), "step finished");
    }

    async fn on_spawn_branch_start(
        &self,
        _state: &T,
        _shared: &S,
        branch: &BranchInfo<T, S>,
        _trigger: &ReachedBy<T, S>,
        _registry: &JoinRegistry<T, S>,
    ) {
        tracing::debug!(branch = %branch.instance(), join = ?branch.join(), "spawning sub-branch");
    }

    async fn on_merge_start(&self, _state: &T, result_states: &[T], _changes: &[ChangeSet]) {
        tracing::debug!(results = result_states.len(), "merging step results");
    }

    async fn on_merge_conflict(
        &self,
        _state: &T,
        _changes: &[ChangeSet],
        conflicts: &ChangeConflict,
    ) {
        tracing::warn!(%conflicts, "merge conflict");
    }

    async fn on_error(&self, error: ExecutionError, _state: &T, _shared: &S) -> Option<ExecutionError> {
        tracing::warn!(%error, "branch error");
        Some(error)
    }
}
