//! Next-step resolution.
//!
//! Given the sources a step finished on, resolution walks their indexed
//! entries, invokes dynamic routers, and flattens everything into an
//! ordered list: nodes to schedule in the coming step and sub-branches to
//! spawn. After the primary pass the instant closure runs — entries marked
//! `instant` whose sources were just resolved are resolved too, so their
//! targets join the *current* step. The walk repeats until no new instant
//! entries remain; the engine does not detect instant cycles.
//!
//! Routers execute sequentially in collection order, so they can touch the
//! shared value without racing each other.

use core::fmt;
use std::sync::Arc;

use crate::edge::{BranchContainer, Next, SingleSource};
use crate::error::ExecutionError;
use crate::index::{BranchIndex, Entry, ErrorEntry};
use crate::node::NodeRef;

/// The entry a target was reached through.
///
/// Kept on every [`NextNode`] so that errors raised while the node runs can
/// be scoped against the originating edge's position.
pub enum ReachedBy<T, S> {
    /// Reached through a node/start edge.
    Edge(Entry<T, S>),
    /// Reached through an error edge.
    ErrorEdge(ErrorEntry<T, S>),
}

impl<T, S> ReachedBy<T, S> {
    /// The originating edge's position in its branch's edge list.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            ReachedBy::Edge(entry) => entry.index,
            ReachedBy::ErrorEdge(entry) => entry.index,
        }
    }
}

impl<T, S> Clone for ReachedBy<T, S> {
    fn clone(&self) -> Self {
        match self {
            ReachedBy::Edge(entry) => ReachedBy::Edge(entry.clone()),
            ReachedBy::ErrorEdge(entry) => ReachedBy::ErrorEdge(entry.clone()),
        }
    }
}

impl<T, S> fmt::Debug for ReachedBy<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReachedBy::Edge(entry) => write!(f, "Edge(index = {})", entry.index),
            ReachedBy::ErrorEdge(entry) => write!(f, "ErrorEdge(index = {})", entry.index),
        }
    }
}

/// A resolved step target paired with the entry that produced it.
pub struct NextNode<T, S> {
    /// The node to run.
    pub node: NodeRef<T, S>,
    /// The entry the node was reached through.
    pub reached_by: ReachedBy<T, S>,
}

impl<T, S> Clone for NextNode<T, S> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            reached_by: self.reached_by.clone(),
        }
    }
}

impl<T, S> fmt::Debug for NextNode<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextNode")
            .field("node", &self.node.name())
            .field("reached_by", &self.reached_by)
            .finish()
    }
}

/// A sub-branch spawn produced during resolution.
pub(crate) struct SpawnRequest<T, S> {
    /// The container to spawn.
    pub(crate) container: Arc<BranchContainer<T, S>>,
    /// The entry whose target was the container.
    pub(crate) trigger: ReachedBy<T, S>,
}

/// One resolution output: a step-local node or a sub-branch to spawn.
pub(crate) enum Resolution<T, S> {
    /// Schedule this node in the step.
    Step(NextNode<T, S>),
    /// Hand this container to the orchestrator; it is not a step node.
    Spawn(SpawnRequest<T, S>),
}

/// Resolves the next step from a set of current sources, instant closure
/// included.
pub(crate) async fn resolve_sources<T, S>(
    state: &T,
    shared: &S,
    sources: &[SingleSource<T, S>],
    index: &BranchIndex<T, S>,
) -> Result<Vec<Resolution<T, S>>, ExecutionError> {
    let mut out = Vec::new();

    for source in sources {
        resolve_entries(state, shared, index.entries(source), &mut out).await?;
    }

    // Instant closure, seeded with the primary pass results.
    let mut wave = step_nodes(&out, 0);
    loop {
        let mut instant: Vec<&Entry<T, S>> = Vec::new();
        for node in &wave {
            for entry in index.entries(&SingleSource::Node(node.clone())) {
                if entry.config.instant {
                    instant.push(entry);
                }
            }
        }
        if instant.is_empty() {
            break;
        }

        let mark = out.len();
        for entry in instant {
            resolve_entry(state, shared, entry, &mut out).await?;
        }
        wave = step_nodes(&out, mark);
    }

    tracing::trace!(sources = sources.len(), resolved = out.len(), "resolved next step");
    Ok(out)
}

fn step_nodes<T, S>(out: &[Resolution<T, S>], from: usize) -> Vec<NodeRef<T, S>> {
    out[from..]
        .iter()
        .filter_map(|resolution| match resolution {
            Resolution::Step(next) => Some(next.node.clone()),
            Resolution::Spawn(_) => None,
        })
        .collect()
}

/// Resolves a run of entries in order, appending to `out`.
pub(crate) async fn resolve_entries<T, S>(
    state: &T,
    shared: &S,
    entries: &[Entry<T, S>],
    out: &mut Vec<Resolution<T, S>>,
) -> Result<(), ExecutionError> {
    for entry in entries {
        resolve_entry(state, shared, entry, out).await?;
    }
    Ok(())
}

async fn resolve_entry<T, S>(
    state: &T,
    shared: &S,
    entry: &Entry<T, S>,
    out: &mut Vec<Resolution<T, S>>,
) -> Result<(), ExecutionError> {
    resolve_next(state, shared, &entry.next, ReachedBy::Edge(entry.clone()), out).await
}

/// Resolves a single error entry; used by error routing.
pub(crate) async fn resolve_error_entry<T, S>(
    state: &T,
    shared: &S,
    entry: &ErrorEntry<T, S>,
    out: &mut Vec<Resolution<T, S>>,
) -> Result<(), ExecutionError> {
    resolve_next(
        state,
        shared,
        &entry.next,
        ReachedBy::ErrorEdge(entry.clone()),
        out,
    )
    .await
}

async fn resolve_next<T, S>(
    state: &T,
    shared: &S,
    next: &Next<T, S>,
    reached_by: ReachedBy<T, S>,
    out: &mut Vec<Resolution<T, S>>,
) -> Result<(), ExecutionError> {
    match next {
        Next::Static(resolved) => push_nodes(resolved.clone(), reached_by, out),
        Next::Router(router) => {
            let resolved = router
                .call(state, shared)
                .await
                .map_err(|source| ExecutionError::Router { source })?;
            push_nodes(resolved, reached_by, out);
        }
        Next::Branch(container) => out.push(Resolution::Spawn(SpawnRequest {
            container: Arc::clone(container),
            trigger: reached_by,
        })),
    }
    Ok(())
}

fn push_nodes<T, S>(
    resolved: crate::edge::ResolvedNext<T, S>,
    reached_by: ReachedBy<T, S>,
    out: &mut Vec<Resolution<T, S>>,
) {
    for node in resolved.into_nodes() {
        out.push(Resolution::Step(NextNode {
            node,
            reached_by: reached_by.clone(),
        }));
    }
}
