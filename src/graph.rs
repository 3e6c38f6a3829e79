//! Graph construction and run orchestration.
//!
//! A [`Graph`] is built from one [`BranchContainer`] — the outermost
//! branch, rooted at [`Start`](crate::node::Start) and joining at
//! [`End`](crate::node::End) — and eagerly indexes it together with every
//! nested container reachable through branch targets. Construction fails
//! fast on malformed edges; execution then works against read-only routing
//! tables.
//!
//! [`Graph::run`] owns a task scope for the duration of one invocation:
//! the root branch is spawned into it, sub-branches join it as they are
//! spawned, and the run completes when every branch has. Dropping the
//! future returned by `run` aborts every live branch.
//!
//! # Example
//!
//! ```ignore
//! use braid::prelude::*;
//!
//! let increment = NodeRef::new(Increment);
//! let graph = Graph::new(BranchContainer::new(
//!     Start,
//!     vec![Edge::new(Start, &increment), Edge::new(&increment, End)],
//!     End,
//! ))?;
//!
//! let (state, shared) = graph.run(Counter { value: 0 }, Arc::new(())).await?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::branch::{spawn_branch, BranchArena, BranchInfo, JoinRegistry, RunContext};
use crate::diff;
use crate::edge::{BranchContainer, SingleNext};
use crate::error::{BuildError, ExecutionError};
use crate::hooks::GraphHook;
use crate::state::{self, GraphState, GraphShared};

/// Aborts every task of a run when the run future is dropped.
struct AbortOnDrop {
    tasks: Arc<Mutex<Vec<JoinHandle<Result<(), ExecutionError>>>>>,
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in self.tasks.lock().iter() {
            handle.abort();
        }
    }
}

/// An executable graph: an indexed container tree plus hooks.
///
/// Construction indexes everything once; `run` may be called any number of
/// times, each invocation owning its own task scope, join registry, and
/// shared handle.
pub struct Graph<T, S> {
    arena: Arc<BranchArena<T, S>>,
    hooks: Vec<Arc<dyn GraphHook<T, S>>>,
}

impl<T: GraphState, S: GraphShared> Graph<T, S> {
    /// Builds a graph from its outermost branch container.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when any edge of any reachable container
    /// is structurally invalid.
    pub fn new(container: BranchContainer<T, S>) -> Result<Self, BuildError> {
        let arena = BranchArena::build(Arc::new(container))?;
        tracing::debug!(containers = arena.len(), "graph indexed");
        Ok(Self {
            arena: Arc::new(arena),
            hooks: Vec::new(),
        })
    }

    /// Registers a lifecycle hook; hooks fire in registration order.
    #[must_use]
    pub fn with_hook(mut self, hook: impl GraphHook<T, S> + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Runs the graph on a state and a shared value.
    ///
    /// The returned state is a fresh value built from the input state plus
    /// every change contributed by branches joining at the end; the input
    /// is never mutated in place. The same shared handle is returned for
    /// symmetry with the state. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the first branch failure: merge conflicts, unhandled node
    /// error groups, state dump/validate failures, router errors, or
    /// cancellation.
    pub async fn run(&self, state: T, shared: Arc<S>) -> Result<(T, Arc<S>), ExecutionError> {
        let run_id = nanoid::nanoid!(8);
        tracing::debug!(run = %run_id, "graph run starting");

        for hook in &self.hooks {
            hook.on_graph_start(&state, &shared).await;
        }

        let tasks = Arc::new(Mutex::new(Vec::new()));
        let _abort_guard = AbortOnDrop {
            tasks: Arc::clone(&tasks),
        };
        let ctx = Arc::new(RunContext {
            hooks: self.hooks.clone(),
            shared: Arc::clone(&shared),
            arena: Arc::clone(&self.arena),
            join_registry: JoinRegistry::new(),
            tasks,
        });

        let root = self.arena.root();
        let info = BranchInfo::new(root.id, Arc::clone(&root.container));
        spawn_branch(&ctx, state.clone(), root, info);

        self.await_branches(&ctx).await?;

        // Fold every branch joining at the end into the final state.
        let mut dump = state::dump(&state)?;
        for waiter in ctx.join_registry.drain(&SingleNext::End) {
            let changes = waiter.rx.await.map_err(|_| ExecutionError::BranchLost)?;
            diff::apply(&mut dump, &changes)?;
        }
        let final_state: T = state::validate(dump)?;

        for hook in &self.hooks {
            hook.on_graph_end(&final_state, &shared).await;
        }

        tracing::debug!(run = %run_id, "graph run finished");
        Ok((final_state, shared))
    }

    /// Awaits every branch task, including those spawned while waiting.
    ///
    /// The first real failure aborts the remaining branches and is
    /// returned; secondary failures caused by the abort (lost sub-branch
    /// results, cancellations) are only reported when nothing better is
    /// available.
    async fn await_branches(&self, ctx: &Arc<RunContext<T, S>>) -> Result<(), ExecutionError> {
        let mut failure: Option<ExecutionError> = None;

        loop {
            let handle = {
                let mut tasks = ctx.tasks.lock();
                if tasks.is_empty() {
                    break;
                }
                tasks.remove(0)
            };

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    if join_error.is_cancelled() {
                        Err(ExecutionError::Cancelled)
                    } else {
                        // A branch task itself panicked; propagate it.
                        std::panic::resume_unwind(join_error.into_panic());
                    }
                }
            };

            if let Err(error) = outcome {
                let secondary = matches!(
                    error,
                    ExecutionError::BranchLost | ExecutionError::Cancelled
                );
                let current_secondary = matches!(
                    failure,
                    Some(ExecutionError::BranchLost) | Some(ExecutionError::Cancelled)
                );

                if !secondary {
                    // First real failure: cancel everything still running.
                    for handle in ctx.tasks.lock().iter() {
                        handle.abort();
                    }
                }
                if failure.is_none() || (current_secondary && !secondary) {
                    failure = Some(error);
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl<T, S> core::fmt::Debug for Graph<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Graph")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
