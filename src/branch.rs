//! Branch runtime: the step loop, fan-out, merges, and sub-branch joins.
//!
//! A branch is one concurrent unit of execution. It snapshots its baseline
//! state, then loops: resolve the step's targets, absorb any sub-branches
//! waiting to join at them, fan the targets out concurrently on private
//! state snapshots, and merge the results back — or, when nodes failed,
//! hand the error group to the error router and continue from whatever
//! recovery targets it produces. When the loop runs out of targets the
//! branch publishes the diff between its baseline and final state as its
//! result.

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

use crate::diff::{self, ChangeConflict, ChangeSet};
use crate::edge::{BranchContainer, SingleNext, SingleSource};
use crate::error::ExecutionError;
use crate::hooks::GraphHook;
use crate::index::BranchIndex;
use crate::resolver::{self, NextNode, Resolution};
use crate::router::{self, TaggedError};
use crate::state::{self, GraphState, GraphShared};

// ─────────────────────────────────────────────────────────────────────────────
// Branch identity
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of a branch container in the graph's arena.
///
/// Every container reachable from the root gets one at construction time;
/// all runtime branches spawned from the same container share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchId(pub(crate) usize);

impl BranchId {
    /// The raw arena index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch_{}", self.0)
    }
}

/// A container together with its prebuilt routing tables.
pub(crate) struct BranchSpec<T, S> {
    pub(crate) id: BranchId,
    pub(crate) container: Arc<BranchContainer<T, S>>,
    pub(crate) index: BranchIndex<T, S>,
}

/// The graph's arena of indexed containers, keyed by [`BranchId`].
///
/// Built eagerly at graph construction by walking every container
/// reachable through branch targets.
pub(crate) struct BranchArena<T, S> {
    specs: Vec<Arc<BranchSpec<T, S>>>,
    by_ptr: HashMap<usize, usize>,
}

impl<T, S> BranchArena<T, S> {
    /// Indexes the root container and every nested container reachable
    /// from it.
    pub(crate) fn build(
        root: Arc<BranchContainer<T, S>>,
    ) -> Result<Self, crate::error::BuildError> {
        let mut arena = Self {
            specs: Vec::new(),
            by_ptr: HashMap::new(),
        };
        let mut queue = vec![root];

        while let Some(container) = queue.pop() {
            let ptr = Arc::as_ptr(&container) as usize;
            if arena.by_ptr.contains_key(&ptr) {
                continue;
            }

            let index = BranchIndex::build(container.edges())?;
            for edge in container.edges() {
                if let Some(crate::edge::Next::Branch(nested)) = edge.next() {
                    queue.push(Arc::clone(nested));
                }
            }

            let id = BranchId(arena.specs.len());
            arena.by_ptr.insert(ptr, id.0);
            arena.specs.push(Arc::new(BranchSpec {
                id,
                container,
                index,
            }));
        }

        Ok(arena)
    }

    pub(crate) fn root(&self) -> Arc<BranchSpec<T, S>> {
        Arc::clone(&self.specs[0])
    }

    pub(crate) fn spec_for(
        &self,
        container: &Arc<BranchContainer<T, S>>,
    ) -> Option<Arc<BranchSpec<T, S>>> {
        let ptr = Arc::as_ptr(container) as usize;
        self.by_ptr.get(&ptr).map(|id| Arc::clone(&self.specs[*id]))
    }

    pub(crate) fn len(&self) -> usize {
        self.specs.len()
    }
}

/// A hook-facing summary of one runtime branch.
pub struct BranchInfo<T, S> {
    id: BranchId,
    instance: String,
    container: Arc<BranchContainer<T, S>>,
}

impl<T, S> BranchInfo<T, S> {
    pub(crate) fn new(id: BranchId, container: Arc<BranchContainer<T, S>>) -> Self {
        Self {
            id,
            instance: nanoid::nanoid!(8),
            container,
        }
    }

    /// The spawning container's arena id.
    #[must_use]
    pub fn id(&self) -> BranchId {
        self.id
    }

    /// A unique id of this runtime branch; containers spawned several
    /// times yield distinct instances.
    #[must_use]
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// The source the branch resolves its first step from.
    #[must_use]
    pub fn start(&self) -> &SingleSource<T, S> {
        self.container.start()
    }

    /// The target the branch's result joins back at.
    #[must_use]
    pub fn join(&self) -> &SingleNext<T, S> {
        self.container.join()
    }
}

impl<T, S> Clone for BranchInfo<T, S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            instance: self.instance.clone(),
            container: Arc::clone(&self.container),
        }
    }
}

impl<T, S> fmt::Debug for BranchInfo<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchInfo")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("join", self.join())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Join registry
// ─────────────────────────────────────────────────────────────────────────────

/// A spawned branch waiting to be joined: its summary and its pending
/// result.
pub(crate) struct Waiter<T, S> {
    pub(crate) info: BranchInfo<T, S>,
    pub(crate) rx: oneshot::Receiver<ChangeSet>,
}

/// The run-scoped registry of sub-branches waiting to join.
///
/// Branches register at spawn time under their join target; the first
/// branch whose step reaches that target drains and absorbs them, in
/// registration order. The registry locks internally, so hook code may
/// inspect it at any lifecycle point.
pub struct JoinRegistry<T, S> {
    waiters: Mutex<HashMap<SingleNext<T, S>, Vec<Waiter<T, S>>>>,
}

impl<T, S> JoinRegistry<T, S> {
    pub(crate) fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, join: SingleNext<T, S>, waiter: Waiter<T, S>) {
        self.waiters.lock().entry(join).or_default().push(waiter);
    }

    pub(crate) fn drain(&self, join: &SingleNext<T, S>) -> Vec<Waiter<T, S>> {
        self.waiters
            .lock()
            .get_mut(join)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// The number of branches currently waiting to join, at any target.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.waiters.lock().values().map(Vec::len).sum()
    }

    /// The number of branches currently waiting to join at `join`.
    #[must_use]
    pub fn waiting_at(&self, join: &SingleNext<T, S>) -> usize {
        self.waiters.lock().get(join).map_or(0, Vec::len)
    }
}

impl<T, S> fmt::Debug for JoinRegistry<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinRegistry")
            .field("pending", &self.pending())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a single `run` invocation shares across its branches.
pub(crate) struct RunContext<T, S> {
    pub(crate) hooks: Vec<Arc<dyn GraphHook<T, S>>>,
    pub(crate) shared: Arc<S>,
    pub(crate) arena: Arc<BranchArena<T, S>>,
    pub(crate) join_registry: JoinRegistry<T, S>,
    pub(crate) tasks: Arc<Mutex<Vec<JoinHandle<Result<(), ExecutionError>>>>>,
}

/// The outcome of one step's fan-out.
enum StepOutcome<T, S> {
    /// Every node completed; snapshots in schedule order.
    Completed(Vec<T>),
    /// At least one node failed; the collected error group.
    Failed(Vec<TaggedError<T, S>>),
}

/// Spawns a runtime branch for `spec`, registering it under its join
/// target first. Returns immediately after creating the task.
pub(crate) fn spawn_branch<T: GraphState, S: GraphShared>(
    ctx: &Arc<RunContext<T, S>>,
    state: T,
    spec: Arc<BranchSpec<T, S>>,
    info: BranchInfo<T, S>,
) {
    let (tx, rx) = oneshot::channel();
    ctx.join_registry.register(
        spec.container.join().clone(),
        Waiter {
            info: info.clone(),
            rx,
        },
    );

    let task = run_branch(Arc::clone(ctx), state, spec, info, tx);
    let handle = tokio::spawn(task);
    ctx.tasks.lock().push(handle);
}

/// Splits resolutions into step nodes and branch spawns, performing the
/// spawns.
async fn admit<T: GraphState, S: GraphShared>(
    ctx: &Arc<RunContext<T, S>>,
    state: &T,
    resolutions: Vec<Resolution<T, S>>,
) -> Result<Vec<NextNode<T, S>>, ExecutionError> {
    let mut next_nodes = Vec::new();

    for resolution in resolutions {
        match resolution {
            Resolution::Step(next) => next_nodes.push(next),
            Resolution::Spawn(request) => {
                let spec = ctx
                    .arena
                    .spec_for(&request.container)
                    .ok_or(ExecutionError::UnknownBranch)?;
                let info = BranchInfo::new(spec.id, Arc::clone(&spec.container));

                for hook in &ctx.hooks {
                    hook.on_spawn_branch_start(
                        state,
                        &ctx.shared,
                        &info,
                        &request.trigger,
                        &ctx.join_registry,
                    )
                    .await;
                }

                // The spawned branch starts from the spawner's state as of
                // this moment.
                spawn_branch(ctx, state.clone(), spec, info.clone());

                for hook in &ctx.hooks {
                    hook.on_spawn_branch_end(
                        state,
                        &ctx.shared,
                        &info,
                        &request.trigger,
                        &ctx.join_registry,
                    )
                    .await;
                }
            }
        }
    }

    Ok(next_nodes)
}

impl<T: GraphState, S: GraphShared> RunContext<T, S> {
    /// Awaits and absorbs every sub-branch registered to join at one of
    /// the step's nodes, in registration order.
    async fn join_waiting(
        &self,
        state: &mut T,
        next_nodes: &[NextNode<T, S>],
    ) -> Result<(), ExecutionError> {
        let mut changesets = Vec::new();

        for next in next_nodes {
            let join = SingleNext::Node(next.node.clone());
            for waiter in self.join_registry.drain(&join) {
                tracing::debug!(branch = %waiter.info.instance(), at = next.node.name(), "joining sub-branch");
                let changes = waiter.rx.await.map_err(|_| ExecutionError::BranchLost)?;
                changesets.push(changes);
            }
        }

        if changesets.is_empty() {
            return Ok(());
        }
        *state = self.apply_changesets(state, &changesets).await?;
        Ok(())
    }

    /// Runs the step's nodes concurrently, each against a private deep
    /// copy of the current state. The first failure aborts the remaining
    /// siblings; all raised errors are collected into the step's group.
    async fn fan_out(&self, state: &T, next_nodes: &[NextNode<T, S>]) -> StepOutcome<T, S> {
        let mut set: JoinSet<Result<(usize, T), TaggedError<T, S>>> = JoinSet::new();

        for (position, next) in next_nodes.iter().enumerate() {
            let mut snapshot = state.clone();
            let node = next.node.clone();
            let shared = Arc::clone(&self.shared);
            let origin = next.clone();

            set.spawn(async move {
                match node.run(&mut snapshot, &shared).await {
                    Ok(()) => Ok((position, snapshot)),
                    Err(error) => Err(TaggedError {
                        error,
                        origin: Some(origin),
                    }),
                }
            });
        }

        // Results are reordered into schedule order via their position so
        // the merge stays deterministic.
        let mut snapshots: Vec<Option<T>> = next_nodes.iter().map(|_| None).collect();
        let mut errors = Vec::new();

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((position, snapshot))) => snapshots[position] = Some(snapshot),
                Ok(Err(tagged)) => {
                    if errors.is_empty() {
                        set.abort_all();
                    }
                    errors.push(tagged);
                }
                Err(join_error) => {
                    if join_error.is_cancelled() {
                        continue;
                    }
                    // A panicked node: untagged, so it cannot be routed.
                    if errors.is_empty() {
                        set.abort_all();
                    }
                    errors.push(TaggedError {
                        error: Box::new(join_error),
                        origin: None,
                    });
                }
            }
        }

        if errors.is_empty() {
            StepOutcome::Completed(snapshots.into_iter().flatten().collect())
        } else {
            StepOutcome::Failed(errors)
        }
    }

    /// Merges the step's result snapshots into the current state.
    async fn merge(&self, state: &mut T, snapshots: Vec<T>) -> Result<(), ExecutionError> {
        let current = state::dump(state)?;
        let mut changesets = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            changesets.push(diff::diff(&current, &state::dump(snapshot)?));
        }

        for hook in &self.hooks {
            hook.on_merge_start(state, &snapshots, &changesets).await;
        }

        let previous = state.clone();
        *state = self.apply_changesets(state, &changesets).await?;

        for hook in &self.hooks {
            hook.on_merge_end(&previous, &snapshots, &changesets, state)
                .await;
        }
        Ok(())
    }

    /// Conflict-checks a list of changesets and applies them, in order,
    /// onto a dump of `state`, revalidating the result.
    async fn apply_changesets(
        &self,
        state: &T,
        changesets: &[ChangeSet],
    ) -> Result<T, ExecutionError> {
        let conflicts = diff::find_conflicts(changesets);
        if !conflicts.is_empty() {
            let conflict = ChangeConflict { conflicts };
            for hook in &self.hooks {
                hook.on_merge_conflict(state, changesets, &conflict).await;
            }
            return Err(conflict.into());
        }

        let mut dump = state::dump(state)?;
        for changeset in changesets {
            diff::apply(&mut dump, changeset)?;
        }
        Ok(state::validate(dump)?)
    }
}

/// The branch's step loop.
async fn run_steps<T: GraphState, S: GraphShared>(
    ctx: &Arc<RunContext<T, S>>,
    state: &mut T,
    spec: &BranchSpec<T, S>,
) -> Result<(), ExecutionError> {
    let start = [spec.container.start().clone()];
    let resolutions = resolver::resolve_sources(&*state, &*ctx.shared, &start, &spec.index).await?;
    let mut next_nodes = admit(ctx, state, resolutions).await?;

    while !next_nodes.is_empty() {
        for hook in &ctx.hooks {
            hook.on_step_start(state, &ctx.shared, &next_nodes).await;
        }

        ctx.join_waiting(state, &next_nodes).await?;

        let outcome = ctx.fan_out(state, &next_nodes).await;
        let routed = match outcome {
            StepOutcome::Completed(snapshots) => match ctx.merge(state, snapshots).await {
                Ok(()) => {
                    let sources: Vec<SingleSource<T, S>> = next_nodes
                        .iter()
                        .map(|next| SingleSource::Node(next.node.clone()))
                        .collect();
                    resolver::resolve_sources(&*state, &*ctx.shared, &sources, &spec.index).await
                }
                Err(error) => Err(error),
            },
            StepOutcome::Failed(group) => {
                tracing::debug!(errors = group.len(), "routing step error group");
                router::route_errors(&*state, &*ctx.shared, group, &spec.index).await
            }
        };

        let advanced = match routed {
            Ok(resolutions) => admit(ctx, state, resolutions).await,
            Err(error) => Err(error),
        };

        match advanced {
            Ok(new_nodes) => {
                next_nodes = new_nodes;
                for hook in &ctx.hooks {
                    hook.on_step_end(state, &ctx.shared, &next_nodes).await;
                }
            }
            Err(error) => {
                // The step failed; on_step_end still fires, with the
                // failed step's nodes.
                for hook in &ctx.hooks {
                    hook.on_step_end(state, &ctx.shared, &next_nodes).await;
                }
                return Err(error);
            }
        }
    }

    Ok(())
}

/// Runs one branch to completion and publishes its result diff.
pub(crate) async fn run_branch<T: GraphState, S: GraphShared>(
    ctx: Arc<RunContext<T, S>>,
    mut state: T,
    spec: Arc<BranchSpec<T, S>>,
    info: BranchInfo<T, S>,
    tx: oneshot::Sender<ChangeSet>,
) -> Result<(), ExecutionError> {
    tracing::debug!(branch = %info.instance(), id = %info.id(), "branch started");

    let initial = state.clone();
    let outcome = run_steps(&ctx, &mut state, &spec).await;

    let surviving = match outcome {
        Ok(()) => None,
        Err(error) => {
            let mut error = Some(error);
            for hook in &ctx.hooks {
                match error {
                    Some(current) => error = hook.on_error(current, &state, &ctx.shared).await,
                    None => break,
                }
            }
            error
        }
    };

    if let Some(error) = surviving {
        tracing::debug!(branch = %info.instance(), %error, "branch failed");
        return Err(error);
    }

    let changes = diff::diff(&state::dump(&initial)?, &state::dump(&state)?);
    tracing::debug!(branch = %info.instance(), changes = changes.len(), "branch finished");
    let _ = tx.send(changes);
    Ok(())
}
