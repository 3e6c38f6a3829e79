//! The edge language: sources, targets, routers, configs, and containers.
//!
//! A graph is declared as a list of edges inside a [`BranchContainer`].
//! Every edge pairs a source with a `next` descriptor:
//!
//! - `Edge::new(Start, &node)` — run `node` first.
//! - `Edge::new(&a, &b)` — after `a`, run `b`.
//! - `Edge::new(&a, End)` — after `a`, terminate the branch.
//! - `Edge::new(vec![a, b], &c)` — both `a` and `b` lead to `c`.
//! - `Edge::new(&a, vec![b, c])` — `a` fans out into `b` and `c`, which run
//!   concurrently on private state snapshots and merge afterwards.
//! - `Edge::new(&a, Router::new(|state, _| Ok(pick(state))))` — decide the
//!   targets dynamically from the state and shared value.
//! - `Edge::with_config(&a, &b, NodeConfig::instant())` — `b` joins the
//!   *same* step as `a` instead of the next one.
//! - `Edge::new(ErrorType::of::<MyError>(), &handler)` — an error edge:
//!   `handler` runs when a node reached through an *earlier* edge fails
//!   with `MyError`.
//! - `Edge::new((&a, ErrorType::of::<MyError>()), &handler)` — the same,
//!   scoped to failures of `a` specifically.
//! - `Edge::with_config(ErrorType::of::<MyError>(), &handler,
//!   ErrorConfig::propagate())` — let later matching error edges fire too.
//! - `Edge::chain(Start, vec![a, b, c])` — shorthand for the linear chain
//!   `Start→a`, `a→b`, `b→c`.
//! - `Edge::new(&a, BranchContainer::new(&b, edges, &c))` — spawn a
//!   sub-branch rooted at `b` that runs concurrently and joins back when
//!   this branch reaches `c`.
//!
//! Classification happens once, at construction and indexing time; nothing
//! in this module invokes user code.

use core::any::TypeId;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::node::{End, NodeError, NodeRef, Start};

// ─────────────────────────────────────────────────────────────────────────────
// Error keys
// ─────────────────────────────────────────────────────────────────────────────

/// A concrete error type usable as an error-edge key.
///
/// Captures the type's identity together with a matcher that recognizes it
/// behind the [`NodeError`] box. Matching is exact-type: an edge keyed on
/// `ErrorType::of::<Io>()` fires only for `Io`, never for other types.
#[derive(Clone, Copy)]
pub struct ErrorType {
    type_id: TypeId,
    name: &'static str,
    matcher: fn(&(dyn std::error::Error + Send + Sync + 'static)) -> bool,
}

impl ErrorType {
    /// The key for error type `E`.
    #[must_use]
    pub fn of<E: std::error::Error + Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: core::any::type_name::<E>(),
            matcher: |error| error.downcast_ref::<E>().is_some(),
        }
    }

    /// Whether the boxed error is of this type.
    #[must_use]
    pub fn matches(&self, error: &NodeError) -> bool {
        (self.matcher)(error.as_ref())
    }

    /// The error type's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ErrorType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ErrorType {}

impl Hash for ErrorType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorType({})", self.name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sources
// ─────────────────────────────────────────────────────────────────────────────

/// A single routing origin: a node, or the branch start.
pub enum SingleSource<T, S> {
    /// The branch's start sentinel.
    Start,
    /// A concrete node.
    Node(NodeRef<T, S>),
}

impl<T, S> SingleSource<T, S> {
    /// The node behind this source, if it is one.
    #[must_use]
    pub fn as_node(&self) -> Option<&NodeRef<T, S>> {
        match self {
            SingleSource::Start => None,
            SingleSource::Node(node) => Some(node),
        }
    }
}

impl<T, S> Clone for SingleSource<T, S> {
    fn clone(&self) -> Self {
        match self {
            SingleSource::Start => SingleSource::Start,
            SingleSource::Node(node) => SingleSource::Node(node.clone()),
        }
    }
}

impl<T, S> PartialEq for SingleSource<T, S> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SingleSource::Start, SingleSource::Start) => true,
            (SingleSource::Node(a), SingleSource::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl<T, S> Eq for SingleSource<T, S> {}

impl<T, S> Hash for SingleSource<T, S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SingleSource::Start => 0u8.hash(state),
            SingleSource::Node(node) => {
                1u8.hash(state);
                node.hash(state);
            }
        }
    }
}

impl<T, S> fmt::Debug for SingleSource<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingleSource::Start => write!(f, "Start"),
            SingleSource::Node(node) => write!(f, "Node({})", node.name()),
        }
    }
}

/// One or more routing origins.
pub enum Source<T, S> {
    /// A single origin.
    Single(SingleSource<T, S>),
    /// A list of origins; the edge is indexed under every element.
    Many(Vec<SingleSource<T, S>>),
}

impl<T, S> Source<T, S> {
    /// Iterates the single sources this source expands to.
    pub fn iter(&self) -> impl Iterator<Item = &SingleSource<T, S>> {
        match self {
            Source::Single(source) => std::slice::from_ref(source).iter(),
            Source::Many(sources) => sources.iter(),
        }
    }

    /// The number of single sources this source expands to.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Source::Single(_) => 1,
            Source::Many(sources) => sources.len(),
        }
    }

    /// Whether this source expands to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, S> Clone for Source<T, S> {
    fn clone(&self) -> Self {
        match self {
            Source::Single(source) => Source::Single(source.clone()),
            Source::Many(sources) => Source::Many(sources.clone()),
        }
    }
}

impl<T, S> fmt::Debug for Source<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Single(source) => source.fmt(f),
            Source::Many(sources) => f.debug_list().entries(sources).finish(),
        }
    }
}

/// A single error-edge key: an error type, optionally scoped to one node.
pub enum SingleErrorSource<T, S> {
    /// Matches any node failing with the given error type.
    Type(ErrorType),
    /// Matches only the given node failing with the given error type.
    Scoped(NodeRef<T, S>, ErrorType),
}

impl<T, S> SingleErrorSource<T, S> {
    /// The error type this key matches on.
    #[must_use]
    pub fn error_type(&self) -> &ErrorType {
        match self {
            SingleErrorSource::Type(error_type) => error_type,
            SingleErrorSource::Scoped(_, error_type) => error_type,
        }
    }
}

impl<T, S> Clone for SingleErrorSource<T, S> {
    fn clone(&self) -> Self {
        match self {
            SingleErrorSource::Type(error_type) => SingleErrorSource::Type(*error_type),
            SingleErrorSource::Scoped(node, error_type) => {
                SingleErrorSource::Scoped(node.clone(), *error_type)
            }
        }
    }
}

impl<T, S> PartialEq for SingleErrorSource<T, S> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SingleErrorSource::Type(a), SingleErrorSource::Type(b)) => a == b,
            (SingleErrorSource::Scoped(na, ta), SingleErrorSource::Scoped(nb, tb)) => {
                na == nb && ta == tb
            }
            _ => false,
        }
    }
}

impl<T, S> Eq for SingleErrorSource<T, S> {}

impl<T, S> Hash for SingleErrorSource<T, S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SingleErrorSource::Type(error_type) => {
                0u8.hash(state);
                error_type.hash(state);
            }
            SingleErrorSource::Scoped(node, error_type) => {
                1u8.hash(state);
                node.hash(state);
                error_type.hash(state);
            }
        }
    }
}

impl<T, S> fmt::Debug for SingleErrorSource<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingleErrorSource::Type(error_type) => error_type.fmt(f),
            SingleErrorSource::Scoped(node, error_type) => {
                write!(f, "({:?}, {:?})", node, error_type)
            }
        }
    }
}

/// One or more error-edge keys.
pub enum ErrorSource<T, S> {
    /// A single key.
    Single(SingleErrorSource<T, S>),
    /// A list of keys; the edge is indexed under every element.
    Many(Vec<SingleErrorSource<T, S>>),
}

impl<T, S> ErrorSource<T, S> {
    /// Iterates the single keys this source expands to.
    pub fn iter(&self) -> impl Iterator<Item = &SingleErrorSource<T, S>> {
        match self {
            ErrorSource::Single(source) => std::slice::from_ref(source).iter(),
            ErrorSource::Many(sources) => sources.iter(),
        }
    }

    /// The number of single keys this source expands to.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ErrorSource::Single(_) => 1,
            ErrorSource::Many(sources) => sources.len(),
        }
    }

    /// Whether this source expands to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, S> Clone for ErrorSource<T, S> {
    fn clone(&self) -> Self {
        match self {
            ErrorSource::Single(source) => ErrorSource::Single(source.clone()),
            ErrorSource::Many(sources) => ErrorSource::Many(sources.clone()),
        }
    }
}

impl<T, S> fmt::Debug for ErrorSource<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Single(source) => source.fmt(f),
            ErrorSource::Many(sources) => f.debug_list().entries(sources).finish(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Targets
// ─────────────────────────────────────────────────────────────────────────────

/// A single resolved target: a node, or branch termination.
pub enum SingleNext<T, S> {
    /// Run this node next.
    Node(NodeRef<T, S>),
    /// Terminate the branch here.
    End,
}

impl<T, S> Clone for SingleNext<T, S> {
    fn clone(&self) -> Self {
        match self {
            SingleNext::Node(node) => SingleNext::Node(node.clone()),
            SingleNext::End => SingleNext::End,
        }
    }
}

impl<T, S> PartialEq for SingleNext<T, S> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SingleNext::Node(a), SingleNext::Node(b)) => a == b,
            (SingleNext::End, SingleNext::End) => true,
            _ => false,
        }
    }
}

impl<T, S> Eq for SingleNext<T, S> {}

impl<T, S> Hash for SingleNext<T, S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SingleNext::Node(node) => {
                0u8.hash(state);
                node.hash(state);
            }
            SingleNext::End => 1u8.hash(state),
        }
    }
}

impl<T, S> fmt::Debug for SingleNext<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingleNext::Node(node) => write!(f, "Node({})", node.name()),
            SingleNext::End => write!(f, "End"),
        }
    }
}

/// Zero or more resolved targets; what static edges carry and routers
/// return.
pub enum ResolvedNext<T, S> {
    /// A single target.
    Single(SingleNext<T, S>),
    /// A list of targets.
    Many(Vec<SingleNext<T, S>>),
}

impl<T, S> ResolvedNext<T, S> {
    /// The termination target, for routers that decide to stop the branch.
    #[must_use]
    pub fn end() -> Self {
        ResolvedNext::Single(SingleNext::End)
    }

    /// Flattens into the contained nodes, dropping terminations.
    #[must_use]
    pub fn into_nodes(self) -> Vec<NodeRef<T, S>> {
        let singles = match self {
            ResolvedNext::Single(single) => vec![single],
            ResolvedNext::Many(many) => many,
        };
        singles
            .into_iter()
            .filter_map(|single| match single {
                SingleNext::Node(node) => Some(node),
                SingleNext::End => None,
            })
            .collect()
    }
}

impl<T, S> Clone for ResolvedNext<T, S> {
    fn clone(&self) -> Self {
        match self {
            ResolvedNext::Single(single) => ResolvedNext::Single(single.clone()),
            ResolvedNext::Many(many) => ResolvedNext::Many(many.clone()),
        }
    }
}

impl<T, S> fmt::Debug for ResolvedNext<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedNext::Single(single) => single.fmt(f),
            ResolvedNext::Many(many) => f.debug_list().entries(many).finish(),
        }
    }
}

/// A dynamic target: a sync or async callable deciding the next targets
/// from the current state and shared value.
///
/// Routers run sequentially, in the order their entries are resolved, so
/// they may touch the shared value without racing each other.
pub struct Router<T, S> {
    f: Arc<
        dyn for<'a> Fn(&'a T, &'a S) -> BoxFuture<'a, Result<ResolvedNext<T, S>, NodeError>>
            + Send
            + Sync,
    >,
}

impl<T, S> Router<T, S> {
    /// Wraps a synchronous routing function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T, &S) -> Result<ResolvedNext<T, S>, NodeError> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |state, shared| {
                let resolved = f(state, shared);
                Box::pin(futures::future::ready(resolved))
            }),
        }
    }

    /// Wraps an asynchronous routing function returning a boxed future,
    /// typically `Box::pin(async move { .. })`.
    pub fn new_async<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a T, &'a S) -> BoxFuture<'a, Result<ResolvedNext<T, S>, NodeError>>
            + Send
            + Sync
            + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Invokes the router.
    pub(crate) async fn call(&self, state: &T, shared: &S) -> Result<ResolvedNext<T, S>, NodeError> {
        (self.f)(state, shared).await
    }
}

impl<T, S> Clone for Router<T, S> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<T, S> fmt::Debug for Router<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Router")
    }
}

/// The `next` descriptor of an edge: where resolution goes from a source.
pub enum Next<T, S> {
    /// Statically known targets.
    Static(ResolvedNext<T, S>),
    /// Targets decided at resolution time by a callable.
    Router(Router<T, S>),
    /// Spawn a sub-branch; it joins back at its container's join target.
    Branch(Arc<BranchContainer<T, S>>),
}

impl<T, S> Clone for Next<T, S> {
    fn clone(&self) -> Self {
        match self {
            Next::Static(resolved) => Next::Static(resolved.clone()),
            Next::Router(router) => Next::Router(router.clone()),
            Next::Branch(container) => Next::Branch(Arc::clone(container)),
        }
    }
}

impl<T, S> fmt::Debug for Next<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Next::Static(resolved) => resolved.fmt(f),
            Next::Router(router) => router.fmt(f),
            Next::Branch(container) => write!(f, "Branch(join = {:?})", container.join()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configs
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration of a node edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeConfig {
    /// When true, the targets join the *current* step instead of the next
    /// one. Instant edges are walked transitively; avoiding cycles is the
    /// caller's responsibility.
    pub instant: bool,
}

impl NodeConfig {
    /// A config with `instant` set.
    #[must_use]
    pub fn instant() -> Self {
        Self { instant: true }
    }
}

/// Configuration of an error edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorConfig {
    /// When true, later matching error edges fire as well; otherwise the
    /// first firing handler consumes the error.
    pub propagate: bool,
}

impl ErrorConfig {
    /// A config with `propagate` set.
    #[must_use]
    pub fn propagate() -> Self {
        Self { propagate: true }
    }
}

/// Either kind of edge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeConfig {
    /// Configuration for a node edge.
    Node(NodeConfig),
    /// Configuration for an error edge.
    Error(ErrorConfig),
}

// ─────────────────────────────────────────────────────────────────────────────
// Edges
// ─────────────────────────────────────────────────────────────────────────────

/// The source of an edge: either routing origins or error keys.
pub enum EdgeSource<T, S> {
    /// A node/start edge source.
    Node(Source<T, S>),
    /// An error edge source.
    Error(ErrorSource<T, S>),
}

impl<T, S> Clone for EdgeSource<T, S> {
    fn clone(&self) -> Self {
        match self {
            EdgeSource::Node(source) => EdgeSource::Node(source.clone()),
            EdgeSource::Error(source) => EdgeSource::Error(source.clone()),
        }
    }
}

impl<T, S> fmt::Debug for EdgeSource<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeSource::Node(source) => source.fmt(f),
            EdgeSource::Error(source) => source.fmt(f),
        }
    }
}

/// One element of a branch's edge list.
pub enum Edge<T, S> {
    /// `(source, next)` with the default config for the source kind.
    Pair {
        /// The edge's source.
        source: EdgeSource<T, S>,
        /// The edge's targets.
        next: Next<T, S>,
    },
    /// `(source, next, config)`; the config kind must match the source
    /// kind.
    PairConfig {
        /// The edge's source.
        source: EdgeSource<T, S>,
        /// The edge's targets.
        next: Next<T, S>,
        /// The explicit config.
        config: EdgeConfig,
    },
    /// `(source, n1, …, nk[, next])`: shorthand for the linear chain
    /// `source→n1`, `n1→n2`, …, and `nk→next` when a trailing target is
    /// given. Every expanded pair carries the default node config.
    Chain {
        /// The chain's first source.
        source: Source<T, S>,
        /// The chained nodes, in order.
        nodes: Vec<NodeRef<T, S>>,
        /// The optional trailing target of the last node.
        next: Option<Next<T, S>>,
    },
}

impl<T, S> Edge<T, S> {
    /// Creates a `(source, next)` edge with the default config.
    pub fn new(source: impl Into<EdgeSource<T, S>>, next: impl Into<Next<T, S>>) -> Self {
        Edge::Pair {
            source: source.into(),
            next: next.into(),
        }
    }

    /// Creates a `(source, next, config)` edge with an explicit config.
    pub fn with_config(
        source: impl Into<EdgeSource<T, S>>,
        next: impl Into<Next<T, S>>,
        config: impl Into<EdgeConfig>,
    ) -> Self {
        Edge::PairConfig {
            source: source.into(),
            next: next.into(),
            config: config.into(),
        }
    }

    /// Creates a node-chain edge without a trailing target.
    pub fn chain(
        source: impl Into<Source<T, S>>,
        nodes: impl IntoIterator<Item = NodeRef<T, S>>,
    ) -> Self {
        Edge::Chain {
            source: source.into(),
            nodes: nodes.into_iter().collect(),
            next: None,
        }
    }

    /// Creates a node-chain edge whose last node leads to `next`.
    pub fn chain_to(
        source: impl Into<Source<T, S>>,
        nodes: impl IntoIterator<Item = NodeRef<T, S>>,
        next: impl Into<Next<T, S>>,
    ) -> Self {
        Edge::Chain {
            source: source.into(),
            nodes: nodes.into_iter().collect(),
            next: Some(next.into()),
        }
    }

    /// The edge's `next` descriptor, if it carries one.
    pub(crate) fn next(&self) -> Option<&Next<T, S>> {
        match self {
            Edge::Pair { next, .. } | Edge::PairConfig { next, .. } => Some(next),
            Edge::Chain { next, .. } => next.as_ref(),
        }
    }
}

impl<T, S> fmt::Debug for Edge<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Pair { source, next } => f
                .debug_struct("Pair")
                .field("source", source)
                .field("next", next)
                .finish(),
            Edge::PairConfig {
                source,
                next,
                config,
            } => f
                .debug_struct("PairConfig")
                .field("source", source)
                .field("next", next)
                .field("config", config)
                .finish(),
            Edge::Chain {
                source,
                nodes,
                next,
            } => f
                .debug_struct("Chain")
                .field("source", source)
                .field("nodes", &nodes.iter().map(NodeRef::name).collect::<Vec<_>>())
                .field("next", next)
                .finish(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Branch containers
// ─────────────────────────────────────────────────────────────────────────────

/// One sub-graph: a start source, an edge list, and a join target.
///
/// The outermost graph is itself a container rooted at [`Start`] and
/// joining at [`End`]. Containers used as edge targets spawn a sub-branch
/// that runs concurrently with the spawning branch; the first branch to
/// later reach the join target absorbs the sub-branch's changes.
pub struct BranchContainer<T, S> {
    start: SingleSource<T, S>,
    edges: Vec<Edge<T, S>>,
    join: SingleNext<T, S>,
}

impl<T, S> BranchContainer<T, S> {
    /// Creates a container from a start source, an edge list, and a join
    /// target.
    pub fn new(
        start: impl Into<SingleSource<T, S>>,
        edges: Vec<Edge<T, S>>,
        join: impl Into<SingleNext<T, S>>,
    ) -> Self {
        Self {
            start: start.into(),
            edges,
            join: join.into(),
        }
    }

    /// The source the branch's first step resolves from.
    #[must_use]
    pub fn start(&self) -> &SingleSource<T, S> {
        &self.start
    }

    /// The container's edge list.
    #[must_use]
    pub fn edges(&self) -> &[Edge<T, S>] {
        &self.edges
    }

    /// The target at which the branch's result is joined back.
    #[must_use]
    pub fn join(&self) -> &SingleNext<T, S> {
        &self.join
    }
}

impl<T, S> fmt::Debug for BranchContainer<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchContainer")
            .field("start", &self.start)
            .field("edges", &self.edges.len())
            .field("join", &self.join)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

impl<T, S> From<Start> for SingleSource<T, S> {
    fn from(_: Start) -> Self {
        SingleSource::Start
    }
}

impl<T, S> From<NodeRef<T, S>> for SingleSource<T, S> {
    fn from(node: NodeRef<T, S>) -> Self {
        SingleSource::Node(node)
    }
}

impl<T, S> From<&NodeRef<T, S>> for SingleSource<T, S> {
    fn from(node: &NodeRef<T, S>) -> Self {
        SingleSource::Node(node.clone())
    }
}

impl<T, S> From<Start> for Source<T, S> {
    fn from(start: Start) -> Self {
        Source::Single(start.into())
    }
}

impl<T, S> From<NodeRef<T, S>> for Source<T, S> {
    fn from(node: NodeRef<T, S>) -> Self {
        Source::Single(node.into())
    }
}

impl<T, S> From<&NodeRef<T, S>> for Source<T, S> {
    fn from(node: &NodeRef<T, S>) -> Self {
        Source::Single(node.into())
    }
}

impl<T, S> From<Vec<NodeRef<T, S>>> for Source<T, S> {
    fn from(nodes: Vec<NodeRef<T, S>>) -> Self {
        Source::Many(nodes.into_iter().map(SingleSource::Node).collect())
    }
}

impl<T, S> From<Vec<SingleSource<T, S>>> for Source<T, S> {
    fn from(sources: Vec<SingleSource<T, S>>) -> Self {
        Source::Many(sources)
    }
}

impl<T, S> From<ErrorType> for SingleErrorSource<T, S> {
    fn from(error_type: ErrorType) -> Self {
        SingleErrorSource::Type(error_type)
    }
}

impl<T, S> From<(NodeRef<T, S>, ErrorType)> for SingleErrorSource<T, S> {
    fn from((node, error_type): (NodeRef<T, S>, ErrorType)) -> Self {
        SingleErrorSource::Scoped(node, error_type)
    }
}

impl<T, S> From<(&NodeRef<T, S>, ErrorType)> for SingleErrorSource<T, S> {
    fn from((node, error_type): (&NodeRef<T, S>, ErrorType)) -> Self {
        SingleErrorSource::Scoped(node.clone(), error_type)
    }
}

impl<T, S> From<ErrorType> for ErrorSource<T, S> {
    fn from(error_type: ErrorType) -> Self {
        ErrorSource::Single(error_type.into())
    }
}

impl<T, S> From<(NodeRef<T, S>, ErrorType)> for ErrorSource<T, S> {
    fn from(scoped: (NodeRef<T, S>, ErrorType)) -> Self {
        ErrorSource::Single(scoped.into())
    }
}

impl<T, S> From<(&NodeRef<T, S>, ErrorType)> for ErrorSource<T, S> {
    fn from(scoped: (&NodeRef<T, S>, ErrorType)) -> Self {
        ErrorSource::Single(scoped.into())
    }
}

impl<T, S> From<(Vec<NodeRef<T, S>>, ErrorType)> for ErrorSource<T, S> {
    fn from((nodes, error_type): (Vec<NodeRef<T, S>>, ErrorType)) -> Self {
        ErrorSource::Many(
            nodes
                .into_iter()
                .map(|node| SingleErrorSource::Scoped(node, error_type))
                .collect(),
        )
    }
}

impl<T, S> From<Vec<SingleErrorSource<T, S>>> for ErrorSource<T, S> {
    fn from(sources: Vec<SingleErrorSource<T, S>>) -> Self {
        ErrorSource::Many(sources)
    }
}

impl<T, S> From<Start> for EdgeSource<T, S> {
    fn from(start: Start) -> Self {
        EdgeSource::Node(start.into())
    }
}

impl<T, S> From<NodeRef<T, S>> for EdgeSource<T, S> {
    fn from(node: NodeRef<T, S>) -> Self {
        EdgeSource::Node(node.into())
    }
}

impl<T, S> From<&NodeRef<T, S>> for EdgeSource<T, S> {
    fn from(node: &NodeRef<T, S>) -> Self {
        EdgeSource::Node(node.into())
    }
}

impl<T, S> From<Vec<NodeRef<T, S>>> for EdgeSource<T, S> {
    fn from(nodes: Vec<NodeRef<T, S>>) -> Self {
        EdgeSource::Node(nodes.into())
    }
}

impl<T, S> From<Source<T, S>> for EdgeSource<T, S> {
    fn from(source: Source<T, S>) -> Self {
        EdgeSource::Node(source)
    }
}

impl<T, S> From<ErrorType> for EdgeSource<T, S> {
    fn from(error_type: ErrorType) -> Self {
        EdgeSource::Error(error_type.into())
    }
}

impl<T, S> From<(NodeRef<T, S>, ErrorType)> for EdgeSource<T, S> {
    fn from(scoped: (NodeRef<T, S>, ErrorType)) -> Self {
        EdgeSource::Error(scoped.into())
    }
}

impl<T, S> From<(&NodeRef<T, S>, ErrorType)> for EdgeSource<T, S> {
    fn from(scoped: (&NodeRef<T, S>, ErrorType)) -> Self {
        EdgeSource::Error(scoped.into())
    }
}

impl<T, S> From<(Vec<NodeRef<T, S>>, ErrorType)> for EdgeSource<T, S> {
    fn from(scoped: (Vec<NodeRef<T, S>>, ErrorType)) -> Self {
        EdgeSource::Error(scoped.into())
    }
}

impl<T, S> From<ErrorSource<T, S>> for EdgeSource<T, S> {
    fn from(source: ErrorSource<T, S>) -> Self {
        EdgeSource::Error(source)
    }
}

impl<T, S> From<NodeRef<T, S>> for SingleNext<T, S> {
    fn from(node: NodeRef<T, S>) -> Self {
        SingleNext::Node(node)
    }
}

impl<T, S> From<&NodeRef<T, S>> for SingleNext<T, S> {
    fn from(node: &NodeRef<T, S>) -> Self {
        SingleNext::Node(node.clone())
    }
}

impl<T, S> From<End> for SingleNext<T, S> {
    fn from(_: End) -> Self {
        SingleNext::End
    }
}

impl<T, S> From<SingleNext<T, S>> for ResolvedNext<T, S> {
    fn from(single: SingleNext<T, S>) -> Self {
        ResolvedNext::Single(single)
    }
}

impl<T, S> From<NodeRef<T, S>> for ResolvedNext<T, S> {
    fn from(node: NodeRef<T, S>) -> Self {
        ResolvedNext::Single(node.into())
    }
}

impl<T, S> From<&NodeRef<T, S>> for ResolvedNext<T, S> {
    fn from(node: &NodeRef<T, S>) -> Self {
        ResolvedNext::Single(node.into())
    }
}

impl<T, S> From<End> for ResolvedNext<T, S> {
    fn from(end: End) -> Self {
        ResolvedNext::Single(end.into())
    }
}

impl<T, S> From<Vec<NodeRef<T, S>>> for ResolvedNext<T, S> {
    fn from(nodes: Vec<NodeRef<T, S>>) -> Self {
        ResolvedNext::Many(nodes.into_iter().map(SingleNext::Node).collect())
    }
}

impl<T, S> From<Vec<SingleNext<T, S>>> for ResolvedNext<T, S> {
    fn from(singles: Vec<SingleNext<T, S>>) -> Self {
        ResolvedNext::Many(singles)
    }
}

impl<T, S> From<ResolvedNext<T, S>> for Next<T, S> {
    fn from(resolved: ResolvedNext<T, S>) -> Self {
        Next::Static(resolved)
    }
}

impl<T, S> From<SingleNext<T, S>> for Next<T, S> {
    fn from(single: SingleNext<T, S>) -> Self {
        Next::Static(single.into())
    }
}

impl<T, S> From<NodeRef<T, S>> for Next<T, S> {
    fn from(node: NodeRef<T, S>) -> Self {
        Next::Static(node.into())
    }
}

impl<T, S> From<&NodeRef<T, S>> for Next<T, S> {
    fn from(node: &NodeRef<T, S>) -> Self {
        Next::Static(node.into())
    }
}

impl<T, S> From<End> for Next<T, S> {
    fn from(end: End) -> Self {
        Next::Static(end.into())
    }
}

impl<T, S> From<Vec<NodeRef<T, S>>> for Next<T, S> {
    fn from(nodes: Vec<NodeRef<T, S>>) -> Self {
        Next::Static(nodes.into())
    }
}

impl<T, S> From<Vec<SingleNext<T, S>>> for Next<T, S> {
    fn from(singles: Vec<SingleNext<T, S>>) -> Self {
        Next::Static(singles.into())
    }
}

impl<T, S> From<Router<T, S>> for Next<T, S> {
    fn from(router: Router<T, S>) -> Self {
        Next::Router(router)
    }
}

impl<T, S> From<BranchContainer<T, S>> for Next<T, S> {
    fn from(container: BranchContainer<T, S>) -> Self {
        Next::Branch(Arc::new(container))
    }
}

impl<T, S> From<Arc<BranchContainer<T, S>>> for Next<T, S> {
    fn from(container: Arc<BranchContainer<T, S>>) -> Self {
        Next::Branch(container)
    }
}

impl From<NodeConfig> for EdgeConfig {
    fn from(config: NodeConfig) -> Self {
        EdgeConfig::Node(config)
    }
}

impl From<ErrorConfig> for EdgeConfig {
    fn from(config: ErrorConfig) -> Self {
        EdgeConfig::Error(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeError;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl crate::node::Node<(), ()> for Noop {
        async fn run(&self, _state: &mut (), _shared: &()) -> Result<(), NodeError> {
            Ok(())
        }
    }

    fn noop() -> NodeRef<(), ()> {
        NodeRef::new(Noop)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[derive(Debug, thiserror::Error)]
    #[error("other")]
    struct Other;

    #[test]
    fn error_type_matches_exactly() {
        let key = ErrorType::of::<Boom>();
        let boom: NodeError = Box::new(Boom);
        let other: NodeError = Box::new(Other);

        assert!(key.matches(&boom));
        assert!(!key.matches(&other));
        assert_eq!(key, ErrorType::of::<Boom>());
        assert_ne!(key, ErrorType::of::<Other>());
    }

    #[test]
    fn resolved_next_drops_terminations() {
        let a = noop();
        let b = noop();
        let resolved: ResolvedNext<(), ()> =
            vec![SingleNext::Node(a.clone()), SingleNext::End, SingleNext::Node(b.clone())].into();

        let nodes = resolved.into_nodes();
        assert_eq!(nodes, vec![a, b]);
    }

    #[test]
    fn sources_classify_by_construction() {
        let node = noop();
        assert!(matches!(
            EdgeSource::<(), ()>::from(Start),
            EdgeSource::Node(Source::Single(SingleSource::Start))
        ));
        assert!(matches!(
            EdgeSource::from(&node),
            EdgeSource::Node(Source::Single(SingleSource::Node(_)))
        ));
        assert!(matches!(
            EdgeSource::<(), ()>::from(ErrorType::of::<Boom>()),
            EdgeSource::Error(ErrorSource::Single(SingleErrorSource::Type(_)))
        ));
        assert!(matches!(
            EdgeSource::from((&node, ErrorType::of::<Boom>())),
            EdgeSource::Error(ErrorSource::Single(SingleErrorSource::Scoped(_, _)))
        ));
    }

    #[test]
    fn scoped_node_list_expands_per_node() {
        let a = noop();
        let b = noop();
        let source = ErrorSource::from((vec![a.clone(), b.clone()], ErrorType::of::<Boom>()));

        let keys: Vec<_> = source.iter().cloned().collect();
        assert_eq!(keys.len(), 2);
        assert!(matches!(&keys[0], SingleErrorSource::Scoped(node, _) if *node == a));
        assert!(matches!(&keys[1], SingleErrorSource::Scoped(node, _) if *node == b));
    }

    #[test]
    fn single_next_keys_distinguish_end_from_nodes() {
        let node = noop();
        let as_next: SingleNext<(), ()> = (&node).into();
        assert_ne!(as_next, SingleNext::End);
        assert_eq!(SingleNext::<(), ()>::End, SingleNext::End);
        assert_eq!(as_next, SingleNext::Node(node));
    }
}
