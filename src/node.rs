//! User nodes and the graph's start/end sentinels.
//!
//! A node is an async unit of computation: it receives a mutable borrow of
//! its own state snapshot and a shared borrow of the graph-wide shared
//! value. Whatever it writes into the snapshot is observed afterwards via a
//! structural diff; whatever it does to the shared value is observed
//! directly by every other node.
//!
//! Node identity is reference identity. Edges hold [`NodeRef`] handles, and
//! two handles are equal exactly when they point at the same node instance,
//! so the same type can appear in a graph many times as distinct nodes.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

/// The error type nodes may fail with.
///
/// Error edges match on the *concrete* type behind this box, so recovery
/// routing works for any error type a node chooses to raise.
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// An async unit of computation in a graph.
///
/// `T` is the state type and `S` the shared type. Implementations mutate
/// `state` freely (it is a private snapshot) and coordinate through
/// `shared` on their own terms.
#[async_trait]
pub trait Node<T, S>: Send + Sync {
    /// Runs the node against a private state snapshot and the shared value.
    async fn run(&self, state: &mut T, shared: &S) -> Result<(), NodeError>;

    /// The node's name, used in traces and debug output.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }
}

/// A cheap, cloneable handle to a node, with identity semantics.
///
/// Equality and hashing follow the pointed-at node instance, not its
/// contents: `a == b` iff `a` and `b` were cloned from the same handle.
pub struct NodeRef<T, S> {
    inner: Arc<dyn Node<T, S>>,
}

impl<T, S> NodeRef<T, S> {
    /// Wraps a node into a handle.
    pub fn new(node: impl Node<T, S> + 'static) -> Self {
        Self {
            inner: Arc::new(node),
        }
    }

    /// Wraps an async closure into a node.
    ///
    /// The closure receives the state snapshot and the shared value and
    /// returns a boxed future, typically `Box::pin(async move { .. })`.
    pub fn from_fn<F>(name: &'static str, f: F) -> Self
    where
        T: Send + 'static,
        S: Sync + 'static,
        F: for<'a> Fn(&'a mut T, &'a S) -> BoxFuture<'a, Result<(), NodeError>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(FnNode {
            name,
            f,
            marker: PhantomData,
        })
    }

    /// The node's name, as reported by [`Node::name`].
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Runs the underlying node.
    pub(crate) async fn run(&self, state: &mut T, shared: &S) -> Result<(), NodeError> {
        self.inner.run(state, shared).await
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl<T, S> Clone for NodeRef<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, S> PartialEq for NodeRef<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<T, S> Eq for NodeRef<T, S> {}

impl<T, S> Hash for NodeRef<T, S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T, S> fmt::Debug for NodeRef<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("name", &self.name())
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

/// Node built from an async closure; see [`NodeRef::from_fn`].
struct FnNode<T, S, F> {
    name: &'static str,
    f: F,
    marker: PhantomData<fn(&mut T, &S)>,
}

#[async_trait]
impl<T, S, F> Node<T, S> for FnNode<T, S, F>
where
    T: Send + 'static,
    S: Sync + 'static,
    F: for<'a> Fn(&'a mut T, &'a S) -> BoxFuture<'a, Result<(), NodeError>> + Send + Sync,
{
    async fn run(&self, state: &mut T, shared: &S) -> Result<(), NodeError> {
        (self.f)(state, shared).await
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// The start sentinel: the implicit source every branch begins from.
///
/// Distinct from every node and from [`End`]; usable directly as an edge
/// source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Start;

/// The end sentinel: a target that terminates the branch reaching it.
///
/// Also the join point of the outermost graph; sub-branches may nominate a
/// node instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct End;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    struct Noop;

    #[async_trait]
    impl Node<(), ()> for Noop {
        async fn run(&self, _state: &mut (), _shared: &()) -> Result<(), NodeError> {
            Ok(())
        }
    }

    fn hash_of<T, S>(node: &NodeRef<T, S>) -> u64 {
        let mut hasher = DefaultHasher::new();
        node.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn identity_is_per_instance() {
        let a = NodeRef::new(Noop);
        let b = NodeRef::new(Noop);

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(hash_of(&a), hash_of(&a.clone()));
    }

    #[test]
    fn default_name_is_the_type_name() {
        let node = NodeRef::new(Noop);
        assert!(node.name().contains("Noop"));
    }

    #[test]
    fn fn_node_reports_its_given_name() {
        let node: NodeRef<(), ()> =
            NodeRef::from_fn("custom", |_state, _shared| Box::pin(async { Ok(()) }));
        assert_eq!(node.name(), "custom");
    }
}
