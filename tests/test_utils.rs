//! Shared test utilities for `braid` integration tests.
//!
//! Provides the common state type, a palette of nodes, error types, and a
//! recording hook used across the test files. Import via
//! `mod test_utils;`.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities — not all items used in every test binary"
)]

use std::sync::Arc;

use async_trait::async_trait;
use braid::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// The state used by most integration tests.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestState {
    pub value: i64,
    pub name: String,
}

pub fn state(value: i64) -> TestState {
    TestState {
        value,
        name: String::new(),
    }
}

pub type TestNode = NodeRef<TestState, SharedMap>;
pub type TestGraph = Graph<TestState, SharedMap>;

/// Runs a graph on a fresh shared map.
pub async fn run_graph(
    graph: &TestGraph,
    state: TestState,
) -> Result<(TestState, Arc<SharedMap>), ExecutionError> {
    graph.run(state, Arc::new(SharedMap::new())).await
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, thiserror::Error)]
#[error("bad input")]
pub struct BadInput;

#[derive(Debug, Default, thiserror::Error)]
#[error("out of range")]
pub struct OutOfRange;

#[derive(Debug, Default, thiserror::Error)]
#[error("unsupported")]
pub struct Unsupported;

// ═══════════════════════════════════════════════════════════════════════════════
// NODES
// ═══════════════════════════════════════════════════════════════════════════════

/// Increments `value` by one.
pub struct Increment;

#[async_trait]
impl Node<TestState, SharedMap> for Increment {
    async fn run(&self, state: &mut TestState, _shared: &SharedMap) -> Result<(), NodeError> {
        state.value += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "increment"
    }
}

/// Does nothing.
pub struct Noop;

#[async_trait]
impl Node<TestState, SharedMap> for Noop {
    async fn run(&self, _state: &mut TestState, _shared: &SharedMap) -> Result<(), NodeError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Sets `value` to a fixed number.
pub struct SetValue(pub i64);

#[async_trait]
impl Node<TestState, SharedMap> for SetValue {
    async fn run(&self, state: &mut TestState, _shared: &SharedMap) -> Result<(), NodeError> {
        state.value = self.0;
        Ok(())
    }

    fn name(&self) -> &str {
        "set_value"
    }
}

/// Sets `name` to a fixed string.
pub struct SetName(pub &'static str);

#[async_trait]
impl Node<TestState, SharedMap> for SetName {
    async fn run(&self, state: &mut TestState, _shared: &SharedMap) -> Result<(), NodeError> {
        state.name = self.0.to_string();
        Ok(())
    }

    fn name(&self) -> &str {
        "set_name"
    }
}

/// Always fails with the error type `E`.
pub struct Raise<E>(core::marker::PhantomData<E>);

impl<E> Raise<E> {
    pub fn new() -> Self {
        Self(core::marker::PhantomData)
    }
}

#[async_trait]
impl<E> Node<TestState, SharedMap> for Raise<E>
where
    E: std::error::Error + Default + Send + Sync + 'static,
{
    async fn run(&self, _state: &mut TestState, _shared: &SharedMap) -> Result<(), NodeError> {
        Err(Box::new(E::default()))
    }

    fn name(&self) -> &str {
        "raise"
    }
}

/// Sets `name` to `"recovered"`.
pub struct Recover;

#[async_trait]
impl Node<TestState, SharedMap> for Recover {
    async fn run(&self, state: &mut TestState, _shared: &SharedMap) -> Result<(), NodeError> {
        state.name = "recovered".to_string();
        Ok(())
    }

    fn name(&self) -> &str {
        "recover"
    }
}

/// Writes a marker into the shared map.
pub struct MarkShared(pub &'static str);

#[async_trait]
impl Node<TestState, SharedMap> for MarkShared {
    async fn run(&self, _state: &mut TestState, shared: &SharedMap) -> Result<(), NodeError> {
        shared.insert(self.0, serde_json::json!(true));
        Ok(())
    }

    fn name(&self) -> &str {
        "mark_shared"
    }
}

// Convenience constructors.

pub fn increment() -> TestNode {
    NodeRef::new(Increment)
}

pub fn noop() -> TestNode {
    NodeRef::new(Noop)
}

pub fn set_value(value: i64) -> TestNode {
    NodeRef::new(SetValue(value))
}

pub fn set_name(name: &'static str) -> TestNode {
    NodeRef::new(SetName(name))
}

pub fn raise<E>() -> TestNode
where
    E: std::error::Error + Default + Send + Sync + 'static,
{
    NodeRef::new(Raise::<E>::new())
}

pub fn recover() -> TestNode {
    NodeRef::new(Recover)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOOKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Records lifecycle events as readable strings.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: String) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// The node-name lists passed to `on_step_start`, in order.
    pub fn step_starts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| event.strip_prefix("step_start:").map(str::to_string))
            .collect()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|recorded| recorded == event)
    }
}

#[async_trait]
impl<T: GraphState, S: GraphShared> GraphHook<T, S> for Recorder {
    async fn on_graph_start(&self, _state: &T, _shared: &S) {
        self.record("graph_start".to_string());
    }

    async fn on_graph_end(&self, _state: &T, _shared: &S) {
        self.record("graph_end".to_string());
    }

    async fn on_step_start(&self, _state: &T, _shared: &S, next_nodes: &[NextNode<T, S>]) {
        let names: Vec<&str> = next_nodes.iter().map(|next| next.node.name()).collect();
        self.record(format!("step_start:{}", names.join("+")));
    }

    async fn on_step_end(&self, _state: &T, _shared: &S, next_nodes: &[NextNode<T, S>]) {
        self.record(format!("step_end:{}", next_nodes.len()));
    }

    async fn on_spawn_branch_start(
        &self,
        _state: &T,
        _shared: &S,
        _branch: &BranchInfo<T, S>,
        _trigger: &ReachedBy<T, S>,
        registry: &JoinRegistry<T, S>,
    ) {
        self.record(format!("spawn_start:pending={}", registry.pending()));
    }

    async fn on_spawn_branch_end(
        &self,
        _state: &T,
        _shared: &S,
        _branch: &BranchInfo<T, S>,
        _trigger: &ReachedBy<T, S>,
        _registry: &JoinRegistry<T, S>,
    ) {
        self.record("spawn_end".to_string());
    }

    async fn on_merge_start(&self, _state: &T, result_states: &[T], _changes: &[ChangeSet]) {
        self.record(format!("merge_start:{}", result_states.len()));
    }

    async fn on_merge_conflict(
        &self,
        _state: &T,
        _changes: &[ChangeSet],
        _conflicts: &ChangeConflict,
    ) {
        self.record("merge_conflict".to_string());
    }

    async fn on_merge_end(
        &self,
        _state: &T,
        _result_states: &[T],
        _changes: &[ChangeSet],
        _merged_state: &T,
    ) {
        self.record("merge_end".to_string());
    }

    async fn on_error(&self, error: ExecutionError, _state: &T, _shared: &S) -> Option<ExecutionError> {
        self.record(format!("error:{error}"));
        Some(error)
    }
}

/// Absorbs every branch error.
#[derive(Clone, Copy, Default)]
pub struct Absorb;

#[async_trait]
impl<T: GraphState, S: GraphShared> GraphHook<T, S> for Absorb {
    async fn on_error(
        &self,
        _error: ExecutionError,
        _state: &T,
        _shared: &S,
    ) -> Option<ExecutionError> {
        None
    }
}

/// Replaces every branch error with `Cancelled`.
#[derive(Clone, Copy, Default)]
pub struct ReplaceWithCancelled;

#[async_trait]
impl<T: GraphState, S: GraphShared> GraphHook<T, S> for ReplaceWithCancelled {
    async fn on_error(
        &self,
        _error: ExecutionError,
        _state: &T,
        _shared: &S,
    ) -> Option<ExecutionError> {
        Some(ExecutionError::Cancelled)
    }
}
