//! Sub-branch tests: spawning, joining at a nominated node, joining at
//! the end, nesting, disjoint-changeset determinism, and failures.

mod test_utils;

use braid::prelude::*;
use test_utils::{
    increment, noop, raise, run_graph, set_name, set_value, state, Recorder, Unsupported,
};

#[tokio::test]
async fn sub_branch_joins_at_the_nominated_node() {
    let entry = increment();
    let continuation = increment();
    let join_node = noop();
    let side = set_name("from-sub");

    let sub = BranchContainer::new(
        Start,
        vec![Edge::new(Start, &side)],
        &join_node,
    );

    let recorder = Recorder::new();
    let graph = Graph::new(BranchContainer::new(
        Start,
        vec![
            Edge::new(Start, &entry),
            Edge::new(&entry, sub),
            Edge::new(&entry, &continuation),
            Edge::new(&continuation, &join_node),
            Edge::new(&join_node, End),
        ],
        End,
    ))
    .unwrap()
    .with_hook(recorder.clone());

    let (result, _shared) = run_graph(&graph, state(0)).await.unwrap();
    assert_eq!(result.value, 2);
    assert_eq!(result.name, "from-sub");
    assert!(
        recorder
            .events()
            .iter()
            .any(|event| event.starts_with("spawn_start")),
        "spawn hooks should have fired"
    );
}

#[tokio::test]
async fn sub_branch_may_join_at_the_end() {
    let entry = increment();
    let side = set_name("side");

    let sub = BranchContainer::new(Start, vec![Edge::new(Start, &side)], End);
    let graph = Graph::new(BranchContainer::new(
        Start,
        vec![Edge::new(Start, &entry), Edge::new(&entry, sub)],
        End,
    ))
    .unwrap();

    let (result, _shared) = run_graph(&graph, state(0)).await.unwrap();
    assert_eq!(result.value, 1);
    assert_eq!(result.name, "side");
}

#[tokio::test]
async fn disjoint_sub_branches_join_deterministically() {
    let entry = noop();
    let join_node = noop();
    let name_side = set_name("one");
    let value_side = set_value(5);

    let graph = Graph::new(BranchContainer::new(
        Start,
        vec![
            Edge::new(Start, &entry),
            Edge::new(
                &entry,
                BranchContainer::new(Start, vec![Edge::new(Start, &name_side)], &join_node),
            ),
            Edge::new(
                &entry,
                BranchContainer::new(Start, vec![Edge::new(Start, &value_side)], &join_node),
            ),
            Edge::new(&entry, &join_node),
            Edge::new(&join_node, End),
        ],
        End,
    ))
    .unwrap();

    for _ in 0..5 {
        let (result, _shared) = run_graph(&graph, state(0)).await.unwrap();
        assert_eq!(result.value, 5);
        assert_eq!(result.name, "one");
    }
}

#[tokio::test]
async fn conflicting_sub_branches_fail_the_join() {
    let entry = noop();
    let join_node = noop();
    let first = set_name("one");
    let second = set_name("two");

    let graph = Graph::new(BranchContainer::new(
        Start,
        vec![
            Edge::new(Start, &entry),
            Edge::new(
                &entry,
                BranchContainer::new(Start, vec![Edge::new(Start, &first)], &join_node),
            ),
            Edge::new(
                &entry,
                BranchContainer::new(Start, vec![Edge::new(Start, &second)], &join_node),
            ),
            Edge::new(&entry, &join_node),
        ],
        End,
    ))
    .unwrap();

    let error = run_graph(&graph, state(0)).await.unwrap_err();
    assert!(matches!(error, ExecutionError::Conflict(_)));
}

#[tokio::test]
async fn sub_branches_nest() {
    let entry = increment();
    let join_node = noop();
    let outer_entry = noop();
    let outer_continuation = noop();
    let deep = set_name("deep");

    let inner = BranchContainer::new(
        Start,
        vec![Edge::new(Start, &deep)],
        &outer_continuation,
    );
    let outer = BranchContainer::new(
        Start,
        vec![
            Edge::new(Start, &outer_entry),
            Edge::new(&outer_entry, inner),
            Edge::new(&outer_entry, &outer_continuation),
            Edge::new(&outer_continuation, End),
        ],
        &join_node,
    );

    let graph = Graph::new(BranchContainer::new(
        Start,
        vec![
            Edge::new(Start, &entry),
            Edge::new(&entry, outer),
            Edge::new(&entry, &join_node),
            Edge::new(&join_node, End),
        ],
        End,
    ))
    .unwrap();

    let (result, _shared) = run_graph(&graph, state(0)).await.unwrap();
    assert_eq!(result.value, 1);
    assert_eq!(result.name, "deep");
}

#[tokio::test]
async fn failing_sub_branch_fails_the_run() {
    let entry = noop();
    let failing = raise::<Unsupported>();

    let sub = BranchContainer::new(Start, vec![Edge::new(Start, &failing)], End);
    let graph = Graph::new(BranchContainer::new(
        Start,
        vec![Edge::new(Start, &entry), Edge::new(&entry, sub)],
        End,
    ))
    .unwrap();

    let error = run_graph(&graph, state(0)).await.unwrap_err();
    assert!(matches!(error, ExecutionError::Unhandled(_)));
}

#[tokio::test]
async fn failing_sub_branch_outranks_the_lost_join() {
    let entry = noop();
    let join_node = noop();
    let failing = raise::<Unsupported>();

    // The main branch waits at the join node for a result that never
    // arrives; the reported failure is still the sub-branch's own error.
    let sub = BranchContainer::new(Start, vec![Edge::new(Start, &failing)], &join_node);
    let graph = Graph::new(BranchContainer::new(
        Start,
        vec![
            Edge::new(Start, &entry),
            Edge::new(&entry, sub),
            Edge::new(&entry, &join_node),
        ],
        End,
    ))
    .unwrap();

    let error = run_graph(&graph, state(0)).await.unwrap_err();
    assert!(matches!(error, ExecutionError::Unhandled(_)));
}

#[tokio::test]
async fn sub_branch_spawned_from_a_recovery_edge() {
    let failing = raise::<Unsupported>();
    let handler = noop();
    let join_node = noop();
    let side = set_name("recovered-side");

    let sub = BranchContainer::new(Start, vec![Edge::new(Start, &side)], &join_node);
    let graph = Graph::new(BranchContainer::new(
        Start,
        vec![
            Edge::new(Start, &failing),
            // Propagates so the branch-spawning error edge below fires too.
            Edge::with_config(
                ErrorType::of::<Unsupported>(),
                &handler,
                ErrorConfig::propagate(),
            ),
            Edge::new(ErrorType::of::<Unsupported>(), sub),
            Edge::new(&handler, &join_node),
            Edge::new(&join_node, End),
        ],
        End,
    ))
    .unwrap();

    let (result, _shared) = run_graph(&graph, state(0)).await.unwrap();
    assert_eq!(result.name, "recovered-side");
}
