//! Property tests for the diff engine.
//!
//! Generates random nested mappings (depth 3) and checks the diff/apply
//! round trip, the empty-diff identity, conflict-detection completeness,
//! and the scalar root path.

use braid::diff;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

fn to_object(entries: Vec<(String, Value)>) -> Value {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key, value);
    }
    Value::Object(map)
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(3, 24, 4, |inner| {
        proptest::collection::vec(("[a-d]{1,2}", inner), 0..4).prop_map(to_object)
    })
}

fn arb_mapping() -> impl Strategy<Value = Value> {
    proptest::collection::vec(("[a-d]{1,2}", arb_value()), 0..5).prop_map(to_object)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Applying `diff(a, b)` to a copy of `a` reproduces `b`.
    #[test]
    fn diff_round_trips(a in arb_mapping(), b in arb_mapping()) {
        let changes = diff::diff(&a, &b);
        let mut patched = a.clone();
        diff::apply(&mut patched, &changes).unwrap();
        prop_assert_eq!(patched, b);
    }

    /// `diff(x, x)` is empty for any value.
    #[test]
    fn diff_of_identical_values_is_empty(x in arb_value()) {
        prop_assert!(diff::diff(&x, &x).is_empty());
    }

    /// A path conflicts iff it appears in both changesets.
    #[test]
    fn conflicts_exactly_where_both_changesets_touch(
        a in arb_mapping(),
        b in arb_mapping(),
        c in arb_mapping(),
    ) {
        let first = diff::diff(&a, &b);
        let second = diff::diff(&a, &c);
        let conflicts = diff::find_conflicts(&[first.clone(), second.clone()]);

        for path in first.keys() {
            prop_assert_eq!(conflicts.contains_key(path), second.contains_key(path));
        }
        for path in conflicts.keys() {
            prop_assert!(first.contains_key(path));
            prop_assert!(second.contains_key(path));
        }
    }

    /// A single changeset never conflicts with itself.
    #[test]
    fn one_changeset_never_conflicts(a in arb_mapping(), b in arb_mapping()) {
        let only = diff::diff(&a, &b);
        prop_assert!(diff::find_conflicts(std::slice::from_ref(&only)).is_empty());
    }

    /// Unequal scalars diff to exactly one change at the root path.
    #[test]
    fn unequal_scalars_diff_at_the_root(x in any::<i64>(), y in any::<i64>()) {
        prop_assume!(x != y);
        let changes = diff::diff(&json!(x), &json!(y));
        prop_assert_eq!(changes.len(), 1);
        prop_assert!(changes.contains_key(&diff::Path::new()));
    }
}
