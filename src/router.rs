//! Error routing.
//!
//! Errors raised by a step's nodes are pooled into a group and matched
//! against the branch's error edges. Matching is positional: an error edge
//! only fires for errors raised through edges located strictly *before* it
//! in the edge list. The first firing handler consumes the error unless it
//! is configured to propagate, in which case later matching handlers fire
//! as well — an error consumed by no handler stays unhandled, and any
//! unhandled errors abort the branch as a group.

use crate::edge::SingleErrorSource;
use crate::error::{ExecutionError, UnhandledNodeErrors};
use crate::index::{BranchIndex, ErrorEntry};
use crate::node::NodeError;
use crate::resolver::{self, NextNode, Resolution};

/// A node error tagged with the target it was raised from.
///
/// Errors without an origin (a panicked task, for example) cannot be
/// matched and are always unhandled.
pub(crate) struct TaggedError<T, S> {
    pub(crate) error: NodeError,
    pub(crate) origin: Option<NextNode<T, S>>,
}

/// Matches a step's error group against the branch's error edges and
/// produces the recovery targets.
///
/// # Errors
///
/// Returns [`UnhandledNodeErrors`] carrying every error no eligible edge
/// consumed; any already-collected recovery targets are discarded in that
/// case, matching the group-abort semantics of the step.
pub(crate) async fn route_errors<T, S>(
    state: &T,
    shared: &S,
    group: Vec<TaggedError<T, S>>,
    index: &BranchIndex<T, S>,
) -> Result<Vec<Resolution<T, S>>, ExecutionError> {
    let mut out = Vec::new();
    let mut unhandled: Vec<NodeError> = Vec::new();

    for tagged in group {
        let Some(origin) = tagged.origin else {
            unhandled.push(tagged.error);
            continue;
        };

        let mut matched: Vec<&ErrorEntry<T, S>> = Vec::new();
        for (key, entries) in index.error_entries() {
            if key_matches(key, &tagged.error, &origin) {
                matched.extend(entries.iter());
            }
        }
        matched.sort_by_key(|entry| entry.index);

        let origin_index = origin.reached_by.index();
        let mut consumed = false;
        for entry in matched {
            // Error routing is scoped forward: only textually-later edges
            // are eligible.
            if entry.index <= origin_index {
                continue;
            }
            resolver::resolve_error_entry(state, shared, entry, &mut out).await?;
            tracing::debug!(
                handler = entry.index,
                origin = origin_index,
                node = origin.node.name(),
                "error edge fired"
            );
            if !entry.config.propagate {
                consumed = true;
                break;
            }
        }

        if !consumed {
            unhandled.push(tagged.error);
        }
    }

    if !unhandled.is_empty() {
        return Err(UnhandledNodeErrors { errors: unhandled }.into());
    }
    Ok(out)
}

fn key_matches<T, S>(
    key: &SingleErrorSource<T, S>,
    error: &NodeError,
    origin: &NextNode<T, S>,
) -> bool {
    match key {
        SingleErrorSource::Type(error_type) => error_type.matches(error),
        SingleErrorSource::Scoped(node, error_type) => {
            *node == origin.node && error_type.matches(error)
        }
    }
}
