//! Structural diff, patch, and conflict detection over nested mappings.
//!
//! States are reconciled by diffing their dumped mappings rather than by
//! sharing them: every fan-out task mutates its own snapshot, and the
//! resulting changesets are checked for conflicts and applied back onto the
//! step's base state. Changes are keyed by [`Path`], the sequence of mapping
//! keys leading to a leaf (the root is the empty path).
//!
//! Conflict detection is path-exact, not parent-inclusive: changes at
//! `["a", "b"]` and `["a", "c"]` never conflict, and a change at `["a"]` is
//! disjoint from a change at `["a", "b"]`.

use core::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Sequence of mapping keys identifying a leaf inside a nested mapping.
///
/// The root value is addressed by the empty path; diffing two unequal
/// scalars yields exactly one change under it.
pub type Path = Vec<String>;

/// An insertion-ordered set of changes, keyed by the path they apply to.
pub type ChangeSet = IndexMap<Path, Change>;

/// The kind of structural change recorded for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The key exists in the new mapping but not in the old one.
    Added,
    /// The key exists in the old mapping but not in the new one.
    Removed,
    /// The value differs between the old and new mapping.
    Updated,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Removed => write!(f, "removed"),
            ChangeKind::Updated => write!(f, "updated"),
        }
    }
}

/// A single recorded change to a nested mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// What happened at the path.
    pub kind: ChangeKind,
    /// The previous value, if any.
    pub old: Option<Value>,
    /// The new value, if any.
    pub new: Option<Value>,
}

impl Change {
    /// Creates an [`ChangeKind::Added`] change.
    #[must_use]
    pub fn added(new: Value) -> Self {
        Self {
            kind: ChangeKind::Added,
            old: None,
            new: Some(new),
        }
    }

    /// Creates a [`ChangeKind::Removed`] change.
    #[must_use]
    pub fn removed(old: Value) -> Self {
        Self {
            kind: ChangeKind::Removed,
            old: Some(old),
            new: None,
        }
    }

    /// Creates an [`ChangeKind::Updated`] change.
    #[must_use]
    pub fn updated(old: Value, new: Value) -> Self {
        Self {
            kind: ChangeKind::Updated,
            old: Some(old),
            new: Some(new),
        }
    }
}

/// Errors from [`apply`].
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// A removal addressed a leaf key that is absent in the target.
    #[error("cannot remove missing key at path {path:?}")]
    MissingKeyOnRemove {
        /// The full path of the missing leaf.
        path: Path,
    },

    /// A change tried to descend through a value that is not a mapping.
    #[error("cannot descend into non-mapping value at path {path:?}")]
    NotAMapping {
        /// The path of the non-mapping component.
        path: Path,
    },

    /// The root value itself cannot be removed.
    #[error("cannot remove the root value")]
    RemoveAtRoot,
}

/// Two or more changesets touched the same path.
///
/// Carries every conflicting change per path, in the order the changesets
/// were supplied.
#[derive(Debug)]
pub struct ChangeConflict {
    /// The conflicting changes, keyed by the contested path.
    pub conflicts: IndexMap<Path, Vec<Change>>,
}

impl fmt::Display for ChangeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conflicting changes at ")?;
        for (i, path) in self.conflicts.keys().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", path)?;
        }
        Ok(())
    }
}

impl std::error::Error for ChangeConflict {}

/// Computes the structural difference between two nested mappings.
///
/// Mappings are compared key-by-key over the union of their keys (old keys
/// first, then keys only present in the new mapping), recursing into keys
/// present on both sides. Anything that is not a mapping on both sides is
/// compared by equality and yields a single [`ChangeKind::Updated`] entry
/// at the current path when unequal. `diff(x, x)` is empty for any `x`.
#[must_use]
pub fn diff(old: &Value, new: &Value) -> ChangeSet {
    let mut changes = ChangeSet::new();
    let mut path = Path::new();
    diff_into(old, new, &mut path, &mut changes);
    changes
}

fn diff_into(old: &Value, new: &Value, path: &mut Path, out: &mut ChangeSet) {
    match (old.as_object(), new.as_object()) {
        (Some(old_map), Some(new_map)) => {
            for (key, old_value) in old_map {
                path.push(key.clone());
                match new_map.get(key) {
                    Some(new_value) => diff_into(old_value, new_value, path, out),
                    None => {
                        out.insert(path.clone(), Change::removed(old_value.clone()));
                    }
                }
                path.pop();
            }
            for (key, new_value) in new_map {
                if !old_map.contains_key(key) {
                    path.push(key.clone());
                    out.insert(path.clone(), Change::added(new_value.clone()));
                    path.pop();
                }
            }
        }
        _ => {
            if old != new {
                out.insert(path.clone(), Change::updated(old.clone(), new.clone()));
            }
        }
    }
}

/// Finds paths touched by more than one changeset.
///
/// A path is conflicting iff it appears in at least two of the supplied
/// changesets. The result maps each conflicting path to every change
/// recorded for it, preserving the input order of the changesets.
#[must_use]
pub fn find_conflicts(changes: &[ChangeSet]) -> IndexMap<Path, Vec<Change>> {
    if changes.len() <= 1 {
        return IndexMap::new();
    }

    let mut counts: IndexMap<&Path, usize> = IndexMap::new();
    for set in changes {
        for path in set.keys() {
            *counts.entry(path).or_insert(0) += 1;
        }
    }

    let mut conflicts = IndexMap::new();
    for (path, count) in counts {
        if count > 1 {
            let entries: Vec<Change> = changes.iter().filter_map(|set| set.get(path)).cloned().collect();
            conflicts.insert(path.clone(), entries);
        }
    }
    conflicts
}

/// Applies a changeset to a target mapping, in the changeset's own order.
///
/// Added and updated changes descend the target, creating intermediate
/// empty mappings for missing components, and set the leaf. Removed changes
/// descend and delete the leaf key; a missing leaf is an error.
///
/// # Errors
///
/// Returns [`ApplyError::MissingKeyOnRemove`] when a removal addresses an
/// absent leaf, and [`ApplyError::NotAMapping`] when a path component
/// exists but is not a mapping.
pub fn apply(target: &mut Value, changes: &ChangeSet) -> Result<(), ApplyError> {
    for (path, change) in changes {
        apply_one(target, path, change)?;
    }
    Ok(())
}

fn apply_one(target: &mut Value, path: &Path, change: &Change) -> Result<(), ApplyError> {
    let Some((leaf, parents)) = path.split_last() else {
        // Root-path change: replace the whole value.
        return match change.kind {
            ChangeKind::Removed => Err(ApplyError::RemoveAtRoot),
            ChangeKind::Added | ChangeKind::Updated => {
                *target = change.new.clone().unwrap_or(Value::Null);
                Ok(())
            }
        };
    };

    let mut cursor = target;
    for (depth, key) in parents.iter().enumerate() {
        let map = cursor.as_object_mut().ok_or_else(|| ApplyError::NotAMapping {
            path: path[..depth].to_vec(),
        })?;
        cursor = map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = cursor.as_object_mut().ok_or_else(|| ApplyError::NotAMapping {
        path: parents.to_vec(),
    })?;

    match change.kind {
        ChangeKind::Removed => {
            map.shift_remove(leaf)
                .ok_or_else(|| ApplyError::MissingKeyOnRemove { path: path.clone() })?;
        }
        ChangeKind::Added | ChangeKind::Updated => {
            map.insert(leaf.clone(), change.new.clone().unwrap_or(Value::Null));
        }
    }
    Ok(())
}
