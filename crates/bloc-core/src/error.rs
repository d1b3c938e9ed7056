//! Error types for tree mutations.

use thiserror::Error;

use crate::id::BlocId;

/// Errors that can occur while mutating a `BlocTree`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Element not present (detached or never mirrored).
    #[error("element not found: {0}")]
    NotFound(BlocId),

    /// An element with this id already exists.
    #[error("element already exists: {0}")]
    DuplicateId(BlocId),

    /// The root element cannot be moved or removed.
    #[error("the root element cannot be moved or removed")]
    RootImmutable,

    /// Moving `node` under `target` would place it inside itself.
    #[error("cannot move {node} into itself or its descendant {target}")]
    Cycle { node: BlocId, target: BlocId },

    /// Insertion index past the end of the child list.
    #[error("child index {index} out of range for {len} children")]
    IndexOutOfRange { index: usize, len: usize },

    /// A requested child order is not a permutation of the current children.
    #[error("new child order for {0} is not a permutation of its children")]
    NotAPermutation(BlocId),
}
