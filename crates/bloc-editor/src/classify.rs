//! Drag intent classification.
//!
//! Runs once per pointer-down and decides which element is being dragged
//! and what kind of drag it is.
//!
//! | Input | Drag type |
//! |-------|-----------|
//! | Ctrl / ⌘ held | `Duplicate` |
//! | Shift held | `Reorder` |
//! | Element marked `data-internal-draggable` with draggable descendants | `Internal` |
//! | Anything else on a bloc | `External` |

use crate::input::{Modifiers, PointerButton};
use bloc_core::{BlocId, BlocTree};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a drag gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragType {
    /// Move the element somewhere else in the page.
    External,
    /// Rearrange a container's own children by gesture direction.
    Internal,
    /// Drop a deep copy, leave the original in place.
    Duplicate,
    /// Move, reported to the host as a reorder.
    Reorder,
}

impl DragType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Internal => "internal",
            Self::Duplicate => "duplicate",
            Self::Reorder => "reorder",
        }
    }
}

impl fmt::Display for DragType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pointer-down did not start a drag session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotPrimaryButton,
    EditableControl,
    NotDraggable,
}

/// The element a drag will carry and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragIntent {
    pub source: BlocId,
    pub drag_type: DragType,
}

/// Classify a pointer-down on `target`.
///
/// The source is the closest element (starting at `target`) whose id carries
/// `prefix`. Presses that land on an editable control inside that element
/// are left to the control.
pub fn classify(
    tree: &BlocTree,
    target: BlocId,
    button: PointerButton,
    modifiers: Modifiers,
    prefix: &str,
) -> Result<DragIntent, IgnoreReason> {
    if button != PointerButton::Primary {
        return Err(IgnoreReason::NotPrimaryButton);
    }

    let source = tree
        .closest_with_prefix(target, prefix)
        .ok_or(IgnoreReason::NotDraggable)?;

    // Walk target → source looking for an editable control
    let mut current = Some(target);
    while let Some(id) = current {
        if tree.get(id).is_some_and(|b| b.editable) {
            return Err(IgnoreReason::EditableControl);
        }
        if id == source {
            break;
        }
        current = tree.parent(id);
    }

    let drag_type = if modifiers.command() {
        DragType::Duplicate
    } else if modifiers.shift {
        DragType::Reorder
    } else if is_internal_container(tree, source, prefix) {
        DragType::Internal
    } else {
        DragType::External
    };

    Ok(DragIntent { source, drag_type })
}

fn is_internal_container(tree: &BlocTree, id: BlocId, prefix: &str) -> bool {
    tree.get(id).is_some_and(|b| b.internal_draggable)
        && tree.descendants(id).iter().any(|d| d.has_prefix(prefix))
}
