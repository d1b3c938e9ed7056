//! Error types for drops, editing actions and the host bridge.

use bloc_core::{BlocId, TreeError};
use thiserror::Error;

use crate::classify::DragType;

/// Why a drop did not produce a change.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DropError {
    /// Released where no registered zone accepts the element.
    #[error("no drop target under the pointer")]
    NoTarget,

    /// Target is the dragged element itself or lies inside it.
    #[error("cannot drop {element} onto itself or its descendant {target}")]
    SelfOrDescendant { element: BlocId, target: BlocId },

    #[error("{zone} does not accept {tag} elements")]
    NotAccepted { zone: BlocId, tag: String },

    #[error("{zone} is full")]
    ZoneFull { zone: BlocId },

    /// The tree refused the mutation. The tree is left as it was.
    #[error("{drag_type} drop of {element} failed: {source}")]
    Mutation {
        drag_type: DragType,
        element: BlocId,
        source: TreeError,
    },
}

impl DropError {
    /// Rejections are expected user outcomes; mutation failures are bugs
    /// or host/tree desyncs.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, DropError::Mutation { .. })
    }
}

/// Errors from programmatic editing actions (delete, duplicate).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("a drag session is in progress")]
    SessionActive,

    #[error("{0} is not a draggable bloc")]
    NotDraggable(BlocId),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("host rejected {event}: {message}")]
    Rejected { event: &'static str, message: String },

    #[error("failed to encode bridge payload: {0}")]
    Encode(#[from] serde_json::Error),
}
