//! Visual feedback artifacts.
//!
//! The engine does not draw. It keeps a set of artifacts (ghost, drop
//! indicator, toasts) that the host renders from [`FeedbackRenderer::snapshot`].
//! Session artifacts must all be gone once a session ends, whichever way it
//! ends; toasts outlive sessions and expire on their own.

use bloc_core::{BlocId, Rect};
use indexmap::IndexMap;
use serde::Serialize;

use crate::position::PositionKind;

/// Thickness of the before/after insertion bar.
pub const INDICATOR_THICKNESS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArtifactId(u64);

impl From<u64> for ArtifactId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Artifact {
    Ghost {
        source: BlocId,
        #[serde(serialize_with = "ser_rect")]
        bounds: Rect,
    },
    #[serde(rename_all = "camelCase")]
    DropIndicator {
        target: BlocId,
        position: PositionKind,
        #[serde(serialize_with = "ser_rect")]
        rect: Rect,
    },
    #[serde(rename_all = "camelCase")]
    Toast {
        level: ToastLevel,
        message: String,
        expires_at: f64,
    },
}

impl Artifact {
    fn is_session(&self) -> bool {
        !matches!(self, Artifact::Toast { .. })
    }
}

fn ser_rect<S: serde::Serializer>(rect: &Rect, s: S) -> Result<S::Ok, S::Error> {
    bloc_core::BoundsSpec::from(*rect).serialize(s)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    pub id: ArtifactId,
    pub created_at: f64,
    pub updated_at: f64,
    #[serde(flatten)]
    pub artifact: Artifact,
}

/// Serializable view of everything the host should currently show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSnapshot {
    pub artifacts: Vec<ArtifactEntry>,
    pub lifted: Option<BlocId>,
    pub scroll_locked: bool,
}

/// Rect of the insertion marker for a resolved position.
pub fn indicator_rect(target: Rect, kind: PositionKind) -> Rect {
    match kind {
        PositionKind::Before => Rect::new(target.x0, target.y0, target.x1, target.y0 + INDICATOR_THICKNESS),
        PositionKind::After => Rect::new(target.x0, target.y1 - INDICATOR_THICKNESS, target.x1, target.y1),
        PositionKind::Inside => target,
    }
}

#[derive(Debug, Default)]
pub struct FeedbackRenderer {
    artifacts: IndexMap<ArtifactId, ArtifactEntry>,
    next_id: u64,
    ghost: Option<ArtifactId>,
    indicator: Option<ArtifactId>,
    lifted: Option<BlocId>,
    scroll_locked: bool,
}

impl FeedbackRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, artifact: Artifact, now_ms: f64) -> ArtifactId {
        let id = ArtifactId(self.next_id);
        self.next_id += 1;
        self.artifacts.insert(
            id,
            ArtifactEntry {
                id,
                created_at: now_ms,
                updated_at: now_ms,
                artifact,
            },
        );
        id
    }

    /// Mark the source as lifted and show its ghost at its current bounds.
    pub fn lift(&mut self, source: BlocId, bounds: Rect, now_ms: f64) {
        self.lifted = Some(source);
        self.scroll_locked = true;
        if let Some(old) = self.ghost.take() {
            self.dismiss(old);
        }
        self.ghost = Some(self.add(Artifact::Ghost { source, bounds }, now_ms));
    }

    /// Move the ghost to `bounds`. No-op without a ghost.
    pub fn move_ghost(&mut self, bounds: Rect, now_ms: f64) {
        let Some(entry) = self.ghost.and_then(|id| self.artifacts.get_mut(&id)) else {
            return;
        };
        if let Artifact::Ghost { bounds: b, .. } = &mut entry.artifact {
            *b = bounds;
            entry.updated_at = now_ms;
        }
    }

    pub fn show_indicator(&mut self, target: BlocId, target_bounds: Rect, kind: PositionKind, now_ms: f64) {
        let artifact = Artifact::DropIndicator {
            target,
            position: kind,
            rect: indicator_rect(target_bounds, kind),
        };
        match self.indicator.and_then(|id| self.artifacts.get_mut(&id)) {
            Some(entry) => {
                entry.artifact = artifact;
                entry.updated_at = now_ms;
            }
            None => self.indicator = Some(self.add(artifact, now_ms)),
        }
    }

    pub fn hide_indicator(&mut self) {
        if let Some(id) = self.indicator.take() {
            self.dismiss(id);
        }
    }

    pub fn toast(&mut self, level: ToastLevel, message: impl Into<String>, duration_ms: f64, now_ms: f64) -> ArtifactId {
        self.add(
            Artifact::Toast {
                level,
                message: message.into(),
                expires_at: now_ms + duration_ms,
            },
            now_ms,
        )
    }

    /// Remove one artifact. Unknown or already-dismissed ids are ignored.
    pub fn dismiss(&mut self, id: ArtifactId) -> bool {
        if self.ghost == Some(id) {
            self.ghost = None;
        }
        if self.indicator == Some(id) {
            self.indicator = None;
        }
        self.artifacts.shift_remove(&id).is_some()
    }

    /// Close a toast before it expires. Ghost and indicator ids are refused.
    pub fn dismiss_toast(&mut self, id: ArtifactId) -> bool {
        let is_toast = self
            .artifacts
            .get(&id)
            .is_some_and(|e| matches!(e.artifact, Artifact::Toast { .. }));
        is_toast && self.dismiss(id)
    }

    /// Drop toasts whose time is up. Returns how many were removed.
    pub fn expire(&mut self, now_ms: f64) -> usize {
        let before = self.artifacts.len();
        self.artifacts.retain(|_, e| match e.artifact {
            Artifact::Toast { expires_at, .. } => expires_at > now_ms,
            _ => true,
        });
        before - self.artifacts.len()
    }

    /// Remove ghost, indicator, lifted marker and scroll lock.
    pub fn clear_session(&mut self) {
        self.artifacts.retain(|_, e| !e.artifact.is_session());
        self.ghost = None;
        self.indicator = None;
        self.lifted = None;
        self.scroll_locked = false;
    }

    pub fn has_session_artifacts(&self) -> bool {
        self.lifted.is_some() || self.scroll_locked || self.artifacts.values().any(|e| e.artifact.is_session())
    }

    pub fn ghost_bounds(&self) -> Option<Rect> {
        match self.ghost.and_then(|id| self.artifacts.get(&id))?.artifact {
            Artifact::Ghost { bounds, .. } => Some(bounds),
            _ => None,
        }
    }

    pub fn indicator(&self) -> Option<(BlocId, PositionKind)> {
        match self.indicator.and_then(|id| self.artifacts.get(&id))?.artifact {
            Artifact::DropIndicator { target, position, .. } => Some((target, position)),
            _ => None,
        }
    }

    pub fn toasts(&self) -> impl Iterator<Item = (ToastLevel, &str)> {
        self.artifacts.values().filter_map(|e| match &e.artifact {
            Artifact::Toast { level, message, .. } => Some((*level, message.as_str())),
            _ => None,
        })
    }

    pub fn lifted(&self) -> Option<BlocId> {
        self.lifted
    }

    pub fn scroll_locked(&self) -> bool {
        self.scroll_locked
    }

    pub fn snapshot(&self) -> FeedbackSnapshot {
        FeedbackSnapshot {
            artifacts: self.artifacts.values().cloned().collect(),
            lifted: self.lifted,
            scroll_locked: self.scroll_locked,
        }
    }
}
