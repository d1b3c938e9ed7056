//! The drag engine: one per page.
//!
//! `DragEngine` owns the mirrored tree and every collaborator (spatial
//! index, position resolver, feedback, operation queue, recovery monitor)
//! and runs the session state machine:
//!
//! ```text
//! Idle ──press──▶ Ready ──move ≥ threshold──▶ Dragging ──release──▶ Dropping ──▶ Idle
//!                   │                            │
//!                   └──── cancel / timeout ──────┴──▶ Recovering ──▶ Idle
//! ```
//!
//! The host drives it with pointer/key/window events plus two clocks:
//! `frame(now)` once per animation frame and `tick(now)` on a timer.
//! All timestamps are host-supplied milliseconds.

use bloc_core::{
    BlocId, BlocTree, EventBus, Point, Rect, SubscriptionId, TreeError, ZoneId, hit_test,
    hit_test_excluding, rect_contains_point,
};
use serde::Serialize;

use crate::classify::{DragType, classify};
use crate::config::EngineConfig;
use crate::error::{ActionError, DropError};
use crate::feedback::{ArtifactId, FeedbackRenderer, FeedbackSnapshot, ToastLevel};
use crate::input::{InputEvent, Modifiers, PointerButton};
use crate::internal::{GestureSamples, apply_internal_reorder};
use crate::operation::{FlushOutcome, HostBridge, LayoutKind, Operation, OperationKind, OperationQueue};
use crate::position::{PositionKind, PositionResolver, PositionResult, ResolverParams};
use crate::recovery::{Correction, RecoveryMonitor, RecoveryReason, SessionProbe};
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::spatial::{SpatialIndex, ZoneSpec};
use crate::stats::DragStats;

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DragState {
    #[default]
    Idle,
    Ready,
    Dragging,
    Dropping,
    Recovering,
}

impl DragState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Dragging => "dragging",
            Self::Dropping => "dropping",
            Self::Recovering => "recovering",
        }
    }
}

/// State owned by the one in-flight drag.
#[derive(Debug, Clone)]
pub struct DragSession {
    pub state: DragState,
    pub drag_type: DragType,
    pub source: BlocId,
    pub source_parent: BlocId,
    pub source_index: usize,
    pub pointer_origin: Point,
    pub current_pointer: Point,
    pub start_ms: f64,
    /// Set when the session entered Dragging.
    pub dragging_since: Option<f64>,
    /// Last resolved drop target and its outcome.
    pub target: Option<Result<PositionResult, DropError>>,
    pub zone: Option<ZoneId>,
    pointer_held: bool,
    pointer_captured: bool,
    source_bounds: Rect,
    samples: GestureSamples,
}

/// Notifications published on the engine's event bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    #[serde(rename_all = "camelCase")]
    DragStarted { source: BlocId, drag_type: DragType },
    /// The resolved drop target changed; `None` when nothing valid is under the pointer.
    TargetChanged { target: Option<PositionResult> },
    Dropped { operation: Operation },
    Rejected { source: BlocId, reason: String },
    Failed { source: BlocId, message: String },
    Cancelled { source: BlocId, reason: RecoveryReason },
    /// The watchdog corrected a stuck or dirty state.
    Recovered { reason: RecoveryReason, repeated: bool },
    /// An operation produced outside a drag (delete, duplicate, layout).
    Edited { operation: Operation },
}

/// Where a drop would land, as seen from one pointer position.
struct Located {
    zone: ZoneId,
    visual_feedback: bool,
    outcome: Result<PositionResult, DropError>,
}

pub struct DragEngine {
    /// The mirrored page. Mutated only through the engine while a session
    /// is active.
    pub tree: BlocTree,
    config: EngineConfig,
    session: Option<DragSession>,
    spatial: SpatialIndex,
    resolver: PositionResolver,
    feedback: FeedbackRenderer,
    queue: OperationQueue,
    monitor: RecoveryMonitor,
    bridge: Option<Box<dyn HostBridge>>,
    events: EventBus<EngineEvent>,
    stats: DragStats,
    /// Last pressed bloc, the subject of keyboard actions.
    focused: Option<BlocId>,
    flush_requested: bool,
    last_flush_ms: f64,
}

impl DragEngine {
    pub fn new(tree: BlocTree, config: EngineConfig) -> Self {
        let params = ResolverParams {
            edge_proximity: config.edge_proximity_px,
            inside_proximity: config.inside_proximity_px,
        };
        Self {
            tree,
            spatial: SpatialIndex::new(config.zone_cache_ttl_ms),
            resolver: PositionResolver::new(params, config.position_cache_ttl_ms, config.position_cache_max),
            feedback: FeedbackRenderer::new(),
            queue: OperationQueue::new(),
            monitor: RecoveryMonitor::new(config.session_timeout_ms, config.monitor_interval_ms),
            bridge: None,
            events: EventBus::new(),
            stats: DragStats::default(),
            focused: None,
            flush_requested: false,
            last_flush_ms: 0.0,
            session: None,
            config,
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn drag_state(&self) -> DragState {
        self.session.as_ref().map_or(DragState::Idle, |s| s.state)
    }

    pub fn drag_type(&self) -> Option<DragType> {
        self.session.as_ref().map(|s| s.drag_type)
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn feedback(&self) -> &FeedbackRenderer {
        &self.feedback
    }

    pub fn feedback_snapshot(&self) -> FeedbackSnapshot {
        self.feedback.snapshot()
    }

    /// Close a toast before its timer runs out.
    pub fn dismiss_toast(&mut self, id: ArtifactId) -> bool {
        self.feedback.dismiss_toast(id)
    }

    pub fn pending_operations(&self) -> Vec<Operation> {
        self.queue.pending()
    }

    pub fn clear_operations(&mut self) -> usize {
        self.queue.clear()
    }

    pub fn stats(&self) -> DragStats {
        self.stats
    }

    pub fn focused(&self) -> Option<BlocId> {
        self.focused
    }

    // ─── Wiring ──────────────────────────────────────────────────────────

    pub fn set_bridge(&mut self, bridge: Option<Box<dyn HostBridge>>) {
        self.bridge = bridge;
    }

    pub fn subscribe(&mut self, listener: impl Fn(&EngineEvent) + 'static) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Register a drop zone. Returns false if its element is not in the tree.
    pub fn register_zone(&mut self, id: ZoneId, spec: ZoneSpec) -> bool {
        if !self.tree.contains(spec.element) {
            log::warn!("zone {id}: element {} not found", spec.element);
            return false;
        }
        self.spatial.register(id, spec);
        true
    }

    pub fn unregister_zone(&mut self, id: ZoneId) -> bool {
        self.spatial.unregister(id)
    }

    /// Refresh one element's bounds from the live layout. Evicts the
    /// element's zone rect and every memoized position.
    pub fn update_bounds(&mut self, id: BlocId, bounds: Rect) -> bool {
        if !self.tree.set_bounds(id, bounds) {
            return false;
        }
        self.spatial.invalidate_element(id);
        self.resolver.invalidate();
        true
    }

    /// Swap in a freshly mirrored tree. Any session is ended first.
    pub fn replace_tree(&mut self, tree: BlocTree, now_ms: f64) {
        if self.session.is_some() {
            self.cancel(RecoveryReason::ForceEnd, now_ms);
        }
        self.tree = tree;
        self.after_structure_change();
        if self.focused.is_some_and(|f| !self.tree.contains(f)) {
            self.focused = None;
        }
    }

    fn after_structure_change(&mut self) {
        self.spatial.invalidate_all();
        self.resolver.invalidate();
        for zone in self.spatial.unregister_missing(&self.tree) {
            log::debug!("zone {zone} dropped with its element");
        }
    }

    // ─── Input ───────────────────────────────────────────────────────────

    /// Dispatch a normalized input event. Returns true if the engine
    /// consumed it.
    pub fn handle(&mut self, event: InputEvent, now_ms: f64) -> bool {
        match event {
            InputEvent::PointerDown {
                x,
                y,
                button,
                modifiers,
                target,
            } => self.pointer_down(x, y, button, modifiers, target, now_ms),
            InputEvent::PointerMove { x, y, buttons_held } => self.pointer_move(x, y, buttons_held, now_ms),
            InputEvent::PointerUp { x, y } => self.pointer_up(x, y, now_ms),
            InputEvent::PointerCancel => self.cancel(RecoveryReason::PointerCancel, now_ms),
            InputEvent::LostPointerCapture => self.lost_pointer_capture(now_ms),
            InputEvent::Blur => self.cancel(RecoveryReason::WindowBlur, now_ms),
            InputEvent::Key { key, modifiers } => self.key(&key, modifiers, now_ms),
        }
    }

    /// Press. Starts a Ready session when it lands on a draggable bloc.
    /// Ignored while any session exists.
    pub fn pointer_down(
        &mut self,
        x: f64,
        y: f64,
        button: PointerButton,
        modifiers: Modifiers,
        target: Option<BlocId>,
        now_ms: f64,
    ) -> bool {
        if self.session.is_some() {
            log::debug!("pointer down ignored: session already active");
            return false;
        }
        // Keyboard actions follow the last press; a press that arms nothing
        // (background, editable control, root) leaves nothing focused.
        self.focused = None;
        let Some(target) = target.or_else(|| hit_test(&self.tree, x, y)) else {
            return false;
        };
        let intent = match classify(&self.tree, target, button, modifiers, &self.config.id_prefix) {
            Ok(intent) => intent,
            Err(reason) => {
                log::debug!("pointer down on {target} ignored: {reason:?}");
                return false;
            }
        };
        let (Some(source_parent), Some(source_index)) = (
            self.tree.parent(intent.source),
            self.tree.index_in_parent(intent.source),
        ) else {
            return false;
        };

        let origin = Point::new(x, y);
        self.focused = Some(intent.source);
        self.session = Some(DragSession {
            state: DragState::Ready,
            drag_type: intent.drag_type,
            source: intent.source,
            source_parent,
            source_index,
            pointer_origin: origin,
            current_pointer: origin,
            start_ms: now_ms,
            dragging_since: None,
            target: None,
            zone: None,
            pointer_held: true,
            pointer_captured: true,
            source_bounds: self.tree.bounds(intent.source).unwrap_or(Rect::ZERO),
            samples: GestureSamples::new(),
        });
        log::debug!("ready: {} ({})", intent.source, intent.drag_type);
        true
    }

    pub fn pointer_move(&mut self, x: f64, y: f64, buttons_held: bool, now_ms: f64) -> bool {
        let threshold = self.config.drag_threshold_px;
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        session.current_pointer = Point::new(x, y);
        session.pointer_held = buttons_held;
        let delta = session.current_pointer - session.pointer_origin;
        session.samples.record(delta.x, delta.y);

        if session.state == DragState::Ready && delta.hypot() >= threshold {
            session.state = DragState::Dragging;
            session.dragging_since = Some(now_ms);
            let (source, drag_type, bounds) = (session.source, session.drag_type, session.source_bounds);
            self.feedback.lift(source, bounds + delta, now_ms);
            self.stats.drags_started += 1;
            log::debug!("dragging: {source} ({drag_type})");
            self.events.emit(&EngineEvent::DragStarted { source, drag_type });
        }
        true
    }

    /// Per-frame update. Returns true while another frame is wanted.
    pub fn frame(&mut self, now_ms: f64) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if session.state != DragState::Dragging {
            return false;
        }
        let (source, drag_type, pointer) = (session.source, session.drag_type, session.current_pointer);
        let ghost = session.source_bounds + (pointer - session.pointer_origin);
        self.stats.frames += 1;
        self.feedback.move_ghost(ghost, now_ms);

        if drag_type == DragType::Internal {
            return true;
        }

        let located = self.locate(source, drag_type, pointer.x, pointer.y, now_ms);
        let (zone, visual_feedback, outcome) = match located {
            Some(l) => (Some(l.zone), l.visual_feedback, Some(l.outcome)),
            None => (None, false, None),
        };
        let valid = outcome.as_ref().and_then(|o| o.as_ref().ok()).copied();

        match valid {
            Some(position) if visual_feedback => {
                let bounds = self.tree.bounds(position.target).unwrap_or(Rect::ZERO);
                self.feedback.show_indicator(position.target, bounds, position.kind, now_ms);
            }
            _ => self.feedback.hide_indicator(),
        }

        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let previous = session.target.as_ref().and_then(|o| o.as_ref().ok()).copied();
        session.target = outcome;
        session.zone = zone;
        if previous != valid {
            self.events.emit(&EngineEvent::TargetChanged { target: valid });
        }
        true
    }

    /// Release. A Ready session was just a click; a Dragging one drops.
    pub fn pointer_up(&mut self, x: f64, y: f64, now_ms: f64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        session.current_pointer = Point::new(x, y);
        match session.state {
            DragState::Ready => {
                self.teardown(now_ms);
                true
            }
            DragState::Dragging => {
                session.state = DragState::Dropping;
                let snapshot = session.clone();
                self.stats.drops_attempted += 1;
                let result = self.execute_drop(&snapshot, now_ms);
                self.finish_drop(&snapshot, result, now_ms);
                true
            }
            _ => false,
        }
    }

    pub fn lost_pointer_capture(&mut self, now_ms: f64) -> bool {
        if let Some(session) = self.session.as_mut() {
            session.pointer_captured = false;
        }
        self.cancel(RecoveryReason::LostCapture, now_ms)
    }

    /// Keyboard input: Escape cancels, edit shortcuts act on the focused bloc.
    pub fn key(&mut self, key: &str, modifiers: Modifiers, now_ms: f64) -> bool {
        match ShortcutMap::resolve(key, modifiers) {
            Some(ShortcutAction::CancelDrag) => self.cancel(RecoveryReason::Escape, now_ms),
            Some(ShortcutAction::Delete) => self.act_on_focused(now_ms, Self::delete_bloc),
            Some(ShortcutAction::Duplicate) => self.act_on_focused(now_ms, Self::duplicate_bloc),
            None => false,
        }
    }

    fn act_on_focused(
        &mut self,
        now_ms: f64,
        action: fn(&mut Self, BlocId, f64) -> Result<Operation, ActionError>,
    ) -> bool {
        let Some(id) = self.focused else {
            return false;
        };
        match action(self, id, now_ms) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("shortcut on {id} failed: {e}");
                false
            }
        }
    }

    // ─── Drop execution ──────────────────────────────────────────────────

    fn locate(&mut self, source: BlocId, drag_type: DragType, x: f64, y: f64, now_ms: f64) -> Option<Located> {
        let tag = self.tree.get(source)?.tag.clone();
        let zone = self.spatial.find_zone_at(&self.tree, x, y, &tag, now_ms)?.clone();

        let over_source = self
            .tree
            .bounds(source)
            .is_some_and(|r| rect_contains_point(r, x, y));
        let target = if over_source {
            Some(source)
        } else {
            zone_child_at(&self.tree, zone.element, source, x, y)
        };

        let outcome = match target {
            Some(target) => {
                let position = self.resolver.resolve(&self.tree, source, target, x, y, now_ms);
                if position.is_valid {
                    self.check_receiver(&tag, source, drag_type, position)
                } else {
                    Err(DropError::SelfOrDescendant { element: source, target })
                }
            }
            // Empty zone: append inside it
            None if zone.element == source || self.tree.is_ancestor_of(source, zone.element) => {
                Err(DropError::SelfOrDescendant {
                    element: source,
                    target: zone.element,
                })
            }
            None => self.check_receiver(
                &tag,
                source,
                drag_type,
                PositionResult {
                    kind: PositionKind::Inside,
                    target: zone.element,
                    target_index: self.tree.child_count(zone.element),
                    is_valid: true,
                },
            ),
        };

        Some(Located {
            zone: zone.id,
            visual_feedback: zone.visual_feedback,
            outcome,
        })
    }

    /// Zone rules of the element that would receive the drop.
    fn check_receiver(
        &self,
        tag: &str,
        source: BlocId,
        drag_type: DragType,
        position: PositionResult,
    ) -> Result<PositionResult, DropError> {
        let receiver = match position.kind {
            PositionKind::Inside => Some(position.target),
            PositionKind::Before | PositionKind::After => self.tree.parent(position.target),
        };
        let Some(zone) = receiver.and_then(|r| self.spatial.zone_for_element(r)) else {
            return Ok(position);
        };
        if !zone.accepts(tag) {
            return Err(DropError::NotAccepted {
                zone: zone.element,
                tag: tag.to_string(),
            });
        }
        if !zone.has_room(&self.tree, source, drag_type != DragType::Duplicate) {
            return Err(DropError::ZoneFull { zone: zone.element });
        }
        Ok(position)
    }

    fn execute_drop(&mut self, session: &DragSession, now_ms: f64) -> Result<Option<Operation>, DropError> {
        if session.drag_type == DragType::Internal {
            return self.execute_internal(session, now_ms);
        }
        let (x, y) = (session.current_pointer.x, session.current_pointer.y);
        let position = self
            .locate(session.source, session.drag_type, x, y, now_ms)
            .ok_or(DropError::NoTarget)?
            .outcome?;

        let mutation = |source| DropError::Mutation {
            drag_type: session.drag_type,
            element: session.source,
            source,
        };
        let kind = match session.drag_type {
            DragType::Duplicate => {
                let parent = match position.kind {
                    PositionKind::Inside => Some(position.target),
                    _ => self.tree.parent(position.target),
                }
                .ok_or_else(|| mutation(TreeError::RootImmutable))?;
                let prefix = self.config.id_prefix.clone();
                let clone = self
                    .tree
                    .clone_subtree(session.source, parent, position.target_index, |base| {
                        BlocId::fresh_from(base, &prefix)
                    })
                    .map_err(mutation)?;
                OperationKind::Duplicate {
                    source: session.source,
                    element: clone,
                    parent,
                    index: position.target_index,
                }
            }
            DragType::External | DragType::Reorder => {
                let moved = match position.kind {
                    PositionKind::Before => self.tree.move_before(session.source, position.target),
                    PositionKind::After => self.tree.move_after(session.source, position.target),
                    PositionKind::Inside => self.tree.move_into(session.source, position.target),
                };
                moved.map_err(mutation)?;
                let parent = self.tree.parent(session.source).unwrap_or(session.source_parent);
                let index = self.tree.index_in_parent(session.source).unwrap_or(session.source_index);
                if (parent, index) == (session.source_parent, session.source_index) {
                    return Ok(None);
                }
                if session.drag_type == DragType::Reorder {
                    OperationKind::Reorder {
                        element: session.source,
                        from_parent: session.source_parent,
                        from_index: session.source_index,
                        parent,
                        index,
                    }
                } else {
                    OperationKind::Move {
                        element: session.source,
                        from_parent: session.source_parent,
                        from_index: session.source_index,
                        parent,
                        index,
                    }
                }
            }
            DragType::Internal => return self.execute_internal(session, now_ms),
        };
        self.after_structure_change();
        Ok(Some(self.queue.enqueue(kind, now_ms)))
    }

    fn execute_internal(&mut self, session: &DragSession, now_ms: f64) -> Result<Option<Operation>, DropError> {
        let direction = session.samples.direction(self.config.internal_axis_ratio);
        let order = apply_internal_reorder(&mut self.tree, session.source, direction, &self.config.id_prefix)
            .map_err(|source| DropError::Mutation {
                drag_type: DragType::Internal,
                element: session.source,
                source,
            })?;
        let Some(order) = order else {
            return Ok(None);
        };
        self.after_structure_change();
        let kind = OperationKind::InternalReorder {
            container: session.source,
            direction,
            order,
        };
        Ok(Some(self.queue.enqueue(kind, now_ms)))
    }

    fn finish_drop(&mut self, session: &DragSession, result: Result<Option<Operation>, DropError>, now_ms: f64) {
        self.teardown(now_ms);
        let toast_ms = self.config.toast_duration_ms;
        match result {
            Ok(Some(operation)) => {
                self.stats.drops_succeeded += 1;
                log::info!(
                    "{} drop of {} → #{} {}",
                    session.drag_type,
                    session.source,
                    operation.seq,
                    operation.kind.name()
                );
                self.flush_requested = true;
                self.feedback
                    .toast(ToastLevel::Success, success_message(session.drag_type), toast_ms, now_ms);
                self.events.emit(&EngineEvent::Dropped { operation });
            }
            Ok(None) => {
                self.stats.drops_succeeded += 1;
                log::debug!("drop of {} left the tree unchanged", session.source);
            }
            Err(e) if e.is_rejection() => {
                self.stats.drops_rejected += 1;
                log::warn!("drop of {} rejected: {e}", session.source);
                self.feedback.toast(ToastLevel::Warning, e.to_string(), toast_ms, now_ms);
                self.events.emit(&EngineEvent::Rejected {
                    source: session.source,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                self.stats.drops_failed += 1;
                log::error!("{e}");
                self.feedback
                    .toast(ToastLevel::Error, "The drop could not be completed", toast_ms, now_ms);
                self.events.emit(&EngineEvent::Failed {
                    source: session.source,
                    message: e.to_string(),
                });
            }
        }
    }

    /// End the session and remove every effect it left on the page.
    fn teardown(&mut self, now_ms: f64) {
        if let Some(since) = self.session.take().and_then(|s| s.dragging_since) {
            self.stats.drag_time_ms += (now_ms - since).max(0.0);
        }
        self.feedback.clear_session();
    }

    // ─── Cancellation & recovery ─────────────────────────────────────────

    /// Abort the current session through the recovery path. Ready sessions
    /// (no drag yet) are dropped quietly. Returns false when Idle.
    pub fn cancel(&mut self, reason: RecoveryReason, now_ms: f64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.state == DragState::Ready {
            log::debug!("press on {} abandoned: {reason}", session.source);
            self.teardown(now_ms);
            return true;
        }
        session.state = DragState::Recovering;
        let source = session.source;
        log::warn!("drag of {source} cancelled: {reason}");
        self.stats.recoveries += 1;
        self.teardown(now_ms);
        self.feedback.toast(
            ToastLevel::Info,
            format!("Drag cancelled ({reason})"),
            self.config.toast_duration_ms,
            now_ms,
        );
        self.events.emit(&EngineEvent::Cancelled { source, reason });
        true
    }

    /// Force the engine back to Idle. Idempotent: when already Idle this
    /// only clears stray visual effects and returns false.
    pub fn force_end_drag(&mut self, now_ms: f64) -> bool {
        if self.session.is_none() {
            self.feedback.clear_session();
            return false;
        }
        self.cancel(RecoveryReason::ForceEnd, now_ms)
    }

    /// Timer-driven housekeeping: toast expiry, session timeout, watchdog,
    /// cache pruning and queue flushing.
    pub fn tick(&mut self, now_ms: f64) {
        self.feedback.expire(now_ms);

        if self
            .session
            .as_ref()
            .is_some_and(|s| self.monitor.timed_out(s.start_ms, now_ms))
        {
            self.cancel(RecoveryReason::Timeout, now_ms);
        }

        let probe = SessionProbe {
            active: self.session.is_some(),
            pointer_held: self.session.as_ref().is_some_and(|s| s.pointer_held),
            pointer_captured: self.session.as_ref().is_some_and(|s| s.pointer_captured),
            leftover_effects: self.feedback.has_session_artifacts(),
        };
        if let Some(report) = self.monitor.watchdog(probe, now_ms) {
            match report.correction {
                Correction::ForceIdle => {
                    log::warn!("watchdog: session out of sync with the pointer, resetting");
                    self.stats.recoveries += 1;
                    self.teardown(now_ms);
                }
                Correction::ClearLeftovers => {
                    log::warn!("watchdog: clearing drag effects left behind");
                    self.feedback.clear_session();
                }
            }
            if report.repeated {
                self.feedback.toast(
                    ToastLevel::Warning,
                    "Drag state was reset",
                    self.config.toast_duration_ms,
                    now_ms,
                );
            }
            self.events.emit(&EngineEvent::Recovered {
                reason: RecoveryReason::Desynchronized,
                repeated: report.repeated,
            });
        }

        self.resolver.prune(now_ms);

        let interval_due = now_ms - self.last_flush_ms >= self.config.flush_interval_ms;
        if self.flush_requested || interval_due {
            self.flush(now_ms);
        }
    }

    /// Hand pending operations to the bridge unless a session is active.
    pub fn flush(&mut self, now_ms: f64) -> FlushOutcome {
        let outcome = self.queue.flush(self.session.is_some(), self.bridge.as_deref());
        if let FlushOutcome::Flushed(_) = outcome {
            self.flush_requested = false;
            self.last_flush_ms = now_ms;
        }
        outcome
    }

    // ─── Editing actions ─────────────────────────────────────────────────

    fn check_editable(&self, id: BlocId) -> Result<(), ActionError> {
        if self.session.is_some() {
            return Err(ActionError::SessionActive);
        }
        if !self.tree.contains(id) {
            return Err(TreeError::NotFound(id).into());
        }
        if !id.has_prefix(&self.config.id_prefix) {
            return Err(ActionError::NotDraggable(id));
        }
        Ok(())
    }

    /// Remove a bloc and its subtree.
    pub fn delete_bloc(&mut self, id: BlocId, now_ms: f64) -> Result<Operation, ActionError> {
        self.check_editable(id)?;
        let parent = self.tree.parent(id).ok_or(TreeError::RootImmutable)?;
        let index = self.tree.index_in_parent(id).unwrap_or(0);
        self.tree.remove(id)?;
        if self.focused.is_some_and(|f| !self.tree.contains(f)) {
            self.focused = None;
        }
        self.after_structure_change();
        Ok(self.record_edit(OperationKind::Delete { element: id, parent, index }, now_ms))
    }

    /// Insert a deep copy right after the original.
    pub fn duplicate_bloc(&mut self, id: BlocId, now_ms: f64) -> Result<Operation, ActionError> {
        self.check_editable(id)?;
        let parent = self.tree.parent(id).ok_or(TreeError::RootImmutable)?;
        let index = self.tree.index_in_parent(id).map_or(0, |i| i + 1);
        let prefix = self.config.id_prefix.clone();
        let clone = self
            .tree
            .clone_subtree(id, parent, index, |base| BlocId::fresh_from(base, &prefix))?;
        self.after_structure_change();
        let kind = OperationKind::Duplicate {
            source: id,
            element: clone,
            parent,
            index,
        };
        Ok(self.record_edit(kind, now_ms))
    }

    /// Record a layout change an external heuristic applied to `container`.
    pub fn report_layout_change(
        &mut self,
        container: BlocId,
        layout: LayoutKind,
        now_ms: f64,
    ) -> Result<Operation, ActionError> {
        if !self.tree.contains(container) {
            return Err(TreeError::NotFound(container).into());
        }
        self.spatial.invalidate_element(container);
        Ok(self.record_edit(OperationKind::LayoutChanged { container, layout }, now_ms))
    }

    fn record_edit(&mut self, kind: OperationKind, now_ms: f64) -> Operation {
        let operation = self.queue.enqueue(kind, now_ms);
        log::info!("#{} {} {}", operation.seq, operation.kind.name(), operation.kind.element());
        self.flush_requested = true;
        self.events.emit(&EngineEvent::Edited {
            operation: operation.clone(),
        });
        operation
    }
}

fn success_message(drag_type: DragType) -> &'static str {
    match drag_type {
        DragType::Duplicate => "Element duplicated",
        DragType::Internal => "Children reordered",
        DragType::External | DragType::Reorder => "Element moved",
    }
}

/// The direct child of `zone` under the pointer, looking through the
/// dragged element; otherwise the child closest to the pointer.
fn zone_child_at(tree: &BlocTree, zone: BlocId, source: BlocId, x: f64, y: f64) -> Option<BlocId> {
    let mut hit = hit_test_excluding(tree, x, y, source);
    while let Some(id) = hit {
        if tree.parent(id) == Some(zone) {
            return Some(id);
        }
        hit = tree.parent(id);
    }

    tree.children(zone)
        .into_iter()
        .filter(|c| *c != source)
        .filter_map(|c| tree.bounds(c).map(|r| (c, distance_to_rect(r, x, y))))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
}

fn distance_to_rect(r: Rect, x: f64, y: f64) -> f64 {
    let dx = (r.x0 - x).max(0.0).max(x - r.x1);
    let dy = (r.y0 - y).max(0.0).max(y - r.y1);
    dx.hypot(dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> BlocId {
        BlocId::intern(s)
    }

    fn engine() -> DragEngine {
        let mut t = BlocTree::new(bloc_core::Bloc::new(id("page"), "body").with_bounds(Rect::new(0.0, 0.0, 800.0, 600.0)));
        t.append(
            id("page"),
            bloc_core::Bloc::new(id("bloc-s1"), "div").with_bounds(Rect::new(0.0, 0.0, 100.0, 50.0)),
        )
        .unwrap();
        t.append(
            id("page"),
            bloc_core::Bloc::new(id("bloc-s2"), "div").with_bounds(Rect::new(0.0, 100.0, 100.0, 150.0)),
        )
        .unwrap();
        let mut e = DragEngine::new(t, EngineConfig::default());
        assert!(e.register_zone(ZoneId::intern("page-zone"), ZoneSpec::new(id("page"))));
        e
    }

    fn press(e: &mut DragEngine, x: f64, y: f64, now: f64) -> bool {
        e.pointer_down(x, y, PointerButton::Primary, Modifiers::default(), None, now)
    }

    #[test]
    fn press_hit_tests_when_no_target_is_given() {
        let mut e = engine();
        assert!(press(&mut e, 50.0, 25.0, 0.0));
        assert_eq!(e.session().unwrap().source, id("bloc-s1"));
        assert_eq!(e.drag_state(), DragState::Ready);
        assert_eq!(e.focused(), Some(id("bloc-s1")));
    }

    #[test]
    fn click_without_travel_tears_down_quietly() {
        let mut e = engine();
        press(&mut e, 50.0, 25.0, 0.0);
        e.pointer_move(52.0, 26.0, true, 5.0);
        assert!(e.pointer_up(52.0, 26.0, 10.0));
        assert_eq!(e.drag_state(), DragState::Idle);
        assert_eq!(e.stats().drops_attempted, 0);
        assert_eq!(e.feedback().toasts().count(), 0);
    }

    #[test]
    fn frames_show_and_hide_the_indicator() {
        let mut e = engine();
        press(&mut e, 50.0, 25.0, 0.0);
        e.pointer_move(50.0, 95.0, true, 10.0);
        assert!(e.frame(16.0));
        assert_eq!(e.feedback().indicator(), Some((id("bloc-s2"), PositionKind::Before)));
        assert_eq!(e.feedback().ghost_bounds(), Some(Rect::new(0.0, 70.0, 100.0, 120.0)));

        // Back over the source: invalid, indicator hidden
        e.pointer_move(50.0, 20.0, true, 20.0);
        assert!(e.frame(32.0));
        assert_eq!(e.feedback().indicator(), None);
    }

    #[test]
    fn zone_without_visual_feedback_hides_indicator() {
        let mut e = engine();
        let mut spec = ZoneSpec::new(id("page"));
        spec.visual_feedback = false;
        e.register_zone(ZoneId::intern("page-zone"), spec);
        press(&mut e, 50.0, 25.0, 0.0);
        e.pointer_move(50.0, 95.0, true, 10.0);
        e.frame(16.0);
        assert_eq!(e.feedback().indicator(), None);
        assert!(e.session().unwrap().target.as_ref().unwrap().is_ok());
    }

    #[test]
    fn delete_and_duplicate_shortcuts_act_on_the_pressed_bloc() {
        let mut e = engine();
        press(&mut e, 50.0, 25.0, 0.0);
        e.pointer_up(50.0, 25.0, 5.0);
        let cmd = Modifiers {
            ctrl: true,
            ..Default::default()
        };
        assert!(e.key("d", cmd, 10.0));
        assert_eq!(e.tree.child_count(id("page")), 3);
        assert!(e.key("Delete", Modifiers::default(), 20.0));
        assert_eq!(e.tree.child_count(id("page")), 2);
        assert!(!e.tree.contains(id("bloc-s1")));
        assert_eq!(e.focused(), None);

        let names: Vec<&str> = e.pending_operations().iter().map(|o| o.kind.name()).collect();
        assert_eq!(names, vec!["duplicate", "delete"]);
    }

    #[test]
    fn background_press_clears_focus() {
        let mut e = engine();
        press(&mut e, 50.0, 25.0, 0.0);
        e.pointer_up(50.0, 25.0, 5.0);
        assert_eq!(e.focused(), Some(id("bloc-s1")));

        // Empty page area: hits the root, arms nothing
        assert!(!press(&mut e, 700.0, 500.0, 10.0));
        assert_eq!(e.focused(), None);
        assert!(!e.key("Delete", Modifiers::default(), 20.0));
        assert!(e.tree.contains(id("bloc-s1")));
        assert!(e.pending_operations().is_empty());
    }

    #[test]
    fn bounds_updates_evict_cached_positions() {
        let mut e = engine();
        press(&mut e, 50.0, 25.0, 0.0);
        e.pointer_move(50.0, 95.0, true, 10.0);
        e.frame(16.0);
        assert_eq!(e.resolver.cached(), 1);

        assert!(e.update_bounds(id("bloc-s2"), Rect::new(0.0, 300.0, 100.0, 350.0)));
        assert_eq!(e.resolver.cached(), 0);
        assert!(!e.update_bounds(id("bloc-missing"), Rect::ZERO));
    }

    #[test]
    fn editing_is_refused_during_a_session() {
        let mut e = engine();
        press(&mut e, 50.0, 25.0, 0.0);
        assert_eq!(e.delete_bloc(id("bloc-s2"), 1.0), Err(ActionError::SessionActive));
        e.cancel(RecoveryReason::Escape, 2.0);
        assert_eq!(e.delete_bloc(id("page"), 3.0), Err(ActionError::NotDraggable(id("page"))));
    }

    #[test]
    fn layout_changes_are_recorded() {
        let mut e = engine();
        let op = e
            .report_layout_change(id("page"), LayoutKind::Grid { columns: 3 }, 1.0)
            .unwrap();
        assert_eq!(
            op.kind,
            OperationKind::LayoutChanged {
                container: id("page"),
                layout: LayoutKind::Grid { columns: 3 },
            }
        );
    }

    #[test]
    fn replacing_the_tree_drops_orphaned_zones() {
        let mut e = engine();
        let fresh = BlocTree::new(bloc_core::Bloc::new(id("other-page"), "body"));
        e.replace_tree(fresh, 0.0);
        assert!(!e.unregister_zone(ZoneId::intern("page-zone")));
    }

    #[test]
    fn distance_is_zero_inside_and_euclidean_outside() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(distance_to_rect(r, 5.0, 5.0), 0.0);
        assert_eq!(distance_to_rect(r, 13.0, 14.0), 5.0);
    }
}
