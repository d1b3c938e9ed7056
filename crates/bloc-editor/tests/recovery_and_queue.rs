//! Integration tests: cancellation, recovery and operation delivery
//! (bloc-editor).

use bloc_core::{BlocId, BlocSpec, BlocTree, ZoneId};
use bloc_editor::*;
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

fn id(s: &str) -> BlocId {
    BlocId::intern(s)
}

fn make_engine() -> DragEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let spec: BlocSpec = serde_json::from_str(include_str!("fixtures/page.json")).unwrap();
    let mut engine = DragEngine::new(BlocTree::from_spec(&spec).unwrap(), EngineConfig::default());
    engine.register_zone(ZoneId::intern("page"), ZoneSpec::new(id("canvas")));
    engine
}

/// Press on bloc-a and drag it over bloc-b, leaving the session in flight.
fn start_drag(engine: &mut DragEngine, now: f64) {
    assert!(engine.pointer_down(50.0, 15.0, PointerButton::Primary, Modifiers::default(), None, now));
    engine.pointer_move(50.0, 60.0, true, now + 16.0);
    engine.pointer_move(50.0, 195.0, true, now + 32.0);
    engine.frame(now + 32.0);
    assert_eq!(engine.drag_state(), DragState::Dragging);
}

fn finish_drag(engine: &mut DragEngine, now: f64) {
    engine.pointer_up(50.0, 195.0, now);
}

fn record_events(engine: &mut DragEngine) -> Rc<RefCell<Vec<EngineEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    engine.subscribe(move |e| sink.borrow_mut().push(e.clone()));
    seen
}

#[derive(Clone, Default)]
struct Recorder {
    payloads: Rc<RefCell<Vec<serde_json::Value>>>,
}

impl HostBridge for Recorder {
    fn notify(&self, payload: &BridgePayload) -> Result<(), BridgeError> {
        self.payloads.borrow_mut().push(serde_json::to_value(payload)?);
        Ok(())
    }
}

struct Offline;

impl HostBridge for Offline {
    fn notify(&self, payload: &BridgePayload) -> Result<(), BridgeError> {
        Err(BridgeError::Rejected {
            event: payload.event,
            message: "network down".into(),
        })
    }
}

// ─── Cancellation ───────────────────────────────────────────────────────

#[test]
fn timeout_recovers_to_idle_and_clears_effects() {
    let mut engine = make_engine();
    let events = record_events(&mut engine);
    start_drag(&mut engine, 0.0);
    assert!(engine.feedback().indicator().is_some());
    assert!(engine.feedback().ghost_bounds().is_some());

    // Still within the timeout: nothing happens
    engine.tick(1000.0);
    assert_eq!(engine.drag_state(), DragState::Dragging);

    engine.tick(3000.0);
    assert_eq!(engine.drag_state(), DragState::Idle);
    assert_eq!(engine.feedback().indicator(), None);
    assert_eq!(engine.feedback().ghost_bounds(), None);
    assert!(!engine.feedback().has_session_artifacts());
    assert_eq!(engine.stats().recoveries, 1);
    assert!(events.borrow().iter().any(|e| matches!(
        e,
        EngineEvent::Cancelled {
            reason: RecoveryReason::Timeout,
            ..
        }
    )));
}

#[test]
fn escape_blur_and_pointer_cancel_all_end_the_drag() {
    for event in [
        InputEvent::Key {
            key: "Escape".into(),
            modifiers: Modifiers::default(),
        },
        InputEvent::Blur,
        InputEvent::PointerCancel,
        InputEvent::LostPointerCapture,
    ] {
        let mut engine = make_engine();
        let before = engine.tree.children(id("canvas"));
        start_drag(&mut engine, 0.0);
        assert!(engine.handle(event.clone(), 100.0), "{event:?} not handled");
        assert_eq!(engine.drag_state(), DragState::Idle, "{event:?}");
        assert!(!engine.feedback().has_session_artifacts(), "{event:?}");
        assert_eq!(engine.tree.children(id("canvas")), before);
        assert!(engine.pending_operations().is_empty());
    }
}

#[test]
fn force_end_is_idempotent() {
    let mut engine = make_engine();
    assert!(!engine.force_end_drag(0.0));
    assert!(!engine.force_end_drag(1.0));
    assert_eq!(engine.drag_state(), DragState::Idle);

    start_drag(&mut engine, 10.0);
    assert!(engine.force_end_drag(100.0));
    assert!(!engine.force_end_drag(101.0));
    assert_eq!(engine.drag_state(), DragState::Idle);
    assert!(!engine.feedback().has_session_artifacts());
}

#[test]
fn watchdog_resets_a_session_with_no_buttons_held() {
    let mut engine = make_engine();
    let events = record_events(&mut engine);
    start_drag(&mut engine, 0.0);
    // Browser reports a move with no buttons: the pointer-up was lost
    engine.pointer_move(50.0, 200.0, false, 50.0);

    engine.tick(60.0);
    assert_eq!(engine.drag_state(), DragState::Idle);
    assert!(!engine.feedback().has_session_artifacts());
    assert!(events.borrow().iter().any(|e| matches!(
        e,
        EngineEvent::Recovered {
            reason: RecoveryReason::Desynchronized,
            repeated: false
        }
    )));
    // First correction is silent
    assert_eq!(engine.feedback().toasts().count(), 0);
}

#[test]
fn repeated_watchdog_corrections_notify_the_user() {
    let mut engine = make_engine();
    start_drag(&mut engine, 0.0);
    engine.pointer_move(50.0, 200.0, false, 50.0);
    engine.tick(60.0);

    start_drag(&mut engine, 500.0);
    engine.pointer_move(50.0, 200.0, false, 600.0);
    engine.tick(1060.0);

    assert_eq!(engine.drag_state(), DragState::Idle);
    let levels: Vec<ToastLevel> = engine.feedback().toasts().map(|(l, _)| l).collect();
    assert_eq!(levels, vec![ToastLevel::Warning]);
}

// ─── Operation queue ────────────────────────────────────────────────────

#[test]
fn drop_is_flushed_on_next_tick() {
    let mut engine = make_engine();
    let bridge = Recorder::default();
    engine.set_bridge(Some(Box::new(bridge.clone())));

    start_drag(&mut engine, 0.0);
    finish_drag(&mut engine, 48.0);
    assert_eq!(engine.pending_operations().len(), 1);
    assert!(bridge.payloads.borrow().is_empty());

    engine.tick(60.0);
    assert!(engine.pending_operations().is_empty());
    let payloads = bridge.payloads.borrow();
    assert_eq!(payloads.len(), 1);
    assert_eq!(
        payloads[0],
        serde_json::json!({
            "event": "move",
            "elementId": "bloc-a",
            "parentId": "canvas",
            "index": 1,
            "dragType": "external",
        })
    );
}

#[test]
fn flush_waits_while_a_session_is_active() {
    let mut engine = make_engine();
    let bridge = Recorder::default();
    engine.set_bridge(Some(Box::new(bridge.clone())));

    start_drag(&mut engine, 0.0);
    finish_drag(&mut engine, 48.0);

    // A second drag starts before the host timer fires
    assert!(engine.pointer_down(50.0, 225.0, PointerButton::Primary, Modifiers::default(), None, 50.0));
    engine.tick(60.0);
    engine.tick(400.0);
    assert_eq!(engine.flush(401.0), FlushOutcome::Suppressed);
    assert_eq!(engine.pending_operations().len(), 1);
    assert!(bridge.payloads.borrow().is_empty());

    engine.pointer_up(50.0, 225.0, 410.0);
    engine.tick(420.0);
    assert_eq!(bridge.payloads.borrow().len(), 1);
}

#[test]
fn bridge_failures_are_swallowed() {
    let mut engine = make_engine();
    engine.set_bridge(Some(Box::new(Offline)));
    start_drag(&mut engine, 0.0);
    finish_drag(&mut engine, 48.0);
    engine.tick(60.0);
    assert!(engine.pending_operations().is_empty());
    assert_eq!(engine.drag_state(), DragState::Idle);
}

#[test]
fn without_a_bridge_operations_are_discarded_on_flush() {
    let mut engine = make_engine();
    engine.delete_bloc(id("bloc-c"), 0.0).unwrap();
    assert_eq!(engine.pending_operations().len(), 1);
    assert_eq!(engine.flush(1.0), FlushOutcome::Flushed(1));
    assert!(engine.pending_operations().is_empty());
}

#[test]
fn clear_operations_drops_pending() {
    let mut engine = make_engine();
    engine.delete_bloc(id("bloc-c"), 0.0).unwrap();
    engine.duplicate_bloc(id("bloc-b"), 1.0).unwrap();
    assert_eq!(engine.clear_operations(), 2);
    assert!(engine.pending_operations().is_empty());
}

#[test]
fn operation_sequence_numbers_increase() {
    let mut engine = make_engine();
    start_drag(&mut engine, 0.0);
    finish_drag(&mut engine, 48.0);
    engine.duplicate_bloc(id("bloc-b"), 60.0).unwrap();
    engine.delete_bloc(id("bloc-c"), 70.0).unwrap();
    let seqs: Vec<u64> = engine.pending_operations().iter().map(|o| o.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
}

#[test]
fn deleting_a_zone_element_unregisters_the_zone() {
    let mut engine = make_engine();
    engine.register_zone(ZoneId::intern("b-slot"), ZoneSpec::new(id("bloc-b")));
    engine.delete_bloc(id("bloc-b"), 0.0).unwrap();
    assert!(!engine.unregister_zone(ZoneId::intern("b-slot")));
    assert!(engine.unregister_zone(ZoneId::intern("page")));
}
