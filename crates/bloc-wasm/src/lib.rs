//! WASM bridge for bloc drop — exposes the drag engine to JavaScript.
//!
//! Compiled via `wasm-pack build --target web` and loaded by the page
//! builder. The host mirrors the DOM into a bloc tree, forwards pointer and
//! keyboard events, drives `frame`/`tick` from `requestAnimationFrame` and a
//! timer, and draws the artifacts returned by `feedback_json`.

mod bridge;
mod logger;

use std::collections::HashMap;

use bloc_core::{Bloc, BlocId, BlocSpec, BlocTree, BoundsSpec, SubscriptionId, ZoneId};
use bloc_editor::{
    ActionError, ArtifactId, DragEngine, EngineConfig, HostBridge, InputEvent, LayoutKind, Modifiers, Operation,
    PointerButton, ZoneSpec,
};
use bridge::JsBridge;
use serde_json::json;
use wasm_bindgen::prelude::*;

/// The main WASM-facing controller.
///
/// Owns one `DragEngine` for the page. All interaction from the host JS
/// goes through this struct.
#[wasm_bindgen]
pub struct BlocCanvas {
    engine: DragEngine,
    /// Listener installed by `on_event`, replaced on each call.
    listener: Option<SubscriptionId>,
}

impl Default for BlocCanvas {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl BlocCanvas {
    /// Create a controller with default settings and an empty page.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::with_engine_config(EngineConfig::default())
    }

    /// Create a controller from a (possibly partial) JSON config.
    pub fn with_config(config_json: &str) -> Result<BlocCanvas, JsValue> {
        let config = EngineConfig::from_json(config_json)
            .map_err(|e| JsValue::from_str(&format!("invalid config: {e}")))?;
        Ok(Self::with_engine_config(config))
    }

    // ─── Page mirror ─────────────────────────────────────────────────────

    /// Replace the mirrored tree. Any drag in flight is ended first.
    /// Returns `{"ok":true}` or `{"ok":false,"error":"..."}`.
    pub fn load_tree(&mut self, json: &str, now_ms: f64) -> String {
        match parse_tree(json) {
            Ok(tree) => {
                log::debug!("tree loaded: {} blocs", tree.len());
                self.engine.replace_tree(tree, now_ms);
                ok_json()
            }
            Err(e) => error_json(&e),
        }
    }

    /// Refresh element bounds from a JSON map of id → `{x, y, width, height}`.
    /// Returns how many elements were updated.
    pub fn update_bounds(&mut self, json: &str) -> usize {
        let updates: HashMap<String, BoundsSpec> = match serde_json::from_str(json) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("update_bounds: {e}");
                return 0;
            }
        };
        updates
            .into_iter()
            .filter(|(id, bounds)| self.engine.update_bounds(BlocId::intern(id), (*bounds).into()))
            .count()
    }

    /// The current tree as nested JSON, in the shape `load_tree` accepts.
    pub fn tree_json(&self) -> String {
        let tree = &self.engine.tree;
        tree.to_spec(tree.root_id())
            .and_then(|spec| serde_json::to_string(&spec).ok())
            .unwrap_or_else(|| "null".to_string())
    }

    // ─── Drop zones ──────────────────────────────────────────────────────

    /// Register a drop zone from a JSON `ZoneSpec`. Returns false if the
    /// spec is malformed or its element is unknown.
    pub fn register_zone(&mut self, zone_id: &str, json: &str) -> bool {
        match serde_json::from_str::<ZoneSpec>(json) {
            Ok(spec) => self.engine.register_zone(ZoneId::intern(zone_id), spec),
            Err(e) => {
                log::warn!("zone {zone_id}: {e}");
                false
            }
        }
    }

    pub fn unregister_zone(&mut self, zone_id: &str) -> bool {
        self.engine.unregister_zone(ZoneId::intern(zone_id))
    }

    // ─── Input ───────────────────────────────────────────────────────────

    /// Pointer pressed. `target` is the pressed element's id when the host
    /// knows it; otherwise the engine hit-tests. Returns true if a drag
    /// session was armed.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_pointer_down(
        &mut self,
        x: f64,
        y: f64,
        button: i16,
        shift: bool,
        ctrl: bool,
        alt: bool,
        meta: bool,
        target: Option<String>,
        now_ms: f64,
    ) -> bool {
        let modifiers = Modifiers {
            shift,
            ctrl,
            alt,
            meta,
        };
        let target = target.as_deref().map(BlocId::intern);
        self.engine
            .pointer_down(x, y, PointerButton::from_code(button), modifiers, target, now_ms)
    }

    /// Pointer moved. `buttons` is `PointerEvent.buttons`.
    pub fn handle_pointer_move(&mut self, x: f64, y: f64, buttons: u16, now_ms: f64) -> bool {
        self.engine.pointer_move(x, y, buttons != 0, now_ms)
    }

    pub fn handle_pointer_up(&mut self, x: f64, y: f64, now_ms: f64) -> bool {
        self.engine.pointer_up(x, y, now_ms)
    }

    pub fn handle_pointer_cancel(&mut self, now_ms: f64) -> bool {
        self.engine.handle(InputEvent::PointerCancel, now_ms)
    }

    pub fn handle_lost_capture(&mut self, now_ms: f64) -> bool {
        self.engine.lost_pointer_capture(now_ms)
    }

    pub fn handle_blur(&mut self, now_ms: f64) -> bool {
        self.engine.handle(InputEvent::Blur, now_ms)
    }

    /// Keyboard event. Returns true if the engine acted on it.
    pub fn handle_key(
        &mut self,
        key: &str,
        ctrl: bool,
        shift: bool,
        alt: bool,
        meta: bool,
        now_ms: f64,
    ) -> bool {
        let modifiers = Modifiers {
            shift,
            ctrl,
            alt,
            meta,
        };
        self.engine.key(key, modifiers, now_ms)
    }

    /// Animation frame. Returns true while the drag wants further frames.
    pub fn frame(&mut self, now_ms: f64) -> bool {
        self.engine.frame(now_ms)
    }

    /// Timer tick: recovery checks, toast expiry and operation flushes.
    pub fn tick(&mut self, now_ms: f64) {
        self.engine.tick(now_ms);
    }

    /// End any drag immediately. Idempotent.
    pub fn force_end_drag(&mut self, now_ms: f64) -> bool {
        self.engine.force_end_drag(now_ms)
    }

    // ─── Host callbacks ──────────────────────────────────────────────────

    /// Install the function that receives operation payloads (JSON strings).
    /// Pass `undefined` to detach.
    pub fn set_bridge(&mut self, callback: Option<js_sys::Function>) {
        self.engine
            .set_bridge(callback.map(|f| Box::new(JsBridge::new(f)) as Box<dyn HostBridge>));
    }

    /// Install the function that receives engine events (JSON strings),
    /// replacing any previous one. Pass `undefined` to detach.
    pub fn on_event(&mut self, callback: Option<js_sys::Function>) {
        if let Some(previous) = self.listener.take() {
            self.engine.unsubscribe(previous);
        }
        let Some(callback) = callback else {
            return;
        };
        let id = self.engine.subscribe(move |event| {
            let json = match serde_json::to_string(event) {
                Ok(json) => json,
                Err(e) => {
                    log::warn!("event encode: {e}");
                    return;
                }
            };
            if let Err(err) = callback.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                log::warn!("event listener threw: {err:?}");
            }
        });
        self.listener = Some(id);
    }

    // ─── Actions ─────────────────────────────────────────────────────────

    /// Delete a bloc. Returns `{"ok":true,"operation":{...}}` or an error.
    pub fn delete_bloc(&mut self, id: &str, now_ms: f64) -> String {
        let result = self.engine.delete_bloc(BlocId::intern(id), now_ms);
        action_json(result)
    }

    /// Duplicate a bloc next to the original.
    pub fn duplicate_bloc(&mut self, id: &str, now_ms: f64) -> String {
        let result = self.engine.duplicate_bloc(BlocId::intern(id), now_ms);
        action_json(result)
    }

    /// Record a layout switch applied by the host, e.g.
    /// `{"mode":"grid","columns":3}`.
    pub fn report_layout_change(&mut self, container: &str, layout_json: &str, now_ms: f64) -> String {
        let layout: LayoutKind = match serde_json::from_str(layout_json) {
            Ok(layout) => layout,
            Err(e) => return error_json(&format!("invalid layout: {e}")),
        };
        let result = self
            .engine
            .report_layout_change(BlocId::intern(container), layout, now_ms);
        action_json(result)
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// `"idle"`, `"ready"`, `"dragging"`, `"dropping"` or `"recovering"`.
    pub fn get_state(&self) -> String {
        self.engine.drag_state().as_str().to_string()
    }

    /// The active drag type, or an empty string when idle.
    pub fn get_drag_type(&self) -> String {
        self.engine
            .drag_type()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default()
    }

    /// Visual artifacts to draw, as a JSON snapshot.
    pub fn feedback_json(&self) -> String {
        serde_json::to_string(&self.engine.feedback_snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Close a toast (by the `id` in `feedback_json`) before it expires.
    pub fn dismiss_toast(&mut self, id: u32) -> bool {
        self.engine.dismiss_toast(ArtifactId::from(u64::from(id)))
    }

    /// Operations not yet delivered to the host.
    pub fn get_operations_json(&self) -> String {
        serde_json::to_string(&self.engine.pending_operations()).unwrap_or_else(|_| "[]".to_string())
    }

    /// Drop every pending operation. Returns how many were dropped.
    pub fn clear_operations(&mut self) -> usize {
        self.engine.clear_operations()
    }

    /// Drag counters with average FPS and drop success rate.
    pub fn get_stats_json(&self) -> String {
        serde_json::to_string(&self.engine.stats().report()).unwrap_or_else(|_| "{}".to_string())
    }
}

// ─── Private helpers ─────────────────────────────────────────────────────

impl BlocCanvas {
    fn with_engine_config(config: EngineConfig) -> Self {
        console_error_panic_hook_setup();
        logger::init(log::LevelFilter::Info);

        let root = Bloc::new(BlocId::intern("root"), "body");
        Self {
            engine: DragEngine::new(BlocTree::new(root), config),
            listener: None,
        }
    }
}

fn parse_tree(json: &str) -> Result<BlocTree, String> {
    let spec: BlocSpec = serde_json::from_str(json).map_err(|e| format!("invalid tree: {e}"))?;
    BlocTree::from_spec(&spec).map_err(|e| e.to_string())
}

fn ok_json() -> String {
    json!({ "ok": true }).to_string()
}

fn error_json(message: &str) -> String {
    json!({ "ok": false, "error": message }).to_string()
}

fn action_json(result: Result<Operation, ActionError>) -> String {
    match result {
        Ok(operation) => json!({ "ok": true, "operation": operation }).to_string(),
        Err(e) => {
            log::warn!("action failed: {e}");
            error_json(&e.to_string())
        }
    }
}

// ─── Panic hook for WASM debugging ───────────────────────────────────────

fn console_error_panic_hook_setup() {
    #[cfg(target_arch = "wasm32")]
    {
        use std::sync::Once;
        static SET_HOOK: Once = Once::new();
        SET_HOOK.call_once(|| {
            std::panic::set_hook(Box::new(|info| {
                let msg = format!("bloc WASM panic: {info}");
                web_sys::console::error_1(&msg.into());
            }));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"{
        "id": "canvas",
        "tag": "main",
        "bounds": { "x": 0, "y": 0, "width": 800, "height": 600 },
        "children": [
            { "id": "bloc-a", "bounds": { "x": 0, "y": 0, "width": 100, "height": 50 } },
            { "id": "bloc-b", "bounds": { "x": 0, "y": 200, "width": 100, "height": 50 } }
        ]
    }"#;

    fn loaded() -> BlocCanvas {
        let mut canvas = BlocCanvas::new();
        assert_eq!(canvas.load_tree(PAGE, 0.0), r#"{"ok":true}"#);
        assert!(canvas.register_zone("page", r#"{"element":"canvas"}"#));
        canvas
    }

    #[test]
    fn load_tree_reports_parse_errors() {
        let mut canvas = BlocCanvas::new();
        let out: serde_json::Value = serde_json::from_str(&canvas.load_tree("{", 0.0)).unwrap();
        assert_eq!(out["ok"], false);
        assert!(out["error"].as_str().unwrap().starts_with("invalid tree"));
    }

    #[test]
    fn tree_json_round_trips_the_page() {
        let canvas = loaded();
        let tree: serde_json::Value = serde_json::from_str(&canvas.tree_json()).unwrap();
        assert_eq!(tree["id"], "canvas");
        assert_eq!(tree["children"][1]["id"], "bloc-b");
        assert_eq!(tree["children"][1]["bounds"]["y"], 200.0);
    }

    #[test]
    fn update_bounds_counts_known_elements() {
        let mut canvas = loaded();
        let n = canvas.update_bounds(
            r#"{"bloc-a":{"x":0,"y":10,"width":100,"height":50},"bloc-zz":{"x":0,"y":0,"width":1,"height":1}}"#,
        );
        assert_eq!(n, 1);
        assert_eq!(canvas.update_bounds("not json"), 0);
    }

    #[test]
    fn malformed_zone_is_not_registered() {
        let mut canvas = loaded();
        assert!(!canvas.register_zone("bad", "[]"));
        assert!(!canvas.register_zone("ghost", r#"{"element":"bloc-nope"}"#));
        assert!(canvas.unregister_zone("page"));
    }

    #[test]
    fn drag_through_the_controller() {
        let mut canvas = loaded();
        assert!(canvas.handle_pointer_down(50.0, 15.0, 0, false, false, false, false, None, 0.0));
        assert_eq!(canvas.get_state(), "ready");
        assert_eq!(canvas.get_drag_type(), "external");

        canvas.handle_pointer_move(50.0, 60.0, 1, 16.0);
        canvas.handle_pointer_move(50.0, 225.0, 1, 32.0);
        assert!(canvas.frame(32.0));
        assert_eq!(canvas.get_state(), "dragging");
        let feedback: serde_json::Value = serde_json::from_str(&canvas.feedback_json()).unwrap();
        assert_eq!(feedback["lifted"], "bloc-a");

        canvas.handle_pointer_up(50.0, 225.0, 48.0);
        assert_eq!(canvas.get_state(), "idle");
        assert_eq!(canvas.get_drag_type(), "");

        let ops: serde_json::Value = serde_json::from_str(&canvas.get_operations_json()).unwrap();
        assert_eq!(ops[0]["type"], "move");
        assert_eq!(ops[0]["element"], "bloc-a");
        assert_eq!(ops[0]["parent"], "bloc-b");
        assert_eq!(ops[0]["index"], 0);

        let feedback: serde_json::Value = serde_json::from_str(&canvas.feedback_json()).unwrap();
        let toast = &feedback["artifacts"][0];
        assert_eq!(toast["kind"], "toast");
        assert_eq!(toast["level"], "success");
        let toast_id = toast["id"].as_u64().unwrap() as u32;
        assert!(canvas.dismiss_toast(toast_id));
        assert!(!canvas.dismiss_toast(toast_id));

        let stats: serde_json::Value = serde_json::from_str(&canvas.get_stats_json()).unwrap();
        assert_eq!(stats["dropsSucceeded"], 1);
        assert_eq!(canvas.clear_operations(), 1);
    }

    #[test]
    fn escape_cancels_through_the_controller() {
        let mut canvas = loaded();
        canvas.handle_pointer_down(50.0, 15.0, 0, false, false, false, false, Some("bloc-a".into()), 0.0);
        canvas.handle_pointer_move(50.0, 60.0, 1, 16.0);
        assert!(canvas.handle_key("Escape", false, false, false, false, 20.0));
        assert_eq!(canvas.get_state(), "idle");
        assert!(!canvas.force_end_drag(21.0));
    }

    #[test]
    fn actions_report_operations_or_errors() {
        let mut canvas = loaded();
        let dup: serde_json::Value = serde_json::from_str(&canvas.duplicate_bloc("bloc-a", 0.0)).unwrap();
        assert_eq!(dup["ok"], true);
        assert_eq!(dup["operation"]["type"], "duplicate");
        assert_eq!(dup["operation"]["index"], 1);

        let del: serde_json::Value = serde_json::from_str(&canvas.delete_bloc("bloc-missing", 1.0)).unwrap();
        assert_eq!(del["ok"], false);

        let layout: serde_json::Value = serde_json::from_str(
            &canvas.report_layout_change("canvas", r#"{"mode":"grid","columns":3}"#, 2.0),
        )
        .unwrap();
        assert_eq!(layout["operation"]["type"], "layoutChanged");
        assert_eq!(layout["operation"]["layout"]["columns"], 3);
    }

    #[test]
    fn with_config_accepts_partial_json() {
        let canvas = BlocCanvas::with_config(r#"{"dragThresholdPx":12}"#).unwrap();
        assert_eq!(canvas.engine.config().drag_threshold_px, 12.0);
    }
}
