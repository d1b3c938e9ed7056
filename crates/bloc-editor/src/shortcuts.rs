//! Keyboard shortcut mapping.
//!
//! Maps key + modifier combos to semantic `ShortcutAction`s.
//! The map lives in Rust so the WASM controller and native tests share it.
//!
//! - Escape = cancel the drag in flight
//! - Delete / Backspace = delete the last pressed bloc
//! - ⌘D = duplicate the last pressed bloc

use crate::input::Modifiers;

/// Actions that keyboard shortcuts can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    /// Abort the current session through the recovery path.
    CancelDrag,
    Delete,
    Duplicate,
}

/// Resolves key events into shortcut actions.
///
/// Uses platform-aware modifier detection: on macOS `meta` is ⌘,
/// on other platforms `ctrl` serves the same role.
pub struct ShortcutMap;

impl ShortcutMap {
    /// Resolve a key event to an action.
    ///
    /// `key` is the `KeyboardEvent.key` value (e.g. `"d"`, `"Escape"`).
    /// Returns `None` if the key combo has no binding.
    pub fn resolve(key: &str, modifiers: Modifiers) -> Option<ShortcutAction> {
        // Escape cancels regardless of modifiers still held from the drag
        if key == "Escape" {
            return Some(ShortcutAction::CancelDrag);
        }

        if modifiers.command() {
            return match key {
                "d" | "D" if !modifiers.shift => Some(ShortcutAction::Duplicate),
                _ => None,
            };
        }

        match key {
            "Delete" | "Backspace" if !modifiers.shift && !modifiers.alt => Some(ShortcutAction::Delete),
            _ => None,
        }
    }
}
