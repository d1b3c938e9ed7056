//! Input abstraction layer.
//!
//! Normalizes browser pointer, keyboard and window lifecycle signals into a
//! unified `InputEvent` enum consumed by the drag engine.

use bloc_core::BlocId;

/// Keyboard modifier state captured with a pointer or key event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Platform command key: ⌘ on macOS, Ctrl elsewhere.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Which button started a pointer sequence (`PointerEvent.button`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PointerButton {
    #[default]
    Primary,
    Auxiliary,
    Secondary,
    Other(i16),
}

impl PointerButton {
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => Self::Primary,
            1 => Self::Auxiliary,
            2 => Self::Secondary,
            other => Self::Other(other),
        }
    }
}

/// A normalized input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer pressed. `target` is the element the browser reported, if
    /// any; without it the engine hit-tests the tree.
    PointerDown {
        x: f64,
        y: f64,
        button: PointerButton,
        modifiers: Modifiers,
        target: Option<BlocId>,
    },

    /// Pointer moved. `buttons_held` is false when the browser reports no
    /// pressed buttons (`PointerEvent.buttons == 0`).
    PointerMove { x: f64, y: f64, buttons_held: bool },

    /// Pointer released.
    PointerUp { x: f64, y: f64 },

    /// Browser aborted the pointer sequence (`pointercancel`).
    PointerCancel,

    /// Pointer capture was released without a matching pointer-up.
    LostPointerCapture,

    /// Window lost focus.
    Blur,

    /// Keyboard shortcut.
    Key { key: String, modifiers: Modifiers },
}

impl InputEvent {
    pub fn pointer_down(x: f64, y: f64, modifiers: Modifiers) -> Self {
        Self::PointerDown {
            x,
            y,
            button: PointerButton::Primary,
            modifiers,
            target: None,
        }
    }

    pub fn pointer_move(x: f64, y: f64) -> Self {
        Self::PointerMove {
            x,
            y,
            buttons_held: true,
        }
    }

    pub fn pointer_up(x: f64, y: f64) -> Self {
        Self::PointerUp { x, y }
    }

    /// Extract position if this is a pointer event.
    pub fn position(&self) -> Option<(f64, f64)> {
        match self {
            Self::PointerDown { x, y, .. }
            | Self::PointerMove { x, y, .. }
            | Self::PointerUp { x, y } => Some((*x, *y)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_codes_map_to_buttons() {
        assert_eq!(PointerButton::from_code(0), PointerButton::Primary);
        assert_eq!(PointerButton::from_code(2), PointerButton::Secondary);
        assert_eq!(PointerButton::from_code(4), PointerButton::Other(4));
    }

    #[test]
    fn command_covers_ctrl_and_meta() {
        let ctrl = Modifiers {
            ctrl: true,
            ..Default::default()
        };
        let meta = Modifiers {
            meta: true,
            ..Default::default()
        };
        assert!(ctrl.command());
        assert!(meta.command());
        assert!(!Modifiers::default().command());
    }

    #[test]
    fn position_only_for_pointer_events() {
        assert_eq!(InputEvent::pointer_up(3.0, 4.0).position(), Some((3.0, 4.0)));
        assert_eq!(InputEvent::Blur.position(), None);
    }
}
