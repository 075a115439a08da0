//! Key codes and the held-key movement intent.
//!
//! Hosts translate their platform key events into [`KeyCode`] and feed them to
//! the controller; the controller folds them into a [`MoveIntent`] that the
//! frame step reads once per tick.

use std::fmt;
use std::str::FromStr;

use snafu::Snafu;

/// Physical keys the controller cares about, named after DOM `KeyboardEvent.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    KeyW,
    KeyA,
    KeyS,
    KeyD,
    KeyF,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Space,
    ShiftLeft,
    ShiftRight,
    Escape,
}

impl KeyCode {
    pub const ALL: [KeyCode; 13] = [
        KeyCode::KeyW,
        KeyCode::KeyA,
        KeyCode::KeyS,
        KeyCode::KeyD,
        KeyCode::KeyF,
        KeyCode::ArrowUp,
        KeyCode::ArrowDown,
        KeyCode::ArrowLeft,
        KeyCode::ArrowRight,
        KeyCode::Space,
        KeyCode::ShiftLeft,
        KeyCode::ShiftRight,
        KeyCode::Escape,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            KeyCode::KeyW => "KeyW",
            KeyCode::KeyA => "KeyA",
            KeyCode::KeyS => "KeyS",
            KeyCode::KeyD => "KeyD",
            KeyCode::KeyF => "KeyF",
            KeyCode::ArrowUp => "ArrowUp",
            KeyCode::ArrowDown => "ArrowDown",
            KeyCode::ArrowLeft => "ArrowLeft",
            KeyCode::ArrowRight => "ArrowRight",
            KeyCode::Space => "Space",
            KeyCode::ShiftLeft => "ShiftLeft",
            KeyCode::ShiftRight => "ShiftRight",
            KeyCode::Escape => "Escape",
        }
    }

    /// Logical movement direction bound to this key, if any.
    ///
    /// WASD and the arrow keys are bound to the same directions on purpose.
    pub const fn move_action(self) -> Option<MoveAction> {
        match self {
            KeyCode::KeyW | KeyCode::ArrowUp => Some(MoveAction::Forward),
            KeyCode::KeyS | KeyCode::ArrowDown => Some(MoveAction::Backward),
            KeyCode::KeyA | KeyCode::ArrowLeft => Some(MoveAction::Left),
            KeyCode::KeyD | KeyCode::ArrowRight => Some(MoveAction::Right),
            KeyCode::Space => Some(MoveAction::Up),
            KeyCode::ShiftLeft | KeyCode::ShiftRight => Some(MoveAction::Down),
            KeyCode::KeyF | KeyCode::Escape => None,
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("unknown key code '{raw}'"))]
pub struct UnknownKeyCode {
    pub raw: String,
}

impl FromStr for KeyCode {
    type Err = UnknownKeyCode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        KeyCode::ALL
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| UnknownKeyCode {
                raw: raw.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveAction {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Current held-key state, one flag per logical direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveIntent {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl MoveIntent {
    pub fn set(&mut self, action: MoveAction, held: bool) {
        match action {
            MoveAction::Forward => self.forward = held,
            MoveAction::Backward => self.backward = held,
            MoveAction::Left => self.left = held,
            MoveAction::Right => self.right = held,
            MoveAction::Up => self.up = held,
            MoveAction::Down => self.down = held,
        }
    }

    pub fn is_held(&self, action: MoveAction) -> bool {
        match action {
            MoveAction::Forward => self.forward,
            MoveAction::Backward => self.backward,
            MoveAction::Left => self.left,
            MoveAction::Right => self.right,
            MoveAction::Up => self.up,
            MoveAction::Down => self.down,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
