#![deny(unsafe_code)]

//! First-person camera control for the floating-universe scene.
//!
//! Pure state: no windowing or rendering. A host feeds pointer, keyboard and
//! frame events into [`FirstPersonController`] and owns the [`CameraTransform`]
//! the controller writes to.

pub mod controller;
pub mod input;
pub mod transform;

pub use controller::{
    ControlRequest, ControllerSettings, CursorStyle, FirstPersonController, Marker,
    PointerLockState, RELEASE_POINTER_KEY, SPAWN_MARKER_KEY,
};
pub use input::{KeyCode, MoveAction, MoveIntent, UnknownKeyCode};
pub use transform::{CameraTransform, LookAngle};
