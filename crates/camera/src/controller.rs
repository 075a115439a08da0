//! First-person fly controller.
//!
//! The host owns the [`CameraTransform`] and forwards pointer-lock, mouse,
//! keyboard and frame events here. Anything the controller needs the host to
//! do (grab or release the pointer, draw a new marker) comes back as a
//! [`ControlRequest`].

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::input::{KeyCode, MoveIntent};
use crate::transform::{CameraTransform, LookAngle};

pub const SPAWN_MARKER_KEY: KeyCode = KeyCode::KeyF;
pub const RELEASE_POINTER_KEY: KeyCode = KeyCode::Escape;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// World units per second.
    pub move_speed: f32,
    /// Radians per pixel of pointer movement.
    pub mouse_sensitivity: f32,
    /// Distance in front of the camera at which markers appear.
    pub marker_distance: f32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            move_speed: 8.0,
            mouse_sensitivity: 0.002,
            marker_distance: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerLockState {
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    Hidden,
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: u64,
    pub position: Vec3,
}

/// Work the host surface must carry out on the controller's behalf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlRequest {
    AcquirePointerLock,
    ReleasePointerLock,
    MarkerSpawned(Marker),
}

#[derive(Debug, Clone)]
pub struct FirstPersonController {
    settings: ControllerSettings,
    look: LookAngle,
    intent: MoveIntent,
    pointer: PointerLockState,
    // Unbounded; markers are never despawned.
    markers: Vec<Marker>,
    next_marker_id: u64,
}

impl FirstPersonController {
    pub fn new(settings: ControllerSettings, camera: &CameraTransform) -> Self {
        Self {
            settings,
            look: LookAngle::from_rotation(camera.rotation),
            intent: MoveIntent::default(),
            pointer: PointerLockState::default(),
            markers: Vec::new(),
            next_marker_id: 0,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn look(&self) -> LookAngle {
        self.look
    }

    pub fn intent(&self) -> MoveIntent {
        self.intent
    }

    pub fn is_locked(&self) -> bool {
        self.pointer.locked
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Called when the user clicks the surface.
    pub fn request_pointer_lock(&self) -> Option<ControlRequest> {
        if self.pointer.locked {
            return None;
        }
        Some(ControlRequest::AcquirePointerLock)
    }

    pub fn on_pointer_lock_acquired(&mut self) -> CursorStyle {
        self.pointer.locked = true;
        tracing::debug!("pointer lock acquired");
        CursorStyle::Hidden
    }

    pub fn on_pointer_lock_released(&mut self) -> CursorStyle {
        self.pointer.locked = false;
        tracing::debug!("pointer lock released");
        CursorStyle::Pointer
    }

    pub fn on_pointer_lock_error(&mut self, reason: &str) {
        tracing::warn!(reason, "pointer lock request failed");
        self.pointer.locked = false;
    }

    pub fn on_mouse_move(&mut self, delta_x: f32, delta_y: f32, camera: &mut CameraTransform) {
        if !self.pointer.locked {
            return;
        }

        let sensitivity = self.settings.mouse_sensitivity;
        self.look = LookAngle {
            yaw: self.look.yaw - delta_x * sensitivity,
            pitch: self.look.pitch - delta_y * sensitivity,
        }
        .clamped();
        camera.rotation = self.look.to_rotation();
    }

    pub fn on_key_event(
        &mut self,
        key: KeyCode,
        pressed: bool,
        camera: &CameraTransform,
    ) -> Option<ControlRequest> {
        if let Some(action) = key.move_action() {
            self.intent.set(action, pressed);
            return None;
        }

        if !pressed {
            return None;
        }

        match key {
            RELEASE_POINTER_KEY if self.pointer.locked => Some(ControlRequest::ReleasePointerLock),
            SPAWN_MARKER_KEY => Some(ControlRequest::MarkerSpawned(self.spawn_marker(camera))),
            _ => None,
        }
    }

    /// Integrates held movement keys into the camera position.
    ///
    /// Horizontal input follows the full camera orientation; up/down always
    /// moves along world Y.
    pub fn on_frame(&mut self, delta_seconds: f32, camera: &mut CameraTransform) {
        if !delta_seconds.is_finite() || delta_seconds <= 0.0 {
            return;
        }

        let step = self.settings.move_speed * delta_seconds;
        let intent = self.intent;

        let local = Vec3::new(
            axis(intent.right, intent.left),
            0.0,
            axis(intent.backward, intent.forward),
        )
        .normalize_or_zero();
        if local != Vec3::ZERO {
            camera.position += camera.rotation * (local * step);
        }

        camera.position.y += axis(intent.up, intent.down) * step;
    }

    fn spawn_marker(&mut self, camera: &CameraTransform) -> Marker {
        let marker = Marker {
            id: self.next_marker_id,
            position: camera.position + camera.forward() * self.settings.marker_distance,
        };
        self.next_marker_id += 1;
        self.markers.push(marker);
        tracing::debug!(
            marker_id = marker.id,
            marker_count = self.markers.len(),
            "spawned marker"
        );
        marker
    }
}

fn axis(positive: bool, negative: bool) -> f32 {
    f32::from(u8::from(positive)) - f32::from(u8::from(negative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    const EPS: f32 = 1e-4;

    fn setup() -> (FirstPersonController, CameraTransform) {
        let camera = CameraTransform::default();
        let controller = FirstPersonController::new(ControllerSettings::default(), &camera);
        (controller, camera)
    }

    fn locked() -> (FirstPersonController, CameraTransform) {
        let (mut controller, camera) = setup();
        controller.on_pointer_lock_acquired();
        (controller, camera)
    }

    #[test]
    fn starts_unlocked_and_idle_with_camera_orientation() {
        let camera = CameraTransform::default().with_look(LookAngle::new(0.5, 0.25));
        let controller = FirstPersonController::new(ControllerSettings::default(), &camera);

        assert!(!controller.is_locked());
        assert!(controller.intent().is_idle());
        assert!((controller.look().yaw - 0.5).abs() < EPS);
        assert!((controller.look().pitch - 0.25).abs() < EPS);
    }

    #[test]
    fn pointer_lock_toggles_cursor() {
        let (mut controller, _camera) = setup();
        assert_eq!(
            controller.request_pointer_lock(),
            Some(ControlRequest::AcquirePointerLock)
        );
        assert_eq!(controller.on_pointer_lock_acquired(), CursorStyle::Hidden);
        assert!(controller.is_locked());
        assert_eq!(controller.request_pointer_lock(), None);

        assert_eq!(controller.on_pointer_lock_released(), CursorStyle::Pointer);
        assert!(!controller.is_locked());
    }

    #[test]
    fn lock_failure_leaves_controller_unlocked() {
        let (mut controller, mut camera) = setup();
        controller.on_pointer_lock_error("denied by host");
        assert!(!controller.is_locked());

        controller.on_mouse_move(100.0, 100.0, &mut camera);
        assert_eq!(camera.rotation, glam::Quat::IDENTITY);
    }

    #[test]
    fn mouse_move_is_ignored_while_unlocked() {
        let (mut controller, mut camera) = setup();
        controller.on_mouse_move(250.0, -40.0, &mut camera);
        assert_eq!(controller.look(), LookAngle::default());
        assert_eq!(camera.rotation, glam::Quat::IDENTITY);
    }

    #[test]
    fn mouse_move_applies_sensitivity_and_updates_camera() {
        let (mut controller, mut camera) = locked();
        controller.on_mouse_move(100.0, 50.0, &mut camera);

        assert!((controller.look().yaw + 0.2).abs() < EPS);
        assert!((controller.look().pitch + 0.1).abs() < EPS);
        assert_eq!(camera.rotation, controller.look().to_rotation());
    }

    #[test]
    fn pitch_stays_clamped_for_any_sequence() {
        let (mut controller, mut camera) = locked();
        let deltas = [
            (0.0, -5_000.0),
            (13.0, 777.0),
            (-400.0, 2_000.0),
            (1.0, -1.0),
            (0.0, 100_000.0),
            (-3.0, -250_000.0),
        ];

        for round in 0..50 {
            for (dx, dy) in deltas {
                let scale = (round % 7) as f32 + 1.0;
                controller.on_mouse_move(dx * scale, dy * scale, &mut camera);
                let pitch = controller.look().pitch;
                assert!((-FRAC_PI_2..=FRAC_PI_2).contains(&pitch), "pitch {pitch}");
            }
        }
    }

    #[test]
    fn paired_keys_drive_one_flag() {
        let (mut controller, camera) = setup();

        controller.on_key_event(KeyCode::KeyW, true, &camera);
        controller.on_key_event(KeyCode::ArrowUp, true, &camera);
        assert!(controller.intent().forward);

        // A single release clears the shared flag; it is not a press counter.
        controller.on_key_event(KeyCode::ArrowUp, false, &camera);
        assert!(!controller.intent().forward);

        controller.on_key_event(KeyCode::ArrowUp, false, &camera);
        controller.on_key_event(KeyCode::KeyW, true, &camera);
        assert!(controller.intent().forward);
        assert_eq!(
            controller.intent(),
            MoveIntent {
                forward: true,
                ..MoveIntent::default()
            }
        );
    }

    #[test]
    fn escape_releases_only_when_locked() {
        let (mut controller, camera) = setup();
        assert_eq!(controller.on_key_event(KeyCode::Escape, true, &camera), None);

        controller.on_pointer_lock_acquired();
        assert_eq!(
            controller.on_key_event(KeyCode::Escape, true, &camera),
            Some(ControlRequest::ReleasePointerLock)
        );
        assert_eq!(controller.on_key_event(KeyCode::Escape, false, &camera), None);
    }

    #[test]
    fn spawn_key_places_markers_ahead_of_camera() {
        let (mut controller, camera) = setup();

        let first = controller.on_key_event(KeyCode::KeyF, true, &camera);
        assert_eq!(
            first,
            Some(ControlRequest::MarkerSpawned(Marker {
                id: 0,
                position: Vec3::new(0.0, 0.0, 2.0),
            }))
        );
        assert_eq!(controller.on_key_event(KeyCode::KeyF, false, &camera), None);

        let turned = CameraTransform::default().with_look(LookAngle::new(FRAC_PI_2, 0.0));
        let Some(ControlRequest::MarkerSpawned(second)) =
            controller.on_key_event(KeyCode::KeyF, true, &turned)
        else {
            panic!("expected a marker");
        };
        assert_eq!(second.id, 1);
        assert!(second.position.abs_diff_eq(Vec3::new(-3.0, 0.0, 5.0), EPS));
        assert_eq!(controller.markers().len(), 2);
    }

    #[test]
    fn forward_moves_along_view_direction() {
        let (mut controller, mut camera) = setup();
        controller.on_key_event(KeyCode::KeyW, true, &camera);
        controller.on_frame(0.5, &mut camera);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), EPS));
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let (mut controller, mut camera) = setup();
        let start = camera.position;
        controller.on_key_event(KeyCode::KeyW, true, &camera);
        controller.on_key_event(KeyCode::KeyD, true, &camera);
        controller.on_frame(1.0, &mut camera);

        let moved = camera.position - start;
        assert!((moved.length() - 8.0).abs() < EPS);
        assert!(moved.x > 0.0 && moved.z < 0.0);
    }

    #[test]
    fn opposing_keys_cancel_out() {
        let (mut controller, mut camera) = setup();
        let start = camera.position;
        controller.on_key_event(KeyCode::KeyA, true, &camera);
        controller.on_key_event(KeyCode::ArrowRight, true, &camera);
        controller.on_frame(1.0, &mut camera);
        assert_eq!(camera.position, start);
    }

    #[test]
    fn horizontal_movement_follows_pitch_but_vertical_does_not() {
        let mut camera = CameraTransform::default().with_look(LookAngle::new(0.0, FRAC_PI_4));
        let mut controller = FirstPersonController::new(ControllerSettings::default(), &camera);
        let start = camera.position;

        controller.on_key_event(KeyCode::KeyW, true, &camera);
        controller.on_frame(1.0, &mut camera);
        let forward_step = camera.position - start;
        assert!(forward_step.y > 0.0, "looking up should climb: {forward_step:?}");
        assert!((forward_step.length() - 8.0).abs() < EPS);

        controller.on_key_event(KeyCode::KeyW, false, &camera);
        controller.on_key_event(KeyCode::Space, true, &camera);
        let before = camera.position;
        controller.on_frame(0.25, &mut camera);
        assert!((camera.position - before).abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), EPS));

        controller.on_key_event(KeyCode::Space, false, &camera);
        controller.on_key_event(KeyCode::ShiftRight, true, &camera);
        let before = camera.position;
        controller.on_frame(0.25, &mut camera);
        assert!((camera.position - before).abs_diff_eq(Vec3::new(0.0, -2.0, 0.0), EPS));
    }

    #[test]
    fn non_positive_delta_is_ignored() {
        let (mut controller, mut camera) = setup();
        let start = camera.position;
        controller.on_key_event(KeyCode::KeyW, true, &camera);
        controller.on_frame(0.0, &mut camera);
        controller.on_frame(-1.0, &mut camera);
        controller.on_frame(f32::NAN, &mut camera);
        assert_eq!(camera.position, start);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: ControllerSettings =
            serde_json::from_str(r#"{ "move_speed": 12.0 }"#).unwrap();
        assert_eq!(settings.move_speed, 12.0);
        assert_eq!(settings.mouse_sensitivity, 0.002);
        assert_eq!(settings.marker_distance, 3.0);
    }
}
