use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Camera pose owned by the render surface.
///
/// Orientation follows the YXZ convention: yaw about world up, then pitch about
/// the camera's local X axis. The camera looks down its local `-Z`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for CameraTransform {
    fn default() -> Self {
        Self::at(Vec3::new(0.0, 0.0, 5.0))
    }
}

impl CameraTransform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn with_look(mut self, angle: LookAngle) -> Self {
        self.rotation = angle.to_rotation();
        self
    }

    /// Unit vector the camera is facing.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

/// Accumulated mouse-look orientation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LookAngle {
    pub yaw: f32,
    pub pitch: f32,
}

impl LookAngle {
    pub const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2;

    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }.clamped()
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        let (yaw, pitch, _roll) = rotation.to_euler(EulerRot::YXZ);
        Self::new(yaw, pitch)
    }

    pub fn to_rotation(self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Keeps pitch within a quarter turn so the view never flips over.
    pub fn clamped(mut self) -> Self {
        self.pitch = self.pitch.clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
        self
    }
}
