//! Position/rotation/scale transform with matrix generation.

use super::mat::{Mat3, Mat4};
use super::quat::Quat;
use super::vec::Vec3;

#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation: rotation.normalized(),
            scale,
        }
    }

    /// Construct from ZYX Euler angles in degrees
    pub fn from_euler(position: Vec3, euler_deg: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_euler_zyx(&euler_deg),
            scale,
        }
    }

    pub fn set_rotation_euler(&mut self, euler_deg: Vec3) {
        self.rotation = Quat::from_euler_zyx(&euler_deg);
    }

    pub fn rotation_euler(&self) -> Vec3 {
        self.rotation.to_euler_zyx()
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position = self.position + delta;
    }

    /// Translate relative to the current rotation
    pub fn translate_local(&mut self, delta: Vec3) {
        self.position = self.position + self.rotation.rotate(&delta);
    }

    /// Apply a delta rotation after the current one
    pub fn rotate(&mut self, delta: &Quat) {
        self.rotation = (delta.normalized() * self.rotation).normalized();
    }

    /// Orbit position and orientation around a world-space point/axis
    pub fn rotate_around(&mut self, point: Vec3, axis: Vec3, angle_rad: f32) {
        let delta = Quat::from_axis_angle(&axis, angle_rad);
        let dir = self.position - point;
        self.position = point + delta.rotate(&dir);
        self.rotation = (delta * self.rotation).normalized();
    }

    /// World matrix: translate * rotate * scale
    pub fn matrix(&self) -> Mat4 {
        let t = Mat4::translation(self.position.x, self.position.y, self.position.z);
        let r = self.rotation.to_mat3().to_mat4();
        let s = Mat4::scale(self.scale.x, self.scale.y, self.scale.z);
        t * r * s
    }

    /// Normal matrix: inverse-transpose of the rotation*scale block
    pub fn normal_matrix(&self) -> Mat3 {
        let rs = self
            .rotation
            .to_mat3()
            .mul_mat3(&Mat3::scale(self.scale.x, self.scale.y, self.scale.z));
        rs.inverse().transpose()
    }

    /// Compose this local transform with a parent's world transform
    pub fn combine(&self, parent: &Transform) -> Transform {
        let scale = Vec3::new(
            parent.scale.x * self.scale.x,
            parent.scale.y * self.scale.y,
            parent.scale.z * self.scale.z,
        );
        let rotation = (parent.rotation * self.rotation).normalized();
        let scaled = Vec3::new(
            parent.scale.x * self.position.x,
            parent.scale.y * self.position.y,
            parent.scale.z * self.position.z,
        );
        let position = parent.position + parent.rotation.rotate(&scaled);
        Transform {
            position,
            rotation,
            scale,
        }
    }

    /// Orient toward a target point. Falls back through alternate up vectors
    /// when the view direction is parallel to `world_up`.
    pub fn look_at(&mut self, target: Vec3, world_up: Vec3) {
        let forward = target - self.position;
        if forward.length_sq() < 1e-6 {
            return;
        }
        let forward = forward.normalize();

        let mut right = world_up.cross(&forward);
        if right.length_sq() < 1e-6 {
            let alt_up = if world_up.y.abs() < 0.99 {
                Vec3::new(0.0, 1.0, 0.0)
            } else {
                Vec3::new(0.0, 0.0, 1.0)
            };
            right = alt_up.cross(&forward);
            if right.length_sq() < 1e-6 {
                right = Vec3::new(1.0, 0.0, 0.0);
            }
        }
        let right = right.normalize();
        let up = forward.cross(&right).normalize();

        // Basis columns [right, up, -forward]
        let mut look = Mat3::identity();
        look.m[0][0] = right.x;
        look.m[1][0] = right.y;
        look.m[2][0] = right.z;
        look.m[0][1] = up.x;
        look.m[1][1] = up.y;
        look.m[2][1] = up.z;
        look.m[0][2] = -forward.x;
        look.m[1][2] = -forward.y;
        look.m[2][2] = -forward.z;
        self.rotation = look.to_quat().normalized();
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            rotation: Quat::identity(),
            scale: Vec3::splat(1.0),
        }
    }
}
