//! FPS-style camera: yaw/pitch angles, derived rotation, view and
//! projection matrices.

use crate::math::{Mat4, Quat, Vec3};

const WORLD_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);
/// Pitch limit keeping the view away from the poles
const PITCH_LIMIT_DEG: f32 = 89.0;
/// Mouse look sensitivity in degrees per count
const LOOK_SENSITIVITY: f32 = 0.1;

pub struct Camera {
    position: Vec3,
    /// Horizontal angle around world-up, degrees, kept in [0, 360)
    yaw: f32,
    /// Vertical angle, degrees, clamped to +/-89
    pitch: f32,
    rotation: Quat,

    fov_deg: f32,
    aspect: f32,
    near: f32,
    far: f32,
    projection: Mat4,
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            yaw,
            pitch,
            rotation: Quat::identity(),
            fov_deg: 45.0,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
            projection: Mat4::identity(),
        };
        camera.update_rotation();
        camera.update_projection();
        camera
    }

    pub fn set_perspective(&mut self, fov_deg: f32, aspect: f32, near: f32, far: f32) {
        self.fov_deg = fov_deg;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.update_projection();
    }

    fn update_projection(&mut self) {
        self.projection =
            Mat4::perspective(self.fov_deg.to_radians(), self.aspect, self.near, self.far);
    }

    /// Rebuild the rotation from the wrapped yaw and clamped pitch
    fn update_rotation(&mut self) {
        self.yaw = self.yaw.rem_euclid(360.0);
        self.pitch = self.pitch.clamp(-PITCH_LIMIT_DEG, PITCH_LIMIT_DEG);

        let yaw_q = Quat::from_axis_angle(&WORLD_UP, self.yaw.to_radians());
        let pitch_q = Quat::from_axis_angle(&Vec3::new(1.0, 0.0, 0.0), self.pitch.to_radians());
        self.rotation = (yaw_q * pitch_q).normalized();
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation.rotate(&Vec3::new(0.0, 0.0, -1.0))
    }

    pub fn right(&self) -> Vec3 {
        self.rotation.rotate(&Vec3::new(1.0, 0.0, 0.0))
    }

    /// Mouse-look: horizontal counts turn the yaw, vertical counts the
    /// pitch
    pub fn process_mouse_movement(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * LOOK_SENSITIVITY;
        self.pitch += dy * LOOK_SENSITIVITY;
        self.update_rotation();
    }

    /// Fly-camera movement along the view basis
    pub fn move_local(&mut self, forward: f32, right: f32, up: f32) {
        self.position += self.forward() * forward;
        self.position += self.right() * right;
        self.position += WORLD_UP * up;
    }

    /// LookAt view matrix toward `position + forward`. When the view
    /// direction is parallel to world-up the right axis falls back to +X.
    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.forward().normalize();

        let mut right = forward.cross(&WORLD_UP);
        if right.length_sq() < 1e-6 {
            right = Vec3::new(1.0, 0.0, 0.0);
        }
        let right = right.normalize();
        let up = right.cross(&forward).normalize();

        let mut rotation = Mat4::identity();
        rotation.m[0][0] = right.x;
        rotation.m[0][1] = right.y;
        rotation.m[0][2] = right.z;
        rotation.m[1][0] = up.x;
        rotation.m[1][1] = up.y;
        rotation.m[1][2] = up.z;
        rotation.m[2][0] = -forward.x;
        rotation.m[2][1] = -forward.y;
        rotation.m[2][2] = -forward.z;

        let translation = Mat4::translation(-self.position.x, -self.position.y, -self.position.z);
        rotation * translation
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec4;

    #[test]
    fn test_default_orientation_looks_down_negative_z() {
        let camera = Camera::new(Vec3::zero(), 0.0, 0.0);
        assert!(camera.forward().approx_eq(&Vec3::new(0.0, 0.0, -1.0), 1e-5));
        assert!(camera.right().approx_eq(&Vec3::new(1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_yaw_wraps_modulo_360() {
        let mut camera = Camera::new(Vec3::zero(), 350.0, 0.0);
        camera.process_mouse_movement(200.0, 0.0); // +20 degrees
        assert!((camera.yaw() - 10.0).abs() < 1e-3);

        camera.process_mouse_movement(-300.0, 0.0); // -30 degrees
        assert!((camera.yaw() - 340.0).abs() < 1e-3);
    }

    #[test]
    fn test_pitch_clamped() {
        let mut camera = Camera::new(Vec3::zero(), 0.0, 0.0);
        camera.process_mouse_movement(0.0, 10_000.0);
        assert_eq!(camera.pitch(), 89.0);
        camera.process_mouse_movement(0.0, -100_000.0);
        assert_eq!(camera.pitch(), -89.0);
    }

    #[test]
    fn test_yaw_90_faces_negative_x() {
        let camera = Camera::new(Vec3::zero(), 90.0, 0.0);
        assert!(camera.forward().approx_eq(&Vec3::new(-1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_view_matrix_centers_look_target() {
        // Camera at +5z looking down -z: the origin lands on the view
        // axis at distance 5
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), 0.0, 0.0);
        let v = camera.view_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(v.xyz().approx_eq(&Vec3::new(0.0, 0.0, -5.0), 1e-4));
    }

    #[test]
    fn test_straight_down_view_is_finite() {
        // Looking nearly straight down: fallback keeps the basis sane
        let camera = Camera::new(Vec3::zero(), 0.0, -89.0);
        let view = camera.view_matrix();
        for row in &view.m {
            for v in row {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn test_move_local_follows_heading() {
        let mut camera = Camera::new(Vec3::zero(), 90.0, 0.0);
        camera.move_local(2.0, 0.0, 0.0);
        assert!(camera.position().approx_eq(&Vec3::new(-2.0, 0.0, 0.0), 1e-4));
    }
}
