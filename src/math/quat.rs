//! Unit quaternions for rotations.
//!
//! Euler conversions use the ZYX convention with angles in degrees
//! (x = pitch, y = yaw, z = roll), matching the scene description format.

use super::mat::Mat3;
use super::vec::Vec3;

const DEG2RAD: f32 = std::f32::consts::PI / 180.0;
const RAD2DEG: f32 = 180.0 / std::f32::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quat {
    #[inline]
    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    #[inline]
    pub const fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    pub fn from_axis_angle(axis: &Vec3, angle_rad: f32) -> Self {
        let half = angle_rad * 0.5;
        let s = half.sin();
        let n = axis.normalize();
        Self {
            w: half.cos(),
            x: n.x * s,
            y: n.y * s,
            z: n.z * s,
        }
    }

    /// Build from Euler angles in degrees, ZYX order
    /// (roll around Z, then pitch around X, then yaw around Y).
    pub fn from_euler_zyx(euler_deg: &Vec3) -> Self {
        let half = *euler_deg * (DEG2RAD * 0.5);
        let (sy, cy) = half.y.sin_cos();
        let (sp, cp) = half.x.sin_cos();
        let (sr, cr) = half.z.sin_cos();

        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: cr * sp * cy + sr * cp * sy,
            y: cr * cp * sy - sr * sp * cy,
            z: sr * cp * cy - cr * sp * sy,
        }
    }

    /// Euler angles in degrees, ZYX order (x = pitch, y = yaw, z = roll).
    /// Pitch saturates at +/-90 degrees in the gimbal-lock case.
    pub fn to_euler_zyx(&self) -> Vec3 {
        let q = self.normalized();

        let sinr_cosp = 2.0 * (q.w * q.z + q.x * q.y);
        let cosr_cosp = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
        let roll = sinr_cosp.atan2(cosr_cosp);

        let sinp = 2.0 * (q.w * q.x - q.y * q.z);
        let pitch = if sinp.abs() >= 1.0 {
            std::f32::consts::FRAC_PI_2.copysign(sinp)
        } else {
            sinp.asin()
        };

        let siny_cosp = 2.0 * (q.w * q.y + q.z * q.x);
        let cosy_cosp = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);
        let yaw = siny_cosp.atan2(cosy_cosp);

        Vec3::new(pitch, yaw, roll) * RAD2DEG
    }

    #[inline]
    pub fn dot(&self, other: &Self) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.dot(self)
    }

    pub fn normalized(&self) -> Self {
        let len = self.length_sq().sqrt();
        if len > 1e-6 {
            Self {
                w: self.w / len,
                x: self.x / len,
                y: self.y / len,
                z: self.z / len,
            }
        } else {
            Self::identity()
        }
    }

    #[inline]
    pub fn conjugate(&self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Inverse: conjugate scaled by 1/|q|^2
    pub fn inverse(&self) -> Self {
        let mut denom = self.length_sq();
        if denom < 1e-6 {
            denom = 1e-6;
        }
        let inv = 1.0 / denom;
        let c = self.conjugate();
        Self {
            w: c.w * inv,
            x: c.x * inv,
            y: c.y * inv,
            z: c.z * inv,
        }
    }

    /// Rotate a vector: q * v * q^-1
    pub fn rotate(&self, v: &Vec3) -> Vec3 {
        let p = Quat::new(0.0, v.x, v.y, v.z);
        let r = *self * p * self.inverse();
        Vec3::new(r.x, r.y, r.z)
    }

    pub fn to_mat3(&self) -> Mat3 {
        Mat3::from_quat(self)
    }

    /// Spherical linear interpolation with shortest-path sign correction.
    /// Nearly-identical inputs fall back to the start quaternion.
    pub fn slerp(q1: &Quat, q2: &Quat, t: f32) -> Quat {
        let a = q1.normalized();
        let b = q2.normalized();

        let mut dot = a.dot(&b);
        // Negative dot means the long way around; flip one endpoint
        let b = if dot < 0.0 {
            dot = -dot;
            -b
        } else {
            b
        };

        let dot = dot.clamp(0.0, 1.0);
        let theta_0 = dot.acos();
        if theta_0 < 1e-6 {
            return a;
        }

        let theta = theta_0 * t;
        // Orthogonal component of b relative to a
        let ortho = (b - a * dot).normalized();
        a * theta.cos() + ortho * theta.sin()
    }
}

impl std::ops::Mul for Quat {
    type Output = Quat;
    fn mul(self, o: Quat) -> Quat {
        Quat {
            w: self.w * o.w - self.x * o.x - self.y * o.y - self.z * o.z,
            x: self.w * o.x + self.x * o.w + self.y * o.z - self.z * o.y,
            y: self.w * o.y - self.x * o.z + self.y * o.w + self.z * o.x,
            z: self.w * o.z + self.x * o.y - self.y * o.x + self.z * o.w,
        }
    }
}

impl std::ops::Add for Quat {
    type Output = Quat;
    #[inline]
    fn add(self, o: Quat) -> Quat {
        Quat::new(self.w + o.w, self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl std::ops::Sub for Quat {
    type Output = Quat;
    #[inline]
    fn sub(self, o: Quat) -> Quat {
        Quat::new(self.w - o.w, self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl std::ops::Mul<f32> for Quat {
    type Output = Quat;
    #[inline]
    fn mul(self, s: f32) -> Quat {
        Quat::new(self.w * s, self.x * s, self.y * s, self.z * s)
    }
}

impl std::ops::Neg for Quat {
    type Output = Quat;
    #[inline]
    fn neg(self) -> Quat {
        Quat::new(-self.w, -self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quat_approx(a: &Quat, b: &Quat, eps: f32) -> bool {
        // Equal up to sign (q and -q are the same rotation)
        a.dot(b).abs() > 1.0 - eps
    }

    #[test]
    fn test_mul_inverse_is_identity() {
        let q = Quat::from_axis_angle(&Vec3::new(0.2, 0.8, -0.5), 1.3);
        let r = q * q.inverse();
        assert!(quat_approx(&r.normalized(), &Quat::identity(), 1e-5));
    }

    #[test]
    fn test_rotate_x_about_y() {
        // Rotating (1,0,0) around Y by pi/2 gives (0,0,-1)
        let q = Quat::from_axis_angle(&Vec3::new(0.0, 1.0, 0.0), std::f32::consts::FRAC_PI_2);
        let v = q.rotate(&Vec3::new(1.0, 0.0, 0.0));
        assert!(v.approx_eq(&Vec3::new(0.0, 0.0, -1.0), 1e-6));
    }

    #[test]
    fn test_slerp_endpoints() {
        let q1 = Quat::from_axis_angle(&Vec3::new(0.0, 1.0, 0.0), 0.3);
        let q2 = Quat::from_axis_angle(&Vec3::new(0.0, 1.0, 0.0), 1.7);
        assert!(quat_approx(&Quat::slerp(&q1, &q2, 0.0), &q1, 1e-5));
        assert!(quat_approx(&Quat::slerp(&q1, &q2, 1.0), &q2, 1e-5));
    }

    #[test]
    fn test_slerp_shortest_path() {
        let q1 = Quat::from_axis_angle(&Vec3::new(0.0, 1.0, 0.0), 0.2);
        let q2 = -Quat::from_axis_angle(&Vec3::new(0.0, 1.0, 0.0), 0.4);
        // Halfway between 0.2 and 0.4 rad despite the sign flip
        let mid = Quat::slerp(&q1, &q2, 0.5);
        let expected = Quat::from_axis_angle(&Vec3::new(0.0, 1.0, 0.0), 0.3);
        assert!(quat_approx(&mid, &expected, 1e-5));
    }

    #[test]
    fn test_euler_roundtrip() {
        let angles = Vec3::new(25.0, 60.0, -40.0);
        let q = Quat::from_euler_zyx(&angles);
        let back = q.to_euler_zyx();
        assert!(back.approx_eq(&angles, 1e-3));
    }

    #[test]
    fn test_rotation_preserves_length() {
        let q = Quat::from_euler_zyx(&Vec3::new(10.0, 20.0, 30.0));
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!((q.rotate(&v).length() - v.length()).abs() < 1e-5);
    }
}
