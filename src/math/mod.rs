//! Math kernel: vectors, matrices, quaternions, transforms.

mod mat;
mod quat;
mod transform;
mod vec;

pub use mat::{Mat3, Mat4};
pub use quat::Quat;
pub use transform::Transform;
pub use vec::{lerp2, lerp3, Vec2, Vec3, Vec4};

/// Linear interpolation between two scalars (not clamped)
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
