//! Light sources.

use crate::math::Vec3;

/// A scene light. Directional lights store the direction the light travels
/// (shading negates it to get the direction *to* the light); point lights
/// store a world-space position and attenuate with inverse-square falloff.
#[derive(Debug, Clone, Copy)]
pub enum LightKind {
    Directional { direction: Vec3 },
    Point { position: Vec3 },
}

#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional {
                direction: direction.normalize(),
            },
            color,
            intensity,
        }
    }

    pub fn point(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point { position },
            color,
            intensity,
        }
    }
}
