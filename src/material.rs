//! Surface materials: base colors, shininess and optional texture maps.

use std::sync::Arc;

use crate::math::Vec3;
use crate::shader::Shader;
use crate::texture::Texture;

/// Material parameters for one object. Texture and shader references are
/// shared with the resource cache; materials never own pixel data.
#[derive(Clone)]
pub struct Material {
    pub ambient_color: Vec3,
    pub diffuse_color: Vec3,
    pub specular_color: Vec3,
    /// Specular exponent; integral so shading can use fast exponentiation
    pub shininess: i32,

    pub diffuse_texture: Option<Arc<Texture>>,
    pub normal_texture: Option<Arc<Texture>>,
    pub ao_texture: Option<Arc<Texture>>,
    pub specular_texture: Option<Arc<Texture>>,
    pub gloss_texture: Option<Arc<Texture>>,

    pub shader: Arc<dyn Shader>,
}

impl Material {
    pub fn new(shader: Arc<dyn Shader>) -> Self {
        Self {
            ambient_color: Vec3::splat(0.1),
            diffuse_color: Vec3::splat(0.8),
            specular_color: Vec3::splat(0.5),
            shininess: 32,
            diffuse_texture: None,
            normal_texture: None,
            ao_texture: None,
            specular_texture: None,
            gloss_texture: None,
            shader,
        }
    }
}

/// True iff a texture slot is filled with a usable (non-empty) texture
pub fn texture_usable(slot: &Option<Arc<Texture>>) -> bool {
    slot.as_ref().is_some_and(|t| !t.is_empty())
}
