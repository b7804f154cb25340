//! Programmable shading: the two-stage shader interface and the
//! Blinn-Phong implementation.
//!
//! A shader sees one vertex at a time in the vertex stage and one
//! interpolated fragment at a time in the fragment stage. Uniforms are
//! built by the renderer once per draw command and are read-only while
//! workers execute.

use std::sync::Arc;

use crate::light::{Light, LightKind};
use crate::material::{texture_usable, Material};
use crate::math::{Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::texture::Texture;

/// Per-vertex attributes fetched from the mesh arrays
#[derive(Debug, Clone, Copy)]
pub struct VertexInput {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

/// Vertex-stage output, interpolated perspective-correctly across the
/// triangle. `clip_position` drives projection only and is not
/// re-interpolated for the fragment stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Varyings {
    pub clip_position: Vec4,
    pub world_position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub uv: Vec2,
}

/// Draw-call constants: matrices, camera, lights and material parameters
pub struct Uniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub mvp: Mat4,
    pub normal_matrix: Mat3,
    pub camera_position: Vec3,
    pub lights: Vec<Light>,
    pub ambient_light: Vec3,

    pub ambient_color: Vec3,
    pub diffuse_color: Vec3,
    pub specular_color: Vec3,
    pub shininess: i32,

    pub diffuse_texture: Option<Arc<Texture>>,
    pub normal_texture: Option<Arc<Texture>>,
    pub ao_texture: Option<Arc<Texture>>,
    pub specular_texture: Option<Arc<Texture>>,
    pub gloss_texture: Option<Arc<Texture>>,
    pub use_diffuse_map: bool,
    pub use_normal_map: bool,
    pub use_ao_map: bool,
    pub use_specular_map: bool,
    pub use_gloss_map: bool,
}

impl Uniforms {
    /// Assemble the uniform block for one draw command
    pub fn build(
        material: &Material,
        model: Mat4,
        view: Mat4,
        projection: Mat4,
        camera_position: Vec3,
        lights: &[Light],
        ambient_light: Vec3,
    ) -> Self {
        let mvp = projection * view * model;
        // Normals transform by the inverse-transpose of the linear block
        let normal_matrix = model.upper3().inverse().transpose();

        Self {
            model,
            view,
            projection,
            mvp,
            normal_matrix,
            camera_position,
            lights: lights.to_vec(),
            ambient_light,
            ambient_color: material.ambient_color,
            diffuse_color: material.diffuse_color,
            specular_color: material.specular_color,
            shininess: material.shininess,
            use_diffuse_map: texture_usable(&material.diffuse_texture),
            use_normal_map: texture_usable(&material.normal_texture),
            use_ao_map: texture_usable(&material.ao_texture),
            use_specular_map: texture_usable(&material.specular_texture),
            use_gloss_map: texture_usable(&material.gloss_texture),
            diffuse_texture: material.diffuse_texture.clone(),
            normal_texture: material.normal_texture.clone(),
            ao_texture: material.ao_texture.clone(),
            specular_texture: material.specular_texture.clone(),
            gloss_texture: material.gloss_texture.clone(),
        }
    }
}

/// Two pure stages; implementations hold no per-draw state
pub trait Shader: Send + Sync {
    fn vertex(&self, input: &VertexInput, uniforms: &Uniforms) -> Varyings;

    /// Shade one fragment. `ddx_uv`/`ddy_uv` are the UV derivatives per
    /// screen pixel for mip selection. Returns `None` to discard.
    fn fragment(
        &self,
        input: &Varyings,
        ddx_uv: Vec2,
        ddy_uv: Vec2,
        uniforms: &Uniforms,
    ) -> Option<Vec3>;
}

/// Integer exponentiation by repeated squaring
pub fn fast_pow(base: f32, n: i32) -> f32 {
    if n < 0 {
        return 1.0 / fast_pow(base, -n);
    }
    let mut result = 1.0;
    let mut base = base;
    let mut n = n;
    while n != 0 {
        if n & 1 != 0 {
            result *= base;
        }
        base *= base;
        n >>= 1;
    }
    result
}

/// Gloss map sample (red channel) remapped to a specular exponent in
/// [2, 256]
#[inline]
fn gloss_to_shininess(gloss: f32) -> i32 {
    2 + ((256.0 - 2.0) * gloss.clamp(0.0, 1.0)).round() as i32
}

/// Blinn-Phong with optional normal/specular/gloss/AO maps
pub struct BlinnPhongShader;

impl Shader for BlinnPhongShader {
    fn vertex(&self, input: &VertexInput, u: &Uniforms) -> Varyings {
        let model_pos = Vec4::from_vec3(input.position, 1.0);
        let world_position = (u.model * model_pos).xyz();

        Varyings {
            clip_position: u.mvp * model_pos,
            world_position,
            normal: u.normal_matrix.mul_vec3(&input.normal).normalize(),
            tangent: u.normal_matrix.mul_vec3(&input.tangent).normalize(),
            bitangent: u.normal_matrix.mul_vec3(&input.bitangent).normalize(),
            uv: input.uv,
        }
    }

    fn fragment(
        &self,
        input: &Varyings,
        ddx_uv: Vec2,
        ddy_uv: Vec2,
        u: &Uniforms,
    ) -> Option<Vec3> {
        let uv = input.uv;

        let map = |enabled: bool, slot: &Option<Arc<Texture>>| -> Option<Vec3> {
            match (enabled, slot) {
                (true, Some(tex)) => Some(tex.sample(uv.x, uv.y, ddx_uv, ddy_uv)),
                _ => None,
            }
        };

        // Shading normal: either the normal map rotated through the TBN
        // basis, or the interpolated geometric normal
        let n = match map(u.use_normal_map, &u.normal_texture) {
            Some(sample) => {
                let tn = (sample * 2.0 - Vec3::splat(1.0)).normalize();
                (input.tangent * tn.x + input.bitangent * tn.y + input.normal * tn.z).normalize()
            }
            None => input.normal.normalize(),
        };

        let v = (u.camera_position - input.world_position).normalize();

        let base_diffuse = match map(u.use_diffuse_map, &u.diffuse_texture) {
            Some(sample) => u.diffuse_color * sample,
            None => u.diffuse_color,
        };

        let base_specular =
            map(u.use_specular_map, &u.specular_texture).unwrap_or(u.specular_color);

        let shininess = match map(u.use_gloss_map, &u.gloss_texture) {
            Some(sample) => gloss_to_shininess(sample.x),
            None => u.shininess,
        };

        let ao = map(u.use_ao_map, &u.ao_texture)
            .map_or(1.0, |sample| sample.x.clamp(0.0, 1.0));

        let mut color = u.ambient_light * u.ambient_color * ao;

        for light in &u.lights {
            let (l, attenuation) = match light.kind {
                LightKind::Directional { direction } => ((-direction).normalize(), 1.0),
                LightKind::Point { position } => {
                    let lvec = position - input.world_position;
                    let dist_sq = lvec.length_sq();
                    let dist = dist_sq.sqrt();
                    (lvec / dist, (1.0 / dist_sq).clamp(0.0, 1.0))
                }
            };
            let light_color = light.color * light.intensity;

            let diff_factor = n.dot(&l).max(0.0);
            let diffuse = base_diffuse * light_color * (diff_factor * attenuation);

            let h = (l + v).normalize();
            let spec_factor = fast_pow(n.dot(&h).max(0.0), shininess);
            let specular = base_specular * light_color * (spec_factor * attenuation);

            color += diffuse + specular;
        }

        Some(color.clamp01())
    }
}
