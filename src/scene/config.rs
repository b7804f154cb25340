//! Declarative scene description, persisted as JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFile {
    pub camera: CameraConfig,
    #[serde(default)]
    pub lights: Vec<LightConfig>,
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
    /// Global ambient illumination
    #[serde(default = "default_ambient_light")]
    pub ambient_light: [f32; 3],
    /// Frame clear color
    #[serde(default = "default_background")]
    pub background: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub position: [f32; 3],
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
    pub fov: f32,
    /// Overrides the framebuffer aspect when present
    #[serde(default)]
    pub aspect: Option<f32>,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub color: [f32; 3],
    pub intensity: f32,
    #[serde(default)]
    pub direction: Option<[f32; 3]>,
    #[serde(default)]
    pub position: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub model: String,
    pub material: MaterialConfig,
    #[serde(default)]
    pub transform: TransformConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialConfig {
    #[serde(default = "default_shader")]
    pub shader: String,
    #[serde(default)]
    pub diffuse_texture: Option<String>,
    #[serde(default)]
    pub normal_texture: Option<String>,
    #[serde(default)]
    pub ao_texture: Option<String>,
    #[serde(default)]
    pub specular_texture: Option<String>,
    #[serde(default)]
    pub gloss_texture: Option<String>,
    #[serde(default = "default_ambient_color")]
    pub ambient_color: [f32; 3],
    #[serde(default = "default_diffuse_color")]
    pub diffuse_color: [f32; 3],
    #[serde(default = "default_specular_color")]
    pub specular_color: [f32; 3],
    #[serde(default = "default_shininess")]
    pub shininess: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub position: [f32; 3],
    /// ZYX Euler angles in degrees
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    #[serde(default)]
    pub animation: Option<AnimationConfig>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: default_scale(),
            animation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    /// Degrees per second
    pub speed: f32,
}

fn default_shader() -> String {
    "blinn_phong".into()
}

fn default_ambient_light() -> [f32; 3] {
    [0.1, 0.1, 0.1]
}

fn default_background() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_ambient_color() -> [f32; 3] {
    [0.1, 0.1, 0.1]
}

fn default_diffuse_color() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}

fn default_specular_color() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_shininess() -> i32 {
    32
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl SceneFile {
    pub fn load(path: &Path) -> Result<Self, String> {
        let json = fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&json).map_err(|e| e.to_string())
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, json).map_err(|e| e.to_string())
    }
}

pub fn vec3(a: [f32; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}
