//! Path-keyed resource caches.
//!
//! Meshes, textures and shaders are loaded once and shared by `Arc`;
//! materials hold references, never copies of pixel or vertex data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::mesh::Mesh;
use crate::shader::{BlinnPhongShader, Shader};
use crate::texture::Texture;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found: {path}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {detail}")]
    Decode { path: PathBuf, detail: String },
    #[error("unsupported texture format for {path}: {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },
    #[error("unknown shader {0:?}")]
    ShaderMissing(String),
}

pub struct ResourceManager {
    meshes: HashMap<PathBuf, Arc<Mesh>>,
    textures: HashMap<PathBuf, Arc<Texture>>,
    shaders: HashMap<String, Arc<dyn Shader>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        let mut shaders: HashMap<String, Arc<dyn Shader>> = HashMap::new();
        shaders.insert("blinn_phong".into(), Arc::new(BlinnPhongShader));
        Self {
            meshes: HashMap::new(),
            textures: HashMap::new(),
            shaders,
        }
    }

    /// Load an OBJ mesh, or build one of the generated primitives when the
    /// path uses the `builtin:` prefix (`builtin:cube`, `builtin:sphere`).
    pub fn load_mesh(&mut self, path: &Path) -> Result<Arc<Mesh>, ResourceError> {
        if let Some(mesh) = self.meshes.get(path) {
            debug!("mesh cache hit: {}", path.display());
            return Ok(Arc::clone(mesh));
        }

        let mesh = match path.to_str().and_then(|s| s.strip_prefix("builtin:")) {
            Some("cube") => Arc::new(Mesh::cube(1.0)),
            Some("sphere") => Arc::new(Mesh::sphere(1.0, 3)),
            Some(other) => {
                return Err(ResourceError::Decode {
                    path: path.to_path_buf(),
                    detail: format!("unknown builtin mesh {other:?}"),
                });
            }
            None => Arc::new(Mesh::load_obj(path)?),
        };
        info!(
            "loaded mesh {} ({} faces)",
            path.display(),
            mesh.num_faces()
        );
        self.meshes.insert(path.to_path_buf(), Arc::clone(&mesh));
        Ok(mesh)
    }

    /// Load a TGA/DDS texture; `builtin:checker` yields a generated
    /// checkerboard.
    pub fn load_texture(&mut self, path: &Path) -> Result<Arc<Texture>, ResourceError> {
        if let Some(texture) = self.textures.get(path) {
            debug!("texture cache hit: {}", path.display());
            return Ok(Arc::clone(texture));
        }

        let texture = if path.to_str() == Some("builtin:checker") {
            Arc::new(Texture::checkerboard(
                256,
                32,
                crate::math::Vec3::splat(0.9),
                crate::math::Vec3::splat(0.2),
            ))
        } else {
            Arc::new(Texture::load(path)?)
        };
        info!(
            "loaded texture {} ({}x{}, {} mips)",
            path.display(),
            texture.width(),
            texture.height(),
            texture.num_levels()
        );
        self.textures.insert(path.to_path_buf(), Arc::clone(&texture));
        Ok(texture)
    }

    pub fn shader(&self, name: &str) -> Result<Arc<dyn Shader>, ResourceError> {
        self.shaders
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| ResourceError::ShaderMissing(name.to_string()))
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
