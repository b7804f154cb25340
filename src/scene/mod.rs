//! Scene graph: objects with transforms and materials, lights, the
//! camera, the per-frame animation tick and draw-command emission.

mod camera;
mod config;

pub use camera::Camera;
pub use config::{
    AnimationConfig, CameraConfig, LightConfig, MaterialConfig, ObjectConfig, SceneFile,
    TransformConfig,
};

use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};

use crate::light::Light;
use crate::material::Material;
use crate::math::{Transform, Vec3};
use crate::mesh::Mesh;
use crate::renderer::{DrawCommand, RenderError, Renderer};
use crate::resources::ResourceManager;
use config::vec3;

#[derive(Debug, Clone, Copy, Default)]
pub enum Animation {
    #[default]
    None,
    /// Spin around world Y at `speed` degrees per second
    RotateY { speed: f32 },
}

pub struct SceneObject {
    pub mesh: Arc<Mesh>,
    pub material: Arc<Material>,
    pub transform: Transform,
    pub animation: Animation,
}

pub struct Scene {
    pub camera: Camera,
    pub lights: Vec<Light>,
    pub objects: Vec<SceneObject>,
    pub ambient_light: Vec3,
    pub background: Vec3,
}

impl Scene {
    /// Load a scene description, resolving meshes/textures/shaders through
    /// the cache. Objects that fail to load are skipped with an error log;
    /// an unreadable scene file falls back to the default scene.
    pub fn load(path: &Path, aspect: f32, resources: &mut ResourceManager) -> Self {
        match SceneFile::load(path) {
            Ok(file) => {
                info!("loaded scene {}", path.display());
                Self::from_config(&file, aspect, resources)
            }
            Err(e) => {
                error!("failed to parse scene {}: {e}", path.display());
                Self::default_scene(aspect)
            }
        }
    }

    pub fn from_config(file: &SceneFile, aspect: f32, resources: &mut ResourceManager) -> Self {
        let cam = &file.camera;
        let mut camera = Camera::new(vec3(cam.position), cam.yaw, cam.pitch);
        camera.set_perspective(cam.fov, cam.aspect.unwrap_or(aspect), cam.near, cam.far);

        let mut lights = Vec::new();
        for light in &file.lights {
            match light.kind.as_str() {
                "directional" => {
                    let direction = light.direction.map(vec3).unwrap_or_else(|| {
                        warn!("directional light without direction, using -z");
                        Vec3::new(0.0, 0.0, -1.0)
                    });
                    lights.push(Light::directional(
                        direction,
                        vec3(light.color),
                        light.intensity,
                    ));
                }
                "point" => {
                    let position = light.position.map(vec3).unwrap_or_else(|| {
                        warn!("point light without position, using origin");
                        Vec3::zero()
                    });
                    lights.push(Light::point(position, vec3(light.color), light.intensity));
                }
                other => warn!("skipping light with unknown type {other:?}"),
            }
        }

        let mut objects = Vec::new();
        for obj in &file.objects {
            match build_object(obj, resources) {
                Ok(object) => objects.push(object),
                Err(e) => error!("skipping object {}: {e}", obj.model),
            }
        }

        Self {
            camera,
            lights,
            objects,
            ambient_light: vec3(file.ambient_light),
            background: vec3(file.background),
        }
    }

    /// Fallback scene: camera at (0, 1, 3) looking down -Z, one
    /// directional light, nothing to draw.
    pub fn default_scene(aspect: f32) -> Self {
        let mut camera = Camera::new(Vec3::new(0.0, 1.0, 3.0), 0.0, 0.0);
        camera.set_perspective(45.0, aspect, 0.1, 100.0);

        Self {
            camera,
            lights: vec![Light::directional(
                Vec3::new(0.707, 0.0, -0.707),
                Vec3::splat(1.0),
                1.0,
            )],
            objects: Vec::new(),
            ambient_light: Vec3::splat(0.1),
            background: Vec3::splat(0.5),
        }
    }

    /// Advance animations by `dt` seconds
    pub fn update(&mut self, dt: f32) {
        for object in &mut self.objects {
            if let Animation::RotateY { speed } = object.animation {
                let mut angle = object.transform.rotation_euler().y + speed * dt;
                if angle > 360.0 {
                    angle -= 360.0;
                }
                object
                    .transform
                    .set_rotation_euler(Vec3::new(0.0, angle, 0.0));
            }
        }
    }

    /// Render one frame: configure the renderer, clear, submit every
    /// object, then flip the framebuffer for presentation.
    pub fn render(&self, renderer: &mut Renderer) -> Result<(), RenderError> {
        renderer.set_camera_params(
            self.camera.view_matrix(),
            self.camera.projection_matrix(),
            self.camera.position(),
        );
        renderer.set_lights(self.lights.clone());
        renderer.set_ambient_light(self.ambient_light);
        renderer.clear(self.background);

        for object in &self.objects {
            renderer.submit(&DrawCommand {
                mesh: Arc::clone(&object.mesh),
                material: Arc::clone(&object.material),
                world: object.transform.matrix(),
            })?;
        }

        renderer.flip_vertical();
        Ok(())
    }
}

fn build_object(
    config: &ObjectConfig,
    resources: &mut ResourceManager,
) -> Result<SceneObject, String> {
    let mesh = resources
        .load_mesh(Path::new(&config.model))
        .map_err(|e| e.to_string())?;

    let mat = &config.material;
    let shader = resources.shader(&mat.shader).map_err(|e| e.to_string())?;
    let mut material = Material::new(shader);
    material.ambient_color = vec3(mat.ambient_color);
    material.diffuse_color = vec3(mat.diffuse_color);
    material.specular_color = vec3(mat.specular_color);
    material.shininess = mat.shininess;

    // A missing texture skips just that map, not the object
    let mut load_map = |path: &Option<String>, slot_name: &str| match path {
        Some(p) => match resources.load_texture(Path::new(p)) {
            Ok(texture) => Some(texture),
            Err(e) => {
                error!("{slot_name} map for {}: {e}", config.model);
                None
            }
        },
        None => None,
    };
    material.diffuse_texture = load_map(&mat.diffuse_texture, "diffuse");
    material.normal_texture = load_map(&mat.normal_texture, "normal");
    material.ao_texture = load_map(&mat.ao_texture, "ao");
    material.specular_texture = load_map(&mat.specular_texture, "specular");
    material.gloss_texture = load_map(&mat.gloss_texture, "gloss");

    let t = &config.transform;
    let transform = Transform::from_euler(vec3(t.position), vec3(t.rotation), vec3(t.scale));

    let animation = match &t.animation {
        Some(anim) if anim.kind == "rotate_y" => Animation::RotateY { speed: anim.speed },
        Some(anim) => {
            warn!("unknown animation type {:?} on {}", anim.kind, config.model);
            Animation::None
        }
        None => Animation::None,
    };

    Ok(SceneObject {
        mesh,
        material: Arc::new(material),
        transform,
        animation,
    })
}
