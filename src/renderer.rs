//! The rasterizer: draw-command submission, vertex processing, near-plane
//! rejection, viewport mapping, backface culling, scanline fill with
//! perspective-correct interpolation, and parallel face dispatch.

use std::sync::Arc;

use log::error;
use thiserror::Error;

use crate::display::Framebuffer;
use crate::light::Light;
use crate::material::Material;
use crate::math::{lerp, lerp2, lerp3, Mat4, Vec2, Vec3};
use crate::mesh::Mesh;
use crate::pool::{PoolError, WorkerPool};
use crate::shader::{Shader, Uniforms, VertexInput, Varyings};

/// Minimum faces per worker batch; fewer batches than workers is fine,
/// more is not
const MIN_FACES_PER_BATCH: usize = 10;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("{0} worker task(s) panicked during submit")]
    WorkerPanic(usize),
}

/// One object to draw this frame: mesh + material + world matrix
#[derive(Clone)]
pub struct DrawCommand {
    pub mesh: Arc<Mesh>,
    pub material: Arc<Material>,
    pub world: Mat4,
}

/// A vertex after projection and viewport mapping
#[derive(Clone, Copy)]
struct ScreenVertex {
    x: i32,
    y: i32,
    z: f32,
    inv_w: f32,
    varyings: Varyings,
}

/// Everything a face batch needs, shared read-only across workers
struct FaceJob {
    mesh: Arc<Mesh>,
    shader: Arc<dyn Shader>,
    uniforms: Uniforms,
    framebuffer: Arc<Framebuffer>,
}

pub struct Renderer {
    framebuffer: Arc<Framebuffer>,
    pool: Arc<WorkerPool>,
    view: Mat4,
    projection: Mat4,
    camera_position: Vec3,
    lights: Vec<Light>,
    ambient_light: Vec3,
}

impl Renderer {
    pub fn new(framebuffer: Arc<Framebuffer>, pool: Arc<WorkerPool>) -> Self {
        Self {
            framebuffer,
            pool,
            view: Mat4::identity(),
            projection: Mat4::identity(),
            camera_position: Vec3::zero(),
            lights: Vec::new(),
            ambient_light: Vec3::splat(0.1),
        }
    }

    /// Per-frame camera state, set by the glue before submitting
    pub fn set_camera_params(&mut self, view: Mat4, projection: Mat4, camera_position: Vec3) {
        self.view = view;
        self.projection = projection;
        self.camera_position = camera_position;
    }

    pub fn set_lights(&mut self, lights: Vec<Light>) {
        self.lights = lights;
    }

    pub fn set_ambient_light(&mut self, color: Vec3) {
        self.ambient_light = color;
    }

    /// Fill the color buffer with `bg` and reset depth to 1.0
    pub fn clear(&self, bg: Vec3) {
        self.framebuffer.clear(bg);
    }

    /// Draw one command: configure uniforms, fan face batches out to the
    /// pool, and block until every face has been rasterized.
    pub fn submit(&self, command: &DrawCommand) -> Result<(), RenderError> {
        let uniforms = Uniforms::build(
            &command.material,
            command.world,
            self.view,
            self.projection,
            self.camera_position,
            &self.lights,
            self.ambient_light,
        );

        let job = Arc::new(FaceJob {
            mesh: Arc::clone(&command.mesh),
            shader: Arc::clone(&command.material.shader),
            uniforms,
            framebuffer: Arc::clone(&self.framebuffer),
        });

        let num_faces = job.mesh.num_faces();
        if num_faces == 0 {
            return Ok(());
        }

        let per_batch = num_faces
            .div_ceil(self.pool.num_threads())
            .max(MIN_FACES_PER_BATCH);

        let mut start = 0;
        while start < num_faces {
            let end = (start + per_batch).min(num_faces);
            let job = Arc::clone(&job);
            self.pool.enqueue(move || {
                for face_idx in start..end {
                    process_face(&job, face_idx);
                }
            })?;
            start = end;
        }

        let panicked = self.pool.wait_for_completion();
        if panicked > 0 {
            error!("{panicked} rasterizer task(s) panicked");
            return Err(RenderError::WorkerPanic(panicked));
        }
        Ok(())
    }

    /// Block until all outstanding face batches finish
    pub fn wait_for_completion(&self) {
        self.pool.wait_for_completion();
    }

    /// Flip the finished frame top-to-bottom for presentation
    pub fn flip_vertical(&self) {
        self.framebuffer.flip_vertical(&self.pool);
    }

    pub fn framebuffer(&self) -> &Arc<Framebuffer> {
        &self.framebuffer
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}

/// Transform, clip-test, project, cull and rasterize one face
fn process_face(job: &FaceJob, face_idx: usize) {
    let mesh = &job.mesh;
    let face = &mesh.faces[face_idx];

    let mut varyings = [Varyings::default(); 3];
    let mut visible = false;
    for k in 0..3 {
        let vi = face.vert[k];
        let input = VertexInput {
            position: mesh.positions.get(vi).copied().unwrap_or_default(),
            normal: mesh.normals.get(face.norm[k]).copied().unwrap_or_default(),
            uv: mesh.uvs.get(face.uv[k]).copied().unwrap_or_default(),
            tangent: mesh.tangents.get(vi).copied().unwrap_or_default(),
            bitangent: mesh.bitangents.get(vi).copied().unwrap_or_default(),
        };
        varyings[k] = job.shader.vertex(&input, &job.uniforms);

        // In front of the near plane under this projection convention,
        // where the frustum interior is -w <= z <= w
        let clip = varyings[k].clip_position;
        if clip.w > 0.0 && clip.z >= -clip.w && clip.z <= clip.w {
            visible = true;
        }
    }
    if !visible {
        return;
    }

    // A vertex at or behind w = 0 cannot be projected; near-plane
    // rejection only, no clipping
    if varyings.iter().any(|v| v.clip_position.w <= 0.0) {
        return;
    }

    let width = job.framebuffer.width() as f32;
    let height = job.framebuffer.height() as f32;
    let screen: [ScreenVertex; 3] = std::array::from_fn(|k| {
        let clip = varyings[k].clip_position;
        let inv_w = 1.0 / clip.w;
        let ndc = clip.xyz() * inv_w;
        ScreenVertex {
            x: ((ndc.x + 1.0) * 0.5 * width) as i32,
            y: ((ndc.y + 1.0) * 0.5 * height) as i32,
            z: (ndc.z + 1.0) * 0.5,
            inv_w,
            varyings: varyings[k],
        }
    });

    // Screen-space backface cull: counter-clockwise is front-facing
    let signed_area = ((screen[1].x - screen[0].x) as f32 * (screen[2].y - screen[0].y) as f32)
        - ((screen[2].x - screen[0].x) as f32 * (screen[1].y - screen[0].y) as f32);
    if signed_area < 0.0 {
        return;
    }

    let (ddx_uv, ddy_uv) = uv_gradients(&screen);
    draw_triangle(job, screen[0], screen[1], screen[2], ddx_uv, ddy_uv);
}

/// Per-triangle screen-space UV derivatives, solved from the vertices'
/// positions and UVs treated as affine over the screen. Degenerate
/// triangles report zero footprint.
fn uv_gradients(screen: &[ScreenVertex; 3]) -> (Vec2, Vec2) {
    let x0 = screen[0].x as f32;
    let y0 = screen[0].y as f32;
    let dx1 = screen[1].x as f32 - x0;
    let dy1 = screen[1].y as f32 - y0;
    let dx2 = screen[2].x as f32 - x0;
    let dy2 = screen[2].y as f32 - y0;

    let denom = dx1 * dy2 - dx2 * dy1;
    if denom.abs() < 1e-6 {
        return (Vec2::zero(), Vec2::zero());
    }

    let duv1 = screen[1].varyings.uv - screen[0].varyings.uv;
    let duv2 = screen[2].varyings.uv - screen[0].varyings.uv;

    let ddx = (duv1 * dy2 - duv2 * dy1) / denom;
    let ddy = (duv2 * dx1 - duv1 * dx2) / denom;
    (ddx, ddy)
}

/// Split the triangle at the middle vertex and fill both halves
fn draw_triangle(
    job: &FaceJob,
    mut v0: ScreenVertex,
    mut v1: ScreenVertex,
    mut v2: ScreenVertex,
    ddx_uv: Vec2,
    ddy_uv: Vec2,
) {
    // Sort by y ascending
    if v0.y > v1.y {
        std::mem::swap(&mut v0, &mut v1);
    }
    if v0.y > v2.y {
        std::mem::swap(&mut v0, &mut v2);
    }
    if v1.y > v2.y {
        std::mem::swap(&mut v1, &mut v2);
    }

    // Degenerate: zero height or all vertices on one column
    if v0.y == v2.y || (v0.x == v1.x && v1.x == v2.x) {
        return;
    }

    // Flat-bottom half between the long edge v0->v2 and short edge v0->v1
    if v0.y < v1.y {
        draw_scanlines(job, v0.y, v1.y, &v0, &v2, &v0, &v1, ddx_uv, ddy_uv);
    }
    // Flat-top half between v1->v2 and the long edge v0->v2
    if v1.y < v2.y {
        draw_scanlines(job, v1.y, v2.y, &v1, &v2, &v0, &v2, ddx_uv, ddy_uv);
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_scanlines(
    job: &FaceJob,
    y_start: i32,
    y_end: i32,
    a_start: &ScreenVertex,
    a_end: &ScreenVertex,
    b_start: &ScreenVertex,
    b_end: &ScreenVertex,
    ddx_uv: Vec2,
    ddy_uv: Vec2,
) {
    let fb = &job.framebuffer;
    let dy_a = (a_end.y - a_start.y) as f32;
    let dy_b = (b_end.y - b_start.y) as f32;

    let y_start = y_start.max(0);
    let y_end = y_end.min(fb.height() as i32 - 1);

    for y in y_start..=y_end {
        let t_a = if dy_a.abs() > 1e-6 {
            (((y - a_start.y) as f32) / dy_a).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let t_b = if dy_b.abs() > 1e-6 {
            (((y - b_start.y) as f32) / dy_b).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Screen x, depth and 1/w interpolate linearly along the edges
        let mut xa = lerp(a_start.x as f32, a_end.x as f32, t_a);
        let mut xb = lerp(b_start.x as f32, b_end.x as f32, t_b);
        let mut za = lerp(a_start.z, a_end.z, t_a);
        let mut zb = lerp(b_start.z, b_end.z, t_b);
        let mut inv_wa = lerp(a_start.inv_w, a_end.inv_w, t_a);
        let mut inv_wb = lerp(b_start.inv_w, b_end.inv_w, t_b);

        // Varyings interpolate perspective-correctly along the edges
        let mut var_a = interpolate_varyings(
            t_a,
            &a_start.varyings,
            &a_end.varyings,
            a_start.inv_w,
            a_end.inv_w,
        );
        let mut var_b = interpolate_varyings(
            t_b,
            &b_start.varyings,
            &b_end.varyings,
            b_start.inv_w,
            b_end.inv_w,
        );

        if xa > xb {
            std::mem::swap(&mut xa, &mut xb);
            std::mem::swap(&mut za, &mut zb);
            std::mem::swap(&mut inv_wa, &mut inv_wb);
            std::mem::swap(&mut var_a, &mut var_b);
        }

        let x_start = (xa.ceil() as i32).max(0);
        let x_end = (xb.floor() as i32).min(fb.width() as i32 - 1);
        let dx = xb - xa;

        for x in x_start..=x_end {
            let t_h = if dx.abs() > 1e-6 {
                ((x as f32 - xa) / dx).clamp(0.0, 1.0)
            } else {
                0.0
            };

            let depth = lerp(za, zb, t_h);
            // Early rejection against a possibly-stale depth read; the
            // write re-tests under the pixel lock
            if depth >= fb.depth_at(x, y) {
                continue;
            }

            let fragment = interpolate_varyings(t_h, &var_a, &var_b, inv_wa, inv_wb);
            if let Some(color) = job.shader.fragment(&fragment, ddx_uv, ddy_uv, &job.uniforms) {
                fb.set_pixel(x, y, color, depth);
            }
        }
    }
}

/// Perspective-correct interpolation of a scalar-weighted attribute:
/// lerp the attribute pre-multiplied by 1/w, then divide by the
/// interpolated 1/w. Near-zero 1/w falls back to the midpoint.
macro_rules! persp_interp {
    ($lerp:path, $t:expr, $start:expr, $end:expr, $inv_w_s:expr, $inv_w_e:expr, $inv_w_t:expr) => {{
        if $inv_w_t.abs() < 1e-6 {
            ($start + $end) * 0.5
        } else {
            $lerp($start * $inv_w_s, $end * $inv_w_e, $t) * (1.0 / $inv_w_t)
        }
    }};
}

/// Interpolate every Varyings field perspective-correctly except
/// `clip_position`, which the fragment stage never reads.
fn interpolate_varyings(
    t: f32,
    start: &Varyings,
    end: &Varyings,
    inv_w_start: f32,
    inv_w_end: f32,
) -> Varyings {
    let inv_w_t = lerp(inv_w_start, inv_w_end, t);

    Varyings {
        clip_position: start.clip_position,
        world_position: persp_interp!(
            lerp3,
            t,
            start.world_position,
            end.world_position,
            inv_w_start,
            inv_w_end,
            inv_w_t
        ),
        normal: persp_interp!(lerp3, t, start.normal, end.normal, inv_w_start, inv_w_end, inv_w_t),
        tangent: persp_interp!(
            lerp3, t, start.tangent, end.tangent, inv_w_start, inv_w_end, inv_w_t
        ),
        bitangent: persp_interp!(
            lerp3,
            t,
            start.bitangent,
            end.bitangent,
            inv_w_start,
            inv_w_end,
            inv_w_t
        ),
        uv: persp_interp!(lerp2, t, start.uv, end.uv, inv_w_start, inv_w_end, inv_w_t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec4;
    use crate::mesh::Face;
    use crate::shader::BlinnPhongShader;

    fn flat_mesh(positions: Vec<Vec3>, faces: Vec<Face>) -> Arc<Mesh> {
        let n = positions.len();
        Arc::new(Mesh {
            positions,
            normals: vec![Vec3::new(0.0, 0.0, 1.0); n],
            uvs: vec![Vec2::zero(); n],
            tangents: vec![Vec3::new(1.0, 0.0, 0.0); n],
            bitangents: vec![Vec3::new(0.0, 1.0, 0.0); n],
            faces,
        })
    }

    fn tri_face() -> Face {
        Face {
            vert: [0, 1, 2],
            uv: [0, 1, 2],
            norm: [0, 1, 2],
        }
    }

    /// Material whose output is a constant ambient color
    fn flat_material(color: Vec3) -> Arc<Material> {
        let mut m = Material::new(Arc::new(BlinnPhongShader));
        m.ambient_color = color;
        m.diffuse_color = Vec3::zero();
        m.specular_color = Vec3::zero();
        Arc::new(m)
    }

    fn test_renderer(width: usize, height: usize) -> (Renderer, Arc<Framebuffer>) {
        let fb = Arc::new(Framebuffer::new(width, height));
        let pool = Arc::new(WorkerPool::new(2));
        let mut renderer = Renderer::new(Arc::clone(&fb), pool);
        renderer.set_ambient_light(Vec3::splat(1.0));
        (renderer, fb)
    }

    #[test]
    fn test_blank_frame() {
        let (renderer, fb) = test_renderer(16, 16);
        renderer.clear(Vec3::splat(0.5));
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(fb.color_at(x, y), Vec3::splat(0.5));
                assert_eq!(fb.depth_at(x, y), 1.0);
            }
        }
    }

    #[test]
    fn test_fullscreen_triangle_flat_color() {
        let (renderer, fb) = test_renderer(16, 16);
        renderer.clear(Vec3::zero());

        // Clip coords equal positions under identity matrices
        let mesh = flat_mesh(
            vec![
                Vec3::new(-2.0, -2.0, 0.0),
                Vec3::new(2.0, -2.0, 0.0),
                Vec3::new(0.0, 2.0, 0.0),
            ],
            vec![tri_face()],
        );
        let command = DrawCommand {
            mesh,
            material: flat_material(Vec3::new(1.0, 0.0, 0.0)),
            world: Mat4::identity(),
        };
        renderer.submit(&command).unwrap();

        // Center covered, red
        assert!(fb.color_at(8, 8).approx_eq(&Vec3::new(1.0, 0.0, 0.0), 1e-5));
        // Top corners outside the triangle keep the background
        assert_eq!(fb.color_at(0, 15), Vec3::zero());
        assert_eq!(fb.color_at(15, 15), Vec3::zero());
    }

    #[test]
    fn test_depth_occlusion_between_submits() {
        let (renderer, fb) = test_renderer(16, 16);
        renderer.clear(Vec3::zero());

        let tri = |z: f32| {
            flat_mesh(
                vec![
                    Vec3::new(-2.0, -2.0, z),
                    Vec3::new(2.0, -2.0, z),
                    Vec3::new(0.0, 2.0, z),
                ],
                vec![tri_face()],
            )
        };

        // Far quad first, then near: near must win everywhere they overlap
        renderer
            .submit(&DrawCommand {
                mesh: tri(0.6),
                material: flat_material(Vec3::new(0.0, 1.0, 0.0)),
                world: Mat4::identity(),
            })
            .unwrap();
        renderer
            .submit(&DrawCommand {
                mesh: tri(-0.6),
                material: flat_material(Vec3::new(1.0, 0.0, 0.0)),
                world: Mat4::identity(),
            })
            .unwrap();

        assert!(fb.color_at(8, 8).approx_eq(&Vec3::new(1.0, 0.0, 0.0), 1e-5));
        assert!((fb.depth_at(8, 8) - 0.2).abs() < 1e-5);

        // Submission order must not matter
        renderer.clear(Vec3::zero());
        renderer
            .submit(&DrawCommand {
                mesh: tri(-0.6),
                material: flat_material(Vec3::new(1.0, 0.0, 0.0)),
                world: Mat4::identity(),
            })
            .unwrap();
        renderer
            .submit(&DrawCommand {
                mesh: tri(0.6),
                material: flat_material(Vec3::new(0.0, 1.0, 0.0)),
                world: Mat4::identity(),
            })
            .unwrap();
        assert!(fb.color_at(8, 8).approx_eq(&Vec3::new(1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_backface_culled() {
        let (renderer, fb) = test_renderer(16, 16);
        renderer.clear(Vec3::zero());

        // Reverse winding of the full-screen triangle
        let mesh = flat_mesh(
            vec![
                Vec3::new(-2.0, -2.0, 0.0),
                Vec3::new(0.0, 2.0, 0.0),
                Vec3::new(2.0, -2.0, 0.0),
            ],
            vec![tri_face()],
        );
        renderer
            .submit(&DrawCommand {
                mesh,
                material: flat_material(Vec3::splat(1.0)),
                world: Mat4::identity(),
            })
            .unwrap();

        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(fb.color_at(x, y), Vec3::zero());
            }
        }
    }

    #[test]
    fn test_behind_camera_rejected() {
        let (mut renderer, fb) = test_renderer(16, 16);
        renderer.set_camera_params(
            Mat4::identity(),
            Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0),
            Vec3::zero(),
        );
        renderer.clear(Vec3::zero());

        // Positive view-space z: behind the camera, every clip w <= 0
        let mesh = flat_mesh(
            vec![
                Vec3::new(-2.0, -2.0, 1.0),
                Vec3::new(2.0, -2.0, 1.0),
                Vec3::new(0.0, 2.0, 1.0),
            ],
            vec![tri_face()],
        );
        renderer
            .submit(&DrawCommand {
                mesh,
                material: flat_material(Vec3::splat(1.0)),
                world: Mat4::identity(),
            })
            .unwrap();

        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(fb.color_at(x, y), Vec3::zero());
            }
        }
    }

    #[test]
    fn test_empty_mesh_is_noop() {
        let (renderer, _fb) = test_renderer(8, 8);
        let mesh = flat_mesh(Vec::new(), Vec::new());
        renderer
            .submit(&DrawCommand {
                mesh,
                material: flat_material(Vec3::splat(1.0)),
                world: Mat4::identity(),
            })
            .unwrap();
    }

    #[test]
    fn test_determinism_across_worker_counts() {
        let render_with = |threads: usize| {
            let fb = Arc::new(Framebuffer::new(32, 32));
            let pool = Arc::new(WorkerPool::new(threads));
            let mut renderer = Renderer::new(Arc::clone(&fb), pool);
            renderer.set_ambient_light(Vec3::splat(1.0));
            renderer.clear(Vec3::zero());

            // Several overlapping triangles at different depths
            for i in 0..6 {
                let z = -0.8 + i as f32 * 0.3;
                let offset = i as f32 * 0.1 - 0.3;
                let mesh = flat_mesh(
                    vec![
                        Vec3::new(-1.5 + offset, -1.5, z),
                        Vec3::new(1.5 + offset, -1.5, z),
                        Vec3::new(offset, 1.5, z),
                    ],
                    vec![tri_face()],
                );
                let shade = (i + 1) as f32 / 6.0;
                renderer
                    .submit(&DrawCommand {
                        mesh,
                        material: flat_material(Vec3::splat(shade)),
                        world: Mat4::identity(),
                    })
                    .unwrap();
            }

            let mut colors = Vec::new();
            let mut depths = Vec::new();
            for y in 0..32 {
                for x in 0..32 {
                    colors.push(fb.color_at(x, y));
                    depths.push(fb.depth_at(x, y));
                }
            }
            (colors, depths)
        };

        let (c1, d1) = render_with(1);
        let (c4, d4) = render_with(4);
        assert_eq!(c1, c4);
        assert_eq!(d1, d4);
    }

    #[test]
    fn test_perspective_correct_interpolation_midpoint() {
        // A segment from w=1 to w=4: at t=0.5 the perspective-correct
        // value is weighted toward the w=1 end
        let start = Varyings {
            clip_position: Vec4::new(0.0, 0.0, 0.0, 1.0),
            uv: Vec2::new(0.0, 0.0),
            ..Default::default()
        };
        let end = Varyings {
            clip_position: Vec4::new(0.0, 0.0, 0.0, 4.0),
            uv: Vec2::new(1.0, 0.0),
            ..Default::default()
        };

        let mid = interpolate_varyings(0.5, &start, &end, 1.0, 0.25);
        // (0*1 + 1*0.25)/2 / ((1+0.25)/2) = 0.125/0.625 = 0.2
        assert!((mid.uv.x - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_affine_case_reduces_to_linear() {
        // Equal w on both ends: perspective-correct equals plain lerp
        let start = Varyings {
            uv: Vec2::new(0.2, 0.0),
            ..Default::default()
        };
        let end = Varyings {
            uv: Vec2::new(0.8, 0.0),
            ..Default::default()
        };
        let mid = interpolate_varyings(0.5, &start, &end, 0.5, 0.5);
        assert!((mid.uv.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_uv_gradients_unit_quadrant() {
        // Triangle spanning 10x10 pixels with UVs spanning 1: gradient is
        // 0.1 per pixel in each direction
        let make = |x: i32, y: i32, u: f32, v: f32| ScreenVertex {
            x,
            y,
            z: 0.0,
            inv_w: 1.0,
            varyings: Varyings {
                uv: Vec2::new(u, v),
                ..Default::default()
            },
        };
        let screen = [
            make(0, 0, 0.0, 0.0),
            make(10, 0, 1.0, 0.0),
            make(0, 10, 0.0, 1.0),
        ];
        let (ddx, ddy) = uv_gradients(&screen);
        assert!(ddx.approx_eq(&Vec2::new(0.1, 0.0), 1e-6));
        assert!(ddy.approx_eq(&Vec2::new(0.0, 0.1), 1e-6));
    }
}
