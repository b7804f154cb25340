//! Indexed triangle meshes: OBJ parsing and tangent-basis synthesis.

use std::fs;
use std::path::Path;

use crate::math::{Vec2, Vec3};
use crate::resources::ResourceError;

/// One triangle, indexing the position/uv/normal arrays separately
#[derive(Debug, Clone, Copy)]
pub struct Face {
    pub vert: [usize; 3],
    pub uv: [usize; 3],
    pub norm: [usize; 3],
}

/// Triangle mesh with per-vertex attributes.
/// Tangents and bitangents are indexed by position index.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub tangents: Vec<Vec3>,
    pub bitangents: Vec<Vec3>,
    pub faces: Vec<Face>,
}

impl Mesh {
    pub fn load_obj(path: &Path) -> Result<Self, ResourceError> {
        let text = fs::read_to_string(path).map_err(|source| ResourceError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let mut mesh = Self::parse_obj(&text).map_err(|detail| ResourceError::Decode {
            path: path.to_path_buf(),
            detail,
        })?;
        mesh.compute_tangents();
        Ok(mesh)
    }

    /// Parse Wavefront OBJ text: `v`, `vt`, `vn` and `f` records.
    /// Face vertices are `v`, `v/vt`, `v//vn` or `v/vt/vn` with 1-based
    /// indices; faces with more than three vertices are fan-triangulated.
    pub fn parse_obj(text: &str) -> Result<Self, String> {
        let mut mesh = Mesh::default();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let tag = parts.next().unwrap_or_default();
            match tag {
                "v" => {
                    let v = parse_floats::<3>(&mut parts)
                        .ok_or_else(|| format!("line {}: bad vertex", line_no + 1))?;
                    mesh.positions.push(Vec3::new(v[0], v[1], v[2]));
                }
                "vt" => {
                    let v = parse_floats::<2>(&mut parts)
                        .ok_or_else(|| format!("line {}: bad uv", line_no + 1))?;
                    mesh.uvs.push(Vec2::new(v[0], v[1]));
                }
                "vn" => {
                    let v = parse_floats::<3>(&mut parts)
                        .ok_or_else(|| format!("line {}: bad normal", line_no + 1))?;
                    mesh.normals.push(Vec3::new(v[0], v[1], v[2]));
                }
                "f" => {
                    let corners: Vec<(usize, Option<usize>, Option<usize>)> = parts
                        .map(parse_face_corner)
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| format!("line {}: bad face", line_no + 1))?;
                    if corners.len() < 3 {
                        return Err(format!("line {}: face with <3 vertices", line_no + 1));
                    }
                    // Fan triangulation around the first corner
                    for i in 1..corners.len() - 1 {
                        mesh.push_face(corners[0], corners[i], corners[i + 1]);
                    }
                }
                _ => {} // other records (o, g, s, mtllib, ...) ignored
            }
        }

        if mesh.positions.is_empty() || mesh.faces.is_empty() {
            return Err("no geometry".into());
        }

        // Validate indices up front so rasterization can index unchecked
        for face in &mesh.faces {
            for k in 0..3 {
                if face.vert[k] >= mesh.positions.len() {
                    return Err(format!("face vertex index {} out of range", face.vert[k]));
                }
            }
        }

        mesh.fill_missing_attributes();
        Ok(mesh)
    }

    fn push_face(
        &mut self,
        a: (usize, Option<usize>, Option<usize>),
        b: (usize, Option<usize>, Option<usize>),
        c: (usize, Option<usize>, Option<usize>),
    ) {
        self.faces.push(Face {
            vert: [a.0, b.0, c.0],
            uv: [a.1.unwrap_or(0), b.1.unwrap_or(0), c.1.unwrap_or(0)],
            norm: [a.2.unwrap_or(0), b.2.unwrap_or(0), c.2.unwrap_or(0)],
        });
    }

    /// Supply defaults when the file carried no `vt`/`vn` records: a single
    /// zero UV, and smooth per-vertex normals averaged from face planes.
    fn fill_missing_attributes(&mut self) {
        if self.uvs.is_empty() {
            self.uvs.push(Vec2::zero());
        }

        if self.normals.is_empty() {
            let mut accum = vec![Vec3::zero(); self.positions.len()];
            for face in &self.faces {
                let p0 = self.positions[face.vert[0]];
                let p1 = self.positions[face.vert[1]];
                let p2 = self.positions[face.vert[2]];
                let n = (p1 - p0).cross(&(p2 - p0));
                for &vi in &face.vert {
                    accum[vi] += n;
                }
            }
            self.normals = accum.iter().map(|n| n.normalize()).collect();
            for face in &mut self.faces {
                face.norm = face.vert;
            }
        }
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Axis-aligned cube centered at origin, four vertices per side so
    /// normals and UVs stay flat across each face.
    pub fn cube(size: f32) -> Self {
        let h = size / 2.0;
        // (normal, four corners counter-clockwise seen from outside)
        let sides: [(Vec3, [Vec3; 4]); 6] = [
            (
                Vec3::new(0.0, 0.0, 1.0),
                [
                    Vec3::new(-h, -h, h),
                    Vec3::new(h, -h, h),
                    Vec3::new(h, h, h),
                    Vec3::new(-h, h, h),
                ],
            ),
            (
                Vec3::new(0.0, 0.0, -1.0),
                [
                    Vec3::new(h, -h, -h),
                    Vec3::new(-h, -h, -h),
                    Vec3::new(-h, h, -h),
                    Vec3::new(h, h, -h),
                ],
            ),
            (
                Vec3::new(-1.0, 0.0, 0.0),
                [
                    Vec3::new(-h, -h, -h),
                    Vec3::new(-h, -h, h),
                    Vec3::new(-h, h, h),
                    Vec3::new(-h, h, -h),
                ],
            ),
            (
                Vec3::new(1.0, 0.0, 0.0),
                [
                    Vec3::new(h, -h, h),
                    Vec3::new(h, -h, -h),
                    Vec3::new(h, h, -h),
                    Vec3::new(h, h, h),
                ],
            ),
            (
                Vec3::new(0.0, 1.0, 0.0),
                [
                    Vec3::new(-h, h, h),
                    Vec3::new(h, h, h),
                    Vec3::new(h, h, -h),
                    Vec3::new(-h, h, -h),
                ],
            ),
            (
                Vec3::new(0.0, -1.0, 0.0),
                [
                    Vec3::new(-h, -h, -h),
                    Vec3::new(h, -h, -h),
                    Vec3::new(h, -h, h),
                    Vec3::new(-h, -h, h),
                ],
            ),
        ];

        let mut mesh = Mesh::default();
        mesh.uvs = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        for (normal, corners) in sides {
            let base = mesh.positions.len();
            let ni = mesh.normals.len();
            mesh.normals.push(normal);
            mesh.positions.extend_from_slice(&corners);
            mesh.faces.push(Face {
                vert: [base, base + 1, base + 2],
                uv: [0, 1, 2],
                norm: [ni; 3],
            });
            mesh.faces.push(Face {
                vert: [base, base + 2, base + 3],
                uv: [0, 2, 3],
                norm: [ni; 3],
            });
        }
        mesh.compute_tangents();
        mesh
    }

    /// Unit-style sphere built by icosahedron subdivision. Normals point
    /// outward, UVs use an equirectangular mapping.
    pub fn sphere(radius: f32, subdivisions: u32) -> Self {
        use std::collections::HashMap;

        // Gets or creates the midpoint vertex between i0 and i1
        fn midpoint(
            vertices: &mut Vec<Vec3>,
            cache: &mut HashMap<(usize, usize), usize>,
            i0: usize,
            i1: usize,
            radius: f32,
        ) -> usize {
            let key = if i0 < i1 { (i0, i1) } else { (i1, i0) };
            if let Some(&idx) = cache.get(&key) {
                return idx;
            }
            let mid = ((vertices[i0] + vertices[i1]) * 0.5).normalize() * radius;
            let idx = vertices.len();
            vertices.push(mid);
            cache.insert(key, idx);
            idx
        }

        let t = (1.0 + 5.0_f32.sqrt()) / 2.0;
        let mut vertices: Vec<Vec3> = [
            Vec3::new(-1.0, t, 0.0),
            Vec3::new(1.0, t, 0.0),
            Vec3::new(-1.0, -t, 0.0),
            Vec3::new(1.0, -t, 0.0),
            Vec3::new(0.0, -1.0, t),
            Vec3::new(0.0, 1.0, t),
            Vec3::new(0.0, -1.0, -t),
            Vec3::new(0.0, 1.0, -t),
            Vec3::new(t, 0.0, -1.0),
            Vec3::new(t, 0.0, 1.0),
            Vec3::new(-t, 0.0, -1.0),
            Vec3::new(-t, 0.0, 1.0),
        ]
        .iter()
        .map(|v| v.normalize() * radius)
        .collect();

        let mut faces: Vec<[usize; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut next = Vec::with_capacity(faces.len() * 4);
            let mut cache = HashMap::new();
            for [v0, v1, v2] in faces {
                let a = midpoint(&mut vertices, &mut cache, v0, v1, radius);
                let b = midpoint(&mut vertices, &mut cache, v1, v2, radius);
                let c = midpoint(&mut vertices, &mut cache, v2, v0, radius);
                next.push([v0, a, c]);
                next.push([v1, b, a]);
                next.push([v2, c, b]);
                next.push([a, b, c]);
            }
            faces = next;
        }

        let normals: Vec<Vec3> = vertices.iter().map(|v| v.normalize()).collect();
        let uvs: Vec<Vec2> = normals
            .iter()
            .map(|n| {
                Vec2::new(
                    0.5 + n.z.atan2(n.x) / std::f32::consts::TAU,
                    0.5 - n.y.asin() / std::f32::consts::PI,
                )
            })
            .collect();

        let mut mesh = Mesh {
            positions: vertices,
            normals,
            uvs,
            tangents: Vec::new(),
            bitangents: Vec::new(),
            faces: faces
                .into_iter()
                .map(|[a, b, c]| Face {
                    vert: [a, b, c],
                    uv: [a, b, c],
                    norm: [a, b, c],
                })
                .collect(),
        };
        mesh.compute_tangents();
        mesh
    }

    /// Derive per-vertex tangent/bitangent vectors from positions, UVs and
    /// normals. Contributions accumulate across shared position indices,
    /// then each basis is Gram-Schmidt orthogonalized against the vertex
    /// normal; T is flipped when cross(N, T) . B < 0 so the basis stays
    /// right-handed. Degenerate UVs fall back to an arbitrary basis
    /// orthogonal to N.
    pub fn compute_tangents(&mut self) {
        let n = self.positions.len();
        let mut tan_accum = vec![Vec3::zero(); n];
        let mut bitan_accum = vec![Vec3::zero(); n];
        let mut normal_accum = vec![Vec3::zero(); n];

        for face in &self.faces {
            let p0 = self.positions[face.vert[0]];
            let p1 = self.positions[face.vert[1]];
            let p2 = self.positions[face.vert[2]];
            let uv0 = self.uvs.get(face.uv[0]).copied().unwrap_or_default();
            let uv1 = self.uvs.get(face.uv[1]).copied().unwrap_or_default();
            let uv2 = self.uvs.get(face.uv[2]).copied().unwrap_or_default();

            for k in 0..3 {
                let normal = self.normals.get(face.norm[k]).copied().unwrap_or_default();
                normal_accum[face.vert[k]] += normal;
            }

            let e1 = p1 - p0;
            let e2 = p2 - p0;
            let duv1 = uv1 - uv0;
            let duv2 = uv2 - uv0;

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() < 1e-12 {
                continue; // degenerate UVs contribute nothing
            }
            let r = 1.0 / det;
            let tangent = (e1 * duv2.y - e2 * duv1.y) * r;
            let bitangent = (e2 * duv1.x - e1 * duv2.x) * r;

            for &vi in &face.vert {
                tan_accum[vi] += tangent;
                bitan_accum[vi] += bitangent;
            }
        }

        self.tangents = Vec::with_capacity(n);
        self.bitangents = Vec::with_capacity(n);
        for i in 0..n {
            let normal = normal_accum[i].normalize();
            let (t, b) = if tan_accum[i].length_sq() > 1e-12 {
                // Orthogonalize T against N, rebuild B from the pair
                let t = (tan_accum[i] - normal * normal.dot(&tan_accum[i])).normalize();
                let mut b = bitan_accum[i];
                if b.length_sq() < 1e-12 {
                    b = normal.cross(&t);
                }
                let t = if normal.cross(&t).dot(&b) < 0.0 { -t } else { t };
                (t, normal.cross(&t).normalize())
            } else {
                arbitrary_basis(normal)
            };
            self.tangents.push(t);
            self.bitangents.push(b);
        }
    }
}

/// Any orthonormal (T, B) pair perpendicular to `n`, for vertices whose
/// UVs gave no usable gradient.
fn arbitrary_basis(n: Vec3) -> (Vec3, Vec3) {
    let axis = if n.x.abs() < 0.9 {
        Vec3::new(1.0, 0.0, 0.0)
    } else {
        Vec3::new(0.0, 1.0, 0.0)
    };
    let t = axis.cross(&n).normalize();
    let b = n.cross(&t).normalize();
    (t, b)
}

fn parse_floats<const N: usize>(parts: &mut std::str::SplitWhitespace) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    Some(out)
}

/// Parse one `v`, `v/vt`, `v//vn` or `v/vt/vn` face corner (1-based)
fn parse_face_corner(s: &str) -> Option<(usize, Option<usize>, Option<usize>)> {
    let mut it = s.split('/');
    let v = it.next()?.parse::<usize>().ok()?.checked_sub(1)?;
    let vt = match it.next() {
        Some("") | None => None,
        Some(t) => Some(t.parse::<usize>().ok()?.checked_sub(1)?),
    };
    let vn = match it.next() {
        Some("") | None => None,
        Some(t) => Some(t.parse::<usize>().ok()?.checked_sub(1)?),
    };
    Some((v, vt, vn))
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_OBJ: &str = "\
# flat quad in the xy plane
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_parse_quad_fan_triangulated() {
        let mesh = Mesh::parse_obj(QUAD_OBJ).unwrap();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.uvs.len(), 4);
        assert_eq!(mesh.normals.len(), 1);
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.faces[0].vert, [0, 1, 2]);
        assert_eq!(mesh.faces[1].vert, [0, 2, 3]);
    }

    #[test]
    fn test_parse_position_only_face() {
        let mesh = Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.num_faces(), 1);
        // Missing attributes are synthesized
        assert!(!mesh.normals.is_empty());
        assert!(!mesh.uvs.is_empty());
        assert!(mesh.normals[0].approx_eq(&Vec3::new(0.0, 0.0, 1.0), 1e-6));
    }

    #[test]
    fn test_parse_missing_uv_slot() {
        let mesh =
            Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n").unwrap();
        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(mesh.normals.len(), 1);
    }

    #[test]
    fn test_comments_and_blanks_ignored() {
        let mesh =
            Mesh::parse_obj("# header\n\nv 0 0 0\nv 1 0 0\nv 0 1 0\n\n# faces\nf 1 2 3\n")
                .unwrap();
        assert_eq!(mesh.num_faces(), 1);
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        assert!(Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n").is_err());
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(Mesh::parse_obj("# nothing here\n").is_err());
    }

    #[test]
    fn test_tangents_orthonormal_right_handed() {
        let mut mesh = Mesh::parse_obj(QUAD_OBJ).unwrap();
        mesh.compute_tangents();
        assert_eq!(mesh.tangents.len(), mesh.positions.len());

        for i in 0..mesh.positions.len() {
            let n = Vec3::new(0.0, 0.0, 1.0);
            let t = mesh.tangents[i];
            let b = mesh.bitangents[i];
            // Unit length, mutually orthogonal
            assert!((t.length() - 1.0).abs() < 1e-4);
            assert!((b.length() - 1.0).abs() < 1e-4);
            assert!(t.dot(&n).abs() < 1e-4);
            assert!(b.dot(&n).abs() < 1e-4);
            assert!(t.dot(&b).abs() < 1e-4);
            // Right-handed: cross(N, T) aligns with B
            assert!(n.cross(&t).dot(&b) > 0.0);
        }
    }

    #[test]
    fn test_tangent_follows_uv_gradient() {
        let mut mesh = Mesh::parse_obj(QUAD_OBJ).unwrap();
        mesh.compute_tangents();
        // U grows along +x on this quad, so T should point along +x
        assert!(mesh.tangents[0].approx_eq(&Vec3::new(1.0, 0.0, 0.0), 1e-4));
    }

    #[test]
    fn test_cube_shape() {
        let cube = Mesh::cube(2.0);
        assert_eq!(cube.positions.len(), 24);
        assert_eq!(cube.num_faces(), 12);
        assert_eq!(cube.tangents.len(), cube.positions.len());
        // Every corner of the 2-unit cube sits at +/-1 on all three axes
        for p in &cube.positions {
            assert!((p.x.abs() - 1.0).abs() < 1e-6);
            assert!((p.y.abs() - 1.0).abs() < 1e-6);
            assert!((p.z.abs() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cube_faces_wind_outward() {
        let cube = Mesh::cube(1.0);
        for face in &cube.faces {
            let p0 = cube.positions[face.vert[0]];
            let p1 = cube.positions[face.vert[1]];
            let p2 = cube.positions[face.vert[2]];
            let face_normal = (p1 - p0).cross(&(p2 - p0));
            let outward = cube.normals[face.norm[0]];
            assert!(face_normal.dot(&outward) > 0.0);
        }
    }

    #[test]
    fn test_sphere_radius_and_normals() {
        let sphere = Mesh::sphere(2.0, 2);
        // 20 faces split 4x per subdivision level
        assert_eq!(sphere.num_faces(), 20 * 16);
        for (p, n) in sphere.positions.iter().zip(&sphere.normals) {
            assert!((p.length() - 2.0).abs() < 1e-4);
            // Normal is the outward radial direction
            assert!(n.approx_eq(&p.normalize(), 1e-4));
        }
    }

    #[test]
    fn test_sphere_winding_outward() {
        let sphere = Mesh::sphere(1.0, 1);
        for face in &sphere.faces {
            let p0 = sphere.positions[face.vert[0]];
            let p1 = sphere.positions[face.vert[1]];
            let p2 = sphere.positions[face.vert[2]];
            let face_normal = (p1 - p0).cross(&(p2 - p0));
            let centroid = (p0 + p1 + p2) / 3.0;
            assert!(face_normal.dot(&centroid) > 0.0);
        }
    }

    #[test]
    fn test_degenerate_uvs_fall_back() {
        // All corners share one UV: no gradient, but the basis must still
        // be orthonormal against the normal
        let mut mesh = Mesh::parse_obj(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0.5 0.5\nvn 0 0 1\nf 1/1/1 2/1/1 3/1/1\n",
        )
        .unwrap();
        mesh.compute_tangents();
        let n = Vec3::new(0.0, 0.0, 1.0);
        for i in 0..3 {
            assert!((mesh.tangents[i].length() - 1.0).abs() < 1e-4);
            assert!(mesh.tangents[i].dot(&n).abs() < 1e-4);
        }
    }
}
