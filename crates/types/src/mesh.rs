//! CPU-side triangle meshes and a few procedural primitives.

use bytemuck::{Pod, Zeroable};
use std::f32::consts::{PI, TAU};
use thiserror::Error;

use crate::aabb::Aabb;
use crate::math::{Mat4, Vec3};

/// Interleaved vertex: position, normal, texcoord. 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self { position: position.to_array(), normal: normal.to_array(), uv }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshDataError {
    #[error("mesh has no vertices")]
    NoVertices,
    #[error("mesh has no indices")]
    NoIndices,
    #[error("index count {0} is not a multiple of 3")]
    NotTriangles(usize),
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

/// Triangle list with 32-bit indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let mut mesh = Self { vertices, indices, bounds: Aabb::EMPTY };
        mesh.recompute_bounds();
        mesh
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn validate(&self) -> Result<(), MeshDataError> {
        if self.vertices.is_empty() {
            return Err(MeshDataError::NoVertices);
        }
        if self.indices.is_empty() {
            return Err(MeshDataError::NoIndices);
        }
        if self.indices.len() % 3 != 0 {
            return Err(MeshDataError::NotTriangles(self.indices.len()));
        }
        let n = self.vertices.len();
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= n) {
            return Err(MeshDataError::IndexOutOfRange { index, vertex_count: n });
        }
        Ok(())
    }

    pub fn recompute_bounds(&mut self) {
        self.bounds = Aabb::from_points(self.vertices.iter().map(|v| Vec3::from(v.position)));
    }

    /// Appends `other` transformed by `m` (normals by the inverse transpose).
    pub fn append_transformed(&mut self, other: &MeshData, m: &Mat4) {
        let base = self.vertices.len() as u32;
        let normal_m = m.inverse().transpose();
        for v in &other.vertices {
            let p = m.transform_point3(Vec3::from(v.position));
            let n = normal_m.transform_vector3(Vec3::from(v.normal)).normalize_or(Vec3::Y);
            self.vertices.push(Vertex::new(p, n, v.uv));
            self.bounds.encapsulate(p);
        }
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// UV sphere centred on the origin. `segments` around, `rings` top to bottom.
    pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        for r in 0..=rings {
            let v = r as f32 / rings as f32;
            let phi = v * PI;
            for s in 0..=segments {
                let u = s as f32 / segments as f32;
                let theta = u * TAU;
                let n = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                vertices.push(Vertex::new(n * radius, n, [u, v]));
            }
        }
        let stride = segments + 1;
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
        for r in 0..rings {
            for s in 0..segments {
                let a = r * stride + s;
                let b = a + stride;
                indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
            }
        }
        Self::new(vertices, indices)
    }

    /// Open-ended cylinder (or cone when `top_radius` is 0) along +Y from y = 0.
    pub fn cylinder(bottom_radius: f32, top_radius: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let slope = (bottom_radius - top_radius) / height.max(1e-4);
        let mut vertices = Vec::with_capacity(((segments + 1) * 2) as usize);
        for s in 0..=segments {
            let u = s as f32 / segments as f32;
            let theta = u * TAU;
            let (sin, cos) = theta.sin_cos();
            let n = Vec3::new(cos, slope, sin).normalize();
            vertices.push(Vertex::new(Vec3::new(cos * bottom_radius, 0.0, sin * bottom_radius), n, [u, 0.0]));
            vertices.push(Vertex::new(Vec3::new(cos * top_radius, height, sin * top_radius), n, [u, 1.0]));
        }
        let mut indices = Vec::with_capacity((segments * 6) as usize);
        for s in 0..segments {
            let a = s * 2;
            indices.extend_from_slice(&[a, a + 1, a + 2, a + 2, a + 1, a + 3]);
        }
        Self::new(vertices, indices)
    }

    /// Axis-aligned box centred on the origin with flat-shaded faces.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, u, v) in faces {
            let base = vertices.len() as u32;
            for (cu, cv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + u * cu + v * cv) * h;
                vertices.push(Vertex::new(p, n, [(cu + 1.0) * 0.5, (1.0 - cv) * 0.5]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }

    /// Camera-facing quad in the XY plane, base at y = 0.
    pub fn billboard_quad(width: f32, height: f32) -> Self {
        let hw = width * 0.5;
        let n = Vec3::Z;
        let vertices = vec![
            Vertex::new(Vec3::new(-hw, 0.0, 0.0), n, [0.0, 1.0]),
            Vertex::new(Vec3::new(hw, 0.0, 0.0), n, [1.0, 1.0]),
            Vertex::new(Vec3::new(hw, height, 0.0), n, [1.0, 0.0]),
            Vertex::new(Vec3::new(-hw, height, 0.0), n, [0.0, 0.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }

    /// Flat grid in the XZ plane centred on the origin, `cells` quads per side.
    pub fn grid_plane(size: f32, cells: u32) -> Self {
        let cells = cells.max(1);
        let step = size / cells as f32;
        let half = size * 0.5;
        let mut vertices = Vec::with_capacity(((cells + 1) * (cells + 1)) as usize);
        for z in 0..=cells {
            for x in 0..=cells {
                let p = Vec3::new(x as f32 * step - half, 0.0, z as f32 * step - half);
                vertices.push(Vertex::new(p, Vec3::Y, [x as f32 / cells as f32, z as f32 / cells as f32]));
            }
        }
        Self::new(vertices, grid_indices(cells + 1, cells + 1))
    }
}

/// Two counter-clockwise (seen from +Y) triangles per cell of a row-major vertex grid.
pub fn grid_indices(columns: u32, rows: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity(((columns - 1) * (rows - 1) * 6) as usize);
    for z in 0..rows - 1 {
        for x in 0..columns - 1 {
            let a = z * columns + x;
            let b = a + columns;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_32_bytes() {
        assert_eq!(Vertex::STRIDE, 32);
    }

    #[test]
    fn sphere_is_valid_and_bounded() {
        let s = MeshData::uv_sphere(2.0, 16, 8);
        assert!(s.validate().is_ok());
        assert!((s.bounds.max.y - 2.0).abs() < 1e-5);
        assert!((s.bounds.min.y + 2.0).abs() < 1e-5);
        assert!(s.bounds.extents().x <= 2.0 + 1e-5);
    }

    #[test]
    fn validation_catches_bad_meshes() {
        assert_eq!(MeshData::default().validate(), Err(MeshDataError::NoVertices));
        let v = vec![Vertex::zeroed(); 3];
        assert_eq!(MeshData::new(v.clone(), vec![]).validate(), Err(MeshDataError::NoIndices));
        assert_eq!(MeshData::new(v.clone(), vec![0, 1]).validate(), Err(MeshDataError::NotTriangles(2)));
        assert!(matches!(
            MeshData::new(v, vec![0, 1, 7]).validate(),
            Err(MeshDataError::IndexOutOfRange { index: 7, .. })
        ));
    }

    #[test]
    fn append_offsets_indices() {
        let mut a = MeshData::billboard_quad(1.0, 1.0);
        let b = MeshData::billboard_quad(1.0, 1.0);
        a.append_transformed(&b, &Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(a.vertex_count(), 8);
        assert_eq!(&a.indices[6..], &[4, 5, 6, 4, 6, 7]);
        assert!(a.bounds.max.x >= 5.5 - 1e-5);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn primitives_validate() {
        assert!(MeshData::cylinder(1.0, 0.0, 3.0, 8).validate().is_ok());
        assert!(MeshData::cuboid(Vec3::ONE).validate().is_ok());
        let g = MeshData::grid_plane(10.0, 4);
        assert!(g.validate().is_ok());
        assert_eq!(g.triangle_count(), 32);
    }
}
