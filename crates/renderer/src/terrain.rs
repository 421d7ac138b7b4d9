//! Procedural island terrain: a layered value-noise heightmap baked into a
//! grid of chunk meshes with per-vertex biome colors.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rhi::shader::ShaderLibrary;
use rhi::{
    Backend, BufferDesc, BufferUsage, CommandList, Device, Format, GraphicsPipelineDesc, IndexFormat, InputElement,
    Pipeline, VertexLayout,
};
use serde::{Deserialize, Serialize};
use types::{cell_origin, grid_indices, lerp, smoothstep, world_to_cell, Aabb};

use crate::buffers::ConstantRing;
use crate::config::TerrainConfig;
use crate::error::RenderError;
use crate::frame::FrameView;
use crate::gpu_mesh::GpuMesh;
use crate::lod::mix64;
use crate::shaders;
use crate::stats::RenderStats;
use crate::targets::{COLOR_FORMAT, DEPTH_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    DeepWater,
    ShallowWater,
    Beach,
    Grassland,
    Forest,
    Hills,
    Rock,
    Mountain,
    Snow,
}

impl Biome {
    pub fn color(self) -> Vec3 {
        let rgb = match self {
            Biome::DeepWater => [0.10, 0.18, 0.32],
            Biome::ShallowWater => [0.22, 0.38, 0.45],
            Biome::Beach => [0.82, 0.76, 0.55],
            Biome::Grassland => [0.36, 0.58, 0.24],
            Biome::Forest => [0.20, 0.40, 0.16],
            Biome::Hills => [0.45, 0.50, 0.28],
            Biome::Rock => [0.46, 0.43, 0.40],
            Biome::Mountain => [0.55, 0.52, 0.50],
            Biome::Snow => [0.94, 0.95, 0.97],
        };
        Vec3::from(rgb)
    }

    /// Whether vegetation may grow here.
    pub fn is_land(self) -> bool {
        !matches!(self, Biome::DeepWater | Biome::ShallowWater)
    }
}

/// Hash-lattice value noise in [0, 1], smoothly interpolated.
fn value_noise(x: f32, z: f32, salt: u64) -> f32 {
    let (x0, z0) = (x.floor(), z.floor());
    let (fx, fz) = (x - x0, z - z0);
    let corner = |dx: i64, dz: i64| {
        let ix = (x0 as i64 + dx) as u64;
        let iz = (z0 as i64 + dz) as u64;
        let h = mix64(ix.wrapping_mul(0x9e37_79b9) ^ iz.wrapping_mul(0x85eb_ca6b) ^ salt.wrapping_mul(0xc2b2_ae35));
        (h >> 40) as f32 / (1u64 << 24) as f32
    };
    let (u, v) = (fx * fx * (3.0 - 2.0 * fx), fz * fz * (3.0 - 2.0 * fz));
    let top = lerp(corner(0, 0), corner(1, 0), u);
    let bottom = lerp(corner(0, 1), corner(1, 1), u);
    lerp(top, bottom, v)
}

/// Fractal sum of `octaves` noise layers, normalized to [0, 1].
fn fbm(x: f32, z: f32, frequency: f32, octaves: u32, salt: u64) -> f32 {
    let (mut sum, mut amplitude, mut norm, mut f) = (0.0, 1.0, 0.0, frequency);
    for octave in 0..octaves {
        sum += value_noise(x * f, z * f, salt + u64::from(octave)) * amplitude;
        norm += amplitude;
        amplitude *= 0.5;
        f *= 2.0;
    }
    sum / norm
}

/// The heightfield itself. Pure and deterministic: no seed, fixed constants.
#[derive(Debug, Clone)]
pub struct Heightmap {
    config: TerrainConfig,
}

impl Heightmap {
    pub fn new(config: &TerrainConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Height in [-1, 1] before scaling.
    fn shape(&self, x: f32, z: f32) -> f32 {
        let continental = fbm(x, z, 0.0015, 4, 11);
        let mountain = fbm(x, z, 0.004, 5, 23);
        let ridge = 1.0 - (2.0 * fbm(x, z, 0.006, 3, 37) - 1.0).abs();
        let hills = fbm(x, z, 0.02, 3, 53);

        let mountain_mask = smoothstep(0.45, 0.75, continental);
        let land = continental * 0.9 - 0.2
            + mountain * mountain * mountain_mask * 0.9
            + ridge * ridge * mountain_mask * 0.25
            + (hills - 0.5) * 0.12;

        let half = self.config.world_size * 0.5;
        let edge = (x.abs().max(z.abs()) / half).min(1.5);
        let falloff = 1.0 - smoothstep(0.55, 0.95, edge);
        (land * falloff - (1.0 - falloff) * 0.25).clamp(-1.0, 1.0)
    }

    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.shape(x, z) * self.config.height_scale
    }

    /// Surface normal from central differences.
    pub fn normal_at(&self, x: f32, z: f32) -> Vec3 {
        let e = (self.config.world_size / (self.config.chunks * self.config.chunk_resolution) as f32).max(0.5);
        let dx = self.height_at(x + e, z) - self.height_at(x - e, z);
        let dz = self.height_at(x, z + e) - self.height_at(x, z - e);
        Vec3::new(-dx, 2.0 * e, -dz).normalize_or(Vec3::Y)
    }

    pub fn biome_at(&self, x: f32, z: f32) -> Biome {
        self.classify(x, z, self.height_at(x, z), self.normal_at(x, z))
    }

    fn classify(&self, x: f32, z: f32, height: f32, normal: Vec3) -> Biome {
        let water = self.config.water_level;
        let relative = (height - water) / self.config.height_scale.max(1e-3);
        if height < water - 0.1 * self.config.height_scale {
            Biome::DeepWater
        } else if height < water {
            Biome::ShallowWater
        } else if height < water + self.config.shoreline {
            Biome::Beach
        } else if normal.y < 0.7 {
            Biome::Rock
        } else if relative > 0.75 {
            Biome::Snow
        } else if relative > 0.5 {
            Biome::Mountain
        } else if relative > 0.3 {
            Biome::Hills
        } else if fbm(x, z, 0.01, 2, 71) > 0.55 {
            Biome::Forest
        } else {
            Biome::Grassland
        }
    }

    /// Vertex colors vary slightly around the biome color.
    fn color_at(&self, x: f32, z: f32, biome: Biome) -> [f32; 4] {
        let jitter = 0.9 + 0.2 * value_noise(x * 0.35, z * 0.35, 97);
        (biome.color() * jitter).min(Vec3::ONE).extend(1.0).to_array()
    }

    /// Vertices and indices of chunk `(cx, cz)`.
    pub fn chunk(&self, cx: u32, cz: u32) -> TerrainChunkData {
        let res = self.config.chunk_resolution.max(1);
        let chunk_size = self.config.world_size / self.config.chunks as f32;
        let step = chunk_size / res as f32;
        let (ox, oz) = cell_origin(cx, cz, self.config.world_size, self.config.chunks);
        let mut vertices = Vec::with_capacity(((res + 1) * (res + 1)) as usize);
        let mut bounds = Aabb::EMPTY;
        for j in 0..=res {
            for i in 0..=res {
                let (x, z) = (ox + i as f32 * step, oz + j as f32 * step);
                let height = self.height_at(x, z);
                let normal = self.normal_at(x, z);
                let biome = self.classify(x, z, height, normal);
                let position = Vec3::new(x, height, z);
                bounds.encapsulate(position);
                vertices.push(TerrainVertex {
                    position: position.to_array(),
                    normal: normal.to_array(),
                    color: self.color_at(x, z, biome),
                });
            }
        }
        TerrainChunkData { vertices, indices: grid_indices(res + 1, res + 1), bounds }
    }
}

/// Layout expected by `terrain.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl TerrainVertex {
    pub const STRIDE: u32 = std::mem::size_of::<TerrainVertex>() as u32;

    pub fn layout() -> VertexLayout {
        VertexLayout {
            elements: vec![
                InputElement::per_vertex("POSITION", 0, Format::Rgb32Float, 0),
                InputElement::per_vertex("NORMAL", 0, Format::Rgb32Float, 12),
                InputElement::per_vertex("COLOR", 0, Format::Rgba32Float, 24),
            ],
            strides: vec![Self::STRIDE],
        }
    }
}

const _: () = assert!(std::mem::size_of::<TerrainVertex>() == 40);

pub struct TerrainChunkData {
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

struct Chunk<B: Backend> {
    mesh: GpuMesh<B>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TerrainParams {
    /// Height scale, water level, shoreline width.
    params: [f32; 4],
    wet_sand: [f32; 4],
}

pub struct TerrainRenderer<B: Backend> {
    heightmap: Heightmap,
    pipeline: Arc<Pipeline<B>>,
    chunks: Vec<Chunk<B>>,
    visible: Vec<usize>,
    constants: ConstantRing<B>,
    stats: RenderStats,
}

impl<B: Backend> TerrainRenderer<B> {
    pub fn new(device: &Device<B>, library: &ShaderLibrary<B>, config: &TerrainConfig) -> Result<Self, RenderError> {
        let frames = device.frames_in_flight();
        let (vs, ps) = shaders::load_pair(library, device, "terrain.wgsl", shaders::TERRAIN)?;
        let mut desc = GraphicsPipelineDesc::new("terrain", vs);
        desc.pixel_shader = Some(ps);
        desc.vertex_layout = TerrainVertex::layout();
        desc.render_target_formats = vec![COLOR_FORMAT];
        desc.depth_format = Some(DEPTH_FORMAT);
        let pipeline = device.create_pipeline(&desc)?;

        let heightmap = Heightmap::new(config);
        let mut chunks = Vec::with_capacity((config.chunks * config.chunks) as usize);
        for cz in 0..config.chunks {
            for cx in 0..config.chunks {
                let data = heightmap.chunk(cx, cz);
                chunks.push(Chunk { mesh: upload_chunk(device, cx, cz, &data)? });
            }
        }
        tracing::info!(chunks = chunks.len(), world_size = config.world_size, "terrain generated");

        let constants = ConstantRing::new(device, "terrain_params", std::mem::size_of::<TerrainParams>() as u64, 1, frames)?;
        let params = TerrainParams {
            params: [config.height_scale, config.water_level, config.shoreline.max(1e-3), 0.0],
            wet_sand: [0.55, 0.48, 0.34, 0.6],
        };
        for slot in 0..frames {
            constants.write(slot, 0, &params);
        }

        Ok(Self { heightmap, pipeline, chunks, visible: Vec::new(), constants, stats: RenderStats::with_levels(1) })
    }

    pub fn heightmap(&self) -> &Heightmap {
        &self.heightmap
    }

    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.heightmap.height_at(x, z)
    }

    pub fn biome_at(&self, x: f32, z: f32) -> Biome {
        self.heightmap.biome_at(x, z)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Index of the chunk containing `(x, z)`, clamped to the border.
    pub fn chunk_index(&self, x: f32, z: f32) -> usize {
        let config = self.heightmap.config();
        let (cx, cz) = world_to_cell(x, z, config.world_size, config.chunks);
        types::grid_index(cx, cz, config.chunks)
    }

    pub fn chunk_bounds(&self, index: usize) -> Option<Aabb> {
        self.chunks.get(index).map(|c| c.mesh.bounds)
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    pub fn prepare(&mut self, frame: &FrameView) {
        self.stats.reset();
        self.visible.clear();
        for (i, chunk) in self.chunks.iter().enumerate() {
            if frame.frustum.intersects_aabb(&chunk.mesh.bounds) {
                self.visible.push(i);
                self.stats.count_visible(0);
            } else {
                self.stats.culled += 1;
            }
        }
        self.stats.draw_calls = self.visible.len();
    }

    pub fn record(&self, cmd: &mut CommandList<B>, frame_constants: &ConstantRing<B>, slot: usize) {
        if self.visible.is_empty() {
            return;
        }
        cmd.set_pipeline(&self.pipeline);
        frame_constants.bind(cmd, 0, slot, 0);
        self.constants.bind(cmd, 1, slot, 0);
        for &i in &self.visible {
            let mesh = &self.chunks[i].mesh;
            cmd.set_vertex_buffer(0, &mesh.vertex_buffer, 0, TerrainVertex::STRIDE);
            cmd.set_index_buffer(&mesh.index_buffer, 0, IndexFormat::U32);
            cmd.draw_indexed(mesh.index_count, 1, 0, 0, 0);
        }
    }
}

fn upload_chunk<B: Backend>(device: &Device<B>, cx: u32, cz: u32, data: &TerrainChunkData) -> Result<GpuMesh<B>, RenderError> {
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);
    let label = format!("terrain_{cx}_{cz}");
    let vertex_buffer = device.create_buffer_with_data(
        &BufferDesc::gpu_only(format!("{label}_vb"), vertex_bytes.len() as u64, BufferUsage::VERTEX),
        vertex_bytes,
    )?;
    let index_buffer = device.create_buffer_with_data(
        &BufferDesc::gpu_only(format!("{label}_ib"), index_bytes.len() as u64, BufferUsage::INDEX),
        index_bytes,
    )?;
    Ok(GpuMesh {
        vertex_buffer,
        index_buffer,
        vertex_count: data.vertices.len() as u32,
        index_count: data.indices.len() as u32,
        bounds: data.bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn heightmap() -> Heightmap {
        Heightmap::new(&TerrainConfig::default())
    }

    #[test]
    fn noise_is_deterministic_and_bounded() {
        for i in 0..200 {
            let (x, z) = (i as f32 * 13.7 - 900.0, i as f32 * -7.3 + 400.0);
            let n = value_noise(x, z, 5);
            assert!((0.0..=1.0).contains(&n));
            assert_eq!(n, value_noise(x, z, 5));
        }
    }

    #[test]
    fn edges_sink_below_water() {
        let map = heightmap();
        let half = map.config().world_size * 0.5;
        for t in [-0.9, -0.3, 0.0, 0.4, 0.95] {
            assert!(map.height_at(half, t * half) < map.config().water_level);
            assert!(map.height_at(t * half, -half) < map.config().water_level);
        }
        assert!(!map.biome_at(half, 0.0).is_land());
    }

    #[test]
    fn chunk_grid_matches_resolution() {
        let map = heightmap();
        let res = map.config().chunk_resolution;
        let chunk = map.chunk(3, 5);
        assert_eq!(chunk.vertices.len() as u32, (res + 1) * (res + 1));
        assert_eq!(chunk.indices.len() as u32, res * res * 6);
        assert!(chunk.bounds.is_valid());
        let first = chunk.vertices[0].position;
        let (ox, oz) = cell_origin(3, 5, map.config().world_size, map.config().chunks);
        assert_eq!((first[0], first[2]), (ox, oz));
        assert!((first[1] - map.height_at(ox, oz)).abs() < 1e-4);
    }

    #[test]
    fn neighbouring_chunks_share_edges() {
        let map = heightmap();
        let res = map.config().chunk_resolution as usize;
        let a = map.chunk(10, 10);
        let b = map.chunk(11, 10);
        for j in 0..=res {
            let right = a.vertices[j * (res + 1) + res].position;
            let left = b.vertices[j * (res + 1)].position;
            assert!((right[0] - left[0]).abs() < 1e-3 && (right[1] - left[1]).abs() < 1e-3);
        }
    }

    proptest! {
        #[test]
        fn height_stays_within_scale(x in -1024.0f32..1024.0, z in -1024.0f32..1024.0) {
            let map = heightmap();
            let h = map.height_at(x, z);
            prop_assert!(h.abs() <= map.config().height_scale + 1e-3);
            prop_assert!(map.normal_at(x, z).y > 0.0);
        }
    }
}
