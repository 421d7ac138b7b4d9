//! Grass blades: one shared crossed-quad mesh, one instanced draw per frame.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use rhi::shader::ShaderLibrary;
use rhi::{Backend, CommandList, CullMode, Device, GraphicsPipelineDesc, IndexFormat, Pipeline, RasterizerState};
use types::{MeshData, VegetationInstance, VegetationKind, Vertex};

use crate::buffers::{instanced_layout, ConstantRing, InstanceData, InstanceRing};
use crate::config::GrassConfig;
use crate::error::RenderError;
use crate::frame::FrameView;
use crate::gpu_mesh::GpuMesh;
use crate::lod::{mix64, select_lod, unit_hash};
use crate::shaders;
use crate::stats::RenderStats;
use crate::targets::{COLOR_FORMAT, DEPTH_FORMAT};

const BASE_COLOR: [f32; 4] = [0.16, 0.32, 0.08, 1.0];
const TIP_COLOR: [f32; 4] = [0.55, 0.72, 0.28, 1.0];
const BEND_EXPONENT: f32 = 1.6;

/// Distance band a blade falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrassLod {
    Near,
    Mid,
    Far,
}

impl GrassLod {
    const ALL: [GrassLod; 3] = [GrassLod::Near, GrassLod::Mid, GrassLod::Far];
}

/// Layout of `Wind` in `grass.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct WindConstants {
    wind: [f32; 4],
    base_color: [f32; 4],
    tip_color: [f32; 4],
    params: [f32; 4],
}

/// Keeps roughly one blade in `keep`, chosen by a hash of its index.
pub fn keeps_one_in(index: usize, keep: u32) -> bool {
    mix64(index as u64) % u64::from(keep.max(1)) == 0
}

/// Two crossed quads, base at the origin.
pub fn blade_mesh(width: f32, height: f32) -> MeshData {
    let quad = MeshData::billboard_quad(width, height);
    let mut mesh = MeshData::default();
    mesh.append_transformed(&quad, &Mat4::IDENTITY);
    mesh.append_transformed(&quad, &Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2));
    mesh
}

pub struct GrassRenderer<B: Backend> {
    config: GrassConfig,
    pipeline: Arc<Pipeline<B>>,
    mesh: GpuMesh<B>,
    blade_height: f32,
    instances: InstanceRing<B, InstanceData>,
    wind: ConstantRing<B>,
    stats: RenderStats,
}

impl<B: Backend> GrassRenderer<B> {
    pub fn new(device: &Device<B>, library: &ShaderLibrary<B>, config: &GrassConfig) -> Result<Self, RenderError> {
        let frames = device.frames_in_flight();
        let (vs, ps) = shaders::load_pair(library, device, "grass.wgsl", shaders::GRASS)?;
        let mut desc = GraphicsPipelineDesc::new("grass", vs);
        desc.pixel_shader = Some(ps);
        desc.vertex_layout = instanced_layout();
        desc.rasterizer = RasterizerState { cull: CullMode::None, ..RasterizerState::default() };
        desc.render_target_formats = vec![COLOR_FORMAT];
        desc.depth_format = Some(DEPTH_FORMAT);
        let pipeline = device.create_pipeline(&desc)?;
        let mesh = GpuMesh::upload(device, "grass_blade", &blade_mesh(config.blade_width, config.blade_height))?;

        Ok(Self {
            config: config.clone(),
            pipeline,
            mesh,
            blade_height: config.blade_height,
            instances: InstanceRing::new(device, "grass_instances", config.max_instances, frames)?,
            wind: ConstantRing::new(device, "grass_wind", std::mem::size_of::<WindConstants>() as u64, 1, frames)?,
            stats: RenderStats::with_levels(GrassLod::ALL.len()),
        })
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    pub fn staged(&self) -> &[InstanceData] {
        self.instances.staged()
    }

    /// Band for a blade `distance` away, or `None` past the far band.
    pub fn band(&self, distance: f32) -> Option<GrassLod> {
        select_lod(distance, &self.config.lod_distances).and_then(|i| GrassLod::ALL.get(i).copied())
    }

    /// Whether blade `index` survives thinning in `band`. Stable across frames.
    pub fn keeps(&self, index: usize, band: GrassLod) -> bool {
        let keep = match band {
            GrassLod::Near => 1,
            GrassLod::Mid => self.config.mid_keep,
            GrassLod::Far => self.config.far_keep,
        };
        keeps_one_in(index, keep)
    }

    /// Extra scale that hides the thinning: widened mid blades, enlarged far ones.
    fn band_scale(&self, band: GrassLod) -> Vec3 {
        match band {
            GrassLod::Near => Vec3::ONE,
            GrassLod::Mid => Vec3::new(self.config.mid_widen, 1.0, self.config.mid_widen),
            GrassLod::Far => Vec3::splat(self.config.far_scale),
        }
    }

    pub fn prepare(&mut self, vegetation: &[VegetationInstance], frame: &FrameView, slot: usize) {
        self.stats.reset();
        self.instances.clear();

        let blades = vegetation.iter().filter(|v| v.kind == VegetationKind::Grass);
        for (index, blade) in blades.enumerate() {
            let distance = blade.position.distance(frame.eye);
            let Some(band) = self.band(distance) else {
                self.stats.culled += 1;
                continue;
            };
            if !self.keeps(index, band) {
                self.stats.culled += 1;
                continue;
            }
            let scale = blade.scale * self.band_scale(band);
            let height = self.blade_height * scale.y;
            let center = blade.position + Vec3::Y * height * 0.5;
            if !frame.frustum.intersects_sphere(center, height.max(self.config.blade_width * scale.x)) {
                self.stats.culled += 1;
                continue;
            }
            self.stats.count_visible(band as usize);

            let placed = VegetationInstance { scale, ..*blade };
            let shade = 0.85 + 0.3 * unit_hash(index as u64);
            let phase = unit_hash(!(index as u64)) * std::f32::consts::TAU;
            self.instances.push(InstanceData::new(
                placed.model_matrix(),
                Vec4::new(shade, shade, shade, 1.0),
                phase,
                band as u32,
                1.0,
                distance,
            ));
        }
        self.stats.dropped = self.instances.dropped();
        self.stats.draw_calls = usize::from(!self.instances.is_empty());
        if self.stats.dropped > 0 {
            tracing::warn!(dropped = self.stats.dropped, "grass instances over capacity");
        }

        self.instances.upload(slot);
        let direction = Vec2::from(self.config.wind_direction).normalize_or_zero();
        self.wind.write(
            slot,
            0,
            &WindConstants {
                wind: [direction.x, direction.y, self.config.wind_strength, frame.time],
                base_color: BASE_COLOR,
                tip_color: TIP_COLOR,
                params: [self.config.sway_frequency, BEND_EXPONENT, 0.0, 0.0],
            },
        );
    }

    pub fn record(&self, cmd: &mut CommandList<B>, frame_constants: &ConstantRing<B>, slot: usize) {
        if self.instances.is_empty() {
            return;
        }
        cmd.set_pipeline(&self.pipeline);
        frame_constants.bind(cmd, 0, slot, 0);
        self.wind.bind(cmd, 1, slot, 0);
        cmd.set_vertex_buffer(0, &self.mesh.vertex_buffer, 0, Vertex::STRIDE);
        cmd.set_vertex_buffer(1, self.instances.buffer(slot), 0, InstanceData::STRIDE);
        cmd.set_index_buffer(&self.mesh.index_buffer, 0, IndexFormat::U32);
        cmd.draw_indexed(self.mesh.index_count, self.instances.len() as u32, 0, 0, 0);
    }
}
