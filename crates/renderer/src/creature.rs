//! Instanced creatures, batched by mesh key, plus their depth-only shadow pass.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use rhi::shader::{CompileOptions, ShaderLibrary};
use rhi::{
    Backend, CommandList, CullMode, Device, GraphicsPipelineDesc, IndexFormat, Pipeline, RasterizerState, Texture,
    TextureDesc, TextureUsage,
};
use sim_core::Creature;
use types::Vertex;

use crate::buffers::{instanced_layout, ConstantRing, InstanceData, InstanceRing};
use crate::config::CreatureConfig;
use crate::error::RenderError;
use crate::frame::FrameView;
use crate::gpu_mesh::GpuMesh;
use crate::lod::{select_lod, unit_hash};
use crate::mesh_cache::{MeshCache, MeshKey};
use crate::shaders;
use crate::stats::RenderStats;
use crate::targets::{COLOR_FORMAT, DEPTH_FORMAT};

/// Creature scale is clamped to this range before culling and drawing.
pub const SCALE_RANGE: (f32, f32) = (0.3, 10.0);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CreatureMaterial {
    /// Bob amplitude, sway amplitude, tint mix.
    motion: [f32; 4],
}

struct Batch<B: Backend> {
    mesh: Arc<GpuMesh<B>>,
    start: u32,
    count: u32,
}

pub struct CreatureRenderer<B: Backend> {
    config: CreatureConfig,
    pipeline: Arc<Pipeline<B>>,
    shadow_pipeline: Option<Arc<Pipeline<B>>>,
    shadow_map: Option<Arc<Texture<B>>>,
    instances: InstanceRing<B, InstanceData>,
    material: ConstantRing<B>,
    groups: HashMap<MeshKey, usize>,
    pending: Vec<(Arc<GpuMesh<B>>, Vec<InstanceData>)>,
    batches: Vec<Batch<B>>,
    stats: RenderStats,
}

impl<B: Backend> CreatureRenderer<B> {
    pub fn new(device: &Device<B>, library: &ShaderLibrary<B>, config: &CreatureConfig) -> Result<Self, RenderError> {
        let frames = device.frames_in_flight();
        let (vs, ps) = shaders::load_pair(library, device, "creature.wgsl", shaders::CREATURE)?;
        let mut desc = GraphicsPipelineDesc::new("creatures", vs);
        desc.pixel_shader = Some(ps);
        desc.vertex_layout = instanced_layout();
        desc.rasterizer = RasterizerState { cull: CullMode::None, ..RasterizerState::default() };
        desc.render_target_formats = vec![COLOR_FORMAT];
        desc.depth_format = Some(DEPTH_FORMAT);
        let pipeline = device.create_pipeline(&desc)?;

        let (shadow_pipeline, shadow_map) = if config.shadows {
            let vs = shaders::load(library, device, "creature_shadow.wgsl", shaders::CREATURE_SHADOW, &CompileOptions::vertex())?;
            let mut desc = GraphicsPipelineDesc::new("creature_shadows", vs);
            desc.vertex_layout = instanced_layout();
            desc.rasterizer = RasterizerState {
                cull: CullMode::None,
                depth_bias: 2,
                slope_scaled_depth_bias: 2.0,
                ..RasterizerState::default()
            };
            desc.depth_format = Some(DEPTH_FORMAT);
            let size = config.shadow_map_size.max(1);
            let map = device.create_texture(&TextureDesc::d2(
                "creature_shadow_map",
                size,
                size,
                DEPTH_FORMAT,
                TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED,
            ))?;
            (Some(device.create_pipeline(&desc)?), Some(map))
        } else {
            (None, None)
        };

        Ok(Self {
            config: config.clone(),
            pipeline,
            shadow_pipeline,
            shadow_map,
            instances: InstanceRing::new(device, "creature_instances", config.max_instances, frames)?,
            material: ConstantRing::new(device, "creature_material", std::mem::size_of::<CreatureMaterial>() as u64, 1, frames)?,
            groups: HashMap::new(),
            pending: Vec::new(),
            batches: Vec::new(),
            stats: RenderStats::with_levels(config.lod_distances.len()),
        })
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Depth target written by [`Self::record_shadows`], if shadows are enabled.
    pub fn shadow_map(&self) -> Option<&Arc<Texture<B>>> {
        self.shadow_map.as_ref()
    }

    /// Instance records staged for the current frame, in draw order.
    pub fn staged(&self) -> &[InstanceData] {
        self.instances.staged()
    }

    /// Culls, batches and uploads the living creatures for frame `slot`.
    pub fn prepare(
        &mut self,
        device: &Device<B>,
        cache: &mut MeshCache<B>,
        creatures: &[Creature],
        frame: &FrameView,
        slot: usize,
    ) -> Result<(), RenderError> {
        self.stats.reset();
        self.instances.clear();
        self.groups.clear();
        self.pending.clear();
        self.batches.clear();

        for creature in creatures.iter().filter(|c| c.alive) {
            let distance = creature.position.distance(frame.eye);
            let Some(lod) = select_lod(distance, &self.config.lod_distances) else {
                self.stats.culled += 1;
                continue;
            };
            let (key, mesh) = cache.get_keyed(device, &creature.genome, creature.creature_type)?;
            let scale = creature.size().clamp(SCALE_RANGE.0, SCALE_RANGE.1);
            let center = creature.position + mesh.bounds.center() * scale;
            if !frame.frustum.intersects_sphere(center, mesh.bounds.bounding_radius() * scale) {
                self.stats.culled += 1;
                continue;
            }
            self.stats.count_visible(lod);

            let model = Mat4::from_scale_rotation_translation(
                Vec3::splat(scale),
                Quat::from_rotation_y(heading(creature.velocity)),
                creature.position,
            );
            let color = instance_color(creature, self.config.tint_mix);
            let phase = (frame.time * creature.velocity.length()).rem_euclid(std::f32::consts::TAU);
            let record = InstanceData::new(model, color.extend(1.0), phase, lod as u32, 1.0, distance);

            let index = *self.groups.entry(key).or_insert_with(|| {
                self.pending.push((Arc::clone(&mesh), Vec::new()));
                self.pending.len() - 1
            });
            self.pending[index].1.push(record);
        }

        for (mesh, records) in self.pending.drain(..) {
            let start = self.instances.len() as u32;
            let mut count = 0;
            for record in records {
                if self.instances.push(record) {
                    count += 1;
                }
            }
            if count > 0 {
                self.batches.push(Batch { mesh, start, count });
            }
        }
        self.stats.dropped = self.instances.dropped();
        self.stats.draw_calls = self.batches.len();
        if self.stats.dropped > 0 {
            tracing::warn!(dropped = self.stats.dropped, capacity = self.instances.capacity(), "creature instances over capacity");
        }

        self.instances.upload(slot);
        self.material.write(
            slot,
            0,
            &CreatureMaterial {
                motion: [self.config.bob_amplitude, self.config.sway_amplitude, self.config.tint_mix, 0.0],
            },
        );
        tracing::debug!(visible = self.stats.visible, culled = self.stats.culled, batches = self.batches.len(), "creatures prepared");
        Ok(())
    }

    /// Records one draw per batch into the open main pass.
    pub fn record(&self, cmd: &mut CommandList<B>, frame_constants: &ConstantRing<B>, slot: usize) {
        if self.batches.is_empty() {
            return;
        }
        cmd.set_pipeline(&self.pipeline);
        frame_constants.bind(cmd, 0, slot, 0);
        self.material.bind(cmd, 1, slot, 0);
        self.draw_batches(cmd, slot);
    }

    /// Records the same batches with the depth-only pipeline into the open shadow pass.
    pub fn record_shadows(&self, cmd: &mut CommandList<B>, frame_constants: &ConstantRing<B>, slot: usize) -> usize {
        let Some(pipeline) = &self.shadow_pipeline else {
            return 0;
        };
        if self.batches.is_empty() {
            return 0;
        }
        cmd.set_pipeline(pipeline);
        frame_constants.bind(cmd, 0, slot, 0);
        self.draw_batches(cmd, slot);
        self.batches.len()
    }

    fn draw_batches(&self, cmd: &mut CommandList<B>, slot: usize) {
        let instances = self.instances.buffer(slot);
        for batch in &self.batches {
            cmd.set_vertex_buffer(0, &batch.mesh.vertex_buffer, 0, Vertex::STRIDE);
            cmd.set_vertex_buffer(1, instances, u64::from(batch.start) * u64::from(InstanceData::STRIDE), InstanceData::STRIDE);
            cmd.set_index_buffer(&batch.mesh.index_buffer, 0, IndexFormat::U32);
            cmd.draw_indexed(batch.mesh.index_count, batch.count, 0, 0, 0);
        }
    }
}

/// Yaw that faces the horizontal component of `velocity`.
fn heading(velocity: Vec3) -> f32 {
    if velocity.x.abs() + velocity.z.abs() < 1e-5 {
        0.0
    } else {
        velocity.x.atan2(velocity.z)
    }
}

/// Deterministic per-species hue.
pub fn species_tint(species_id: u64) -> Vec3 {
    hsv_to_rgb(unit_hash(species_id), 0.55, 0.9)
}

/// Genome color blended towards the species tint by `tint_mix`.
pub fn instance_color(creature: &Creature, tint_mix: f32) -> Vec3 {
    let base = creature.color().clamp(Vec3::ZERO, Vec3::ONE);
    base.lerp(species_tint(creature.species_id()), tint_mix.clamp(0.0, 1.0))
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let c = v * s;
    let x = c * (1.0 - (h6 % 2.0 - 1.0).abs());
    let (r, g, b) = match h6 as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    Vec3::new(r, g, b) + Vec3::splat(v - c)
}
