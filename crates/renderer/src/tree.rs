//! Instanced trees batched by kind and LOD level.
//!
//! Levels are full mesh, simplified mesh, billboard, impostor (crossed quads)
//! and point. Every level is built at unit height; the per-draw constant
//! slice carries the kind's proxy transform and colors, and each instance
//! carries its own placement matrix and fade factor.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use rhi::shader::ShaderLibrary;
use rhi::{Backend, BlendState, CommandList, CullMode, Device, GraphicsPipelineDesc, IndexFormat, Pipeline, RasterizerState};
use types::{MeshData, TreeKind, VegetationInstance, Vertex};

use crate::buffers::{instanced_layout, ConstantRing, InstanceData, InstanceRing};
use crate::config::TreeConfig;
use crate::error::RenderError;
use crate::frame::FrameView;
use crate::gpu_mesh::GpuMesh;
use crate::lod::{fade_out, select_lod, unit_hash};
use crate::shaders;
use crate::stats::RenderStats;
use crate::targets::{COLOR_FORMAT, DEPTH_FORMAT};

pub const TREE_LODS: usize = 5;
const KINDS: usize = TreeKind::ALL.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TreeLod {
    Full,
    Simplified,
    Billboard,
    Impostor,
    Point,
}

impl TreeLod {
    pub const ALL: [TreeLod; TREE_LODS] =
        [TreeLod::Full, TreeLod::Simplified, TreeLod::Billboard, TreeLod::Impostor, TreeLod::Point];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Levels drawn as camera-facing quads.
    pub fn is_billboard(self) -> bool {
        matches!(self, TreeLod::Billboard | TreeLod::Point)
    }
}

/// Proportions and colors of one tree kind, in units of its height.
#[derive(Debug, Clone, Copy)]
pub struct TreeProfile {
    pub height: f32,
    pub trunk_height: f32,
    pub trunk_radius: f32,
    pub crown_radius: f32,
    pub bark: Vec3,
    pub foliage: Vec3,
}

pub fn profile(kind: TreeKind) -> TreeProfile {
    let (height, trunk_height, trunk_radius, crown_radius, bark, foliage) = match kind {
        TreeKind::Oak => (9.0, 0.4, 0.05, 0.38, [0.36, 0.25, 0.16], [0.22, 0.45, 0.16]),
        TreeKind::Pine => (14.0, 0.3, 0.035, 0.22, [0.33, 0.22, 0.14], [0.12, 0.32, 0.18]),
        TreeKind::Birch => (11.0, 0.5, 0.03, 0.2, [0.85, 0.83, 0.78], [0.45, 0.62, 0.22]),
        TreeKind::Willow => (8.0, 0.45, 0.05, 0.45, [0.35, 0.28, 0.18], [0.42, 0.56, 0.24]),
        TreeKind::Palm => (10.0, 0.85, 0.03, 0.35, [0.52, 0.42, 0.28], [0.3, 0.55, 0.2]),
        TreeKind::Bush => (1.8, 0.1, 0.08, 0.5, [0.3, 0.22, 0.14], [0.25, 0.42, 0.17]),
    };
    TreeProfile {
        height,
        trunk_height,
        trunk_radius,
        crown_radius,
        bark: Vec3::from(bark),
        foliage: Vec3::from(foliage),
    }
}

/// Unit-height mesh for `kind` at `lod`. Trunk vertices carry `uv.y = 1` so
/// the shader colors them as bark; crown vertices stay below 0.66.
pub fn tree_mesh(kind: TreeKind, lod: TreeLod) -> MeshData {
    let p = profile(kind);
    let width = p.crown_radius * 2.0;
    match lod {
        TreeLod::Full => solid_tree(kind, &p, 12),
        TreeLod::Simplified => solid_tree(kind, &p, 5),
        TreeLod::Billboard => MeshData::billboard_quad(width, 1.0),
        TreeLod::Impostor => {
            let quad = MeshData::billboard_quad(width, 1.0);
            let mut mesh = MeshData::default();
            mesh.append_transformed(&quad, &Mat4::IDENTITY);
            mesh.append_transformed(&quad, &Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2));
            mesh
        }
        TreeLod::Point => MeshData::billboard_quad(width * 0.5, 1.0),
    }
}

fn solid_tree(kind: TreeKind, p: &TreeProfile, segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let mut trunk = MeshData::cylinder(p.trunk_radius, p.trunk_radius * 0.7, p.trunk_height + 0.05, segments.min(8));
    for v in &mut trunk.vertices {
        v.uv[1] = 1.0;
    }
    mesh.append_transformed(&trunk, &Mat4::IDENTITY);

    let rings = segments / 2 + 2;
    let r = p.crown_radius;
    let crown_span = 1.0 - p.trunk_height;
    let mut crown = match kind {
        TreeKind::Pine => {
            let mut cone = MeshData::default();
            for (i, (radius, base)) in [(1.0, 0.0), (0.75, 0.3), (0.5, 0.55)].into_iter().enumerate() {
                let tier = MeshData::cylinder(r * radius, 0.0, crown_span * (0.6 - i as f32 * 0.1), segments);
                cone.append_transformed(&tier, &Mat4::from_translation(Vec3::new(0.0, crown_span * base, 0.0)));
            }
            cone
        }
        TreeKind::Palm => {
            let frond = MeshData::cuboid(Vec3::new(r * 0.5, 0.01, 0.04));
            let mut fronds = MeshData::default();
            for i in 0..6 {
                let yaw = i as f32 * std::f32::consts::TAU / 6.0;
                let m = Mat4::from_rotation_translation(
                    Quat::from_rotation_y(yaw) * Quat::from_rotation_z(-0.35),
                    Quat::from_rotation_y(yaw) * Vec3::new(r * 0.45, 0.0, 0.0),
                );
                fronds.append_transformed(&frond, &m);
            }
            fronds
        }
        TreeKind::Willow => {
            let mut canopy = MeshData::default();
            let dome = MeshData::uv_sphere(r, segments, rings);
            canopy.append_transformed(&dome, &Mat4::from_scale_rotation_translation(Vec3::new(1.0, 0.6, 1.0), Quat::IDENTITY, Vec3::new(0.0, crown_span * 0.6, 0.0)));
            let skirt = MeshData::cylinder(r * 1.05, r * 0.8, crown_span * 0.55, segments);
            canopy.append_transformed(&skirt, &Mat4::IDENTITY);
            canopy
        }
        TreeKind::Birch => {
            let mut canopy = MeshData::default();
            let body = MeshData::uv_sphere(r, segments, rings);
            canopy.append_transformed(&body, &Mat4::from_scale_rotation_translation(Vec3::new(1.0, 1.8, 1.0), Quat::IDENTITY, Vec3::new(0.0, crown_span * 0.5, 0.0)));
            canopy
        }
        TreeKind::Oak | TreeKind::Bush => {
            let mut canopy = MeshData::default();
            let body = MeshData::uv_sphere(r, segments, rings);
            canopy.append_transformed(&body, &Mat4::from_translation(Vec3::new(0.0, crown_span * 0.5, 0.0)));
            canopy
        }
    };
    for v in &mut crown.vertices {
        v.uv[1] *= 0.6;
    }
    mesh.append_transformed(&crown, &Mat4::from_translation(Vec3::new(0.0, p.trunk_height, 0.0)));
    mesh
}

/// Layout of `TreeDraw` in `tree.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TreeDraw {
    proxy: [[f32; 4]; 4],
    bark: [f32; 4],
    foliage: [f32; 4],
    /// LOD, sway strength, billboard flag.
    params: [f32; 4],
}

struct Batch {
    slice: u32,
    start: u32,
    count: u32,
}

pub struct TreeRenderer<B: Backend> {
    config: TreeConfig,
    pipeline: Arc<Pipeline<B>>,
    /// Indexed by `kind * TREE_LODS + lod`.
    meshes: Vec<Arc<GpuMesh<B>>>,
    instances: InstanceRing<B, InstanceData>,
    draws: ConstantRing<B>,
    pending: Vec<Vec<InstanceData>>,
    batches: Vec<Batch>,
    stats: RenderStats,
}

fn slice_of(kind: TreeKind, lod: TreeLod) -> usize {
    kind.index() * TREE_LODS + lod.index()
}

impl<B: Backend> TreeRenderer<B> {
    pub fn new(device: &Device<B>, library: &ShaderLibrary<B>, config: &TreeConfig) -> Result<Self, RenderError> {
        let frames = device.frames_in_flight();
        let (vs, ps) = shaders::load_pair(library, device, "tree.wgsl", shaders::TREE)?;
        let mut desc = GraphicsPipelineDesc::new("trees", vs);
        desc.pixel_shader = Some(ps);
        desc.vertex_layout = instanced_layout();
        desc.rasterizer = RasterizerState { cull: CullMode::None, ..RasterizerState::default() };
        desc.blend = BlendState::ALPHA;
        desc.render_target_formats = vec![COLOR_FORMAT];
        desc.depth_format = Some(DEPTH_FORMAT);
        let pipeline = device.create_pipeline(&desc)?;

        let mut meshes = Vec::with_capacity(KINDS * TREE_LODS);
        for kind in TreeKind::ALL {
            for lod in TreeLod::ALL {
                let data = tree_mesh(kind, lod);
                meshes.push(Arc::new(GpuMesh::upload(device, &format!("tree_{kind:?}_{lod:?}"), &data)?));
            }
        }
        tracing::debug!(meshes = meshes.len(), "tree meshes uploaded");

        Ok(Self {
            config: config.clone(),
            pipeline,
            meshes,
            instances: InstanceRing::new(device, "tree_instances", config.max_instances, frames)?,
            draws: ConstantRing::new(device, "tree_draws", std::mem::size_of::<TreeDraw>() as u64, (KINDS * TREE_LODS) as u32, frames)?,
            pending: vec![Vec::new(); KINDS * TREE_LODS],
            batches: Vec::new(),
            stats: RenderStats::with_levels(TREE_LODS),
        })
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    pub fn staged(&self) -> &[InstanceData] {
        self.instances.staged()
    }

    /// Replaces the mesh drawn for `kind` at `lod`.
    pub fn set_mesh(&mut self, device: &Device<B>, kind: TreeKind, lod: TreeLod, mesh: &MeshData) -> Result<(), RenderError> {
        mesh.validate()?;
        let uploaded = GpuMesh::upload(device, &format!("tree_{kind:?}_{lod:?}_custom"), mesh)?;
        self.meshes[slice_of(kind, lod)] = Arc::new(uploaded);
        Ok(())
    }

    fn mesh(&self, kind: TreeKind, lod: TreeLod) -> &Arc<GpuMesh<B>> {
        &self.meshes[slice_of(kind, lod)]
    }

    /// LOD level and fade for a tree `distance` away, or `None` when culled.
    pub fn classify(&self, distance: f32) -> Option<(TreeLod, f32)> {
        let level = select_lod(distance, &self.config.lod_distances)?;
        let lod = TreeLod::ALL.get(level).copied()?;
        let last = self.config.lod_distances.len() - 1;
        let fade = if level == last { fade_out(distance, self.config.lod_distances[last], self.config.fade_band) } else { 1.0 };
        (fade > 0.0).then_some((lod, fade))
    }

    pub fn prepare(&mut self, vegetation: &[VegetationInstance], frame: &FrameView, slot: usize) {
        self.stats.reset();
        self.instances.clear();
        self.batches.clear();
        for list in &mut self.pending {
            list.clear();
        }

        for plant in vegetation {
            let Some(kind) = plant.tree_kind() else { continue };
            let distance = plant.position.distance(frame.eye);
            let Some((lod, fade)) = self.classify(distance) else {
                self.stats.culled += 1;
                continue;
            };
            let height = profile(kind).height;
            let bounds = self.mesh(kind, lod).bounds;
            let extent = plant.scale.abs().max_element() * height;
            let center = plant.position + Vec3::Y * bounds.center().y * plant.scale.y * height;
            if !frame.frustum.intersects_sphere(center, bounds.bounding_radius() * extent) {
                self.stats.culled += 1;
                continue;
            }
            self.stats.count_visible(lod.index());

            let phase = unit_hash((u64::from(plant.position.x.to_bits()) << 32) | u64::from(plant.position.z.to_bits()))
                * std::f32::consts::TAU;
            let record = InstanceData::new(plant.model_matrix(), glam::Vec4::ONE, phase, lod.index() as u32, fade, distance);
            self.pending[slice_of(kind, lod)].push(record);
        }

        for (slice, records) in self.pending.iter().enumerate() {
            let start = self.instances.len() as u32;
            let mut count = 0;
            for record in records {
                if self.instances.push(*record) {
                    count += 1;
                }
            }
            if count > 0 {
                self.batches.push(Batch { slice: slice as u32, start, count });
            }
        }
        self.stats.dropped = self.instances.dropped();
        self.stats.draw_calls = self.batches.len();
        if self.stats.dropped > 0 {
            tracing::warn!(dropped = self.stats.dropped, "tree instances over capacity");
        }

        self.instances.upload(slot);
        for batch in &self.batches {
            let kind = TreeKind::ALL[batch.slice as usize / TREE_LODS];
            let lod = TreeLod::ALL[batch.slice as usize % TREE_LODS];
            let p = profile(kind);
            let draw = TreeDraw {
                proxy: Mat4::from_scale(Vec3::splat(p.height)).to_cols_array_2d(),
                bark: p.bark.extend(1.0).to_array(),
                foliage: p.foliage.extend(1.0).to_array(),
                params: [lod.index() as f32, self.config.sway, if lod.is_billboard() { 1.0 } else { 0.0 }, 0.0],
            };
            self.draws.write(slot, batch.slice, &draw);
        }
    }

    pub fn record(&self, cmd: &mut CommandList<B>, frame_constants: &ConstantRing<B>, slot: usize) {
        if self.batches.is_empty() {
            return;
        }
        cmd.set_pipeline(&self.pipeline);
        frame_constants.bind(cmd, 0, slot, 0);
        let instances = self.instances.buffer(slot);
        for batch in &self.batches {
            let mesh = &self.meshes[batch.slice as usize];
            self.draws.bind(cmd, 1, slot, batch.slice);
            cmd.set_vertex_buffer(0, &mesh.vertex_buffer, 0, Vertex::STRIDE);
            cmd.set_vertex_buffer(1, instances, u64::from(batch.start) * u64::from(InstanceData::STRIDE), InstanceData::STRIDE);
            cmd.set_index_buffer(&mesh.index_buffer, 0, IndexFormat::U32);
            cmd.draw_indexed(mesh.index_count, batch.count, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_and_level_builds_a_valid_mesh() {
        for kind in TreeKind::ALL {
            for lod in TreeLod::ALL {
                let mesh = tree_mesh(kind, lod);
                assert!(mesh.validate().is_ok(), "{kind:?} {lod:?}");
                assert!(mesh.bounds.min.y >= -1e-3, "{kind:?} {lod:?} below ground");
                assert!(mesh.bounds.max.y < 1.5, "{kind:?} {lod:?} not unit height");
            }
        }
    }

    #[test]
    fn trunk_is_marked_as_bark() {
        let mesh = tree_mesh(TreeKind::Oak, TreeLod::Full);
        let bark = mesh.vertices.iter().filter(|v| v.uv[1] > 0.66).count();
        let foliage = mesh.vertices.len() - bark;
        assert!(bark > 0 && foliage > bark);
        assert!(mesh.vertices.iter().filter(|v| v.uv[1] > 0.66).all(|v| v.position[1] <= 0.5));
    }

    #[test]
    fn simplified_is_cheaper_than_full() {
        for kind in TreeKind::ALL {
            assert!(tree_mesh(kind, TreeLod::Simplified).index_count() < tree_mesh(kind, TreeLod::Full).index_count());
        }
        assert_eq!(tree_mesh(TreeKind::Pine, TreeLod::Impostor).index_count(), 12);
    }
}
