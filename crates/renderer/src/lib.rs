//! Batched instanced rendering of creatures, vegetation, terrain and water
//! on top of the [`rhi`] front end.

pub mod buffers;
pub mod camera;
pub mod config;
pub mod creature;
pub mod error;
pub mod frame;
pub mod gpu_mesh;
pub mod grass;
pub mod lod;
pub mod mesh_cache;
pub mod shaders;
pub mod stats;
pub mod targets;
pub mod terrain;
pub mod tree;
pub mod water;

use std::path::Path;

use rhi::shader::ShaderLibrary;
use rhi::{Backend, ColorAttachment, CommandList, CommandListKind, DepthAttachment, Device, RenderPassDesc, Viewport};
use sim_core::Creature;
use types::VegetationInstance;

pub use camera::Camera;
pub use config::RenderConfig;
pub use creature::CreatureRenderer;
pub use error::RenderError;
pub use frame::{FrameView, TIME_PERIOD};
pub use grass::GrassRenderer;
pub use mesh_cache::{MeshCache, MeshGenerator, MeshKey, PrimitiveCreatures};
pub use stats::{FrameStats, RenderStats};
pub use terrain::{Biome, Heightmap, TerrainRenderer};
pub use tree::{TreeLod, TreeRenderer};
pub use water::WaterRenderer;

use buffers::ConstantRing;
use frame::FrameConstants;
use targets::RenderTargets;

/// What one frame draws.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scene<'a> {
    pub creatures: &'a [Creature],
    pub vegetation: &'a [VegetationInstance],
}

pub struct Renderer<B: Backend> {
    config: RenderConfig,
    library: ShaderLibrary<B>,
    targets: RenderTargets<B>,
    frame_constants: ConstantRing<B>,
    mesh_cache: MeshCache<B>,
    creatures: CreatureRenderer<B>,
    trees: TreeRenderer<B>,
    grass: GrassRenderer<B>,
    terrain: TerrainRenderer<B>,
    water: Option<WaterRenderer<B>>,
    lists: Vec<CommandList<B>>,
    stats: FrameStats,
    frames: u64,
}

impl<B: Backend> Renderer<B> {
    pub fn new(device: &Device<B>, config: &RenderConfig, shader_cache: Option<&Path>) -> Result<Self, RenderError> {
        Self::with_generator(device, config, shader_cache, PrimitiveCreatures)
    }

    /// Builds every pipeline and static mesh. Creature meshes come from `generator`.
    pub fn with_generator(
        device: &Device<B>,
        config: &RenderConfig,
        shader_cache: Option<&Path>,
        generator: impl MeshGenerator + 'static,
    ) -> Result<Self, RenderError> {
        config.validate()?;
        let frames = device.frames_in_flight();
        let library = shaders::library(shader_cache)?;

        let creatures = CreatureRenderer::new(device, &library, &config.creatures)?;
        let trees = TreeRenderer::new(device, &library, &config.trees)?;
        let grass = GrassRenderer::new(device, &library, &config.grass)?;
        let terrain = TerrainRenderer::new(device, &library, &config.terrain)?;
        let water = if config.water.enabled {
            Some(WaterRenderer::new(device, &library, &config.water, config.terrain.world_size, config.terrain.water_level)?)
        } else {
            None
        };

        let mut mesh_cache = MeshCache::new(generator);
        if config.creatures.preload {
            mesh_cache.preload(device)?;
        }

        let lists = (0..frames)
            .map(|i| device.create_command_list(CommandListKind::Graphics, format!("frame_{i}")))
            .collect();
        tracing::info!(
            frames,
            width = config.width,
            height = config.height,
            shaders_cached = library.cache().len(),
            "renderer ready"
        );

        Ok(Self {
            config: config.clone(),
            targets: RenderTargets::new(device, config.width, config.height)?,
            frame_constants: ConstantRing::new(device, "frame_constants", std::mem::size_of::<FrameConstants>() as u64, 1, frames)?,
            library,
            mesh_cache,
            creatures,
            trees,
            grass,
            terrain,
            water,
            lists,
            stats: FrameStats::default(),
            frames: 0,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn shader_library(&self) -> &ShaderLibrary<B> {
        &self.library
    }

    pub fn targets(&self) -> &RenderTargets<B> {
        &self.targets
    }

    pub fn mesh_cache(&self) -> &MeshCache<B> {
        &self.mesh_cache
    }

    pub fn mesh_cache_mut(&mut self) -> &mut MeshCache<B> {
        &mut self.mesh_cache
    }

    pub fn creatures(&self) -> &CreatureRenderer<B> {
        &self.creatures
    }

    pub fn trees(&self) -> &TreeRenderer<B> {
        &self.trees
    }

    pub fn trees_mut(&mut self) -> &mut TreeRenderer<B> {
        &mut self.trees
    }

    pub fn grass(&self) -> &GrassRenderer<B> {
        &self.grass
    }

    pub fn terrain(&self) -> &TerrainRenderer<B> {
        &self.terrain
    }

    pub fn water(&self) -> Option<&WaterRenderer<B>> {
        self.water.as_ref()
    }

    /// Counters from the last rendered frame.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Records and submits one frame: the creature shadow pass, then terrain,
    /// creatures, grass, trees and finally water in the main pass.
    pub fn render(&mut self, device: &Device<B>, scene: Scene<'_>, camera: &Camera, seconds: f64) -> Result<&FrameStats, RenderError> {
        device.begin_frame();
        let slot = device.current_frame_index();

        let mut camera = camera.clone();
        let (width, height) = self.targets.size();
        camera.set_viewport(width, height);
        let frame = FrameView::new(&camera, seconds, &self.config.lighting, self.config.creatures.shadow_extent);
        self.frame_constants.write(slot, 0, &frame.constants());

        self.terrain.prepare(&frame);
        self.creatures.prepare(device, &mut self.mesh_cache, scene.creatures, &frame, slot)?;
        self.grass.prepare(scene.vegetation, &frame, slot);
        self.trees.prepare(scene.vegetation, &frame, slot);
        if let Some(water) = &mut self.water {
            water.prepare(&frame, slot);
        }

        let cmd = &mut self.lists[slot];
        cmd.begin();

        let mut shadow_draw_calls = 0;
        if let Some(shadow_map) = self.creatures.shadow_map() {
            let size = shadow_map.desc().width;
            cmd.begin_render_pass(RenderPassDesc {
                label: "creature_shadows".into(),
                color: Vec::new(),
                depth: Some(DepthAttachment { texture: shadow_map.clone(), clear: Some(1.0) }),
            });
            cmd.set_viewport(Viewport::full(size, size));
            shadow_draw_calls = self.creatures.record_shadows(cmd, &self.frame_constants, slot);
            cmd.end_render_pass();
        }

        let fog = self.config.lighting.fog_color;
        cmd.begin_render_pass(RenderPassDesc {
            label: "main".into(),
            color: vec![ColorAttachment {
                texture: self.targets.color.clone(),
                clear: Some([f64::from(fog[0]), f64::from(fog[1]), f64::from(fog[2]), 1.0]),
            }],
            depth: Some(DepthAttachment { texture: self.targets.depth.clone(), clear: Some(1.0) }),
        });
        cmd.set_viewport(Viewport::full(width, height));
        self.terrain.record(cmd, &self.frame_constants, slot);
        self.creatures.record(cmd, &self.frame_constants, slot);
        self.grass.record(cmd, &self.frame_constants, slot);
        self.trees.record(cmd, &self.frame_constants, slot);
        let water_draw_calls = match &self.water {
            Some(water) => water.record(cmd, slot),
            None => 0,
        };
        cmd.end_render_pass();
        cmd.end()?;
        device.submit_one(cmd)?;
        device.end_frame();

        self.frames += 1;
        self.stats = FrameStats {
            creatures: self.creatures.stats().clone(),
            shadow_draw_calls,
            trees: self.trees.stats().clone(),
            grass: self.grass.stats().clone(),
            terrain: self.terrain.stats().clone(),
            water_draw_calls,
        };
        tracing::debug!(frame = self.frames, slot, draw_calls = self.stats.draw_calls(), "frame submitted");
        Ok(&self.stats)
    }
}
