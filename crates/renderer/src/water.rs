//! A single tessellated water plane drawn last with alpha blending.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use rhi::shader::ShaderLibrary;
use rhi::{
    Backend, BlendState, CommandList, CullMode, DepthStencilState, Device, GraphicsPipelineDesc, IndexFormat, Pipeline,
    RasterizerState, VertexLayout,
};
use types::{MeshData, Vertex};

use crate::buffers::{mesh_elements, ConstantRing};
use crate::config::WaterConfig;
use crate::error::RenderError;
use crate::frame::FrameView;
use crate::gpu_mesh::GpuMesh;
use crate::shaders;
use crate::targets::{COLOR_FORMAT, DEPTH_FORMAT};

/// Layout of `Water` in `water.wgsl`, padded to a 256-byte multiple.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WaterConstants {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub camera: [f32; 4],
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub deep_color: [f32; 4],
    pub shallow_color: [f32; 4],
    pub wave: [f32; 4],
    pub sky_top: [f32; 4],
    pub sky_horizon: [f32; 4],
    pub surface: [f32; 4],
    /// Specular intensity, water height, underwater depth, clarity.
    pub misc: [f32; 4],
    _pad: [[f32; 4]; 10],
}

const _: () = assert!(std::mem::size_of::<WaterConstants>() % 256 == 0);

impl WaterConstants {
    pub fn new(config: &WaterConfig, frame: &FrameView, water_height: f32) -> Self {
        let rgb = |c: [f32; 3]| [c[0], c[1], c[2], 1.0];
        Self {
            view: frame.view.to_cols_array_2d(),
            projection: frame.projection.to_cols_array_2d(),
            view_projection: frame.view_projection.to_cols_array_2d(),
            camera: frame.eye.extend(frame.time).to_array(),
            light_direction: frame.light_direction.extend(0.0).to_array(),
            light_color: frame.light_color.extend(frame.light_intensity).to_array(),
            deep_color: rgb(config.deep_color),
            shallow_color: rgb(config.shallow_color),
            wave: [config.wave_scale, config.wave_speed, config.wave_height, 0.0],
            sky_top: rgb(config.sky_top),
            sky_horizon: rgb(config.sky_horizon),
            surface: [config.fresnel_power, config.foam_threshold, config.foam_intensity, config.specular_power],
            misc: [config.specular_intensity, water_height, underwater_depth(water_height, frame.eye.y), config.clarity],
            _pad: [[0.0; 4]; 10],
        }
    }

    pub fn underwater_depth(&self) -> f32 {
        self.misc[2]
    }
}

/// How far the camera is below the surface; zero above it.
pub fn underwater_depth(water_height: f32, camera_y: f32) -> f32 {
    (water_height - camera_y).max(0.0)
}

pub struct WaterRenderer<B: Backend> {
    config: WaterConfig,
    water_height: f32,
    pipeline: Arc<Pipeline<B>>,
    mesh: GpuMesh<B>,
    constants: ConstantRing<B>,
    underwater_depth: f32,
}

impl<B: Backend> WaterRenderer<B> {
    pub fn new(
        device: &Device<B>,
        library: &ShaderLibrary<B>,
        config: &WaterConfig,
        world_size: f32,
        water_height: f32,
    ) -> Result<Self, RenderError> {
        let (vs, ps) = shaders::load_pair(library, device, "water.wgsl", shaders::WATER)?;
        let mut desc = GraphicsPipelineDesc::new("water", vs);
        desc.pixel_shader = Some(ps);
        desc.vertex_layout = VertexLayout { elements: mesh_elements(), strides: vec![Vertex::STRIDE] };
        desc.rasterizer = RasterizerState { cull: CullMode::None, ..RasterizerState::default() };
        desc.depth_stencil = DepthStencilState { depth_write: false, ..DepthStencilState::default() };
        desc.blend = BlendState::ALPHA;
        desc.render_target_formats = vec![COLOR_FORMAT];
        desc.depth_format = Some(DEPTH_FORMAT);
        let pipeline = device.create_pipeline(&desc)?;
        let mesh = GpuMesh::upload(device, "water_grid", &MeshData::grid_plane(world_size, config.cells.max(1)))?;

        Ok(Self {
            config: config.clone(),
            water_height,
            pipeline,
            mesh,
            constants: ConstantRing::new(
                device,
                "water_constants",
                std::mem::size_of::<WaterConstants>() as u64,
                1,
                device.frames_in_flight(),
            )?,
            underwater_depth: 0.0,
        })
    }

    pub fn water_height(&self) -> f32 {
        self.water_height
    }

    /// Depth below the surface computed for the last prepared frame.
    pub fn underwater_depth(&self) -> f32 {
        self.underwater_depth
    }

    pub fn prepare(&mut self, frame: &FrameView, slot: usize) {
        let constants = WaterConstants::new(&self.config, frame, self.water_height);
        self.underwater_depth = constants.underwater_depth();
        self.constants.write(slot, 0, &constants);
    }

    /// One draw. Must come after every opaque renderer.
    pub fn record(&self, cmd: &mut CommandList<B>, slot: usize) -> usize {
        cmd.set_pipeline(&self.pipeline);
        self.constants.bind(cmd, 0, slot, 0);
        cmd.set_vertex_buffer(0, &self.mesh.vertex_buffer, 0, Vertex::STRIDE);
        cmd.set_index_buffer(&self.mesh.index_buffer, 0, IndexFormat::U32);
        cmd.draw_indexed(self.mesh.index_count, 1, 0, 0, 0);
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::config::LightingConfig;

    #[test]
    fn constants_are_512_bytes() {
        assert_eq!(std::mem::size_of::<WaterConstants>(), 512);
    }

    #[test]
    fn depth_is_clamped_above_surface() {
        assert_eq!(underwater_depth(0.0, 10.0), 0.0);
        assert_eq!(underwater_depth(2.0, -3.0), 5.0);
    }

    #[test]
    fn constants_carry_camera_and_config() {
        let mut camera = Camera::new(100.0);
        camera.pitch = -0.5;
        let frame = FrameView::new(&camera, 3.0, &LightingConfig::default(), 50.0);
        let config = WaterConfig::default();
        let c = WaterConstants::new(&config, &frame, 1.0);
        assert_eq!(c.camera[3], 3.0);
        assert_eq!(c.wave, [config.wave_scale, config.wave_speed, config.wave_height, 0.0]);
        assert_eq!(c.misc[1], 1.0);
        assert_eq!(c.underwater_depth(), underwater_depth(1.0, frame.eye.y));
    }
}
