use std::sync::Arc;

use crate::command::Command;
use crate::desc::{BufferDesc, ShaderDesc, SwapchainDesc, TextureDesc};
use crate::error::RhiError;
use crate::resource::GraphicsPipelineDesc;

/// What the adapter can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub backend: &'static str,
    pub device_name: String,
    /// Dedicated video memory in bytes, 0 when the backend does not report it.
    pub dedicated_video_memory: u64,
    pub max_texture_size: u32,
    pub max_render_targets: u32,
    pub supports_raytracing: bool,
    pub supports_mesh_shaders: bool,
    pub supports_vrs: bool,
}

/// A graphics API implementation.
///
/// The front end ([`crate::Device`]) owns one backend behind an `Arc`. Closed
/// command lists reach the backend as frozen `Vec<Command<Self>>` and are
/// translated in order; each [`Backend::submit`] returns a monotonically
/// increasing serial that fences map onto.
pub trait Backend: Send + Sync + Sized + 'static {
    type Buffer: Send + Sync + 'static;
    type Texture: Send + Sync + 'static;
    type Shader: Send + Sync + 'static;
    type Pipeline: Send + Sync + 'static;
    type Surface: Send + Sync + 'static;
    /// Whatever the platform hands over to create a presentable surface.
    type Window;

    fn capabilities(&self) -> Capabilities;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Self::Buffer, RhiError>;
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    /// Hands `f` a writable view of `len` bytes at `offset`. The default
    /// stages through a scratch vector.
    fn write_buffer_with(&self, buffer: &Self::Buffer, offset: u64, len: usize, f: &mut dyn FnMut(&mut [u8])) {
        let mut scratch = vec![0u8; len];
        f(&mut scratch);
        self.write_buffer(buffer, offset, &scratch);
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Self::Texture, RhiError>;
    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<Self::Shader, RhiError>;
    fn create_pipeline(&self, desc: &GraphicsPipelineDesc<Self>) -> Result<Self::Pipeline, RhiError>;

    /// Executes `lists` in order on the single graphics queue.
    fn submit(&self, lists: &[Arc<Vec<Command<Self>>>]) -> u64;
    fn last_submitted_serial(&self) -> u64;
    fn completed_serial(&self) -> u64;
    /// Blocks until `serial` has retired.
    fn wait_serial(&self, serial: u64);

    fn create_surface(&self, window: Self::Window, desc: &SwapchainDesc) -> Result<Self::Surface, RhiError>;
    fn acquire_back_buffer(&self, surface: &Self::Surface) -> Result<(Self::Texture, TextureDesc), RhiError>;
    fn present(&self, surface: &Self::Surface) -> Result<(), RhiError>;
    fn resize_surface(&self, surface: &Self::Surface, width: u32, height: u32) -> Result<(), RhiError>;
}
