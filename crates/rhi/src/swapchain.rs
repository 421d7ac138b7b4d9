use std::sync::Arc;

use crate::backend::Backend;
use crate::desc::{ResourceState, SwapchainDesc, TextureUsage};
use crate::descriptor::DescriptorHandle;
use crate::device::Device;
use crate::error::RhiError;
use crate::resource::Texture;

/// Ring of presentable back buffers, each with a pre-allocated RTV.
pub struct Swapchain<B: Backend> {
    surface: B::Surface,
    backend: Arc<B>,
    desc: SwapchainDesc,
    rtvs: Vec<DescriptorHandle>,
    current: usize,
}

impl<B: Backend> Swapchain<B> {
    pub(crate) fn new(device: &Device<B>, window: B::Window, desc: &SwapchainDesc) -> Result<Self, RhiError> {
        let buffer_count = desc.buffer_count.max(2);
        let desc = SwapchainDesc { buffer_count, ..desc.clone() };
        let surface = device.backend().create_surface(window, &desc)?;
        let rtvs = (0..buffer_count).map(|_| device.heaps().rtv.allocate()).collect::<Result<Vec<_>, _>>()?;
        tracing::info!(width = desc.width, height = desc.height, buffers = buffer_count, vsync = desc.vsync, "swapchain created");
        Ok(Self { surface, backend: Arc::clone(device.backend()), desc, rtvs, current: 0 })
    }

    pub fn desc(&self) -> &SwapchainDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The back buffer to render into this frame, in the present state.
    pub fn acquire(&mut self) -> Result<Arc<Texture<B>>, RhiError> {
        let (raw, mut tex_desc) = self.backend.acquire_back_buffer(&self.surface)?;
        tex_desc.usage |= TextureUsage::RENDER_TARGET;
        let mut texture = Texture::new(tex_desc, raw, ResourceState::Present);
        texture.rtv = Some(self.rtvs[self.current]);
        Ok(Arc::new(texture))
    }

    pub fn present(&mut self) -> Result<(), RhiError> {
        self.backend.present(&self.surface)?;
        self.current = (self.current + 1) % self.rtvs.len();
        Ok(())
    }

    /// Waits for the GPU to go idle, then resizes the back buffers.
    pub fn resize(&mut self, device: &Device<B>, width: u32, height: u32) -> Result<(), RhiError> {
        if width == 0 || height == 0 || (width == self.desc.width && height == self.desc.height) {
            return Ok(());
        }
        device.wait_idle();
        self.backend.resize_surface(&self.surface, width, height)?;
        self.desc.width = width;
        self.desc.height = height;
        self.current = 0;
        tracing::debug!(width, height, "swapchain resized");
        Ok(())
    }
}
