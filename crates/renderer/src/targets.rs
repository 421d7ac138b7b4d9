//! Offscreen color and depth targets for the main pass.

use std::sync::Arc;

use rhi::{Backend, Device, Format, RhiError, Texture, TextureDesc, TextureUsage};

pub const COLOR_FORMAT: Format = Format::Bgra8Unorm;
pub const DEPTH_FORMAT: Format = Format::D32Float;

pub struct RenderTargets<B: Backend> {
    pub color: Arc<Texture<B>>,
    pub depth: Arc<Texture<B>>,
    width: u32,
    height: u32,
}

impl<B: Backend> RenderTargets<B> {
    pub fn new(device: &Device<B>, width: u32, height: u32) -> Result<Self, RhiError> {
        let (width, height) = (width.max(1), height.max(1));
        let color = device.create_texture(&TextureDesc::d2(
            "scene_color",
            width,
            height,
            COLOR_FORMAT,
            TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED | TextureUsage::COPY_SRC,
        ))?;
        let depth =
            device.create_texture(&TextureDesc::d2("scene_depth", width, height, DEPTH_FORMAT, TextureUsage::DEPTH_STENCIL))?;
        Ok(Self { color, depth, width, height })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}
