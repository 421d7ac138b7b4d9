//! The device front end: resource factories, submission and frame pacing.

use std::sync::{Arc, Mutex};

use types::OrFatal;

use crate::backend::{Backend, Capabilities};
use crate::command::CommandList;
use crate::desc::{BufferDesc, BufferUsage, CommandListKind, CpuAccess, ResourceState, ShaderDesc, SwapchainDesc, TextureDesc, TextureUsage};
use crate::descriptor::{DescriptorHeap, DescriptorHeaps};
use crate::error::RhiError;
use crate::fence::Fence;
use crate::pool::CommandListPool;
use crate::resource::{Buffer, GraphicsPipelineDesc, Pipeline, Shader, Texture};
use crate::shader::{CompileOptions, Reflection, ShaderCompiler};
use crate::swapchain::Swapchain;
use crate::sync::lock;

#[derive(Debug, Clone)]
pub struct DeviceDesc {
    /// Frames the CPU may record ahead of the GPU. At least 2.
    pub frames_in_flight: u32,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self { frames_in_flight: 2 }
    }
}

struct FrameState {
    values: Vec<u64>,
    current: usize,
    next_value: u64,
}

pub struct Device<B: Backend> {
    backend: Arc<B>,
    caps: Capabilities,
    heaps: DescriptorHeaps,
    frame_fences: Vec<Arc<Fence<B>>>,
    frames: Mutex<FrameState>,
}

impl<B: Backend> Device<B> {
    pub fn try_new(backend: B, desc: &DeviceDesc) -> Result<Self, RhiError> {
        let frames = if desc.frames_in_flight < 2 {
            tracing::warn!(requested = desc.frames_in_flight, "frames in flight raised to 2");
            2
        } else {
            desc.frames_in_flight
        } as usize;

        let backend = Arc::new(backend);
        let caps = backend.capabilities();
        types::rhi_assert!(
            caps.max_render_targets > 0 && caps.max_texture_size > 0,
            "{} backend reports no renderable texture support",
            caps.backend
        );
        tracing::info!(
            backend = caps.backend,
            device = %caps.device_name,
            max_texture = caps.max_texture_size,
            frames,
            "device created"
        );

        let frame_fences = (0..frames).map(|_| Arc::new(Fence::new(Arc::clone(&backend), 0))).collect();
        Ok(Self {
            backend,
            caps,
            heaps: DescriptorHeaps::new(),
            frame_fences,
            frames: Mutex::new(FrameState { values: vec![0; frames], current: 0, next_value: 1 }),
        })
    }

    /// Like [`Device::try_new`] but aborts on failure.
    pub fn new(backend: B, desc: &DeviceDesc) -> Self {
        Self::try_new(backend, desc).or_fatal("device creation")
    }

    /// The native backend, for interop with external UI libraries.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// The shader-visible CBV/SRV/UAV heap.
    pub fn shader_visible_heap(&self) -> &DescriptorHeap {
        &self.heaps.srv
    }

    pub fn heaps(&self) -> &DescriptorHeaps {
        &self.heaps
    }

    // ---- resources ----

    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<Buffer<B>>, RhiError> {
        if desc.size == 0 {
            return Err(RhiError::BufferCreation(format!("{}: zero-sized buffer", desc.label)));
        }
        let raw = self.backend.create_buffer(desc)?;
        Ok(Arc::new(Buffer::new(desc.clone(), raw, Arc::clone(&self.backend), ResourceState::Common)))
    }

    /// Creates a buffer holding `data`. GPU-only buffers are filled through a
    /// throw-away staging buffer and a copy on the graphics queue; the call
    /// blocks until the copy retires.
    pub fn create_buffer_with_data(&self, desc: &BufferDesc, data: &[u8]) -> Result<Arc<Buffer<B>>, RhiError> {
        let mut desc = desc.clone();
        desc.size = desc.size.max(data.len() as u64);
        if desc.cpu_access == CpuAccess::Write {
            let buffer = self.create_buffer(&desc)?;
            buffer.write(0, data);
            return Ok(buffer);
        }

        desc.usage |= BufferUsage::COPY_DST;
        let dst = self.create_buffer(&desc)?;
        if data.is_empty() {
            return Ok(dst);
        }
        let staging = self.create_buffer(&BufferDesc::upload(
            format!("{}_staging", desc.label),
            data.len() as u64,
            BufferUsage::COPY_SRC,
        ))?;
        staging.write(0, data);

        let mut list = self.create_command_list(CommandListKind::Graphics, "upload");
        list.begin();
        list.buffer_barrier(Some(&dst), ResourceState::Common, ResourceState::CopyDest);
        list.copy_buffer(&staging, 0, &dst, 0, data.len() as u64);
        list.buffer_barrier(Some(&dst), ResourceState::CopyDest, resting_state(desc.usage));
        list.end()?;
        self.submit_one(&mut list)?;

        let fence = self.create_fence(0);
        self.signal_fence(&fence, 1);
        fence.wait(1);
        Ok(dst)
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<Texture<B>>, RhiError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::TextureCreation(format!("{}: zero extent", desc.label)));
        }
        if desc.width > self.caps.max_texture_size || desc.height > self.caps.max_texture_size {
            return Err(RhiError::TextureCreation(format!(
                "{}: {}x{} exceeds max texture size {}",
                desc.label, desc.width, desc.height, self.caps.max_texture_size
            )));
        }
        let raw = self.backend.create_texture(desc)?;
        let mut texture = Texture::new(desc.clone(), raw, ResourceState::Common);
        self.allocate_views(&mut texture, desc.usage)?;
        Ok(Arc::new(texture))
    }

    pub(crate) fn allocate_views(&self, texture: &mut Texture<B>, usage: TextureUsage) -> Result<(), RhiError> {
        if usage.contains(TextureUsage::RENDER_TARGET) {
            texture.rtv = Some(self.heaps.rtv.allocate()?);
        }
        if usage.contains(TextureUsage::DEPTH_STENCIL) {
            texture.dsv = Some(self.heaps.dsv.allocate()?);
        }
        if usage.intersects(TextureUsage::SAMPLED | TextureUsage::UAV) {
            texture.srv = Some(self.heaps.srv.allocate()?);
        }
        Ok(())
    }

    pub fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<Arc<Shader<B>>, RhiError> {
        self.create_shader_reflected(desc, None)
    }

    pub fn create_shader_reflected(
        &self,
        desc: &ShaderDesc<'_>,
        reflection: Option<Reflection>,
    ) -> Result<Arc<Shader<B>>, RhiError> {
        if desc.bytecode.is_empty() {
            return Err(RhiError::ShaderCreation(format!("{}: empty bytecode", desc.label)));
        }
        let raw = self.backend.create_shader(desc)?;
        Ok(Arc::new(Shader::new(desc.stage, desc.entry_point.to_string(), desc.bytecode, raw, reflection)))
    }

    /// Compiles `source` and creates the shader from the resulting bytecode.
    pub fn create_shader_from_source(
        &self,
        label: &str,
        source: &str,
        options: &CompileOptions,
    ) -> Result<Arc<Shader<B>>, RhiError> {
        let result = ShaderCompiler::new().compile_source(source, label, options);
        if !result.success {
            return Err(RhiError::ShaderCreation(format!("{label}: {}", result.errors)));
        }
        let entry = options.entry_point_or_default();
        self.create_shader_reflected(
            &ShaderDesc { stage: options.stage, entry_point: &entry, bytecode: &result.bytecode, label },
            Some(result.reflection),
        )
    }

    pub fn create_pipeline(&self, desc: &GraphicsPipelineDesc<B>) -> Result<Arc<Pipeline<B>>, RhiError> {
        if desc.render_target_formats.len() as u32 > self.caps.max_render_targets {
            return Err(RhiError::PipelineCreation(format!(
                "{}: {} render targets exceeds {}",
                desc.label,
                desc.render_target_formats.len(),
                self.caps.max_render_targets
            )));
        }
        let raw = self.backend.create_pipeline(desc)?;
        Ok(Arc::new(Pipeline::new(desc.label.clone(), desc.topology, raw)))
    }

    pub fn create_swapchain(&self, window: B::Window, desc: &SwapchainDesc) -> Result<Swapchain<B>, RhiError> {
        Swapchain::new(self, window, desc)
    }

    pub fn create_command_list(&self, kind: CommandListKind, label: impl Into<String>) -> CommandList<B> {
        CommandList::new(kind, self.heaps.srv.id(), label)
    }

    pub fn create_command_list_pool(&self, kind: CommandListKind, max_lists: usize) -> CommandListPool<B> {
        CommandListPool::new(kind, self.heaps.srv.id(), max_lists)
    }

    pub fn create_fence(&self, initial: u64) -> Arc<Fence<B>> {
        Arc::new(Fence::new(Arc::clone(&self.backend), initial))
    }

    // ---- submission ----

    /// Executes closed lists in argument order. Nothing is submitted if any
    /// list is not closed.
    pub fn submit(&self, lists: &mut [&mut CommandList<B>]) -> Result<u64, RhiError> {
        let recorded = lists.iter().map(|l| l.take_for_submit()).collect::<Result<Vec<_>, _>>()?;
        let serial = self.backend.submit(&recorded);
        for list in lists.iter_mut() {
            list.mark_submitted();
        }
        Ok(serial)
    }

    pub fn submit_one(&self, list: &mut CommandList<B>) -> Result<u64, RhiError> {
        self.submit(&mut [list])
    }

    /// Signals `value` on `fence` once all work submitted so far retires.
    pub fn signal_fence(&self, fence: &Fence<B>, value: u64) {
        fence.signal_on_queue(value);
    }

    /// False if `value` was never signalled on `fence`.
    pub fn wait_fence(&self, fence: &Fence<B>, value: u64) -> bool {
        fence.wait(value)
    }

    // ---- frame pacing ----

    /// Blocks until the work last submitted in the current frame slot retires.
    pub fn begin_frame(&self) {
        let (slot, value) = {
            let frames = lock(&self.frames);
            (frames.current, frames.values[frames.current])
        };
        self.frame_fences[slot].wait(value);
    }

    /// Signals a fresh value on the current slot's fence and advances the slot.
    pub fn end_frame(&self) {
        let mut frames = lock(&self.frames);
        let slot = frames.current;
        let value = frames.next_value;
        frames.next_value += 1;
        frames.values[slot] = value;
        self.frame_fences[slot].signal_on_queue(value);
        frames.current = (slot + 1) % frames.values.len();
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frame_fences.len()
    }

    pub fn current_frame_index(&self) -> usize {
        lock(&self.frames).current
    }

    pub fn frame_fence(&self, slot: usize) -> &Arc<Fence<B>> {
        &self.frame_fences[slot % self.frame_fences.len()]
    }

    pub fn frame_fence_value(&self, slot: usize) -> u64 {
        let frames = lock(&self.frames);
        frames.values[slot % frames.values.len()]
    }

    /// Blocks until the queue is idle.
    pub fn wait_idle(&self) {
        let fence = self.create_fence(0);
        fence.signal_on_queue(1);
        fence.wait(1);
    }
}

/// State a GPU-only buffer settles in after its initial upload.
fn resting_state(usage: BufferUsage) -> ResourceState {
    if usage.intersects(BufferUsage::VERTEX | BufferUsage::CONSTANT) {
        ResourceState::VertexBuffer
    } else if usage.contains(BufferUsage::INDEX) {
        ResourceState::IndexBuffer
    } else if usage.contains(BufferUsage::INDIRECT) {
        ResourceState::IndirectArgument
    } else if usage.contains(BufferUsage::STORAGE) {
        ResourceState::UnorderedAccess
    } else {
        ResourceState::Common
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resting_states() {
        assert_eq!(resting_state(BufferUsage::VERTEX), ResourceState::VertexBuffer);
        assert_eq!(resting_state(BufferUsage::INDEX), ResourceState::IndexBuffer);
        assert_eq!(resting_state(BufferUsage::COPY_DST), ResourceState::Common);
    }
}
