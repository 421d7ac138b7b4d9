//! Front-end resource wrappers shared through `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytemuck::Pod;

use crate::backend::Backend;
use crate::desc::{
    BlendState, BufferDesc, CpuAccess, DepthStencilState, Format, RasterizerState, ResourceState, ShaderStage,
    TextureDesc, Topology, VertexLayout,
};
use crate::descriptor::DescriptorHandle;
use crate::shader::Reflection;
use crate::sync::lock;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

pub struct Buffer<B: Backend> {
    id: u64,
    desc: BufferDesc,
    raw: B::Buffer,
    backend: Arc<B>,
    state: Mutex<ResourceState>,
}

impl<B: Backend> Buffer<B> {
    pub(crate) fn new(desc: BufferDesc, raw: B::Buffer, backend: Arc<B>, state: ResourceState) -> Self {
        Self { id: next_resource_id(), desc, raw, backend, state: Mutex::new(state) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn raw(&self) -> &B::Buffer {
        &self.raw
    }

    /// Last state recorded by a barrier. Diagnostic only.
    pub fn state(&self) -> ResourceState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        *lock(&self.state) = state;
    }

    fn check_write(&self, offset: u64, len: usize) -> bool {
        if self.desc.cpu_access != CpuAccess::Write {
            tracing::warn!(buffer = %self.desc.label, "write to a buffer without CPU write access ignored");
            return false;
        }
        if offset + len as u64 > self.desc.size {
            tracing::warn!(
                buffer = %self.desc.label,
                offset,
                len,
                size = self.desc.size,
                "write past end of buffer ignored"
            );
            return false;
        }
        true
    }

    /// Copies `data` into the upload-heap buffer at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) {
        if data.is_empty() || !self.check_write(offset, data.len()) {
            return;
        }
        self.backend.write_buffer(&self.raw, offset, data);
    }

    pub fn write_pod<T: Pod>(&self, offset: u64, data: &[T]) {
        self.write(offset, bytemuck::cast_slice(data));
    }

    /// Write-scoped region of `len` bytes at `offset`.
    pub fn write_with(&self, offset: u64, len: usize, mut f: impl FnMut(&mut [u8])) {
        if len == 0 || !self.check_write(offset, len) {
            return;
        }
        self.backend.write_buffer_with(&self.raw, offset, len, &mut f);
    }
}

impl<B: Backend> std::fmt::Debug for Buffer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("id", &self.id).field("desc", &self.desc).finish()
    }
}

pub struct Texture<B: Backend> {
    id: u64,
    desc: TextureDesc,
    raw: B::Texture,
    state: Mutex<ResourceState>,
    pub(crate) rtv: Option<DescriptorHandle>,
    pub(crate) dsv: Option<DescriptorHandle>,
    pub(crate) srv: Option<DescriptorHandle>,
}

impl<B: Backend> Texture<B> {
    pub(crate) fn new(desc: TextureDesc, raw: B::Texture, state: ResourceState) -> Self {
        Self { id: next_resource_id(), desc, raw, state: Mutex::new(state), rtv: None, dsv: None, srv: None }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn format(&self) -> Format {
        self.desc.format
    }

    pub fn raw(&self) -> &B::Texture {
        &self.raw
    }

    pub fn state(&self) -> ResourceState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        *lock(&self.state) = state;
    }

    pub fn rtv(&self) -> Option<DescriptorHandle> {
        self.rtv
    }

    pub fn dsv(&self) -> Option<DescriptorHandle> {
        self.dsv
    }

    pub fn srv(&self) -> Option<DescriptorHandle> {
        self.srv
    }

    /// Shader-visible descriptor handle, for external UI libraries.
    pub fn srv_gpu_handle(&self) -> Option<u64> {
        self.srv.map(|h| h.gpu_handle())
    }
}

impl<B: Backend> std::fmt::Debug for Texture<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture").field("id", &self.id).field("desc", &self.desc).finish()
    }
}

pub struct Shader<B: Backend> {
    id: u64,
    stage: ShaderStage,
    entry_point: String,
    bytecode: Arc<[u32]>,
    raw: B::Shader,
    reflection: Option<Reflection>,
}

impl<B: Backend> Shader<B> {
    pub(crate) fn new(
        stage: ShaderStage,
        entry_point: String,
        bytecode: &[u32],
        raw: B::Shader,
        reflection: Option<Reflection>,
    ) -> Self {
        Self { id: next_resource_id(), stage, entry_point, bytecode: Arc::from(bytecode), raw, reflection }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// SPIR-V words the shader was created from.
    pub fn bytecode(&self) -> &[u32] {
        &self.bytecode
    }

    pub fn raw(&self) -> &B::Shader {
        &self.raw
    }

    pub fn reflection(&self) -> Option<&Reflection> {
        self.reflection.as_ref()
    }
}

impl<B: Backend> std::fmt::Debug for Shader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader").field("id", &self.id).field("stage", &self.stage).field("entry_point", &self.entry_point).finish()
    }
}

/// Graphics pipeline state. The root layout is fixed (b0, b1, t0, s0).
pub struct GraphicsPipelineDesc<B: Backend> {
    pub label: String,
    pub vertex_shader: Arc<Shader<B>>,
    pub pixel_shader: Option<Arc<Shader<B>>>,
    pub geometry_shader: Option<Arc<Shader<B>>>,
    pub hull_shader: Option<Arc<Shader<B>>>,
    pub domain_shader: Option<Arc<Shader<B>>>,
    pub vertex_layout: VertexLayout,
    pub topology: Topology,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    pub render_target_formats: Vec<Format>,
    pub depth_format: Option<Format>,
    pub sample_count: u32,
}

impl<B: Backend> GraphicsPipelineDesc<B> {
    pub fn new(label: impl Into<String>, vertex_shader: Arc<Shader<B>>) -> Self {
        Self {
            label: label.into(),
            vertex_shader,
            pixel_shader: None,
            geometry_shader: None,
            hull_shader: None,
            domain_shader: None,
            vertex_layout: VertexLayout::default(),
            topology: Topology::TriangleList,
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState::default(),
            blend: BlendState::OPAQUE,
            render_target_formats: Vec::new(),
            depth_format: None,
            sample_count: 1,
        }
    }
}

pub struct Pipeline<B: Backend> {
    id: u64,
    label: String,
    topology: Topology,
    raw: B::Pipeline,
}

impl<B: Backend> Pipeline<B> {
    pub(crate) fn new(label: String, topology: Topology, raw: B::Pipeline) -> Self {
        Self { id: next_resource_id(), label, topology, raw }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn raw(&self) -> &B::Pipeline {
        &self.raw
    }
}
