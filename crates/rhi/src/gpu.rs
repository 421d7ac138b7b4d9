//! The `wgpu` backend.
//!
//! Every pipeline shares one bind group layout: two uniform buffers at
//! bindings 0 and 1, a sampled 2D texture at 2 and a linear sampler at 3.
//! Bind groups are built lazily when a draw is flushed and cached by the
//! resources they reference. Unbound slots fall back to a zeroed constant
//! buffer and a 1x1 white texture.

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, Capabilities};
use crate::command::{BarrierTarget, Command, RenderPassDesc};
use crate::desc::{
    BlendFactor, BlendOp, BlendState, BufferDesc, BufferUsage, CompareFunc, CpuAccess, CullMode, FillMode, Format,
    IndexFormat, InputRate, ScissorRect, ShaderDesc, ShaderStage, SwapchainDesc, TextureDesc, TextureDimension,
    TextureUsage, Topology, Viewport,
};
use crate::error::RhiError;
use crate::resource::{Buffer, GraphicsPipelineDesc, Pipeline, Texture};
use crate::sync::lock;

const ZERO_CONSTANTS_SIZE: u64 = 16 * 1024;
const BIND_GROUP_CACHE_LIMIT: usize = 1024;

pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

impl GpuBuffer {
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

pub struct GpuShader {
    module: wgpu::ShaderModule,
    entry_point: String,
}

pub struct GpuPipeline {
    pipeline: wgpu::RenderPipeline,
}

pub struct GpuSurface {
    surface: wgpu::Surface<'static>,
    config: Mutex<wgpu::SurfaceConfiguration>,
    current: Mutex<Option<wgpu::SurfaceTexture>>,
}

#[derive(Debug, Clone)]
pub struct WgpuDesc {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
}

impl Default for WgpuDesc {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BindKey {
    constants: [(u64, u64); 2],
    texture: u64,
}

pub struct WgpuBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    features: wgpu::Features,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    white: GpuTexture,
    zero_constants: wgpu::Buffer,
    bind_groups: Mutex<HashMap<BindKey, wgpu::BindGroup>>,
    in_flight: Mutex<VecDeque<(u64, wgpu::SubmissionIndex)>>,
    last_submitted: AtomicU64,
    completed: Arc<AtomicU64>,
}

impl WgpuBackend {
    /// Picks an adapter and opens a device without a surface.
    pub fn new(desc: &WgpuDesc) -> Result<Self, RhiError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor { backends: desc.backends, ..Default::default() });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: desc.power_preference,
            compatible_surface: None,
            force_fallback_adapter: desc.force_fallback_adapter,
        }))
        .map_err(|e| RhiError::NoAdapter(e.to_string()))?;

        let info = adapter.get_info();
        tracing::info!(name = %info.name, device_type = ?info.device_type, backend = ?info.backend, "gpu adapter");

        let optional = wgpu::Features::POLYGON_MODE_LINE | wgpu::Features::DEPTH_CLIP_CONTROL;
        let features = adapter.features() & optional;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("rhi_device"),
            required_features: features,
            required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| RhiError::DeviceRequest(e.to_string()))?;
        let limits = device.limits();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("rhi_root_bgl"),
            entries: &[
                uniform_entry(0),
                uniform_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("rhi_root_pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("rhi_linear_repeat"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("rhi_white"),
            size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            white_texture.as_image_copy(),
            &[255; 4],
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4), rows_per_image: Some(1) },
            wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        );
        let white_view = white_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let zero_constants = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("rhi_zero_constants"),
            size: ZERO_CONSTANTS_SIZE,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            info,
            limits,
            features,
            bind_group_layout,
            pipeline_layout,
            sampler,
            white: GpuTexture { texture: white_texture, view: white_view },
            zero_constants,
            bind_groups: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(VecDeque::new()),
            last_submitted: AtomicU64::new(0),
            completed: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Copies a readback buffer's contents to the host, blocking until mapped.
    pub fn read_buffer(&self, buffer: &Buffer<WgpuBackend>) -> Result<Vec<u8>, RhiError> {
        if buffer.desc().cpu_access != CpuAccess::Read {
            return Err(RhiError::Readback(format!("{}: not a readback buffer", buffer.desc().label)));
        }
        let slice = buffer.raw().buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        if let Err(e) = self.device.poll(wgpu::PollType::Wait { submission_index: None, timeout: None }) {
            tracing::warn!(error = %e, "device poll failed");
        }
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RhiError::Readback(format!("{}: map failed: {e}", buffer.desc().label))),
            Err(e) => return Err(RhiError::Readback(format!("{}: map dropped: {e}", buffer.desc().label))),
        }
        let data = slice.get_mapped_range().to_vec();
        buffer.raw().buffer.unmap();
        data.get(..buffer.size() as usize)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| RhiError::Readback(format!("{}: short mapping", buffer.desc().label)))
    }

    fn retire(&self) {
        let completed = self.completed.load(Ordering::Acquire);
        let mut in_flight = lock(&self.in_flight);
        while in_flight.front().is_some_and(|(serial, _)| *serial <= completed) {
            in_flight.pop_front();
        }
    }

    fn bind_group<'a>(&'a self, key: BindKey, constants: [Option<(&'a GpuBuffer, u64)>; 2], texture: Option<&'a GpuTexture>) -> wgpu::BindGroup {
        let mut cache = lock(&self.bind_groups);
        if let Some(group) = cache.get(&key) {
            return group.clone();
        }
        if cache.len() >= BIND_GROUP_CACHE_LIMIT {
            tracing::debug!(entries = cache.len(), "bind group cache cleared");
            cache.clear();
        }
        let max_binding = u64::from(self.limits.max_uniform_buffer_binding_size);
        let binding = |slot: Option<(&'a GpuBuffer, u64)>| -> wgpu::BufferBinding<'a> {
            match slot {
                Some((buffer, offset)) => wgpu::BufferBinding {
                    buffer: &buffer.buffer,
                    offset,
                    size: NonZeroU64::new(buffer.size.saturating_sub(offset).min(max_binding)),
                },
                None => wgpu::BufferBinding { buffer: &self.zero_constants, offset: 0, size: None },
            }
        };
        let view = texture.map_or(&self.white.view, |t| &t.view);
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("rhi_root_bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::Buffer(binding(constants[0])) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Buffer(binding(constants[1])) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(view) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(&self.sampler) },
            ],
        });
        cache.insert(key, group.clone());
        group
    }

    fn record(&self, commands: &[Command<WgpuBackend>]) -> wgpu::CommandBuffer {
        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("rhi_list") });
        let mut recorder = Recorder { backend: self, encoder, pass: None, state: Bound::default() };
        for cmd in commands {
            recorder.apply(cmd);
        }
        recorder.pass = None;
        recorder.encoder.finish()
    }

    fn configure(&self, surface: &GpuSurface, config: &wgpu::SurfaceConfiguration) {
        surface.surface.configure(&self.device, config);
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[derive(Default)]
struct Bound<'c> {
    pipeline: Option<&'c Pipeline<WgpuBackend>>,
    vertex: Vec<Option<(&'c Buffer<WgpuBackend>, u64)>>,
    index: Option<(&'c Buffer<WgpuBackend>, u64, IndexFormat)>,
    constants: [Option<(&'c Buffer<WgpuBackend>, u64)>; 2],
    texture: Option<&'c Texture<WgpuBackend>>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    dirty: bool,
}

/// Translates one frozen command list into a `wgpu` command buffer. State
/// set outside a pass carries into the next one and is flushed at draw time.
struct Recorder<'b, 'c> {
    backend: &'b WgpuBackend,
    encoder: wgpu::CommandEncoder,
    pass: Option<wgpu::RenderPass<'static>>,
    state: Bound<'c>,
}

impl<'b, 'c> Recorder<'b, 'c> {
    fn apply(&mut self, cmd: &'c Command<WgpuBackend>) {
        match cmd {
            Command::Barrier { target, before, after } => {
                let id = match target {
                    BarrierTarget::Buffer(b) => b.id(),
                    BarrierTarget::Texture(t) => t.id(),
                };
                tracing::trace!(id, ?before, ?after, "barrier handled by wgpu");
            }
            Command::CopyBuffer { src, src_offset, dst, dst_offset, size } => {
                self.close_pass("copy_buffer");
                let size = align4(*size)
                    .min(src.raw().size.saturating_sub(*src_offset))
                    .min(dst.raw().size.saturating_sub(*dst_offset));
                self.encoder.copy_buffer_to_buffer(&src.raw().buffer, *src_offset, &dst.raw().buffer, *dst_offset, size);
            }
            Command::CopyBufferToTexture { src, src_offset, bytes_per_row, dst, width, height } => {
                self.close_pass("copy_buffer_to_texture");
                if bytes_per_row % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT != 0 {
                    tracing::warn!(bytes_per_row, texture = %dst.desc().label, "row pitch not 256-aligned; copy skipped");
                    return;
                }
                self.encoder.copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: &src.raw().buffer,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: *src_offset,
                            bytes_per_row: Some(*bytes_per_row),
                            rows_per_image: Some(*height),
                        },
                    },
                    dst.raw().texture.as_image_copy(),
                    wgpu::Extent3d { width: *width, height: *height, depth_or_array_layers: 1 },
                );
            }
            Command::SetDescriptorHeap { .. } => {}
            Command::BeginRenderPass(desc) => self.begin_pass(desc),
            Command::EndRenderPass => self.pass = None,
            Command::SetPipeline(p) => self.set(|s| s.pipeline = Some(&**p)),
            Command::SetVertexBuffer { slot, buffer, offset, .. } => {
                let slot = *slot as usize;
                self.set(|s| {
                    if s.vertex.len() <= slot {
                        s.vertex.resize(slot + 1, None);
                    }
                    s.vertex[slot] = Some((&**buffer, *offset));
                });
            }
            Command::SetIndexBuffer { buffer, offset, format } => self.set(|s| s.index = Some((&**buffer, *offset, *format))),
            Command::SetConstantBuffer { slot, buffer, offset } => {
                let slot = (*slot as usize).min(1);
                self.set(|s| s.constants[slot] = Some((&**buffer, *offset)));
            }
            Command::SetTexture { texture, .. } => self.set(|s| s.texture = Some(&**texture)),
            Command::SetViewport(v) => self.set(|s| s.viewport = Some(*v)),
            Command::SetScissor(r) => self.set(|s| s.scissor = Some(*r)),
            Command::Draw { vertex_count, instance_count, first_vertex, first_instance } => {
                if let Some(pass) = self.flushed_pass(false) {
                    pass.draw(
                        *first_vertex..first_vertex + vertex_count,
                        *first_instance..first_instance + instance_count,
                    );
                }
            }
            Command::DrawIndexed { index_count, instance_count, first_index, base_vertex, first_instance } => {
                if let Some(pass) = self.flushed_pass(true) {
                    pass.draw_indexed(
                        *first_index..first_index + index_count,
                        *base_vertex,
                        *first_instance..first_instance + instance_count,
                    );
                }
            }
            Command::DebugDelay(d) => tracing::debug!(delay = ?d, "debug delay has no wgpu equivalent"),
        }
    }

    fn set(&mut self, f: impl FnOnce(&mut Bound<'c>)) {
        f(&mut self.state);
        self.state.dirty = true;
    }

    fn close_pass(&mut self, op: &str) {
        if self.pass.take().is_some() {
            tracing::warn!(op, "render pass closed early for a copy");
        }
    }

    fn begin_pass(&mut self, desc: &RenderPassDesc<WgpuBackend>) {
        self.pass = None;
        let color: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = desc
            .color
            .iter()
            .map(|a| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &a.texture.raw().view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: match a.clear {
                            Some([r, g, b, alpha]) => wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a: alpha }),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let depth = desc.depth.as_ref().map(|d| wgpu::RenderPassDepthStencilAttachment {
            view: &d.texture.raw().view,
            depth_ops: Some(wgpu::Operations {
                load: d.clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        });
        let pass = self
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.label.as_str()),
                color_attachments: &color,
                depth_stencil_attachment: depth,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.pass = Some(pass);
        self.state.dirty = true;
    }

    /// The open pass with all bound state applied, or `None` if the draw
    /// cannot be issued.
    fn flushed_pass(&mut self, indexed: bool) -> Option<&mut wgpu::RenderPass<'static>> {
        let backend = self.backend;
        let state = &mut self.state;
        let Some(pass) = self.pass.as_mut() else {
            tracing::warn!("draw outside a render pass skipped");
            return None;
        };
        let Some(pipeline) = state.pipeline else {
            tracing::warn!("draw without a pipeline skipped");
            return None;
        };
        if indexed && state.index.is_none() {
            tracing::warn!(pipeline = pipeline.label(), "indexed draw without an index buffer skipped");
            return None;
        }
        if state.dirty {
            pass.set_pipeline(&pipeline.raw().pipeline);
            for (slot, bound) in state.vertex.iter().enumerate() {
                if let Some((buffer, offset)) = bound {
                    pass.set_vertex_buffer(slot as u32, buffer.raw().buffer.slice(*offset..));
                }
            }
            if let Some((buffer, offset, format)) = state.index {
                pass.set_index_buffer(buffer.raw().buffer.slice(offset..), index_format(format));
            }
            if let Some(v) = state.viewport {
                pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
            }
            if let Some(r) = state.scissor {
                pass.set_scissor_rect(r.x, r.y, r.width, r.height);
            }
            let key = BindKey {
                constants: state.constants.map(|c| c.map_or((0, 0), |(b, o)| (b.id(), o))),
                texture: state.texture.map_or(0, |t| t.id()),
            };
            let group = backend.bind_group(
                key,
                state.constants.map(|c| c.map(|(b, o)| (b.raw(), o))),
                state.texture.map(|t| t.raw()),
            );
            pass.set_bind_group(0, &group, &[]);
            state.dirty = false;
        }
        Some(pass)
    }
}

fn align4(n: u64) -> u64 {
    (n + 3) & !3
}

fn buffer_usages(desc: &BufferDesc) -> wgpu::BufferUsages {
    if desc.cpu_access == CpuAccess::Read {
        return wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST;
    }
    let mut usage = wgpu::BufferUsages::empty();
    for (ours, theirs) in [
        (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
        (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
        (BufferUsage::CONSTANT, wgpu::BufferUsages::UNIFORM),
        (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
        (BufferUsage::INDIRECT, wgpu::BufferUsages::INDIRECT),
        (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
        (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
    ] {
        if desc.usage.contains(ours) {
            usage |= theirs;
        }
    }
    if desc.cpu_access == CpuAccess::Write {
        usage |= wgpu::BufferUsages::COPY_DST;
    }
    usage
}

fn texture_usages(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::SAMPLED) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.intersects(TextureUsage::RENDER_TARGET | TextureUsage::DEPTH_STENCIL) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsage::UAV) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    out
}

pub fn texture_format(format: Format) -> Option<wgpu::TextureFormat> {
    Some(match format {
        Format::R8Unorm => wgpu::TextureFormat::R8Unorm,
        Format::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        Format::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        Format::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        Format::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        Format::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        Format::R32Float => wgpu::TextureFormat::R32Float,
        Format::Rg32Float => wgpu::TextureFormat::Rg32Float,
        Format::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        Format::R32Uint => wgpu::TextureFormat::R32Uint,
        Format::R16Uint => wgpu::TextureFormat::R16Uint,
        Format::D32Float => wgpu::TextureFormat::Depth32Float,
        Format::D24UnormS8Uint => wgpu::TextureFormat::Depth24PlusStencil8,
        Format::Rgb32Float | Format::Unknown => return None,
    })
}

fn from_texture_format(format: wgpu::TextureFormat) -> Format {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Format::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => Format::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8UnormSrgb => Format::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba16Float => Format::Rgba16Float,
        _ => Format::Bgra8Unorm,
    }
}

fn vertex_format(format: Format) -> Option<wgpu::VertexFormat> {
    Some(match format {
        Format::R32Float => wgpu::VertexFormat::Float32,
        Format::Rg32Float => wgpu::VertexFormat::Float32x2,
        Format::Rgb32Float => wgpu::VertexFormat::Float32x3,
        Format::Rgba32Float => wgpu::VertexFormat::Float32x4,
        Format::Rgba16Float => wgpu::VertexFormat::Float16x4,
        Format::Rgba8Unorm => wgpu::VertexFormat::Unorm8x4,
        Format::R32Uint => wgpu::VertexFormat::Uint32,
        _ => return None,
    })
}

fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::U16 => wgpu::IndexFormat::Uint16,
        IndexFormat::U32 => wgpu::IndexFormat::Uint32,
    }
}

fn topology(t: Topology) -> wgpu::PrimitiveTopology {
    match t {
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn compare(f: CompareFunc) -> wgpu::CompareFunction {
    match f {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::Always => wgpu::CompareFunction::Always,
    }
}

fn blend_factor(f: BlendFactor) -> wgpu::BlendFactor {
    match f {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::InvSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::InvSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::InvDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::InvDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

fn blend(state: BlendState) -> Option<wgpu::BlendState> {
    if !state.enabled {
        return None;
    }
    let operation = match state.op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    };
    let component = if matches!(state.op, BlendOp::Min | BlendOp::Max) {
        wgpu::BlendComponent { src_factor: wgpu::BlendFactor::One, dst_factor: wgpu::BlendFactor::One, operation }
    } else {
        wgpu::BlendComponent { src_factor: blend_factor(state.src), dst_factor: blend_factor(state.dst), operation }
    };
    Some(wgpu::BlendState { color: component, alpha: component })
}

impl Backend for WgpuBackend {
    type Buffer = GpuBuffer;
    type Texture = GpuTexture;
    type Shader = GpuShader;
    type Pipeline = GpuPipeline;
    type Surface = GpuSurface;
    type Window = wgpu::SurfaceTarget<'static>;

    fn capabilities(&self) -> Capabilities {
        let features = self.adapter.features();
        Capabilities {
            backend: "wgpu",
            device_name: self.info.name.clone(),
            dedicated_video_memory: 0,
            max_texture_size: self.limits.max_texture_dimension_2d,
            max_render_targets: self.limits.max_color_attachments,
            supports_raytracing: features.contains(wgpu::Features::EXPERIMENTAL_RAY_QUERY),
            supports_mesh_shaders: features.contains(wgpu::Features::EXPERIMENTAL_MESH_SHADER),
            supports_vrs: false,
        }
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Self::Buffer, RhiError> {
        let size = align4(desc.size);
        if size > self.limits.max_buffer_size {
            return Err(RhiError::BufferCreation(format!(
                "{}: {} bytes exceeds the device limit {}",
                desc.label, size, self.limits.max_buffer_size
            )));
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label.as_str()),
            size,
            usage: buffer_usages(desc),
            mapped_at_creation: false,
        });
        Ok(GpuBuffer { buffer, size })
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            tracing::warn!(offset, "unaligned buffer write ignored");
            return;
        }
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(&buffer.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(align4(data.len() as u64) as usize, 0);
            self.queue.write_buffer(&buffer.buffer, offset, &padded);
        }
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Self::Texture, RhiError> {
        let format = texture_format(desc.format)
            .ok_or_else(|| RhiError::TextureCreation(format!("{}: no texture format for {:?}", desc.label, desc.format)))?;
        let (dimension, layers, view_dimension) = match desc.dimension {
            TextureDimension::D2 => (wgpu::TextureDimension::D2, 1, wgpu::TextureViewDimension::D2),
            TextureDimension::D2Array => {
                (wgpu::TextureDimension::D2, desc.depth_or_layers.max(1), wgpu::TextureViewDimension::D2Array)
            }
            TextureDimension::Cube => (wgpu::TextureDimension::D2, 6, wgpu::TextureViewDimension::Cube),
            TextureDimension::D3 => (wgpu::TextureDimension::D3, desc.depth_or_layers.max(1), wgpu::TextureViewDimension::D3),
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label.as_str()),
            size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: layers },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: desc.sample_count.max(1),
            dimension,
            format,
            usage: texture_usages(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label.as_str()),
            dimension: Some(view_dimension),
            ..Default::default()
        });
        Ok(GpuTexture { texture, view })
    }

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<Self::Shader, RhiError> {
        if !matches!(desc.stage, ShaderStage::Vertex | ShaderStage::Pixel | ShaderStage::Compute) {
            return Err(RhiError::Unsupported(format!("{}: {:?} shaders", desc.label, desc.stage)));
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::SpirV(Cow::Borrowed(desc.bytecode)),
        });
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RhiError::ShaderCreation(format!("{}: {e}", desc.label)));
        }
        Ok(GpuShader { module, entry_point: desc.entry_point.to_string() })
    }

    fn create_pipeline(&self, desc: &GraphicsPipelineDesc<Self>) -> Result<Self::Pipeline, RhiError> {
        if desc.geometry_shader.is_some() || desc.hull_shader.is_some() || desc.domain_shader.is_some() {
            return Err(RhiError::Unsupported(format!("{}: geometry and tessellation stages", desc.label)));
        }

        let slots = desc
            .vertex_layout
            .elements
            .iter()
            .map(|e| e.input_slot as usize + 1)
            .max()
            .unwrap_or(0)
            .max(desc.vertex_layout.strides.len());
        let mut attributes: Vec<Vec<wgpu::VertexAttribute>> = vec![Vec::new(); slots];
        let mut step_modes = vec![wgpu::VertexStepMode::Vertex; slots];
        for (location, element) in desc.vertex_layout.elements.iter().enumerate() {
            let format = vertex_format(element.format).ok_or_else(|| {
                RhiError::PipelineCreation(format!(
                    "{}: {}{} has no vertex format for {:?}",
                    desc.label, element.semantic, element.semantic_index, element.format
                ))
            })?;
            if element.rate == InputRate::PerInstance {
                step_modes[element.input_slot as usize] = wgpu::VertexStepMode::Instance;
                if element.step_rate > 1 {
                    tracing::warn!(pipeline = %desc.label, step_rate = element.step_rate, "instance step rate treated as 1");
                }
            }
            attributes[element.input_slot as usize].push(wgpu::VertexAttribute {
                format,
                offset: u64::from(element.offset),
                shader_location: location as u32,
            });
        }
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = attributes
            .iter()
            .enumerate()
            .map(|(slot, attrs)| wgpu::VertexBufferLayout {
                array_stride: u64::from(desc.vertex_layout.strides.get(slot).copied().unwrap_or(0)),
                step_mode: step_modes[slot],
                attributes: attrs,
            })
            .collect();

        let mut targets = Vec::with_capacity(desc.render_target_formats.len());
        for format in &desc.render_target_formats {
            let format = texture_format(*format)
                .ok_or_else(|| RhiError::PipelineCreation(format!("{}: bad target format {format:?}", desc.label)))?;
            targets.push(Some(wgpu::ColorTargetState {
                format,
                blend: blend(desc.blend),
                write_mask: wgpu::ColorWrites::ALL,
            }));
        }

        let polygon_mode = match desc.rasterizer.fill {
            FillMode::Solid => wgpu::PolygonMode::Fill,
            FillMode::Wireframe if self.features.contains(wgpu::Features::POLYGON_MODE_LINE) => wgpu::PolygonMode::Line,
            FillMode::Wireframe => {
                tracing::warn!(pipeline = %desc.label, "wireframe unsupported; filling");
                wgpu::PolygonMode::Fill
            }
        };
        let primitive = wgpu::PrimitiveState {
            topology: topology(desc.topology),
            strip_index_format: None,
            front_face: if desc.rasterizer.front_counter_clockwise { wgpu::FrontFace::Ccw } else { wgpu::FrontFace::Cw },
            cull_mode: match desc.rasterizer.cull {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            unclipped_depth: !desc.rasterizer.depth_clip && self.features.contains(wgpu::Features::DEPTH_CLIP_CONTROL),
            polygon_mode,
            conservative: false,
        };

        let depth_stencil = match desc.depth_format {
            Some(format) => Some(wgpu::DepthStencilState {
                format: texture_format(format)
                    .ok_or_else(|| RhiError::PipelineCreation(format!("{}: bad depth format {format:?}", desc.label)))?,
                depth_write_enabled: desc.depth_stencil.depth_test && desc.depth_stencil.depth_write,
                depth_compare: if desc.depth_stencil.depth_test {
                    compare(desc.depth_stencil.compare)
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: desc.rasterizer.depth_bias,
                    slope_scale: desc.rasterizer.slope_scaled_depth_bias,
                    clamp: 0.0,
                },
            }),
            None => None,
        };

        let vs = desc.vertex_shader.raw();
        let fragment = desc.pixel_shader.as_ref().map(|ps| wgpu::FragmentState {
            module: &ps.raw().module,
            entry_point: Some(ps.raw().entry_point.as_str()),
            targets: &targets,
            compilation_options: Default::default(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label.as_str()),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vs.module,
                entry_point: Some(vs.entry_point.as_str()),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            primitive,
            depth_stencil,
            multisample: wgpu::MultisampleState { count: desc.sample_count.max(1), ..Default::default() },
            fragment,
            multiview: None,
            cache: None,
        });
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RhiError::PipelineCreation(format!("{}: {e}", desc.label)));
        }
        Ok(GpuPipeline { pipeline })
    }

    fn submit(&self, lists: &[Arc<Vec<Command<Self>>>]) -> u64 {
        let buffers: Vec<wgpu::CommandBuffer> = lists.iter().map(|list| self.record(list)).collect();
        let serial = {
            let mut in_flight = lock(&self.in_flight);
            let index = self.queue.submit(buffers);
            let serial = self.last_submitted.fetch_add(1, Ordering::AcqRel) + 1;
            in_flight.push_back((serial, index));
            serial
        };
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(serial, Ordering::AcqRel);
        });
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            tracing::warn!(error = %e, "device poll failed");
        }
        serial
    }

    fn last_submitted_serial(&self) -> u64 {
        self.last_submitted.load(Ordering::Acquire)
    }

    fn completed_serial(&self) -> u64 {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            tracing::warn!(error = %e, "device poll failed");
        }
        self.retire();
        self.completed.load(Ordering::Acquire)
    }

    fn wait_serial(&self, serial: u64) {
        if self.completed.load(Ordering::Acquire) >= serial {
            return;
        }
        let index = lock(&self.in_flight).iter().find(|(s, _)| *s >= serial).map(|(_, i)| i.clone());
        let Some(index) = index else {
            return;
        };
        match self.device.poll(wgpu::PollType::Wait { submission_index: Some(index), timeout: None }) {
            Ok(_) => {
                self.completed.fetch_max(serial, Ordering::AcqRel);
            }
            Err(e) => tracing::error!(serial, error = %e, "wait for submission failed"),
        }
        self.retire();
    }

    fn create_surface(&self, window: Self::Window, desc: &SwapchainDesc) -> Result<Self::Surface, RhiError> {
        let surface = self.instance.create_surface(window).map_err(|e| RhiError::Surface(e.to_string()))?;
        let caps = surface.get_capabilities(&self.adapter);
        if caps.formats.is_empty() {
            return Err(RhiError::Surface("adapter cannot present to this surface".to_string()));
        }
        let wanted = texture_format(desc.format);
        let format = match wanted.filter(|f| caps.formats.contains(f)) {
            Some(f) => f,
            None => {
                let fallback = caps.formats.iter().find(|f| f.is_srgb()).copied().unwrap_or(caps.formats[0]);
                tracing::warn!(requested = ?desc.format, chosen = ?fallback, "swapchain format unavailable");
                fallback
            }
        };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: desc.width.max(1),
            height: desc.height.max(1),
            present_mode: if desc.vsync { wgpu::PresentMode::AutoVsync } else { wgpu::PresentMode::AutoNoVsync },
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: desc.buffer_count,
        };
        surface.configure(&self.device, &config);
        tracing::info!(width = config.width, height = config.height, format = ?format, "surface configured");
        Ok(GpuSurface { surface, config: Mutex::new(config), current: Mutex::new(None) })
    }

    fn acquire_back_buffer(&self, surface: &Self::Surface) -> Result<(Self::Texture, TextureDesc), RhiError> {
        let frame = match surface.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                self.configure(surface, &lock(&surface.config));
                surface.surface.get_current_texture().map_err(|e| RhiError::Surface(e.to_string()))?
            }
            Err(e) => return Err(RhiError::Surface(e.to_string())),
        };
        let config = lock(&surface.config);
        let texture = frame.texture.clone();
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let desc = TextureDesc::d2(
            "back_buffer",
            config.width,
            config.height,
            from_texture_format(config.format),
            TextureUsage::RENDER_TARGET,
        );
        *lock(&surface.current) = Some(frame);
        Ok((GpuTexture { texture, view }, desc))
    }

    fn present(&self, surface: &Self::Surface) -> Result<(), RhiError> {
        match lock(&surface.current).take() {
            Some(frame) => {
                frame.present();
                Ok(())
            }
            None => Err(RhiError::Surface("present without an acquired back buffer".to_string())),
        }
    }

    fn resize_surface(&self, surface: &Self::Surface, width: u32, height: u32) -> Result<(), RhiError> {
        lock(&surface.current).take();
        let mut config = lock(&surface.config);
        config.width = width.max(1);
        config.height = height.max(1);
        self.configure(surface, &config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_buffers_are_copy_destinations() {
        let desc = BufferDesc::upload("cb", 256, BufferUsage::CONSTANT);
        let usage = buffer_usages(&desc);
        assert!(usage.contains(wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST));
        let readback = BufferDesc::new("rb", 64, BufferUsage::VERTEX, CpuAccess::Read);
        assert_eq!(buffer_usages(&readback), wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST);
    }

    #[test]
    fn formats_map_where_wgpu_has_them() {
        assert_eq!(texture_format(Format::D32Float), Some(wgpu::TextureFormat::Depth32Float));
        assert_eq!(texture_format(Format::Rgb32Float), None);
        assert_eq!(vertex_format(Format::Rgb32Float), Some(wgpu::VertexFormat::Float32x3));
        assert_eq!(vertex_format(Format::D32Float), None);
    }

    #[test]
    fn min_max_blends_force_unit_factors() {
        let state = BlendState { enabled: true, src: BlendFactor::SrcAlpha, dst: BlendFactor::Zero, op: BlendOp::Max };
        let b = blend(state).unwrap();
        assert_eq!(b.color.src_factor, wgpu::BlendFactor::One);
        assert!(blend(BlendState::OPAQUE).is_none());
    }

    #[test]
    fn sizes_round_to_copy_alignment() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(5), 8);
        assert_eq!(align4(256), 256);
    }
}
