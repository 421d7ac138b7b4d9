//! A backend with no GPU.
//!
//! Buffers and textures live in host memory. Submitted command lists run on a
//! worker thread that stands in for the GPU timeline: commands execute in
//! order, copies move bytes, draws are validated and counted, and
//! [`Command::DebugDelay`] stalls the timeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::backend::{Backend, Capabilities};
use crate::command::{BarrierTarget, Command};
use crate::desc::{BufferDesc, CpuAccess, Format, ShaderDesc, ShaderStage, SwapchainDesc, TextureDesc, TextureUsage};
use crate::error::RhiError;
use crate::resource::{Buffer, GraphicsPipelineDesc};
use crate::sync::lock;

const SPIRV_MAGIC: u32 = 0x0723_0203;

pub struct HeadlessBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    cpu_access: CpuAccess,
}

pub struct HeadlessTexture {
    data: Arc<Mutex<Vec<u8>>>,
    bytes_per_texel: u32,
}

pub struct HeadlessShader {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub word_count: usize,
}

pub struct HeadlessPipeline {
    pub label: String,
    pub slot_strides: Vec<u32>,
    pub has_pixel_stage: bool,
}

pub struct HeadlessSurface {
    textures: Vec<Arc<Mutex<Vec<u8>>>>,
    state: Mutex<SurfaceState>,
}

struct SurfaceState {
    width: u32,
    height: u32,
    format: Format,
    current: usize,
    presented: u64,
}

/// Execution counters accumulated on the timeline thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub submissions: u64,
    pub command_lists: u64,
    pub render_passes: u64,
    pub draw_calls: u64,
    pub instances: u64,
    pub indices: u64,
    pub vertices: u64,
    pub copies: u64,
    pub bytes_copied: u64,
    pub barriers: u64,
    pub validation_errors: u64,
}

struct Timeline {
    completed: Mutex<u64>,
    retired: Condvar,
    stats: Mutex<ExecutionStats>,
}

struct Job {
    serial: u64,
    lists: Vec<Arc<Vec<Command<HeadlessBackend>>>>,
}

#[derive(Debug, Clone)]
pub struct HeadlessDesc {
    pub device_name: String,
    pub dedicated_video_memory: u64,
    pub max_texture_size: u32,
}

impl Default for HeadlessDesc {
    fn default() -> Self {
        Self { device_name: "headless".to_string(), dedicated_video_memory: 0, max_texture_size: 16384 }
    }
}

pub struct HeadlessBackend {
    desc: HeadlessDesc,
    timeline: Arc<Timeline>,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    last_submitted: AtomicU64,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_desc(HeadlessDesc::default())
    }

    pub fn with_desc(desc: HeadlessDesc) -> Self {
        let timeline = Arc::new(Timeline {
            completed: Mutex::new(0),
            retired: Condvar::new(),
            stats: Mutex::new(ExecutionStats::default()),
        });
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker_timeline = Arc::clone(&timeline);
        let worker = std::thread::Builder::new()
            .name("headless-gpu".to_string())
            .spawn(move || {
                for job in receiver {
                    for list in &job.lists {
                        execute(list, &worker_timeline.stats);
                    }
                    lock(&worker_timeline.stats).submissions += 1;
                    let mut completed = lock(&worker_timeline.completed);
                    *completed = (*completed).max(job.serial);
                    worker_timeline.retired.notify_all();
                }
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => types::fatal(&format!("headless timeline thread: {e}")),
        };
        Self {
            desc,
            timeline,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(worker),
            last_submitted: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        *lock(&self.timeline.stats)
    }

    /// Snapshot of a buffer's contents.
    pub fn read_buffer(buffer: &Buffer<HeadlessBackend>) -> Vec<u8> {
        lock(&buffer.raw().data).clone()
    }

    /// Number of presents on a surface.
    pub fn presented(surface: &HeadlessSurface) -> u64 {
        lock(&surface.state).presented
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        lock(&self.sender).take();
        if let Some(handle) = lock(&self.worker).take() {
            // The last reference can be released by the timeline thread itself.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn execute(list: &[Command<HeadlessBackend>], stats: &Mutex<ExecutionStats>) {
    let mut local = ExecutionStats { command_lists: 1, ..Default::default() };
    let mut pipeline: Option<&HeadlessPipeline> = None;
    let mut vertex_bound = false;
    let mut index_bound = false;
    let mut in_pass = false;

    for cmd in list {
        match cmd {
            Command::Barrier { target, before, after } => {
                local.barriers += 1;
                let id = match target {
                    BarrierTarget::Buffer(b) => b.id(),
                    BarrierTarget::Texture(t) => t.id(),
                };
                tracing::trace!(id, ?before, ?after, "barrier");
            }
            Command::CopyBuffer { src, src_offset, dst, dst_offset, size } => {
                let (s, d, n) = (*src_offset as usize, *dst_offset as usize, *size as usize);
                if Arc::ptr_eq(&src.raw().data, &dst.raw().data) {
                    let mut data = lock(&src.raw().data);
                    if s + n <= data.len() && d + n <= data.len() {
                        data.copy_within(s..s + n, d);
                    } else {
                        local.validation_errors += 1;
                    }
                } else {
                    let src_data = lock(&src.raw().data);
                    let mut dst_data = lock(&dst.raw().data);
                    if s + n <= src_data.len() && d + n <= dst_data.len() {
                        dst_data[d..d + n].copy_from_slice(&src_data[s..s + n]);
                    } else {
                        local.validation_errors += 1;
                        tracing::warn!(src = %src.desc().label, dst = %dst.desc().label, "copy out of bounds");
                    }
                }
                local.copies += 1;
                local.bytes_copied += *size;
            }
            Command::CopyBufferToTexture { src, src_offset, bytes_per_row, dst, width, height } => {
                let src_data = lock(&src.raw().data);
                let mut dst_data = lock(&dst.raw().data);
                let row = (*width * dst.raw().bytes_per_texel) as usize;
                for y in 0..*height as usize {
                    let s = *src_offset as usize + y * *bytes_per_row as usize;
                    let d = y * row;
                    if s + row <= src_data.len() && d + row <= dst_data.len() {
                        dst_data[d..d + row].copy_from_slice(&src_data[s..s + row]);
                    }
                }
                local.copies += 1;
                local.bytes_copied += (row * *height as usize) as u64;
            }
            Command::SetDescriptorHeap { .. } => {}
            Command::BeginRenderPass(_) => {
                in_pass = true;
                local.render_passes += 1;
            }
            Command::EndRenderPass => in_pass = false,
            Command::SetPipeline(p) => pipeline = Some(p.raw()),
            Command::SetVertexBuffer { .. } => vertex_bound = true,
            Command::SetIndexBuffer { .. } => index_bound = true,
            Command::SetConstantBuffer { .. }
            | Command::SetTexture { .. }
            | Command::SetViewport(_)
            | Command::SetScissor(_) => {}
            Command::Draw { vertex_count, instance_count, .. } => {
                if !in_pass || pipeline.is_none() {
                    local.validation_errors += 1;
                    continue;
                }
                local.draw_calls += 1;
                local.instances += *instance_count as u64;
                local.vertices += *vertex_count as u64 * *instance_count as u64;
            }
            Command::DrawIndexed { index_count, instance_count, .. } => {
                if !in_pass || pipeline.is_none() || !index_bound || !vertex_bound {
                    local.validation_errors += 1;
                    continue;
                }
                local.draw_calls += 1;
                local.instances += *instance_count as u64;
                local.indices += *index_count as u64 * *instance_count as u64;
            }
            Command::DebugDelay(d) => std::thread::sleep(*d),
        }
    }

    let mut stats = lock(stats);
    stats.command_lists += local.command_lists;
    stats.render_passes += local.render_passes;
    stats.draw_calls += local.draw_calls;
    stats.instances += local.instances;
    stats.indices += local.indices;
    stats.vertices += local.vertices;
    stats.copies += local.copies;
    stats.bytes_copied += local.bytes_copied;
    stats.barriers += local.barriers;
    stats.validation_errors += local.validation_errors;
}

impl Backend for HeadlessBackend {
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type Shader = HeadlessShader;
    type Pipeline = HeadlessPipeline;
    type Surface = HeadlessSurface;
    type Window = ();

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            backend: "headless",
            device_name: self.desc.device_name.clone(),
            dedicated_video_memory: self.desc.dedicated_video_memory,
            max_texture_size: self.desc.max_texture_size,
            max_render_targets: 8,
            supports_raytracing: false,
            supports_mesh_shaders: false,
            supports_vrs: false,
        }
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Self::Buffer, RhiError> {
        let size = usize::try_from(desc.size).map_err(|e| RhiError::BufferCreation(e.to_string()))?;
        Ok(HeadlessBuffer { data: Arc::new(Mutex::new(vec![0; size])), cpu_access: desc.cpu_access })
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
        let mut dst = lock(&buffer.data);
        let start = offset as usize;
        dst[start..start + data.len()].copy_from_slice(data);
    }

    fn write_buffer_with(&self, buffer: &Self::Buffer, offset: u64, len: usize, f: &mut dyn FnMut(&mut [u8])) {
        debug_assert_eq!(buffer.cpu_access, CpuAccess::Write);
        let mut dst = lock(&buffer.data);
        let start = offset as usize;
        f(&mut dst[start..start + len]);
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Self::Texture, RhiError> {
        let bytes_per_texel = desc.format.size_bytes().max(1);
        let size = desc.width as usize * desc.height as usize * desc.depth_or_layers.max(1) as usize * bytes_per_texel as usize;
        Ok(HeadlessTexture { data: Arc::new(Mutex::new(vec![0; size])), bytes_per_texel })
    }

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<Self::Shader, RhiError> {
        if desc.bytecode.first() != Some(&SPIRV_MAGIC) {
            return Err(RhiError::ShaderCreation(format!("{}: not SPIR-V", desc.label)));
        }
        Ok(HeadlessShader {
            stage: desc.stage,
            entry_point: desc.entry_point.to_string(),
            word_count: desc.bytecode.len(),
        })
    }

    fn create_pipeline(&self, desc: &GraphicsPipelineDesc<Self>) -> Result<Self::Pipeline, RhiError> {
        if desc.vertex_shader.stage() != ShaderStage::Vertex {
            return Err(RhiError::PipelineCreation(format!("{}: vertex slot holds a {:?} shader", desc.label, desc.vertex_shader.stage())));
        }
        if let Some(ps) = &desc.pixel_shader {
            if ps.stage() != ShaderStage::Pixel {
                return Err(RhiError::PipelineCreation(format!("{}: pixel slot holds a {:?} shader", desc.label, ps.stage())));
            }
        }
        Ok(HeadlessPipeline {
            label: desc.label.clone(),
            slot_strides: desc.vertex_layout.strides.clone(),
            has_pixel_stage: desc.pixel_shader.is_some(),
        })
    }

    fn submit(&self, lists: &[Arc<Vec<Command<Self>>>]) -> u64 {
        let serial = self.last_submitted.fetch_add(1, Ordering::AcqRel) + 1;
        let job = Job { serial, lists: lists.to_vec() };
        if let Some(sender) = lock(&self.sender).as_ref() {
            if sender.send(job).is_err() {
                types::fatal("headless timeline thread exited");
            }
        }
        serial
    }

    fn last_submitted_serial(&self) -> u64 {
        self.last_submitted.load(Ordering::Acquire)
    }

    fn completed_serial(&self) -> u64 {
        *lock(&self.timeline.completed)
    }

    fn wait_serial(&self, serial: u64) {
        let mut completed = lock(&self.timeline.completed);
        while *completed < serial {
            completed = self.timeline.retired.wait(completed).unwrap_or_else(|p| p.into_inner());
        }
    }

    fn create_surface(&self, _window: (), desc: &SwapchainDesc) -> Result<Self::Surface, RhiError> {
        let size = desc.width as usize * desc.height as usize * desc.format.size_bytes() as usize;
        Ok(HeadlessSurface {
            textures: (0..desc.buffer_count).map(|_| Arc::new(Mutex::new(vec![0; size]))).collect(),
            state: Mutex::new(SurfaceState {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                current: 0,
                presented: 0,
            }),
        })
    }

    fn acquire_back_buffer(&self, surface: &Self::Surface) -> Result<(Self::Texture, TextureDesc), RhiError> {
        let state = lock(&surface.state);
        let texture = HeadlessTexture {
            data: Arc::clone(&surface.textures[state.current]),
            bytes_per_texel: state.format.size_bytes(),
        };
        let desc = TextureDesc::d2("back_buffer", state.width, state.height, state.format, TextureUsage::RENDER_TARGET);
        Ok((texture, desc))
    }

    fn present(&self, surface: &Self::Surface) -> Result<(), RhiError> {
        let mut state = lock(&surface.state);
        state.current = (state.current + 1) % surface.textures.len();
        state.presented += 1;
        Ok(())
    }

    fn resize_surface(&self, surface: &Self::Surface, width: u32, height: u32) -> Result<(), RhiError> {
        let mut state = lock(&surface.state);
        let size = width as usize * height as usize * state.format.size_bytes() as usize;
        for texture in &surface.textures {
            let mut data = lock(texture);
            data.clear();
            data.resize(size, 0);
        }
        state.width = width;
        state.height = height;
        state.current = 0;
        Ok(())
    }
}
