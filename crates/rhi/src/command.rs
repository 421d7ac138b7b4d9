//! Command recording.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::Backend;
use crate::desc::{CommandListKind, IndexFormat, ResourceState, ScissorRect, Viewport};
use crate::error::RhiError;
use crate::resource::{Buffer, Pipeline, Texture};

/// Constant-buffer root slots (b0, b1).
pub const CONSTANT_BUFFER_SLOTS: u32 = 2;
/// One SRV in the root descriptor table (t0).
pub const TEXTURE_SLOTS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    Initial,
    Recording,
    Closed,
    Submitted,
}

pub struct ColorAttachment<B: Backend> {
    pub texture: Arc<Texture<B>>,
    /// `Some` clears to this color, `None` loads.
    pub clear: Option<[f64; 4]>,
}

pub struct DepthAttachment<B: Backend> {
    pub texture: Arc<Texture<B>>,
    pub clear: Option<f32>,
}

pub struct RenderPassDesc<B: Backend> {
    pub label: String,
    pub color: Vec<ColorAttachment<B>>,
    pub depth: Option<DepthAttachment<B>>,
}

pub enum BarrierTarget<B: Backend> {
    Buffer(Arc<Buffer<B>>),
    Texture(Arc<Texture<B>>),
}

/// One recorded operation. Backends translate these in order.
pub enum Command<B: Backend> {
    Barrier {
        target: BarrierTarget<B>,
        before: ResourceState,
        after: ResourceState,
    },
    CopyBuffer {
        src: Arc<Buffer<B>>,
        src_offset: u64,
        dst: Arc<Buffer<B>>,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        src: Arc<Buffer<B>>,
        src_offset: u64,
        bytes_per_row: u32,
        dst: Arc<Texture<B>>,
        width: u32,
        height: u32,
    },
    SetDescriptorHeap {
        heap_id: u32,
    },
    BeginRenderPass(RenderPassDesc<B>),
    EndRenderPass,
    SetPipeline(Arc<Pipeline<B>>),
    SetVertexBuffer {
        slot: u32,
        buffer: Arc<Buffer<B>>,
        offset: u64,
        stride: u32,
    },
    SetIndexBuffer {
        buffer: Arc<Buffer<B>>,
        offset: u64,
        format: IndexFormat,
    },
    SetConstantBuffer {
        slot: u32,
        buffer: Arc<Buffer<B>>,
        offset: u64,
    },
    SetTexture {
        slot: u32,
        texture: Arc<Texture<B>>,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    /// Stalls the GPU timeline. Honoured by the headless backend only.
    DebugDelay(Duration),
}

/// A recordable list of commands.
///
/// `begin` moves Initial/Closed/Submitted to Recording and rebinds the
/// shader-visible heap; `end` freezes the recording; the device marks it
/// Submitted. Recording calls outside the Recording state are ignored.
pub struct CommandList<B: Backend> {
    kind: CommandListKind,
    label: String,
    state: CommandListState,
    heap_id: u32,
    commands: Vec<Command<B>>,
    recorded: Option<Arc<Vec<Command<B>>>>,
    in_render_pass: bool,
    draw_count: u32,
}

impl<B: Backend> CommandList<B> {
    pub(crate) fn new(kind: CommandListKind, heap_id: u32, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            state: CommandListState::Initial,
            heap_id,
            commands: Vec::new(),
            recorded: None,
            in_render_pass: false,
            draw_count: 0,
        }
    }

    pub fn kind(&self) -> CommandListKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// Draws recorded since the last `begin`.
    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    pub fn begin(&mut self) {
        if self.state == CommandListState::Recording {
            tracing::warn!(list = %self.label, "begin on a list that is already recording; discarding");
        }
        self.commands.clear();
        self.recorded = None;
        self.in_render_pass = false;
        self.draw_count = 0;
        self.state = CommandListState::Recording;
        self.commands.push(Command::SetDescriptorHeap { heap_id: self.heap_id });
    }

    pub fn end(&mut self) -> Result<(), RhiError> {
        if self.state != CommandListState::Recording {
            return Err(RhiError::InvalidState { expected: CommandListState::Recording, found: self.state });
        }
        if self.in_render_pass {
            tracing::warn!(list = %self.label, "render pass left open at end; closing");
            self.commands.push(Command::EndRenderPass);
            self.in_render_pass = false;
        }
        self.recorded = Some(Arc::new(std::mem::take(&mut self.commands)));
        self.state = CommandListState::Closed;
        Ok(())
    }

    pub(crate) fn take_for_submit(&self) -> Result<Arc<Vec<Command<B>>>, RhiError> {
        match (&self.recorded, self.state) {
            (Some(recorded), CommandListState::Closed) => Ok(Arc::clone(recorded)),
            _ => Err(RhiError::InvalidState { expected: CommandListState::Closed, found: self.state }),
        }
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.state = CommandListState::Submitted;
    }

    /// Commands frozen by the last `end`.
    pub fn recorded(&self) -> Option<&[Command<B>]> {
        self.recorded.as_deref().map(Vec::as_slice)
    }

    fn push(&mut self, cmd: Command<B>) -> bool {
        if self.state != CommandListState::Recording {
            tracing::warn!(list = %self.label, state = ?self.state, "command recorded outside begin/end ignored");
            return false;
        }
        self.commands.push(cmd);
        true
    }

    /// Full-subresource transition. A missing buffer or an identity transition
    /// records nothing.
    pub fn buffer_barrier(&mut self, buffer: Option<&Arc<Buffer<B>>>, before: ResourceState, after: ResourceState) {
        let Some(buffer) = buffer else { return };
        if before == after {
            return;
        }
        if self.push(Command::Barrier { target: BarrierTarget::Buffer(Arc::clone(buffer)), before, after }) {
            buffer.set_state(after);
        }
    }

    pub fn texture_barrier(&mut self, texture: Option<&Arc<Texture<B>>>, before: ResourceState, after: ResourceState) {
        let Some(texture) = texture else { return };
        if before == after {
            return;
        }
        if self.push(Command::Barrier { target: BarrierTarget::Texture(Arc::clone(texture)), before, after }) {
            texture.set_state(after);
        }
    }

    pub fn copy_buffer(&mut self, src: &Arc<Buffer<B>>, src_offset: u64, dst: &Arc<Buffer<B>>, dst_offset: u64, size: u64) {
        self.push(Command::CopyBuffer { src: Arc::clone(src), src_offset, dst: Arc::clone(dst), dst_offset, size });
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        src: &Arc<Buffer<B>>,
        src_offset: u64,
        bytes_per_row: u32,
        dst: &Arc<Texture<B>>,
    ) {
        let (width, height) = (dst.desc().width, dst.desc().height);
        self.push(Command::CopyBufferToTexture {
            src: Arc::clone(src),
            src_offset,
            bytes_per_row,
            dst: Arc::clone(dst),
            width,
            height,
        });
    }

    pub fn begin_render_pass(&mut self, desc: RenderPassDesc<B>) {
        if self.in_render_pass {
            tracing::warn!(list = %self.label, "nested render pass; closing the previous one");
            self.push(Command::EndRenderPass);
        }
        if self.push(Command::BeginRenderPass(desc)) {
            self.in_render_pass = true;
        }
    }

    pub fn end_render_pass(&mut self) {
        if !self.in_render_pass {
            return;
        }
        if self.push(Command::EndRenderPass) {
            self.in_render_pass = false;
        }
    }

    pub fn set_pipeline(&mut self, pipeline: &Arc<Pipeline<B>>) {
        self.push(Command::SetPipeline(Arc::clone(pipeline)));
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<Buffer<B>>, offset: u64, stride: u32) {
        self.push(Command::SetVertexBuffer { slot, buffer: Arc::clone(buffer), offset, stride });
    }

    pub fn set_index_buffer(&mut self, buffer: &Arc<Buffer<B>>, offset: u64, format: IndexFormat) {
        self.push(Command::SetIndexBuffer { buffer: Arc::clone(buffer), offset, format });
    }

    /// Binds a constant buffer view at b0 (`slot` 0) or b1 (`slot` 1).
    pub fn set_constant_buffer(&mut self, slot: u32, buffer: &Arc<Buffer<B>>, offset: u64) {
        if slot >= CONSTANT_BUFFER_SLOTS {
            tracing::warn!(list = %self.label, slot, "constant buffer slot out of range ignored");
            return;
        }
        self.push(Command::SetConstantBuffer { slot, buffer: Arc::clone(buffer), offset });
    }

    /// Binds a shader resource. Out-of-range slots clamp to the last one.
    pub fn set_texture(&mut self, slot: u32, texture: &Arc<Texture<B>>) {
        let slot = slot.min(TEXTURE_SLOTS - 1);
        self.push(Command::SetTexture { slot, texture: Arc::clone(texture) });
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.push(Command::SetViewport(viewport));
    }

    pub fn set_scissor(&mut self, rect: ScissorRect) {
        self.push(Command::SetScissor(rect));
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        if instance_count == 0 || vertex_count == 0 {
            return;
        }
        if self.push(Command::Draw { vertex_count, instance_count, first_vertex, first_instance }) {
            self.draw_count += 1;
        }
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        if instance_count == 0 || index_count == 0 {
            return;
        }
        if self.push(Command::DrawIndexed { index_count, instance_count, first_index, base_vertex, first_instance }) {
            self.draw_count += 1;
        }
    }

    pub fn debug_delay(&mut self, delay: Duration) {
        self.push(Command::DebugDelay(delay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{BufferDesc, BufferUsage, Format, TextureDesc, TextureUsage};
    use crate::device::{Device, DeviceDesc};
    use crate::headless::HeadlessBackend;

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), &DeviceDesc::default())
    }

    #[test]
    fn begin_records_the_shader_visible_heap() {
        let device = device();
        let mut list = device.create_command_list(CommandListKind::Graphics, "main");
        list.begin();
        list.end().unwrap();
        let recorded = list.recorded().unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(matches!(recorded[0], Command::SetDescriptorHeap { heap_id } if heap_id == device.shader_visible_heap().id()));
    }

    #[test]
    fn commands_outside_recording_are_ignored() {
        let device = device();
        let mut list = device.create_command_list(CommandListKind::Graphics, "idle");
        list.draw(3, 1, 0, 0);
        assert_eq!(list.draw_count(), 0);
        assert!(matches!(
            list.end(),
            Err(RhiError::InvalidState { expected: CommandListState::Recording, found: CommandListState::Initial })
        ));
    }

    #[test]
    fn zero_count_draws_record_nothing() {
        let device = device();
        let mut list = device.create_command_list(CommandListKind::Graphics, "zero");
        list.begin();
        list.draw(0, 5, 0, 0);
        list.draw(3, 0, 0, 0);
        list.draw_indexed(0, 1, 0, 0, 0);
        list.draw(3, 2, 0, 0);
        assert_eq!(list.draw_count(), 1);
    }

    #[test]
    fn end_closes_an_open_render_pass() {
        let device = device();
        let target = device
            .create_texture(&TextureDesc::d2("rt", 4, 4, Format::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let mut list = device.create_command_list(CommandListKind::Graphics, "pass");
        list.begin();
        list.begin_render_pass(RenderPassDesc {
            label: "p".into(),
            color: vec![ColorAttachment { texture: target, clear: Some([0.0; 4]) }],
            depth: None,
        });
        list.end().unwrap();
        assert!(matches!(list.recorded().unwrap().last(), Some(Command::EndRenderPass)));
        assert_eq!(list.state(), CommandListState::Closed);
    }

    #[test]
    fn barriers_skip_identity_and_track_state() {
        let device = device();
        let buffer = device.create_buffer(&BufferDesc::gpu_only("b", 64, BufferUsage::VERTEX)).unwrap();
        let mut list = device.create_command_list(CommandListKind::Graphics, "barriers");
        list.begin();
        list.buffer_barrier(None, ResourceState::Common, ResourceState::CopyDest);
        list.buffer_barrier(Some(&buffer), ResourceState::Common, ResourceState::Common);
        list.buffer_barrier(Some(&buffer), ResourceState::Common, ResourceState::VertexBuffer);
        list.end().unwrap();
        let barriers = list.recorded().unwrap().iter().filter(|c| matches!(c, Command::Barrier { .. })).count();
        assert_eq!(barriers, 1);
        assert_eq!(buffer.state(), ResourceState::VertexBuffer);
    }

    #[test]
    fn constant_slots_past_b1_are_dropped() {
        let device = device();
        let cb = device.create_buffer(&BufferDesc::upload("cb", 256, BufferUsage::CONSTANT)).unwrap();
        let mut list = device.create_command_list(CommandListKind::Graphics, "cb");
        list.begin();
        list.set_constant_buffer(1, &cb, 0);
        list.set_constant_buffer(2, &cb, 0);
        list.end().unwrap();
        let bound = list.recorded().unwrap().iter().filter(|c| matches!(c, Command::SetConstantBuffer { .. })).count();
        assert_eq!(bound, 1);
    }

    #[test]
    fn submitted_lists_can_be_reused() {
        let device = device();
        let mut list = device.create_command_list(CommandListKind::Graphics, "reuse");
        for _ in 0..3 {
            list.begin();
            list.end().unwrap();
            device.submit_one(&mut list).unwrap();
            assert_eq!(list.state(), CommandListState::Submitted);
        }
        device.wait_idle();
        assert_eq!(device.backend().stats().submissions, 3);
    }

    #[test]
    fn submit_rejects_unclosed_lists_without_side_effects() {
        let device = device();
        let mut closed = device.create_command_list(CommandListKind::Graphics, "closed");
        closed.begin();
        closed.end().unwrap();
        let mut open = device.create_command_list(CommandListKind::Graphics, "open");
        open.begin();
        assert!(device.submit(&mut [&mut closed, &mut open]).is_err());
        assert_eq!(closed.state(), CommandListState::Closed);
        assert_eq!(device.backend().last_submitted_serial(), 0);
    }
}
