//! Upload-heap rings shared by the instanced renderers.
//!
//! Each frame slot owns its own instance buffer and its own 256-byte aligned
//! constant slices, so the CPU never writes memory the GPU may still be
//! reading from an earlier frame.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use rhi::{Backend, Buffer, BufferDesc, BufferUsage, CommandList, Device, Format, InputElement, VertexLayout};
use types::{align_up, Vertex};

/// Constant-buffer views must start on this boundary.
pub const CONSTANT_ALIGNMENT: u64 = 256;

/// One upload buffer carved into `frames × slices_per_frame` aligned slices.
pub struct ConstantRing<B: Backend> {
    buffer: Arc<Buffer<B>>,
    stride: u64,
    slices_per_frame: u32,
    frames: usize,
}

impl<B: Backend> ConstantRing<B> {
    pub fn new(
        device: &Device<B>,
        label: &str,
        element_size: u64,
        slices_per_frame: u32,
        frames: usize,
    ) -> Result<Self, rhi::RhiError> {
        let stride = align_up(element_size.max(1), CONSTANT_ALIGNMENT);
        let slices_per_frame = slices_per_frame.max(1);
        let frames = frames.max(1);
        let size = stride * u64::from(slices_per_frame) * frames as u64;
        let buffer = device.create_buffer(&BufferDesc::upload(label, size, BufferUsage::CONSTANT))?;
        Ok(Self { buffer, stride, slices_per_frame, frames })
    }

    pub fn buffer(&self) -> &Arc<Buffer<B>> {
        &self.buffer
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn slices_per_frame(&self) -> u32 {
        self.slices_per_frame
    }

    pub fn offset(&self, slot: usize, slice: u32) -> u64 {
        let slot = (slot % self.frames) as u64;
        let slice = u64::from(slice.min(self.slices_per_frame - 1));
        (slot * u64::from(self.slices_per_frame) + slice) * self.stride
    }

    pub fn write<T: Pod>(&self, slot: usize, slice: u32, value: &T) {
        self.buffer.write(self.offset(slot, slice), bytemuck::bytes_of(value));
    }

    /// Binds one slice to register `b{register}`.
    pub fn bind(&self, cmd: &mut CommandList<B>, register: u32, slot: usize, slice: u32) {
        cmd.set_constant_buffer(register, &self.buffer, self.offset(slot, slice));
    }
}

/// Per-frame instance buffers plus the host-side staging vector they are
/// filled from.
pub struct InstanceRing<B: Backend, T: Pod> {
    buffers: Vec<Arc<Buffer<B>>>,
    staging: Vec<T>,
    capacity: usize,
    dropped: usize,
}

impl<B: Backend, T: Pod> InstanceRing<B, T> {
    pub fn new(device: &Device<B>, label: &str, capacity: usize, frames: usize) -> Result<Self, rhi::RhiError> {
        let capacity = capacity.max(1);
        let size = (capacity * std::mem::size_of::<T>()) as u64;
        let buffers = (0..frames.max(1))
            .map(|i| device.create_buffer(&BufferDesc::upload(format!("{label}_{i}"), size, BufferUsage::VERTEX)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { buffers, staging: Vec::with_capacity(capacity), capacity, dropped: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.staging.clear();
        self.dropped = 0;
    }

    /// Queues one record. Records past capacity are dropped and counted.
    pub fn push(&mut self, record: T) -> bool {
        if self.staging.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.staging.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.staging.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staging.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn staged(&self) -> &[T] {
        &self.staging
    }

    /// Copies the staging vector into the buffer of frame `slot`.
    pub fn upload(&self, slot: usize) -> &Arc<Buffer<B>> {
        let buffer = self.buffer(slot);
        buffer.write_pod(0, &self.staging);
        buffer
    }

    pub fn buffer(&self, slot: usize) -> &Arc<Buffer<B>> {
        &self.buffers[slot % self.buffers.len()]
    }
}

/// Per-instance record for creatures, trees and grass. Matches `Instance`
/// in `common.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// Phase, LOD level, fade, distance to the eye.
    pub params: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<InstanceData>() == 96);

impl InstanceData {
    pub const STRIDE: u32 = std::mem::size_of::<InstanceData>() as u32;

    pub fn new(model: Mat4, color: Vec4, phase: f32, lod: u32, fade: f32, distance: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: color.to_array(),
            params: [phase, lod as f32, fade, distance],
        }
    }

    pub fn phase(&self) -> f32 {
        self.params[0]
    }

    pub fn lod(&self) -> u32 {
        self.params[1] as u32
    }

    pub fn fade(&self) -> f32 {
        self.params[2]
    }
}

/// `types::Vertex` at slot 0.
pub fn mesh_elements() -> Vec<InputElement> {
    vec![
        InputElement::per_vertex("POSITION", 0, Format::Rgb32Float, 0),
        InputElement::per_vertex("NORMAL", 0, Format::Rgb32Float, 12),
        InputElement::per_vertex("TEXCOORD", 0, Format::Rg32Float, 24),
    ]
}

/// Mesh at slot 0, [`InstanceData`] at slot 1 (locations 3..=8).
pub fn instanced_layout() -> VertexLayout {
    let mut elements = mesh_elements();
    for (i, offset) in [0u32, 16, 32, 48].into_iter().enumerate() {
        elements.push(InputElement::per_instance("INSTANCE_MODEL", i as u32, Format::Rgba32Float, 1, offset));
    }
    elements.push(InputElement::per_instance("COLOR", 0, Format::Rgba32Float, 1, 64));
    elements.push(InputElement::per_instance("INSTANCE_PARAMS", 0, Format::Rgba32Float, 1, 80));
    VertexLayout { elements, strides: vec![Vertex::STRIDE, InstanceData::STRIDE] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi::headless::HeadlessBackend;
    use rhi::DeviceDesc;

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), &DeviceDesc::default())
    }

    #[test]
    fn constant_slices_are_aligned_and_disjoint() {
        let device = device();
        let ring = ConstantRing::new(&device, "cb", 320, 3, 2).unwrap();
        assert_eq!(ring.stride(), 512);
        assert_eq!(ring.offset(0, 0), 0);
        assert_eq!(ring.offset(0, 2), 1024);
        assert_eq!(ring.offset(1, 0), 1536);
        assert_eq!(ring.offset(3, 0), ring.offset(1, 0));
        assert_eq!(ring.buffer().size(), 512 * 6);
        for slot in 0..2 {
            for slice in 0..3 {
                assert_eq!(ring.offset(slot, slice) % CONSTANT_ALIGNMENT, 0);
            }
        }
    }

    #[test]
    fn instance_ring_caps_and_uploads() {
        let device = device();
        let mut ring: InstanceRing<HeadlessBackend, InstanceData> = InstanceRing::new(&device, "inst", 2, 2).unwrap();
        let a = InstanceData::new(Mat4::IDENTITY, Vec4::ONE, 1.5, 2, 0.5, 10.0);
        assert!(ring.push(a));
        assert!(ring.push(a));
        assert!(!ring.push(a));
        assert_eq!(ring.dropped(), 1);
        let buffer = ring.upload(1);
        let bytes = HeadlessBackend::read_buffer(buffer);
        let second: InstanceData = bytemuck::pod_read_unaligned(&bytes[96..192]);
        assert_eq!(second, a);
        assert_eq!(second.lod(), 2);
        assert!(HeadlessBackend::read_buffer(ring.buffer(0)).iter().all(|b| *b == 0));
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.dropped(), 0);
    }

    #[test]
    fn instanced_layout_matches_shader_locations() {
        let layout = instanced_layout();
        assert_eq!(layout.elements.len(), 9);
        assert_eq!(layout.elements[3].semantic, "INSTANCE_MODEL");
        assert_eq!(layout.elements[7].semantic, "COLOR");
        assert_eq!(layout.strides, vec![32, 96]);
    }
}
