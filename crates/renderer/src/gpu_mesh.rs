use std::sync::Arc;

use rhi::{Backend, Buffer, BufferDesc, BufferUsage, Device, RhiError};
use types::{Aabb, MeshData};

/// An immutable mesh resident in GPU-only memory.
pub struct GpuMesh<B: Backend> {
    pub vertex_buffer: Arc<Buffer<B>>,
    pub index_buffer: Arc<Buffer<B>>,
    pub vertex_count: u32,
    pub index_count: u32,
    pub bounds: Aabb,
}

impl<B: Backend> GpuMesh<B> {
    /// Uploads `mesh` through a one-shot staging copy. The mesh must be valid.
    pub fn upload(device: &Device<B>, label: &str, mesh: &MeshData) -> Result<Self, RhiError> {
        let vertex_buffer = device.create_buffer_with_data(
            &BufferDesc::gpu_only(format!("{label}_vb"), mesh.vertex_bytes().len() as u64, BufferUsage::VERTEX),
            mesh.vertex_bytes(),
        )?;
        let index_buffer = device.create_buffer_with_data(
            &BufferDesc::gpu_only(format!("{label}_ib"), mesh.index_bytes().len() as u64, BufferUsage::INDEX),
            mesh.index_bytes(),
        )?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertex_count(),
            index_count: mesh.index_count(),
            bounds: mesh.bounds,
        })
    }
}
