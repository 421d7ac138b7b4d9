//! Device-owned descriptor heaps.
//!
//! Allocation is a monotonic bump; descriptors are never freed. The GPU handle
//! of a shader-visible descriptor packs the heap id and the slot index.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::RhiError;

pub const RTV_HEAP_CAPACITY: u32 = 256;
pub const DSV_HEAP_CAPACITY: u32 = 64;
pub const SRV_HEAP_CAPACITY: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    RenderTarget,
    DepthStencil,
    /// CBV/SRV/UAV, shader visible.
    ShaderResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    pub kind: HeapKind,
    pub heap_id: u32,
    pub index: u32,
}

impl DescriptorHandle {
    /// Opaque GPU handle for external UI code.
    pub fn gpu_handle(&self) -> u64 {
        ((self.heap_id as u64) << 32) | self.index as u64
    }
}

#[derive(Debug)]
pub struct DescriptorHeap {
    kind: HeapKind,
    id: u32,
    capacity: u32,
    next: AtomicU32,
}

impl DescriptorHeap {
    pub fn new(kind: HeapKind, id: u32, capacity: u32) -> Self {
        Self { kind, id, capacity, next: AtomicU32::new(0) }
    }

    pub fn allocate(&self) -> Result<DescriptorHandle, RhiError> {
        let index = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.capacity).then_some(n + 1))
            .map_err(|_| RhiError::HeapExhausted { kind: self.kind, capacity: self.capacity })?;
        Ok(DescriptorHandle { kind: self.kind, heap_id: self.id, index })
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }
}

/// The three heaps every device owns.
#[derive(Debug)]
pub struct DescriptorHeaps {
    pub rtv: DescriptorHeap,
    pub dsv: DescriptorHeap,
    pub srv: DescriptorHeap,
}

impl DescriptorHeaps {
    pub fn new() -> Self {
        Self {
            rtv: DescriptorHeap::new(HeapKind::RenderTarget, 0, RTV_HEAP_CAPACITY),
            dsv: DescriptorHeap::new(HeapKind::DepthStencil, 1, DSV_HEAP_CAPACITY),
            srv: DescriptorHeap::new(HeapKind::ShaderResource, 2, SRV_HEAP_CAPACITY),
        }
    }
}

impl Default for DescriptorHeaps {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocation_until_exhausted() {
        let heap = DescriptorHeap::new(HeapKind::DepthStencil, 1, 2);
        assert_eq!(heap.allocate().unwrap().index, 0);
        assert_eq!(heap.allocate().unwrap().index, 1);
        assert!(matches!(heap.allocate(), Err(RhiError::HeapExhausted { capacity: 2, .. })));
        assert_eq!(heap.allocated(), 2);
    }

    #[test]
    fn gpu_handle_packs_heap_and_index() {
        let h = DescriptorHandle { kind: HeapKind::ShaderResource, heap_id: 2, index: 7 };
        assert_eq!(h.gpu_handle(), (2u64 << 32) | 7);
    }
}
