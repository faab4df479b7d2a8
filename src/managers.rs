//! wgpu Vertex and Index Buffer Managers
//!
//! The two record kinds a renderer suballocates, vertices and indices, are
//! instantiations of the same generic pooling logic; only the pool key
//! and the byte sizing differ. [`VertexBufferManager`] and
//! [`IndexBufferManager`] are thin typed facades over
//! [`BufferPoolAllocator`] with the production capacity constants.

use crate::allocator::{Allocation, BufferPoolAllocator};
use crate::device::{BackingBuffer, BufferDevice};
use crate::errors::Result;

/// Record capacity of one pooled vertex buffer.
pub const MAX_VERTICES_PER_BUFFER: u32 = 65_535;

/// Record capacity of one pooled index buffer.
pub const MAX_INDICES_PER_BUFFER: u32 = 262_144;

impl BackingBuffer for wgpu::Buffer {
    fn destroy(&self) {
        wgpu::Buffer::destroy(self);
    }
}

/// Byte width of one index element.
#[must_use]
pub fn index_format_stride(format: wgpu::IndexFormat) -> u64 {
    match format {
        wgpu::IndexFormat::Uint16 => 2,
        wgpu::IndexFormat::Uint32 => 4,
    }
}

// ─── Vertex Buffers ───────────────────────────────────────────────────────────

/// Order-sensitive vertex format signature used as the pool key.
///
/// Two geometries share a pool only when their attribute lists match
/// exactly, including order, formats and offsets; records of one buffer
/// must be interchangeable.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexLayout {
    /// Byte stride of one vertex record.
    pub array_stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexLayout {
    #[must_use]
    pub fn new(array_stride: u64, attributes: Vec<wgpu::VertexAttribute>) -> Self {
        Self {
            array_stride,
            attributes,
        }
    }
}

/// Creates vertex buffers sized in whole records of one [`VertexLayout`].
#[derive(Clone)]
pub struct WgpuVertexBufferDevice {
    device: wgpu::Device,
}

impl WgpuVertexBufferDevice {
    #[must_use]
    pub fn new(device: wgpu::Device) -> Self {
        Self { device }
    }
}

impl BufferDevice for WgpuVertexBufferDevice {
    type Layout = VertexLayout;
    type Buffer = wgpu::Buffer;

    fn create_buffer(
        &self,
        num_records: u32,
        layout: &VertexLayout,
        dynamic: bool,
    ) -> Result<wgpu::Buffer> {
        // wgpu has no static/dynamic buffer distinction; the hint only
        // selects the debug label.
        let label = if dynamic {
            "PooledVertexBuffer (dynamic)"
        } else {
            "PooledVertexBuffer"
        };
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: u64::from(num_records) * layout.array_stride,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }
}

/// A vertex range inside a pooled `wgpu` vertex buffer.
pub type VertexAllocation = Allocation<wgpu::Buffer>;

/// Suballocates vertex ranges out of pooled `wgpu` vertex buffers.
pub struct VertexBufferManager {
    allocator: BufferPoolAllocator<WgpuVertexBufferDevice>,
}

impl VertexBufferManager {
    /// `dynamic` marks every created buffer as frequently rewritten.
    #[must_use]
    pub fn new(device: wgpu::Device, dynamic: bool) -> Self {
        Self {
            allocator: BufferPoolAllocator::new(
                WgpuVertexBufferDevice::new(device),
                MAX_VERTICES_PER_BUFFER,
                dynamic,
            ),
        }
    }

    /// Allocate `num_vertices` contiguous vertices of `layout`.
    pub fn allocate(
        &mut self,
        num_vertices: u32,
        layout: &VertexLayout,
    ) -> Result<VertexAllocation> {
        self.allocator.allocate(num_vertices, layout)
    }

    /// Release a vertex range.
    pub fn free(&mut self, allocation: VertexAllocation) {
        self.allocator.free(allocation);
    }

    /// Destroy every pooled vertex buffer.
    pub fn destroy(&mut self) {
        self.allocator.destroy();
    }

    /// The generic allocator, for diagnostics.
    #[must_use]
    pub fn allocator(&self) -> &BufferPoolAllocator<WgpuVertexBufferDevice> {
        &self.allocator
    }
}

// ─── Index Buffers ────────────────────────────────────────────────────────────

/// Creates index buffers of one element width.
#[derive(Clone)]
pub struct WgpuIndexBufferDevice {
    device: wgpu::Device,
}

impl WgpuIndexBufferDevice {
    #[must_use]
    pub fn new(device: wgpu::Device) -> Self {
        Self { device }
    }
}

impl BufferDevice for WgpuIndexBufferDevice {
    type Layout = wgpu::IndexFormat;
    type Buffer = wgpu::Buffer;

    fn create_buffer(
        &self,
        num_records: u32,
        layout: &wgpu::IndexFormat,
        dynamic: bool,
    ) -> Result<wgpu::Buffer> {
        let label = if dynamic {
            "PooledIndexBuffer (dynamic)"
        } else {
            "PooledIndexBuffer"
        };
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: u64::from(num_records) * index_format_stride(*layout),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }
}

/// An index range inside a pooled `wgpu` index buffer.
pub type IndexAllocation = Allocation<wgpu::Buffer>;

/// Suballocates index ranges out of pooled `wgpu` index buffers, one pool
/// per element width.
pub struct IndexBufferManager {
    allocator: BufferPoolAllocator<WgpuIndexBufferDevice>,
}

impl IndexBufferManager {
    /// `dynamic` marks every created buffer as frequently rewritten.
    #[must_use]
    pub fn new(device: wgpu::Device, dynamic: bool) -> Self {
        Self {
            allocator: BufferPoolAllocator::new(
                WgpuIndexBufferDevice::new(device),
                MAX_INDICES_PER_BUFFER,
                dynamic,
            ),
        }
    }

    /// Allocate `num_indices` contiguous indices of `format`.
    pub fn allocate(
        &mut self,
        num_indices: u32,
        format: wgpu::IndexFormat,
    ) -> Result<IndexAllocation> {
        self.allocator.allocate(num_indices, &format)
    }

    /// Release an index range.
    pub fn free(&mut self, allocation: IndexAllocation) {
        self.allocator.free(allocation);
    }

    /// Destroy every pooled index buffer.
    pub fn destroy(&mut self) {
        self.allocator.destroy();
    }

    /// The generic allocator, for diagnostics.
    #[must_use]
    pub fn allocator(&self) -> &BufferPoolAllocator<WgpuIndexBufferDevice> {
        &self.allocator
    }
}
