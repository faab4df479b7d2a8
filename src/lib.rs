//! Pooled suballocation of GPU vertex and index buffer ranges.
//!
//! Creating a device buffer is the expensive operation a renderer wants to
//! amortize; this crate carves many small geometry allocations out of a few
//! large pooled buffers instead. The core is a generic first-fit free-list
//! allocator with size-bucketed free lists and exhaustive coalescing
//! ([`BufferPoolAllocator`]); [`VertexBufferManager`] and
//! [`IndexBufferManager`] instantiate it over a `wgpu` device for the two
//! record kinds.
//!
//! ```rust,ignore
//! use bufpool::{VertexBufferManager, VertexLayout};
//!
//! let mut vertices = VertexBufferManager::new(device.clone(), false);
//! let quad = vertices.allocate(4, &layout)?;
//! queue.write_buffer(
//!     quad.buffer(),
//!     u64::from(quad.base_index()) * layout.array_stride,
//!     bytemuck::cast_slice(&quad_vertices),
//! );
//! // ...
//! vertices.free(quad);
//! ```
//!
//! The allocator is single-threaded by contract; see the `allocator` module
//! docs for the full resource model.

pub mod allocator;
mod chunk;
pub mod device;
pub mod errors;
pub mod managers;

pub use allocator::{Allocation, BufferPoolAllocator, NUM_BUCKETS, bucket_index};
pub use device::{BackingBuffer, BufferDevice};
pub use errors::{PoolError, Result};
pub use managers::{
    IndexAllocation, IndexBufferManager, MAX_INDICES_PER_BUFFER, MAX_VERTICES_PER_BUFFER,
    VertexAllocation, VertexBufferManager, VertexLayout, WgpuIndexBufferDevice,
    WgpuVertexBufferDevice, index_format_stride,
};
