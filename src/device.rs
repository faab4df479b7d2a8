//! Graphics Device Boundary
//!
//! The allocator never talks to the GPU API directly; it reaches the device
//! through this narrow trait pair. The pooling logic stays fully testable
//! without an adapter, and alternative backends only need to supply a
//! creation primitive and a destroy hook.

use crate::errors::Result;

/// Handle to one device buffer owned by the allocator.
///
/// Handles are cheap clones of the underlying resource (`wgpu::Buffer` is
/// reference counted internally); destroying through any clone releases the
/// GPU resource for all of them.
pub trait BackingBuffer: Clone {
    /// Release the device resource.
    fn destroy(&self);
}

/// The sole creation primitive the allocator consumes.
pub trait BufferDevice {
    /// Pool key: the structural record format (vertex attribute signature or
    /// index element width). Equality is exact and order-sensitive: two
    /// layouts that differ only in attribute order are distinct pools.
    type Layout: Clone + PartialEq;

    /// Buffer handle type produced by this device.
    type Buffer: BackingBuffer;

    /// Create a buffer able to hold `num_records` records of `layout`.
    ///
    /// `dynamic` marks buffers whose contents are expected to be rewritten
    /// often; backends are free to ignore the hint.
    fn create_buffer(
        &self,
        num_records: u32,
        layout: &Self::Layout,
        dynamic: bool,
    ) -> Result<Self::Buffer>;
}
