//! Pooled Buffer Allocator
//!
//! Suballocates contiguous record ranges (vertices, indices) out of a
//! growable set of bounded backing buffers, amortizing device buffer
//! creation, the one expensive operation, across many small allocations.
//!
//! # Design
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                 BufferPoolAllocator<D>                    │
//! │                                                           │
//! │  pools: [Pool]            ←── one per record layout       │
//! │    └─ buffers: [PooledBuffer]                             │
//! │         ├─ buckets: [head; 10]  ←── free lists by size    │
//! │         └─ chunks: ChunkArena                             │
//! │                                                           │
//! │  allocate(n, layout) → Allocation     (&mut self)         │
//! │  free(Allocation)                     (&mut self)         │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Free space is tracked per buffer in ten size-class buckets of singly
//! linked chunk lists. `allocate` takes the first sufficiently large chunk,
//! scanning from the requesting size class upward (first fit within class;
//! a smaller class cannot hold a fitting chunk). `free` coalesces the
//! released range with both neighbors exhaustively, so no two free chunks
//! are ever adjacent, and destroys a backing buffer the moment it becomes
//! wholly free.
//!
//! Requests at or above the per-buffer capacity bypass pooling entirely and
//! get a dedicated, exactly-sized buffer.
//!
//! # Thread Safety
//!
//! The allocator is single-threaded by contract: all mutation goes through
//! `&mut self`, there is no internal locking and no suspension point.
//! Callers on multi-threaded renderers must wrap it in their own mutual
//! exclusion.

use crate::chunk::ChunkArena;
use crate::device::{BackingBuffer, BufferDevice};
use crate::errors::{PoolError, Result};

/// Number of free-list size classes per backing buffer.
pub const NUM_BUCKETS: usize = 10;

/// Map a record count to its size class.
///
/// Classes are ≤8, ≤16, ≤32, ≤64, ≤128, ≤256, ≤512, ≤1024, ≤2048 and
/// everything above. Monotonic: a larger length never maps to a smaller
/// bucket index.
#[must_use]
pub fn bucket_index(length: u32) -> usize {
    if length <= 64 {
        if length <= 16 {
            return usize::from(length > 8);
        }
        return if length <= 32 { 2 } else { 3 };
    }
    if length <= 512 {
        if length <= 256 {
            return if length <= 128 { 4 } else { 5 };
        }
        return 6;
    }
    if length <= 2048 {
        return if length <= 1024 { 7 } else { 8 };
    }
    9
}

// ─── Allocation Handle ────────────────────────────────────────────────────────

/// A live record range handed out by [`BufferPoolAllocator::allocate`].
///
/// The handle is intentionally not `Clone`: [`BufferPoolAllocator::free`]
/// consumes it by value, so a range cannot be released twice through safe
/// code. Dropping a handle without freeing it leaks the range (the records
/// stay reserved until the allocator itself is destroyed).
#[derive(Debug)]
#[must_use]
pub struct Allocation<B> {
    pub(crate) buffer: B,
    pub(crate) base_index: u32,
    pub(crate) length: u32,
    pub(crate) pool_index: usize,
    pub(crate) buffer_id: u64,
}

impl<B> Allocation<B> {
    /// The backing buffer this range was carved from.
    #[must_use]
    #[inline]
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Record offset of the first record of the range.
    #[must_use]
    #[inline]
    pub fn base_index(&self) -> u32 {
        self.base_index
    }

    /// Number of records in the range. Always greater than zero.
    #[must_use]
    #[inline]
    pub fn len(&self) -> u32 {
        self.length
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Index of the owning pool inside the allocator.
    #[must_use]
    #[inline]
    pub fn pool_index(&self) -> usize {
        self.pool_index
    }
}

// ─── Internal Types ───────────────────────────────────────────────────────────

/// One backing buffer together with its free-space bookkeeping.
struct PooledBuffer<B> {
    /// Stable identity; never reused within one allocator.
    id: u64,
    buffer: B,
    capacity: u32,
    /// Head chunk of each size-class list, as an arena index.
    buckets: [Option<u32>; NUM_BUCKETS],
    chunks: ChunkArena,
}

impl<B> PooledBuffer<B> {
    fn new(id: u64, buffer: B, capacity: u32) -> Self {
        Self {
            id,
            buffer,
            capacity,
            buckets: [None; NUM_BUCKETS],
            chunks: ChunkArena::new(),
        }
    }

    /// Link a chunk at the head of `bucket`.
    fn push_front(&mut self, bucket: usize, chunk: u32) {
        self.chunks.get_mut(chunk).next = self.buckets[bucket];
        self.buckets[bucket] = Some(chunk);
    }

    /// Splice `chunk` out of `bucket`, given its predecessor in the list.
    fn unlink(&mut self, bucket: usize, prev: Option<u32>, chunk: u32) {
        let next = self.chunks.get(chunk).next;
        match prev {
            Some(p) => self.chunks.get_mut(p).next = next,
            None => self.buckets[bucket] = next,
        }
    }

    /// Re-file a resized chunk when its size class changed.
    fn refile(&mut self, old_bucket: usize, prev: Option<u32>, chunk: u32) {
        let new_bucket = bucket_index(self.chunks.get(chunk).length);
        if new_bucket != old_bucket {
            self.unlink(old_bucket, prev, chunk);
            self.push_front(new_bucket, chunk);
        }
    }
}

/// All backing buffers sharing one record layout.
///
/// Pools are created on first request for a layout and never removed; only
/// their buffers come and go.
struct Pool<D: BufferDevice> {
    layout: D::Layout,
    buffers: Vec<PooledBuffer<D::Buffer>>,
}

/// A free chunk located by the neighbor search in `free`, together with its
/// list predecessor (the lists are singly linked) and the bucket it sits in.
struct Neighbor {
    chunk: u32,
    prev: Option<u32>,
    bucket: usize,
}

// ─── Allocator ────────────────────────────────────────────────────────────────

/// Best-effort pooled allocator over an abstract buffer device.
///
/// Fully lazy: no backing buffer exists until the first allocation needs
/// one, and every buffer is destroyed as soon as it is wholly free again.
pub struct BufferPoolAllocator<D: BufferDevice> {
    device: D,
    pools: Vec<Pool<D>>,
    max_records: u32,
    dynamic: bool,
    created_buffers: u32,
    next_buffer_id: u64,
}

impl<D: BufferDevice> BufferPoolAllocator<D> {
    /// Create an empty allocator.
    ///
    /// `max_records` bounds the capacity of pooled backing buffers;
    /// `dynamic` is forwarded to every buffer creation.
    pub fn new(device: D, max_records: u32, dynamic: bool) -> Self {
        debug_assert!(max_records > 0, "per-buffer capacity must be non-zero");
        Self {
            device,
            pools: Vec::new(),
            max_records,
            dynamic,
            created_buffers: 0,
            next_buffer_id: 0,
        }
    }

    /// Allocate a contiguous range of `num_records` records of `layout`.
    ///
    /// Requests smaller than the per-buffer capacity are served from pooled
    /// buffers, creating a new one at full capacity only when no existing
    /// buffer of the pool has a large enough free chunk. Requests at or
    /// above the capacity get a dedicated, exactly-sized buffer that is
    /// never shared with later allocations.
    pub fn allocate(
        &mut self,
        num_records: u32,
        layout: &D::Layout,
    ) -> Result<Allocation<D::Buffer>> {
        if num_records == 0 {
            return Err(PoolError::ZeroRecords);
        }

        let pool_index = match self.pools.iter().position(|p| p.layout == *layout) {
            Some(index) => index,
            None => {
                self.pools.push(Pool {
                    layout: layout.clone(),
                    buffers: Vec::new(),
                });
                self.pools.len() - 1
            }
        };

        if num_records < self.max_records {
            if let Some((buffer_pos, bucket, prev, chunk)) =
                self.find_free_chunk(pool_index, num_records)
            {
                return Ok(self.carve(pool_index, buffer_pos, bucket, prev, chunk, num_records));
            }
            return self.create_pooled_buffer(pool_index, num_records, layout);
        }

        self.create_dedicated_buffer(pool_index, num_records, layout)
    }

    /// Release a range previously returned by [`allocate`](Self::allocate).
    ///
    /// The freed range is coalesced with any adjacent free chunks; if the
    /// owning buffer becomes wholly free it is destroyed and removed from
    /// its pool.
    ///
    /// Handles from another allocator are outside the contract and are
    /// ignored (checked only by a debug assertion).
    pub fn free(&mut self, allocation: Allocation<D::Buffer>) {
        let Allocation {
            base_index,
            length,
            pool_index,
            buffer_id,
            ..
        } = allocation;

        let pool = &mut self.pools[pool_index];
        let Some(buffer_pos) = pool.buffers.iter().position(|b| b.id == buffer_id) else {
            debug_assert!(false, "free of an allocation with no owning buffer");
            return;
        };
        let buffer = &mut pool.buffers[buffer_pos];

        // One pass over every bucket: an adjacent chunk can sit in any size
        // class. Predecessors are recorded for unlinking, and the pass stops
        // as soon as both neighbors are found.
        let mut left: Option<Neighbor> = None;
        let mut right: Option<Neighbor> = None;
        'buckets: for bucket in 0..NUM_BUCKETS {
            let mut prev = None;
            let mut cursor = buffer.buckets[bucket];
            while let Some(chunk) = cursor {
                let c = buffer.chunks.get(chunk);
                if left.is_none() && c.base_index + c.length == base_index {
                    left = Some(Neighbor { chunk, prev, bucket });
                }
                if right.is_none() && c.base_index == base_index + length {
                    right = Some(Neighbor { chunk, prev, bucket });
                }
                if left.is_some() && right.is_some() {
                    break 'buckets;
                }
                prev = Some(chunk);
                cursor = c.next;
            }
        }

        match (left, right) {
            (Some(mut l), Some(r)) => {
                // Merge all three ranges into the left chunk.
                let right_length = buffer.chunks.get(r.chunk).length;
                buffer.chunks.get_mut(l.chunk).length += length + right_length;

                // Unlink the right chunk before any move of the left one:
                // the right chunk may be the left chunk's recorded
                // predecessor, in which case the left chunk inherits the
                // right chunk's predecessor.
                buffer.unlink(r.bucket, r.prev, r.chunk);
                if l.prev == Some(r.chunk) {
                    l.prev = r.prev;
                }
                buffer.chunks.release(r.chunk);

                buffer.refile(l.bucket, l.prev, l.chunk);
            }
            (Some(l), None) => {
                buffer.chunks.get_mut(l.chunk).length += length;
                buffer.refile(l.bucket, l.prev, l.chunk);
            }
            (None, Some(r)) => {
                // The right chunk absorbs the freed range by moving its
                // base down.
                let c = buffer.chunks.get_mut(r.chunk);
                c.base_index = base_index;
                c.length += length;
                buffer.refile(r.bucket, r.prev, r.chunk);
            }
            (None, None) => {
                let bucket = bucket_index(length);
                let chunk = buffer
                    .chunks
                    .insert(base_index, length, buffer.buckets[bucket]);
                buffer.buckets[bucket] = Some(chunk);
            }
        }

        // Whole-buffer reclamation. A fully free buffer always coalesces
        // into a single chunk, so inspecting the head of the largest bucket
        // suffices whenever the capacity exceeds the top bucket boundary,
        // which holds for the production capacities. Smaller capacities are
        // conservatively retained.
        if let Some(head) = buffer.buckets[NUM_BUCKETS - 1] {
            if buffer.chunks.get(head).length >= self.max_records {
                let reclaimed = pool.buffers.remove(buffer_pos);
                log::debug!(
                    "destroying wholly free buffer #{} ({} records)",
                    reclaimed.id,
                    reclaimed.capacity
                );
                reclaimed.buffer.destroy();
            }
        }
    }

    /// Destroy every backing buffer and clear all pools.
    ///
    /// Called automatically on drop; calling it again afterwards is a
    /// no-op. Outstanding [`Allocation`] handles are invalidated.
    pub fn destroy(&mut self) {
        for pool in &mut self.pools {
            for buffer in pool.buffers.drain(..) {
                buffer.buffer.destroy();
            }
        }
        self.pools.clear();
    }

    // ── Allocation internals ───────────────────────────────────────────────

    /// Scan buckets from the requesting size class upward, buffers of the
    /// pool in list order within each bucket, and return the first chunk
    /// large enough for the request.
    fn find_free_chunk(
        &self,
        pool_index: usize,
        num_records: u32,
    ) -> Option<(usize, usize, Option<u32>, u32)> {
        let pool = &self.pools[pool_index];
        for bucket in bucket_index(num_records)..NUM_BUCKETS {
            for (buffer_pos, buffer) in pool.buffers.iter().enumerate() {
                let mut prev = None;
                let mut cursor = buffer.buckets[bucket];
                while let Some(chunk) = cursor {
                    let c = buffer.chunks.get(chunk);
                    if c.length >= num_records {
                        return Some((buffer_pos, bucket, prev, chunk));
                    }
                    prev = Some(chunk);
                    cursor = c.next;
                }
            }
        }
        None
    }

    /// Take `num_records` from the low end of a located chunk.
    fn carve(
        &mut self,
        pool_index: usize,
        buffer_pos: usize,
        bucket: usize,
        prev: Option<u32>,
        chunk: u32,
        num_records: u32,
    ) -> Allocation<D::Buffer> {
        let buffer = &mut self.pools[pool_index].buffers[buffer_pos];
        let (base_index, length) = {
            let c = buffer.chunks.get(chunk);
            (c.base_index, c.length)
        };

        if num_records < length {
            // Shrink in place. Allocations are carved from the low end so
            // the remainder keeps the high addresses; the adjacency
            // arithmetic in `free` relies on this.
            {
                let c = buffer.chunks.get_mut(chunk);
                c.base_index = base_index + num_records;
                c.length = length - num_records;
            }
            buffer.refile(bucket, prev, chunk);
        } else {
            // Exact fit: the whole chunk becomes the allocation.
            buffer.unlink(bucket, prev, chunk);
            buffer.chunks.release(chunk);
        }

        Allocation {
            buffer: buffer.buffer.clone(),
            base_index,
            length: num_records,
            pool_index,
            buffer_id: buffer.id,
        }
    }

    /// Bring up a new full-capacity buffer for the pool and carve the
    /// request from its start, filing the remainder as a single free chunk.
    fn create_pooled_buffer(
        &mut self,
        pool_index: usize,
        num_records: u32,
        layout: &D::Layout,
    ) -> Result<Allocation<D::Buffer>> {
        let capacity = self.max_records;
        let handle = self.device.create_buffer(capacity, layout, self.dynamic)?;
        let id = self.next_id();
        log::debug!("created pooled buffer #{id} ({capacity} records)");

        let mut buffer = PooledBuffer::new(id, handle, capacity);
        let remainder = capacity - num_records;
        if remainder > 0 {
            let chunk = buffer.chunks.insert(num_records, remainder, None);
            buffer.buckets[bucket_index(remainder)] = Some(chunk);
        }

        let allocation = Allocation {
            buffer: buffer.buffer.clone(),
            base_index: 0,
            length: num_records,
            pool_index,
            buffer_id: id,
        };
        self.pools[pool_index].buffers.push(buffer);
        Ok(allocation)
    }

    /// A request as large as a pooled buffer or larger skips pooling: the
    /// buffer is sized exactly to the request, carries no tracked free
    /// space, and can only ever be freed as a whole.
    fn create_dedicated_buffer(
        &mut self,
        pool_index: usize,
        num_records: u32,
        layout: &D::Layout,
    ) -> Result<Allocation<D::Buffer>> {
        let handle = self
            .device
            .create_buffer(num_records, layout, self.dynamic)?;
        let id = self.next_id();
        log::debug!("created dedicated buffer #{id} ({num_records} records)");

        let buffer = PooledBuffer::new(id, handle, num_records);
        let allocation = Allocation {
            buffer: buffer.buffer.clone(),
            base_index: 0,
            length: num_records,
            pool_index,
            buffer_id: id,
        };
        self.pools[pool_index].buffers.push(buffer);
        Ok(allocation)
    }

    fn next_id(&mut self) -> u64 {
        self.created_buffers += 1;
        self.next_buffer_id += 1;
        self.next_buffer_id
    }

    // ── Diagnostics ────────────────────────────────────────────────────────

    /// Total number of backing buffers ever created.
    #[must_use]
    pub fn created_buffers(&self) -> u32 {
        self.created_buffers
    }

    /// Number of pools (distinct layouts ever requested).
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Number of live backing buffers in a pool.
    #[must_use]
    pub fn buffer_count(&self, pool_index: usize) -> usize {
        self.pools[pool_index].buffers.len()
    }

    /// Record capacity of one backing buffer.
    #[must_use]
    pub fn buffer_capacity(&self, pool_index: usize, buffer_pos: usize) -> u32 {
        self.pools[pool_index].buffers[buffer_pos].capacity
    }

    /// All free ranges of one backing buffer as `(base_index, length)`
    /// pairs, sorted by base index.
    #[must_use]
    pub fn free_ranges(&self, pool_index: usize, buffer_pos: usize) -> Vec<(u32, u32)> {
        let buffer = &self.pools[pool_index].buffers[buffer_pos];
        let mut ranges = Vec::new();
        for &head in &buffer.buckets {
            let mut cursor = head;
            while let Some(chunk) = cursor {
                let c = buffer.chunks.get(chunk);
                ranges.push((c.base_index, c.length));
                cursor = c.next;
            }
        }
        ranges.sort_unstable();
        ranges
    }

    /// Free ranges filed under one bucket of one backing buffer, in list
    /// order (head first).
    #[must_use]
    pub fn bucket_ranges(
        &self,
        pool_index: usize,
        buffer_pos: usize,
        bucket: usize,
    ) -> Vec<(u32, u32)> {
        let buffer = &self.pools[pool_index].buffers[buffer_pos];
        let mut ranges = Vec::new();
        let mut cursor = buffer.buckets[bucket];
        while let Some(chunk) = cursor {
            let c = buffer.chunks.get(chunk);
            ranges.push((c.base_index, c.length));
            cursor = c.next;
        }
        ranges
    }

    /// Position of a buffer within its pool, by handle identity.
    pub fn buffer_position(&self, pool_index: usize, buffer: &D::Buffer) -> Option<usize>
    where
        D::Buffer: PartialEq,
    {
        self.pools[pool_index]
            .buffers
            .iter()
            .position(|b| b.buffer == *buffer)
    }
}

impl<D: BufferDevice> Drop for BufferPoolAllocator<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
