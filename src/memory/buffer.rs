//! Grow-only device and pinned-host buffers
//!
//! A [`GrowableBuffer`] owns at most one physical allocation. Capacity only
//! grows: a smaller request just updates the logical size, so a pipeline
//! that replays the same graph on fluctuating inputs stops allocating once
//! it has seen its largest input.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;

use crate::backend::{MemoryRuntime, StreamToken};
use crate::error::{MemResult, MemoryError};
use crate::memory::kind::{Device, MemoryKind, Pinned};
use crate::memory::shared::SharedBuffer;

/// Buffer backed by device memory
pub type DeviceBuffer = GrowableBuffer<Device>;

/// Buffer backed by pinned host memory
pub type HostPinnedBuffer = GrowableBuffer<Pinned>;

/// Physical allocation history of one buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Successful runtime allocations
    pub allocations: usize,
    /// Successful runtime frees
    pub frees: usize,
    /// Largest capacity ever held
    pub peak_capacity: usize,
}

// SAFETY: the raw pointer is an opaque runtime handle owned exclusively by
// this buffer; every mutation goes through &mut self
unsafe impl<K: MemoryKind> Send for GrowableBuffer<K> {}
unsafe impl<K: MemoryKind> Sync for GrowableBuffer<K> {}

/// Owned allocation with grow-only capacity and a separate logical size.
///
/// Invariants:
/// - `as_ptr().is_null()` exactly when `capacity() == 0`
/// - `size() <= capacity()`
pub struct GrowableBuffer<K: MemoryKind> {
    runtime: Arc<dyn MemoryRuntime>,
    ptr: *mut c_void,
    capacity: usize,
    size: usize,
    name: Option<String>,
    stats: BufferStats,
    _kind: PhantomData<K>,
}

impl<K: MemoryKind> GrowableBuffer<K> {
    /// Create an empty buffer. No memory is allocated until the first grow.
    pub fn new(runtime: Arc<dyn MemoryRuntime>) -> Self {
        Self {
            runtime,
            ptr: ptr::null_mut(),
            capacity: 0,
            size: 0,
            name: None,
            stats: BufferStats::default(),
            _kind: PhantomData,
        }
    }

    /// Create an empty buffer with a diagnostic name
    pub fn named(runtime: Arc<dyn MemoryRuntime>, name: impl Into<String>) -> Self {
        let mut buffer = Self::new(runtime);
        buffer.name = Some(name.into());
        buffer
    }

    /// Make at least `bytes` available and set the logical size to `bytes`.
    ///
    /// When `bytes` exceeds the current capacity the old allocation is
    /// released on `stream` and a fresh allocation of exactly `bytes` is
    /// made; the old contents are not preserved. Otherwise only the size
    /// changes. Capacity never shrinks here.
    ///
    /// If the fresh allocation fails the buffer is left empty.
    pub fn allocate_or_grow(&mut self, bytes: usize, stream: StreamToken) -> MemResult<()> {
        if bytes > self.capacity {
            if bytes >= self.runtime.config().large_allocation_warn {
                tracing::warn!(
                    buffer = self.label(),
                    "Large {} allocation requested: {} MB",
                    K::LABEL,
                    bytes / (1024 * 1024)
                );
            }

            tracing::debug!(
                buffer = self.label(),
                kind = K::LABEL,
                old_capacity = self.capacity,
                new_capacity = bytes,
                "Growing buffer"
            );

            self.free(stream)?;
            let ptr = K::allocate(self.runtime.as_ref(), bytes, stream)?;

            self.ptr = ptr;
            self.capacity = bytes;
            self.stats.allocations += 1;
            self.stats.peak_capacity = self.stats.peak_capacity.max(bytes);
        }

        tracing::trace!(buffer = self.label(), size = bytes, "Buffer size set");
        self.size = bytes;
        Ok(())
    }

    /// Alias of [`allocate_or_grow`](Self::allocate_or_grow)
    pub fn alloc(&mut self, bytes: usize, stream: StreamToken) -> MemResult<()> {
        self.allocate_or_grow(bytes, stream)
    }

    /// Set the logical size without touching the allocation.
    ///
    /// For callers that already know the capacity suffices. Asking for more
    /// than the capacity is a contract violation and leaves the buffer
    /// unchanged.
    pub fn resize(&mut self, bytes: usize) -> MemResult<()> {
        if bytes > self.capacity {
            tracing::error!(
                buffer = self.label(),
                requested = bytes,
                capacity = self.capacity,
                "Resize past capacity"
            );
            return Err(MemoryError::CapacityExceeded {
                name: self.label().to_string(),
                requested: bytes,
                capacity: self.capacity,
            });
        }
        self.size = bytes;
        Ok(())
    }

    /// Release the allocation, if any, and reset capacity and size to zero.
    ///
    /// Bookkeeping is reset before the runtime call, so a failed release
    /// still leaves the buffer empty.
    pub fn free(&mut self, stream: StreamToken) -> MemResult<()> {
        if self.ptr.is_null() {
            return Ok(());
        }

        let ptr = std::mem::replace(&mut self.ptr, ptr::null_mut());
        let released = self.capacity;
        self.capacity = 0;
        self.size = 0;

        K::release(self.runtime.as_ref(), ptr, stream)?;
        self.stats.frees += 1;

        tracing::debug!(
            buffer = self.label(),
            kind = K::LABEL,
            bytes = released,
            "Released allocation"
        );
        Ok(())
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// Logical size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Allocated bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_null()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for diagnostics, `"<unnamed>"` when none was given
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    pub fn runtime(&self) -> &Arc<dyn MemoryRuntime> {
        &self.runtime
    }

    /// Move this buffer behind a shared handle
    pub fn into_shared(self) -> SharedBuffer<K> {
        SharedBuffer::from_buffer(self)
    }
}

impl<K: MemoryKind> fmt::Debug for GrowableBuffer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("kind", &K::LABEL)
            .field("name", &self.name)
            .field("ptr", &self.ptr)
            .field("capacity", &self.capacity)
            .field("size", &self.size)
            .field("runtime", &self.runtime.name())
            .finish()
    }
}

impl<K: MemoryKind> Drop for GrowableBuffer<K> {
    fn drop(&mut self) {
        if let Err(err) = self.free(StreamToken::DEFAULT) {
            tracing::error!(buffer = self.label(), "Failed to release buffer on drop: {}", err);
        }
    }
}
