//! Shared ownership of a growable buffer
//!
//! Pool entries, typed views and stages of a pipeline all hold the same
//! allocation; a grow through one holder is visible to every other holder.
//! The allocation is released when the last holder drops.

use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{MemoryRuntime, StreamToken};
use crate::error::MemResult;
use crate::memory::buffer::{BufferStats, GrowableBuffer};
use crate::memory::kind::{Device, MemoryKind, Pinned};

pub type SharedDeviceBuffer = SharedBuffer<Device>;
pub type SharedPinnedBuffer = SharedBuffer<Pinned>;

/// Reference-counted handle to a [`GrowableBuffer`]
pub struct SharedBuffer<K: MemoryKind> {
    inner: Arc<Mutex<GrowableBuffer<K>>>,
}

impl<K: MemoryKind> fmt::Debug for SharedBuffer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("holders", &self.strong_count())
            .field("buffer", &*self.read())
            .finish()
    }
}

impl<K: MemoryKind> Clone for SharedBuffer<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: MemoryKind> SharedBuffer<K> {
    pub fn new(runtime: Arc<dyn MemoryRuntime>) -> Self {
        Self::from_buffer(GrowableBuffer::new(runtime))
    }

    pub fn named(runtime: Arc<dyn MemoryRuntime>, name: impl Into<String>) -> Self {
        Self::from_buffer(GrowableBuffer::named(runtime, name))
    }

    pub fn from_buffer(buffer: GrowableBuffer<K>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    /// Exclusive access to the underlying buffer
    pub fn lock(&self) -> MemResult<MutexGuard<'_, GrowableBuffer<K>>> {
        Ok(self.inner.lock()?)
    }

    // Read-only accessors tolerate poisoning: the fields are plain values
    // and are never left half-written.
    fn read(&self) -> MutexGuard<'_, GrowableBuffer<K>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// See [`GrowableBuffer::allocate_or_grow`]
    pub fn allocate_or_grow(&self, bytes: usize, stream: StreamToken) -> MemResult<()> {
        self.lock()?.allocate_or_grow(bytes, stream)
    }

    pub fn alloc(&self, bytes: usize, stream: StreamToken) -> MemResult<()> {
        self.allocate_or_grow(bytes, stream)
    }

    /// See [`GrowableBuffer::resize`]
    pub fn resize(&self, bytes: usize) -> MemResult<()> {
        self.lock()?.resize(bytes)
    }

    /// Release the allocation for every holder
    pub fn free(&self, stream: StreamToken) -> MemResult<()> {
        self.lock()?.free(stream)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.read().as_ptr()
    }

    pub fn size(&self) -> usize {
        self.read().size()
    }

    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn name(&self) -> Option<String> {
        self.read().name().map(str::to_owned)
    }

    pub fn stats(&self) -> BufferStats {
        self.read().stats()
    }

    /// True when both handles refer to the same buffer
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live holders
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
