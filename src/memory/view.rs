//! Typed, element-counted views over shared buffers

use std::fmt;
use std::marker::PhantomData;
use std::mem;

use crate::backend::StreamToken;
use crate::error::{MemResult, MemoryError};
use crate::memory::kind::{Device, MemoryKind};
use crate::memory::shared::SharedBuffer;

/// Typed handle on a [`SharedBuffer`].
///
/// The view stores a logical element count and translates every request
/// into bytes (`count * size_of::<T>()`) for the buffer underneath. An
/// unbound view is a valid state; any operation that needs the buffer
/// reports [`MemoryError::UnboundAccess`] instead.
///
/// Several views, possibly of different element types, may share one
/// buffer. Each keeps its own count.
pub struct TypedView<T: bytemuck::Pod, K: MemoryKind = Device> {
    buffer: Option<SharedBuffer<K>>,
    count: usize,
    _element: PhantomData<T>,
}

impl<T: bytemuck::Pod, K: MemoryKind> TypedView<T, K> {
    /// Create an unbound view
    pub fn new() -> Self {
        Self {
            buffer: None,
            count: 0,
            _element: PhantomData,
        }
    }

    /// Create a view bound to `buffer`
    pub fn bound(buffer: SharedBuffer<K>) -> Self {
        let mut view = Self::new();
        view.bind(buffer);
        view
    }

    /// Bind to `buffer`, replacing any previous binding. The element count
    /// starts at zero for the new binding.
    pub fn bind(&mut self, buffer: SharedBuffer<K>) {
        self.buffer = Some(buffer);
        self.count = 0;
    }

    /// Drop the binding and return the buffer handle, if any
    pub fn unbind(&mut self) -> Option<SharedBuffer<K>> {
        self.count = 0;
        self.buffer.take()
    }

    fn byte_len(count: usize) -> MemResult<usize> {
        count
            .checked_mul(mem::size_of::<T>())
            .ok_or(MemoryError::SizeOverflow {
                count,
                element_size: mem::size_of::<T>(),
            })
    }

    fn require(&self, operation: &'static str) -> MemResult<&SharedBuffer<K>> {
        self.buffer
            .as_ref()
            .ok_or(MemoryError::UnboundAccess { operation })
    }

    /// Ensure room for `count` elements and set the element count.
    pub fn allocate_or_grow(&mut self, count: usize, stream: StreamToken) -> MemResult<()> {
        let buffer = self.require("allocate_or_grow")?;
        let bytes = Self::byte_len(count)?;
        buffer.allocate_or_grow(bytes, stream)?;
        self.count = count;
        Ok(())
    }

    /// Alias of [`allocate_or_grow`](Self::allocate_or_grow)
    pub fn alloc(&mut self, count: usize, stream: StreamToken) -> MemResult<()> {
        self.allocate_or_grow(count, stream)
    }

    /// Set the element count without allocating. Fails if `count` elements
    /// do not fit in the buffer's capacity.
    pub fn resize(&mut self, count: usize) -> MemResult<()> {
        let buffer = self.require("resize")?;
        let bytes = Self::byte_len(count)?;
        buffer.resize(bytes)?;
        self.count = count;
        Ok(())
    }

    /// Typed pointer to the first element, null when unbound or empty
    pub fn as_ptr(&self) -> *mut T {
        match &self.buffer {
            Some(buffer) => buffer.as_ptr().cast(),
            None => std::ptr::null_mut(),
        }
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.count
    }

    /// Current byte size of the bound buffer, 0 when unbound.
    ///
    /// This is the buffer's size, which another holder may have changed;
    /// it need not equal `len() * size_of::<T>()`.
    pub fn bytes(&self) -> usize {
        self.buffer.as_ref().map_or(0, SharedBuffer::size)
    }

    pub fn is_bound(&self) -> bool {
        self.buffer.is_some()
    }

    /// Opposite of [`is_bound`](Self::is_bound)
    pub fn is_unset(&self) -> bool {
        self.buffer.is_none()
    }

    /// True when unbound or the bound buffer holds no allocation
    pub fn is_empty(&self) -> bool {
        self.buffer.as_ref().map_or(true, SharedBuffer::is_empty)
    }

    pub fn buffer(&self) -> Option<&SharedBuffer<K>> {
        self.buffer.as_ref()
    }
}

impl<T: bytemuck::Pod, K: MemoryKind> Default for TypedView<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: bytemuck::Pod, K: MemoryKind> Clone for TypedView<T, K> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            count: self.count,
            _element: PhantomData,
        }
    }
}

impl<T: bytemuck::Pod, K: MemoryKind> fmt::Debug for TypedView<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedView")
            .field("element", &std::any::type_name::<T>())
            .field("kind", &K::LABEL)
            .field("len", &self.count)
            .field("buffer", &self.buffer)
            .finish()
    }
}
