//! Identifier-keyed registry of shared device buffers
//!
//! Pipeline stages ask for their scratch buffers by name. Stages that use
//! the same name get the same buffer, so a workspace is allocated once per
//! pipeline rather than once per stage. [`AcquireMode::Private`] opts out of
//! sharing for buffers that must not alias anything else.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{MemoryRuntime, StreamToken};
use crate::error::MemResult;
use crate::memory::shared::SharedDeviceBuffer;
use crate::memory::view::TypedView;

/// How [`BufferPool::acquire`] resolves an identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AcquireMode {
    /// Return the registry entry for the identifier, creating it if absent
    #[default]
    Pooled,
    /// Return a fresh buffer named after the identifier, never registered
    Private,
}

/// Snapshot of pool usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Registered identifiers
    pub entries: usize,
    /// Registered buffers currently holding an allocation
    pub allocated_entries: usize,
    /// Sum of capacities in bytes
    pub total_capacity: usize,
    /// Sum of logical sizes in bytes
    pub total_size: usize,
}

/// Registry of named device buffers.
///
/// Entries are never evicted; they live until the pool is dropped, after
/// which each buffer is released once its last outside holder lets go.
#[derive(Debug)]
pub struct BufferPool {
    runtime: Arc<dyn MemoryRuntime>,
    registry: HashMap<String, SharedDeviceBuffer>,
}

impl BufferPool {
    pub fn new(runtime: Arc<dyn MemoryRuntime>) -> Self {
        Self {
            runtime,
            registry: HashMap::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn MemoryRuntime> {
        &self.runtime
    }

    /// Get the buffer for `id`.
    ///
    /// Pooled lookups for the same `id` always return handles to the same
    /// buffer. Private lookups return a new, unallocated buffer each call.
    pub fn acquire(&mut self, id: &str, mode: AcquireMode) -> SharedDeviceBuffer {
        match mode {
            AcquireMode::Private => {
                tracing::trace!(id, "BufferPool: private buffer");
                SharedDeviceBuffer::named(Arc::clone(&self.runtime), id)
            }
            AcquireMode::Pooled => {
                if let Some(existing) = self.registry.get(id) {
                    return existing.clone();
                }
                tracing::debug!(id, entries = self.registry.len() + 1, "BufferPool: new entry");
                let buffer = SharedDeviceBuffer::named(Arc::clone(&self.runtime), id);
                self.registry.insert(id.to_string(), buffer.clone());
                buffer
            }
        }
    }

    pub fn acquire_pooled(&mut self, id: &str) -> SharedDeviceBuffer {
        self.acquire(id, AcquireMode::Pooled)
    }

    pub fn acquire_private(&mut self, id: &str) -> SharedDeviceBuffer {
        self.acquire(id, AcquireMode::Private)
    }

    /// Acquire `id` and bind a typed view to it
    pub fn view<T: bytemuck::Pod>(&mut self, id: &str, mode: AcquireMode) -> TypedView<T> {
        TypedView::bound(self.acquire(id, mode))
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.contains_key(id)
    }

    /// Registered identifiers in sorted order
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.registry.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Bytes held by registered buffers
    pub fn total_capacity(&self) -> usize {
        self.registry.values().map(SharedDeviceBuffer::capacity).sum()
    }

    pub fn stats(&self) -> PoolStats {
        self.registry
            .values()
            .fold(PoolStats::default(), |mut stats, buffer| {
                let capacity = buffer.capacity();
                stats.entries += 1;
                if capacity > 0 {
                    stats.allocated_entries += 1;
                }
                stats.total_capacity += capacity;
                stats.total_size += buffer.size();
                stats
            })
    }

    /// Release the allocation of every registered buffer, keeping entries.
    ///
    /// Every buffer is attempted; the first failure is returned.
    pub fn free_all(&self, stream: StreamToken) -> MemResult<()> {
        let mut first_err = None;
        for (id, buffer) in &self.registry {
            if let Err(err) = buffer.free(stream) {
                tracing::error!(id = id.as_str(), "BufferPool: free failed: {}", err);
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
