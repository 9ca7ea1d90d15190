//! System heap runtime
//!
//! Serves both "device" and "pinned" requests from the host heap with
//! [`HOST_ALIGNMENT`]-byte alignment. Used on machines without a GPU, in
//! tests, and for CPU fallback pipelines. An optional byte limit makes it
//! report out-of-memory the way a real device would.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::runtime::{
    AllocationCounters, MemoryRuntime, RuntimeStats, RUNTIME_ERROR_INVALID_VALUE,
    RUNTIME_ERROR_OUT_OF_MEMORY, RUNTIME_SUCCESS,
};
use crate::backend::stream::StreamToken;
use crate::check_runtime;
use crate::config::MemoryConfig;
use crate::error::{MemResult, MemoryError};

/// Alignment of every host runtime allocation
pub const HOST_ALIGNMENT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Device,
    Pinned,
}

#[derive(Debug, Clone, Copy)]
struct LiveAllocation {
    bytes: usize,
    region: Region,
}

#[derive(Debug)]
pub struct HostRuntime {
    config: MemoryConfig,
    limit: Option<usize>,
    live: Mutex<HashMap<usize, LiveAllocation>>,
    counters: AllocationCounters,
}

impl HostRuntime {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            limit: None,
            live: Mutex::new(HashMap::new()),
            counters: AllocationCounters::default(),
        }
    }

    /// Cap the total bytes this runtime hands out; requests beyond the cap
    /// fail with an out-of-memory status.
    pub fn with_limit(mut self, limit_bytes: usize) -> Self {
        self.limit = Some(limit_bytes);
        self
    }

    pub fn into_shared(self) -> Arc<dyn MemoryRuntime> {
        Arc::new(self)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    // Bookkeeping stays consistent even if a previous holder panicked
    fn live(&self) -> MutexGuard<'_, HashMap<usize, LiveAllocation>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn raw_alloc(&self, out: &mut *mut c_void, bytes: usize, region: Region) -> i32 {
        let layout = match Layout::from_size_align(bytes, HOST_ALIGNMENT) {
            Ok(layout) if bytes > 0 => layout,
            _ => return RUNTIME_ERROR_INVALID_VALUE,
        };

        let mut live = self.live();
        if let Some(limit) = self.limit {
            let in_use: usize = live.values().map(|a| a.bytes).sum();
            if in_use.saturating_add(bytes) > limit {
                return RUNTIME_ERROR_OUT_OF_MEMORY;
            }
        }

        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            return RUNTIME_ERROR_OUT_OF_MEMORY;
        }

        live.insert(ptr as usize, LiveAllocation { bytes, region });
        *out = ptr.cast();
        RUNTIME_SUCCESS
    }

    fn raw_free(&self, ptr: *mut c_void, region: Region, freed: &mut usize) -> i32 {
        let mut live = self.live();
        let allocation = match live.get(&(ptr as usize)) {
            Some(allocation) if allocation.region == region => *allocation,
            _ => return RUNTIME_ERROR_INVALID_VALUE,
        };
        live.remove(&(ptr as usize));

        // SAFETY: ptr was produced by alloc::alloc with exactly this layout
        unsafe {
            alloc::dealloc(
                ptr.cast(),
                Layout::from_size_align_unchecked(allocation.bytes, HOST_ALIGNMENT),
            );
        }
        *freed = allocation.bytes;
        RUNTIME_SUCCESS
    }
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl MemoryRuntime for HostRuntime {
    fn name(&self) -> &str {
        "host"
    }

    fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn allocate_device(&self, bytes: usize, _stream: StreamToken) -> MemResult<*mut c_void> {
        let mut ptr: *mut c_void = ptr::null_mut();
        check_runtime!(self.raw_alloc(&mut ptr, bytes, Region::Device), |code, site| {
            MemoryError::AllocationFailed {
                kind: "device",
                bytes,
                code,
                site,
            }
        })?;
        self.counters.record_device_alloc(bytes);
        tracing::trace!("HostRuntime: device alloc {} bytes at {:?}", bytes, ptr);
        Ok(ptr)
    }

    fn free_device(&self, ptr: *mut c_void, _stream: StreamToken) -> MemResult<()> {
        let mut freed = 0;
        check_runtime!(self.raw_free(ptr, Region::Device, &mut freed), |code, site| {
            MemoryError::FreeFailed {
                kind: "device",
                code,
                site,
            }
        })?;
        self.counters.record_device_free(freed);
        Ok(())
    }

    fn allocate_pinned(&self, bytes: usize, _stream: StreamToken) -> MemResult<*mut c_void> {
        let mut ptr: *mut c_void = ptr::null_mut();
        check_runtime!(self.raw_alloc(&mut ptr, bytes, Region::Pinned), |code, site| {
            MemoryError::AllocationFailed {
                kind: "pinned host",
                bytes,
                code,
                site,
            }
        })?;
        self.counters.record_pinned_alloc(bytes);
        tracing::trace!("HostRuntime: pinned alloc {} bytes at {:?}", bytes, ptr);
        Ok(ptr)
    }

    fn free_pinned(&self, ptr: *mut c_void, _stream: StreamToken) -> MemResult<()> {
        let mut freed = 0;
        check_runtime!(self.raw_free(ptr, Region::Pinned, &mut freed), |code, site| {
            MemoryError::FreeFailed {
                kind: "pinned host",
                code,
                site,
            }
        })?;
        self.counters.record_pinned_free(freed);
        Ok(())
    }

    fn stats(&self) -> RuntimeStats {
        self.counters.snapshot()
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        let live = self.live.get_mut().unwrap_or_else(|p| p.into_inner());
        if !live.is_empty() {
            tracing::warn!(
                "HostRuntime dropped with {} live allocations, releasing them",
                live.len()
            );
        }
        for (addr, allocation) in live.drain() {
            // SAFETY: every entry was allocated with this layout and not yet freed
            unsafe {
                alloc::dealloc(
                    addr as *mut u8,
                    Layout::from_size_align_unchecked(allocation.bytes, HOST_ALIGNMENT),
                );
            }
        }
    }
}
