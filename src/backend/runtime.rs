//! Allocation runtime abstraction
//!
//! Buffers never call an allocator directly. They go through a
//! [`MemoryRuntime`], which is either the HIP runtime (feature `rocm`) or the
//! system heap runtime used on hosts without a GPU.

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::stream::StreamToken;
use crate::config::MemoryConfig;
use crate::error::MemResult;

/// Status code of a successful runtime call
pub const RUNTIME_SUCCESS: i32 = 0;

/// Status code for an invalid argument (unknown pointer, bad layout)
pub const RUNTIME_ERROR_INVALID_VALUE: i32 = 1;

/// Status code for an exhausted allocator
pub const RUNTIME_ERROR_OUT_OF_MEMORY: i32 = 2;

/// Device and pinned-host allocation primitives.
///
/// Implementations report failures as `MemoryError::AllocationFailed` or
/// `MemoryError::FreeFailed` and never return a null pointer from a
/// successful allocation. The stream token is forwarded untouched; a runtime
/// may use it to order the call or ignore it.
pub trait MemoryRuntime: Send + Sync + fmt::Debug {
    /// Short runtime name for diagnostics
    fn name(&self) -> &str;

    /// Configuration shared with every buffer backed by this runtime
    fn config(&self) -> &MemoryConfig;

    fn allocate_device(&self, bytes: usize, stream: StreamToken) -> MemResult<*mut c_void>;

    fn free_device(&self, ptr: *mut c_void, stream: StreamToken) -> MemResult<()>;

    fn allocate_pinned(&self, bytes: usize, stream: StreamToken) -> MemResult<*mut c_void>;

    fn free_pinned(&self, ptr: *mut c_void, stream: StreamToken) -> MemResult<()>;

    /// Snapshot of the physical allocations performed so far
    fn stats(&self) -> RuntimeStats;
}

/// Physical allocation counts for one runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub device_allocations: usize,
    pub device_frees: usize,
    pub device_live_bytes: usize,
    pub pinned_allocations: usize,
    pub pinned_frees: usize,
    pub pinned_live_bytes: usize,
}

impl RuntimeStats {
    /// Allocations that have not been released yet, across both kinds
    pub fn live_allocations(&self) -> usize {
        // Counters are loaded one by one, so a snapshot taken during a
        // concurrent alloc/free can see the free before the allocation
        self.device_allocations.saturating_sub(self.device_frees)
            + self.pinned_allocations.saturating_sub(self.pinned_frees)
    }

    pub fn live_bytes(&self) -> usize {
        self.device_live_bytes + self.pinned_live_bytes
    }
}

/// Lock-free counters behind [`RuntimeStats`]
#[derive(Debug, Default)]
pub(crate) struct AllocationCounters {
    device_allocations: AtomicUsize,
    device_frees: AtomicUsize,
    device_live_bytes: AtomicUsize,
    pinned_allocations: AtomicUsize,
    pinned_frees: AtomicUsize,
    pinned_live_bytes: AtomicUsize,
}

impl AllocationCounters {
    pub(crate) fn record_device_alloc(&self, bytes: usize) {
        self.device_allocations.fetch_add(1, Ordering::Relaxed);
        self.device_live_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_device_free(&self, bytes: usize) {
        self.device_frees.fetch_add(1, Ordering::Relaxed);
        self.device_live_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_pinned_alloc(&self, bytes: usize) {
        self.pinned_allocations.fetch_add(1, Ordering::Relaxed);
        self.pinned_live_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_pinned_free(&self, bytes: usize) {
        self.pinned_frees.fetch_add(1, Ordering::Relaxed);
        self.pinned_live_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            device_allocations: self.device_allocations.load(Ordering::Relaxed),
            device_frees: self.device_frees.load(Ordering::Relaxed),
            device_live_bytes: self.device_live_bytes.load(Ordering::Relaxed),
            pinned_allocations: self.pinned_allocations.load(Ordering::Relaxed),
            pinned_frees: self.pinned_frees.load(Ordering::Relaxed),
            pinned_live_bytes: self.pinned_live_bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = AllocationCounters::default();
        counters.record_device_alloc(100);
        counters.record_device_alloc(200);
        counters.record_device_free(100);
        counters.record_pinned_alloc(64);

        let stats = counters.snapshot();
        assert_eq!(stats.device_allocations, 2);
        assert_eq!(stats.device_frees, 1);
        assert_eq!(stats.device_live_bytes, 200);
        assert_eq!(stats.pinned_allocations, 1);
        assert_eq!(stats.pinned_live_bytes, 64);
        assert_eq!(stats.live_allocations(), 2);
        assert_eq!(stats.live_bytes(), 264);
    }

    #[test]
    fn test_live_allocations_with_torn_snapshot() {
        let stats = RuntimeStats {
            device_allocations: 3,
            device_frees: 4,
            pinned_allocations: 2,
            pinned_frees: 1,
            ..Default::default()
        };
        assert_eq!(stats.live_allocations(), 1);
    }
}
