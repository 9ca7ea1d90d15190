//! Shared fixtures for integration tests
//!
//! Host-heap runtimes run everywhere. The GPU fixture only exists with the
//! `rocm` feature and is `None` when no device is present, so GPU tests
//! skip gracefully.
//!
//! ```ignore
//! mod common;
//! use common::{host_runtime, serial};
//! ```

#![allow(dead_code)]

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hipmem::backend::{HostRuntime, MemoryRuntime, RuntimeStats, StreamToken};
use hipmem::error::{CallSite, MemResult, MemoryError};
use hipmem::MemoryConfig;
#[cfg(feature = "rocm")]
pub use serial_test::serial;

/// Unlimited host runtime with default configuration
pub fn host_runtime() -> Arc<dyn MemoryRuntime> {
    HostRuntime::default().into_shared()
}

/// Host runtime that reports out-of-memory past `limit` live bytes
pub fn limited_runtime(limit: usize) -> Arc<dyn MemoryRuntime> {
    HostRuntime::new(MemoryConfig::default())
        .with_limit(limit)
        .into_shared()
}

/// Runtime whose frees can be made to fail on demand.
///
/// Allocation is served by a [`HostRuntime`]. While `fail_frees` is set,
/// every free reports an error and leaves the allocation live.
#[derive(Debug, Default)]
pub struct FlakyRuntime {
    inner: HostRuntime,
    fail_frees: AtomicBool,
}

impl FlakyRuntime {
    pub fn set_fail_frees(&self, fail: bool) {
        self.fail_frees.store(fail, Ordering::SeqCst);
    }

    fn free_error(&self, kind: &'static str) -> MemResult<()> {
        Err(MemoryError::FreeFailed {
            kind,
            code: 1,
            site: CallSite::new(file!(), line!(), "FlakyRuntime::free"),
        })
    }
}

impl MemoryRuntime for FlakyRuntime {
    fn name(&self) -> &str {
        "flaky"
    }

    fn config(&self) -> &MemoryConfig {
        self.inner.config()
    }

    fn allocate_device(&self, bytes: usize, stream: StreamToken) -> MemResult<*mut c_void> {
        self.inner.allocate_device(bytes, stream)
    }

    fn free_device(&self, ptr: *mut c_void, stream: StreamToken) -> MemResult<()> {
        if self.fail_frees.load(Ordering::SeqCst) {
            return self.free_error("device");
        }
        self.inner.free_device(ptr, stream)
    }

    fn allocate_pinned(&self, bytes: usize, stream: StreamToken) -> MemResult<*mut c_void> {
        self.inner.allocate_pinned(bytes, stream)
    }

    fn free_pinned(&self, ptr: *mut c_void, stream: StreamToken) -> MemResult<()> {
        if self.fail_frees.load(Ordering::SeqCst) {
            return self.free_error("pinned host");
        }
        self.inner.free_pinned(ptr, stream)
    }

    fn stats(&self) -> RuntimeStats {
        self.inner.stats()
    }
}

#[cfg(feature = "rocm")]
pub use gpu::{GpuTestFixture, GPU_FIXTURE};

#[cfg(feature = "rocm")]
mod gpu {
    use std::sync::Arc;

    use hipmem::backend::{HipRuntime, MemoryRuntime};
    use hipmem::error::MemResult;
    use hipmem::MemoryConfig;
    use once_cell::sync::Lazy;

    /// Global GPU fixture, initialized once and shared by every GPU test
    pub static GPU_FIXTURE: Lazy<Option<GpuTestFixture>> = Lazy::new(|| {
        if !HipRuntime::gpu_available() {
            eprintln!("WARNING: GPU not available - skipping GPU tests");
            return None;
        }

        match GpuTestFixture::new() {
            Ok(fixture) => {
                eprintln!(
                    "GPU fixture ready: {} MB free of {} MB",
                    fixture.initial_free_mb, fixture.initial_total_mb
                );
                Some(fixture)
            }
            Err(e) => {
                eprintln!("ERROR: Failed to initialize GPU fixture: {}", e);
                None
            }
        }
    });

    pub struct GpuTestFixture {
        hip: Arc<HipRuntime>,
        initial_free_mb: usize,
        initial_total_mb: usize,
    }

    impl GpuTestFixture {
        fn new() -> MemResult<Self> {
            let hip = Arc::new(HipRuntime::new(0, MemoryConfig::default())?);
            let (free, total) = hip.memory_info()?;
            Ok(Self {
                hip,
                initial_free_mb: free / 1024 / 1024,
                initial_total_mb: total / 1024 / 1024,
            })
        }

        pub fn runtime(&self) -> Arc<dyn MemoryRuntime> {
            self.hip.clone()
        }

        pub fn hip(&self) -> &HipRuntime {
            &self.hip
        }

        /// Panics if free device memory dropped by more than
        /// `tolerance_percent` of total since the fixture was created
        pub fn assert_no_leak(&self, tolerance_percent: usize) {
            let (free, _) = self
                .hip
                .memory_info()
                .expect("Failed to query GPU memory");
            let free_mb = free / 1024 / 1024;
            let leaked_mb = self.initial_free_mb.saturating_sub(free_mb);
            let tolerance_mb = (self.initial_total_mb * tolerance_percent) / 100;

            assert!(
                leaked_mb <= tolerance_mb,
                "GPU memory leak detected: initial free {} MB, now {} MB (tolerance {} MB)",
                self.initial_free_mb,
                free_mb,
                tolerance_mb
            );
        }
    }
}
