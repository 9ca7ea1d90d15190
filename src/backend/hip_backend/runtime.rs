//! HIP implementation of [`MemoryRuntime`]

use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use crate::backend::hip_backend::ffi;
use crate::backend::runtime::{AllocationCounters, MemoryRuntime, RuntimeStats};
use crate::backend::stream::StreamToken;
use crate::check_runtime;
use crate::config::MemoryConfig;
use crate::error::{MemResult, MemoryError};

/// Device and pinned-host allocations through the HIP runtime
#[derive(Debug)]
pub struct HipRuntime {
    config: MemoryConfig,
    device_id: i32,
    counters: AllocationCounters,
    // hipFree/hipHostFree need no size, so track it for the live byte counters
    sizes: Mutex<HashMap<usize, usize>>,
}

impl HipRuntime {
    /// Check whether HIP is usable without touching any device state.
    ///
    /// Safe to call when the HIP runtime is missing or no device is present.
    pub fn gpu_available() -> bool {
        static AVAILABLE: AtomicBool = AtomicBool::new(false);
        static INIT: Once = Once::new();

        INIT.call_once(|| {
            let result = std::panic::catch_unwind(|| unsafe {
                let init_result = ffi::hipInit(0);
                if init_result != ffi::HIP_SUCCESS {
                    tracing::debug!("HIP not available: hipInit failed with code {}", init_result);
                    return false;
                }

                let mut count: i32 = 0;
                let count_result = ffi::hipGetDeviceCount(&mut count);
                if count_result != ffi::HIP_SUCCESS {
                    tracing::debug!(
                        "HIP not available: hipGetDeviceCount failed with code {}",
                        count_result
                    );
                    return false;
                }

                tracing::debug!("GPU available: {} device(s)", count);
                count > 0
            })
            .unwrap_or(false);

            AVAILABLE.store(result, Ordering::Release);
        });

        AVAILABLE.load(Ordering::Acquire)
    }

    /// Bind a runtime to `device_id`.
    pub fn new(device_id: i32, config: MemoryConfig) -> MemResult<Self> {
        config.validate()?;
        check_runtime!(unsafe { ffi::hipSetDevice(device_id) }, |code, site| {
            MemoryError::RuntimeCallFailed { code, site }
        })?;

        tracing::info!(
            device_id,
            stream_ordered_free = config.stream_ordered_free,
            "HipRuntime initialized"
        );
        Ok(Self {
            config,
            device_id,
            counters: AllocationCounters::default(),
            sizes: Mutex::new(HashMap::new()),
        })
    }

    pub fn into_shared(self) -> Arc<dyn MemoryRuntime> {
        Arc::new(self)
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// Free and total device memory in bytes
    pub fn memory_info(&self) -> MemResult<(usize, usize)> {
        let mut free = 0usize;
        let mut total = 0usize;
        check_runtime!(unsafe { ffi::hipMemGetInfo(&mut free, &mut total) }, |code, site| {
            MemoryError::RuntimeCallFailed { code, site }
        })?;
        Ok((free, total))
    }

    /// Human-readable description of a HIP status code
    pub fn error_string(code: i32) -> String {
        let raw = unsafe { ffi::hipGetErrorString(code) };
        if raw.is_null() {
            return format!("unknown HIP error {}", code);
        }
        unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned()
    }

    fn remember(&self, ptr: *mut c_void, bytes: usize) {
        let mut sizes = self.sizes.lock().unwrap_or_else(|p| p.into_inner());
        sizes.insert(ptr as usize, bytes);
    }

    fn forget(&self, ptr: *mut c_void) -> usize {
        let mut sizes = self.sizes.lock().unwrap_or_else(|p| p.into_inner());
        sizes.remove(&(ptr as usize)).unwrap_or(0)
    }
}

impl MemoryRuntime for HipRuntime {
    fn name(&self) -> &str {
        "hip"
    }

    fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn allocate_device(&self, bytes: usize, _stream: StreamToken) -> MemResult<*mut c_void> {
        let mut ptr: *mut c_void = ptr::null_mut();
        check_runtime!(unsafe { ffi::hipMalloc(&mut ptr, bytes) }, |code, site| {
            MemoryError::AllocationFailed {
                kind: "device",
                bytes,
                code,
                site,
            }
        })?;

        if ptr.is_null() {
            tracing::error!("hipMalloc returned null pointer for {} bytes", bytes);
            return Err(MemoryError::AllocationFailed {
                kind: "device",
                bytes,
                code: crate::backend::RUNTIME_ERROR_OUT_OF_MEMORY,
                site: crate::error::CallSite::new(file!(), line!(), "hipMalloc(&mut ptr, bytes)"),
            });
        }

        self.remember(ptr, bytes);
        self.counters.record_device_alloc(bytes);
        tracing::debug!("HipRuntime: hipMalloc {} bytes at {:?}", bytes, ptr);
        Ok(ptr)
    }

    fn free_device(&self, ptr: *mut c_void, stream: StreamToken) -> MemResult<()> {
        if self.config.stream_ordered_free && !stream.is_default() {
            check_runtime!(
                unsafe { ffi::hipFreeAsync(ptr, stream.as_raw()) },
                |code, site| MemoryError::FreeFailed {
                    kind: "device",
                    code,
                    site,
                }
            )?;
        } else {
            check_runtime!(unsafe { ffi::hipFree(ptr) }, |code, site| {
                MemoryError::FreeFailed {
                    kind: "device",
                    code,
                    site,
                }
            })?;
        }

        let bytes = self.forget(ptr);
        self.counters.record_device_free(bytes);
        Ok(())
    }

    fn allocate_pinned(&self, bytes: usize, _stream: StreamToken) -> MemResult<*mut c_void> {
        let mut ptr: *mut c_void = ptr::null_mut();
        check_runtime!(
            unsafe { ffi::hipHostMalloc(&mut ptr, bytes, ffi::HIP_HOST_MALLOC_DEFAULT) },
            |code, site| MemoryError::AllocationFailed {
                kind: "pinned host",
                bytes,
                code,
                site,
            }
        )?;

        if ptr.is_null() {
            tracing::error!("hipHostMalloc returned null pointer for {} bytes", bytes);
            return Err(MemoryError::AllocationFailed {
                kind: "pinned host",
                bytes,
                code: crate::backend::RUNTIME_ERROR_OUT_OF_MEMORY,
                site: crate::error::CallSite::new(
                    file!(),
                    line!(),
                    "hipHostMalloc(&mut ptr, bytes, HIP_HOST_MALLOC_DEFAULT)",
                ),
            });
        }

        self.remember(ptr, bytes);
        self.counters.record_pinned_alloc(bytes);
        tracing::debug!("HipRuntime: hipHostMalloc {} bytes at {:?}", bytes, ptr);
        Ok(ptr)
    }

    fn free_pinned(&self, ptr: *mut c_void, _stream: StreamToken) -> MemResult<()> {
        check_runtime!(unsafe { ffi::hipHostFree(ptr) }, |code, site| {
            MemoryError::FreeFailed {
                kind: "pinned host",
                code,
                site,
            }
        })?;

        let bytes = self.forget(ptr);
        self.counters.record_pinned_free(bytes);
        Ok(())
    }

    fn stats(&self) -> RuntimeStats {
        self.counters.snapshot()
    }
}
