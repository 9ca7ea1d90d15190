//! HIP FFI bindings
//!
//! Only the entry points the memory layer needs: device/pinned allocation,
//! stream lifetime, and the error string lookup used in diagnostics.

use std::ffi::{c_char, c_void};

#[link(name = "amdhip64")]
#[allow(dead_code)]
extern "C" {
    pub fn hipInit(flags: u32) -> i32;
    pub fn hipGetDeviceCount(count: *mut i32) -> i32;
    pub fn hipSetDevice(deviceId: i32) -> i32;
    pub fn hipMalloc(ptr: *mut *mut c_void, size: usize) -> i32;
    pub fn hipFree(ptr: *mut c_void) -> i32;
    pub fn hipFreeAsync(ptr: *mut c_void, stream: *mut c_void) -> i32;
    pub fn hipHostMalloc(ptr: *mut *mut c_void, size: usize, flags: u32) -> i32;
    pub fn hipHostFree(ptr: *mut c_void) -> i32;
    pub fn hipStreamCreate(stream: *mut *mut c_void) -> i32;
    pub fn hipStreamDestroy(stream: *mut c_void) -> i32;
    pub fn hipStreamSynchronize(stream: *mut c_void) -> i32;
    pub fn hipGetErrorString(error: i32) -> *const c_char;
    pub fn hipMemGetInfo(free: *mut usize, total: *mut usize) -> i32;
}

/// HIP success code
pub const HIP_SUCCESS: i32 = 0;

/// Default pinned allocation flags (`hipHostMallocDefault`)
pub const HIP_HOST_MALLOC_DEFAULT: u32 = 0x0;
