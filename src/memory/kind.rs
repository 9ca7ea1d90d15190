//! Memory kinds: which runtime primitive backs a buffer

use std::ffi::c_void;

use crate::backend::{MemoryRuntime, StreamToken};
use crate::error::MemResult;

mod sealed {
    pub trait Sealed {}
}

/// Allocation primitive pair for one kind of memory.
///
/// Device and pinned-host buffers share every line of bookkeeping; only the
/// runtime calls differ, and those live here.
pub trait MemoryKind: sealed::Sealed + Send + Sync + 'static {
    /// Label used in logs and error messages
    const LABEL: &'static str;

    fn allocate(
        runtime: &dyn MemoryRuntime,
        bytes: usize,
        stream: StreamToken,
    ) -> MemResult<*mut c_void>;

    fn release(runtime: &dyn MemoryRuntime, ptr: *mut c_void, stream: StreamToken)
        -> MemResult<()>;
}

/// Accelerator-resident memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device;

/// Page-locked host memory, usable for asynchronous transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pinned;

impl sealed::Sealed for Device {}
impl sealed::Sealed for Pinned {}

impl MemoryKind for Device {
    const LABEL: &'static str = "device";

    fn allocate(
        runtime: &dyn MemoryRuntime,
        bytes: usize,
        stream: StreamToken,
    ) -> MemResult<*mut c_void> {
        runtime.allocate_device(bytes, stream)
    }

    fn release(
        runtime: &dyn MemoryRuntime,
        ptr: *mut c_void,
        stream: StreamToken,
    ) -> MemResult<()> {
        runtime.free_device(ptr, stream)
    }
}

impl MemoryKind for Pinned {
    const LABEL: &'static str = "pinned host";

    fn allocate(
        runtime: &dyn MemoryRuntime,
        bytes: usize,
        stream: StreamToken,
    ) -> MemResult<*mut c_void> {
        runtime.allocate_pinned(bytes, stream)
    }

    fn release(
        runtime: &dyn MemoryRuntime,
        ptr: *mut c_void,
        stream: StreamToken,
    ) -> MemResult<()> {
        runtime.free_pinned(ptr, stream)
    }
}
