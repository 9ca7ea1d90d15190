//! HIP stream wrapper

use std::ptr;

use crate::backend::hip_backend::ffi;
use crate::backend::stream::StreamToken;
use crate::check_runtime;
use crate::error::{MemResult, MemoryError};

// SAFETY: HipStream only holds the runtime handle; HIP streams may be used
// from any host thread
// NOTE: HipStream does NOT implement Clone because cloning the handle would
// destroy the stream twice. Share it through `token()` instead.
unsafe impl Send for HipStream {}
unsafe impl Sync for HipStream {}

/// Owned HIP stream
#[repr(C)]
#[derive(Debug)]
pub struct HipStream {
    stream: *mut std::ffi::c_void,
}

impl HipStream {
    pub fn new() -> MemResult<Self> {
        let mut stream: *mut std::ffi::c_void = ptr::null_mut();

        check_runtime!(unsafe { ffi::hipStreamCreate(&mut stream) }, |code, site| {
            MemoryError::RuntimeCallFailed { code, site }
        })?;

        tracing::debug!("HipStream::new: created stream {:?}", stream);
        Ok(HipStream { stream })
    }

    pub fn synchronize(&self) -> MemResult<()> {
        check_runtime!(unsafe { ffi::hipStreamSynchronize(self.stream) }, |code, site| {
            MemoryError::RuntimeCallFailed { code, site }
        })
    }

    /// Non-owning token for allocate/free calls ordered on this stream
    pub fn token(&self) -> StreamToken {
        StreamToken::from_raw(self.stream)
    }

    pub fn as_ptr(&self) -> *mut std::ffi::c_void {
        self.stream
    }
}

impl From<&HipStream> for StreamToken {
    fn from(stream: &HipStream) -> Self {
        stream.token()
    }
}

impl Drop for HipStream {
    fn drop(&mut self) {
        if !self.stream.is_null() {
            unsafe {
                ffi::hipStreamDestroy(self.stream);
            }
        }
    }
}
