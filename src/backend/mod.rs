//! Allocation runtimes: HIP (feature `rocm`) and the system heap

#[cfg(feature = "rocm")]
pub mod hip_backend;
pub mod host;
pub mod runtime;
pub mod stream;

#[cfg(feature = "rocm")]
pub use hip_backend::{HipRuntime, HipStream};
pub use host::{HostRuntime, HOST_ALIGNMENT};
pub use runtime::{
    MemoryRuntime, RuntimeStats, RUNTIME_ERROR_INVALID_VALUE, RUNTIME_ERROR_OUT_OF_MEMORY,
    RUNTIME_SUCCESS,
};
pub use stream::StreamToken;
