//! hipmem - device and pinned-host memory management for HIP pipelines
//!
//! Sparse and irregular GPU workloads replay the same sequence of kernels on
//! inputs whose sizes change every call. This crate keeps their scratch
//! memory cheap: buffers grow to the largest size seen and are then reused,
//! and a pool hands the same buffer to every stage that asks for it by name.
//!
//! Allocation goes through a [`MemoryRuntime`](backend::MemoryRuntime):
//! [`HipRuntime`](backend::HipRuntime) with the `rocm` feature, or
//! [`HostRuntime`](backend::HostRuntime) on the system heap.

#![allow(clippy::missing_safety_doc)] // FFI bindings documented at module level

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;

#[doc(hidden)]
pub use tracing as __tracing;

#[cfg(feature = "rocm")]
pub use backend::{HipRuntime, HipStream};
pub use backend::{HostRuntime, MemoryRuntime, RuntimeStats, StreamToken};
pub use config::{FailurePolicy, MemoryConfig};
pub use error::{CallSite, ErrorCategory, MemResult, MemResultExt, MemoryError};
pub use logging::{init_logging_default, init_logging_from_env, init_with_config};
pub use memory::{
    AcquireMode, BufferPool, BufferStats, Device, DeviceBuffer, GrowableBuffer, HostPinnedBuffer,
    MemoryKind, Pinned, PoolStats, SharedBuffer, SharedDeviceBuffer, SharedPinnedBuffer,
    TypedView,
};
