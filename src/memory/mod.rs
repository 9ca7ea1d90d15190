//! Grow-only buffers, typed views and the buffer pool
//!
//! The building blocks, bottom up:
//! - [`GrowableBuffer`]: one allocation whose capacity only grows
//! - [`SharedBuffer`]: reference-counted handle shared by views and the pool
//! - [`TypedView`]: element-counted façade over a shared buffer
//! - [`BufferPool`]: identifier-keyed registry of shared device buffers

pub mod buffer;
pub mod kind;
pub mod pool;
pub mod shared;
pub mod view;

pub use buffer::{BufferStats, DeviceBuffer, GrowableBuffer, HostPinnedBuffer};
pub use kind::{Device, MemoryKind, Pinned};
pub use pool::{AcquireMode, BufferPool, PoolStats};
pub use shared::{SharedBuffer, SharedDeviceBuffer, SharedPinnedBuffer};
pub use view::TypedView;
