//! HIP runtime smoke tests
//!
//! Need the `rocm` feature and a device; skipped otherwise.

#![cfg(feature = "rocm")]

mod common;

use common::{serial, GPU_FIXTURE};
use hipmem::backend::{HipStream, MemoryRuntime, StreamToken};
use hipmem::{BufferPool, DeviceBuffer, HostPinnedBuffer, MemoryConfig};

#[test]
#[serial]
fn test_device_buffer_grow_cycle() {
    let Some(fixture) = GPU_FIXTURE.as_ref() else {
        return;
    };

    {
        let mut buffer = DeviceBuffer::named(fixture.runtime(), "smoke");
        buffer.allocate_or_grow(1 << 20, StreamToken::DEFAULT).unwrap();
        let ptr = buffer.as_ptr();
        buffer.allocate_or_grow(1 << 10, StreamToken::DEFAULT).unwrap();
        assert_eq!(buffer.as_ptr(), ptr);
        buffer.allocate_or_grow(4 << 20, StreamToken::DEFAULT).unwrap();
        assert_eq!(buffer.capacity(), 4 << 20);
    }

    fixture.assert_no_leak(5);
}

#[test]
#[serial]
fn test_pinned_buffer_is_host_addressable() {
    let Some(fixture) = GPU_FIXTURE.as_ref() else {
        return;
    };

    let mut buffer = HostPinnedBuffer::new(fixture.runtime());
    buffer.allocate_or_grow(4096, StreamToken::DEFAULT).unwrap();
    assert!(!buffer.as_ptr().is_null());
    assert_eq!(buffer.capacity(), 4096);
    unsafe { std::ptr::write_bytes(buffer.as_ptr().cast::<u8>(), 0xAB, 4096) };
    let bytes = unsafe { std::slice::from_raw_parts(buffer.as_ptr().cast::<u8>(), 4096) };
    assert!(bytes.iter().all(|&b| b == 0xAB));
}

#[test]
#[serial]
fn test_stream_ordered_free() {
    let Some(fixture) = GPU_FIXTURE.as_ref() else {
        return;
    };

    let hip = hipmem::backend::HipRuntime::new(
        fixture.hip().device_id(),
        MemoryConfig::default().with_stream_ordered_free(true),
    )
    .unwrap()
    .into_shared();
    let stream = HipStream::new().unwrap();

    let mut pool = BufferPool::new(hip.clone());
    let buffer = pool.acquire_pooled("async");
    buffer.allocate_or_grow(1 << 16, stream.token()).unwrap();
    buffer.allocate_or_grow(1 << 17, stream.token()).unwrap();
    pool.free_all(stream.token()).unwrap();
    stream.synchronize().unwrap();

    let stats = hip.stats();
    assert_eq!(stats.device_allocations, 2);
    assert_eq!(stats.device_frees, 2);
    assert_eq!(stats.device_live_bytes, 0);
}
