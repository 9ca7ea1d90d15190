//! Pooled and private buffer acquisition

mod common;

use std::sync::Arc;

use common::{host_runtime, FlakyRuntime};
use hipmem::backend::{MemoryRuntime, StreamToken};
use hipmem::{AcquireMode, BufferPool, MemoryError};

#[test]
fn test_pooled_acquisitions_by_id() {
    let mut pool = BufferPool::new(host_runtime());
    let first = pool.acquire("tensorA", AcquireMode::Pooled);
    let second = pool.acquire("tensorA", AcquireMode::Pooled);
    let third = pool.acquire("tensorB", AcquireMode::Pooled);

    assert!(first.ptr_eq(&second));
    assert!(!first.ptr_eq(&third));
    assert_eq!(pool.len(), 2);
    assert!(pool.contains("tensorA"));
    assert!(pool.contains("tensorB"));
}

#[test]
fn test_same_id_same_pointer_after_equal_grows() -> anyhow::Result<()> {
    let mut pool = BufferPool::new(host_runtime());
    let a = pool.acquire_pooled("features");
    a.allocate_or_grow(512, StreamToken::DEFAULT)?;
    let b = pool.acquire_pooled("features");
    b.allocate_or_grow(512, StreamToken::DEFAULT)?;

    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_eq!(a.stats().allocations, 1);
    Ok(())
}

#[test]
fn test_private_buffers_are_independent() -> anyhow::Result<()> {
    let runtime = host_runtime();
    let mut pool = BufferPool::new(Arc::clone(&runtime));
    let a = pool.acquire("scratch", AcquireMode::Private);
    let b = pool.acquire("scratch", AcquireMode::Private);

    a.allocate_or_grow(128, StreamToken::DEFAULT)?;
    b.allocate_or_grow(128, StreamToken::DEFAULT)?;
    assert_ne!(a.as_ptr(), b.as_ptr());
    assert_eq!(a.name().as_deref(), Some("scratch"));

    a.free(StreamToken::DEFAULT)?;
    assert!(a.is_empty());
    assert!(!b.is_empty());
    assert_eq!(b.capacity(), 128);
    assert!(pool.is_empty());
    assert_eq!(runtime.stats().device_live_bytes, 128);
    Ok(())
}

#[test]
fn test_private_never_touches_registry() {
    let mut pool = BufferPool::new(host_runtime());
    let pooled = pool.acquire_pooled("x");
    let private = pool.acquire_private("x");

    assert!(!pooled.ptr_eq(&private));
    assert_eq!(pool.identifiers(), vec!["x"]);
}

#[test]
fn test_pool_drop_releases_unheld_buffers() -> anyhow::Result<()> {
    let runtime = host_runtime();
    let held = {
        let mut pool = BufferPool::new(Arc::clone(&runtime));
        pool.acquire_pooled("a").allocate_or_grow(10, StreamToken::DEFAULT)?;
        let held = pool.acquire_pooled("b");
        held.allocate_or_grow(20, StreamToken::DEFAULT)?;
        held
    };

    let stats = runtime.stats();
    assert_eq!(stats.device_frees, 1);
    assert_eq!(stats.device_live_bytes, 20);
    assert_eq!(held.capacity(), 20);
    Ok(())
}

#[test]
fn test_free_all_reports_failures_and_continues() {
    let flaky = Arc::new(FlakyRuntime::default());
    let runtime: Arc<dyn MemoryRuntime> = flaky.clone();
    let mut pool = BufferPool::new(runtime);
    for id in ["a", "b", "c"] {
        pool.acquire_pooled(id)
            .allocate_or_grow(32, StreamToken::DEFAULT)
            .unwrap();
    }

    flaky.set_fail_frees(true);
    let err = pool.free_all(StreamToken::DEFAULT).unwrap_err();
    assert!(matches!(err, MemoryError::FreeFailed { .. }));
    assert_eq!(pool.total_capacity(), 0);
    assert_eq!(pool.len(), 3);
    flaky.set_fail_frees(false);
}

#[test]
fn test_pool_views_share_pooled_storage() -> anyhow::Result<()> {
    let mut pool = BufferPool::new(host_runtime());
    let mut indices = pool.view::<i32>("indice_pairs", AcquireMode::Pooled);
    indices.allocate_or_grow(1024, StreamToken::DEFAULT)?;

    let mut again = pool.view::<i32>("indice_pairs", AcquireMode::Pooled);
    again.resize(512)?;
    assert_eq!(again.as_ptr(), indices.as_ptr());

    let stats = pool.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_capacity, 4096);
    assert_eq!(stats.total_size, 2048);
    Ok(())
}
