//! Buffer pool sharing across receive loops.

use std::sync::Arc;
use std::thread;
use tether_core::alloc::BufferPool;
use tether_core::buffer::{BufferError, ManagedBuffer};

/// Simulate one receive session: fill, grow on overflow, dispose.
fn session(pool: Arc<BufferPool>, message_len: usize) -> u32 {
    let mut buffer = ManagedBuffer::new(pool, 64);
    let mut written = 0;
    while written < message_len {
        if buffer.free_len() == 0 {
            buffer.grow().unwrap();
        }
        let space = buffer.free_space().unwrap();
        let n = space.len().min(message_len - written).min(100);
        space[..n].fill(0xAB);
        buffer.track_data_size(n).unwrap();
        written += n;
    }
    assert_eq!(buffer.len(), message_len);
    assert!(buffer.data().unwrap().iter().all(|&b| b == 0xAB));
    let grows = buffer.grow_count();
    buffer.dispose().unwrap();
    assert_eq!(buffer.dispose(), Err(BufferError::Disposed));
    grows
}

#[test]
fn test_sessions_return_every_array() {
    let pool = Arc::new(BufferPool::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pool = pool.clone();
            thread::spawn(move || {
                for round in 0..50 {
                    session(pool.clone(), 1 + (i * 997 + round * 131) % 5000);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.rented(), pool.returned());
    assert!(pool.idle() > 0);
}

#[test]
fn test_grow_count_is_logarithmic() {
    let pool = Arc::new(BufferPool::new());
    // 64 -> 128 -> ... -> 8192
    assert_eq!(session(pool.clone(), 8000), 7);
    assert_eq!(session(pool.clone(), 64), 0);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_recycled_arrays_are_reused() {
    let pool = Arc::new(BufferPool::new());
    session(pool.clone(), 3000);
    let idle = pool.idle();
    session(pool.clone(), 3000);
    assert_eq!(pool.idle(), idle);
}
