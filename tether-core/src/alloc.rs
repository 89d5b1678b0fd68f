//! Allocation primitives for Tether
//!
//! Receive buffers are rented from a [`BufferPool`] and handed back when a
//! listen session ends, so steady-state connections do not hit the allocator
//! for every message. The pool is an explicit value shared through `Arc`;
//! there is no process-wide instance.
//!
//! This module also hosts [`IoBytes`], the only place where `unsafe` is used
//! to expose refcounted `Bytes` to compio write operations.

#![allow(unsafe_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Smallest array handed out by the pool.
pub const MIN_CLASS_SIZE: usize = 64;

/// Arrays above this size are allocated and freed directly.
pub const MAX_CLASS_SIZE: usize = 16 * 1024 * 1024;

/// Default number of idle arrays kept per size class.
pub const DEFAULT_RETAIN_PER_CLASS: usize = 32;

const CLASS_COUNT: usize =
    (MAX_CLASS_SIZE.trailing_zeros() - MIN_CLASS_SIZE.trailing_zeros() + 1) as usize;

/// Pool of byte arrays bucketed by power-of-two size class.
///
/// Invariants:
/// - Every array handed out has `len() == capacity class` and is zero-filled
///   on first allocation (recycled arrays keep stale bytes, callers only read
///   what they wrote).
/// - An array is accepted back only if its length is exactly a class size.
pub struct BufferPool {
    classes: Vec<Mutex<Vec<Vec<u8>>>>,
    retain_per_class: usize,
    rented: AtomicUsize,
    returned: AtomicUsize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAIN_PER_CLASS)
    }

    /// Create a pool that keeps at most `retain_per_class` idle arrays per class.
    #[must_use]
    pub fn with_retention(retain_per_class: usize) -> Self {
        Self {
            classes: (0..CLASS_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
            retain_per_class,
            rented: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
        }
    }

    /// Size class that satisfies a request for `min_len` bytes.
    #[inline]
    #[must_use]
    pub fn class_size(min_len: usize) -> usize {
        min_len.max(MIN_CLASS_SIZE).next_power_of_two()
    }

    fn class_index(size: usize) -> Option<usize> {
        if !size.is_power_of_two() || !(MIN_CLASS_SIZE..=MAX_CLASS_SIZE).contains(&size) {
            return None;
        }
        Some((size.trailing_zeros() - MIN_CLASS_SIZE.trailing_zeros()) as usize)
    }

    /// Rent an array of at least `min_len` bytes.
    pub fn rent(&self, min_len: usize) -> Vec<u8> {
        let size = Self::class_size(min_len);
        self.rented.fetch_add(1, Ordering::Relaxed);

        if let Some(idx) = Self::class_index(size) {
            if let Some(array) = self.classes[idx].lock().pop() {
                return array;
            }
        }
        vec![0; size]
    }

    /// Hand an array back to the pool.
    ///
    /// Arrays that do not match a size class, or that would exceed the
    /// retention limit, are simply dropped.
    pub fn give_back(&self, array: Vec<u8>) {
        self.returned.fetch_add(1, Ordering::Relaxed);

        let Some(idx) = Self::class_index(array.len()) else {
            return;
        };
        let mut class = self.classes[idx].lock();
        if class.len() < self.retain_per_class {
            class.push(array);
        }
    }

    /// Total number of arrays rented since creation.
    #[inline]
    #[must_use]
    pub fn rented(&self) -> usize {
        self.rented.load(Ordering::Relaxed)
    }

    /// Total number of arrays handed back since creation.
    #[inline]
    #[must_use]
    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::Relaxed)
    }

    /// Arrays currently rented out.
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.rented().saturating_sub(self.returned())
    }

    /// Number of idle arrays held across all classes.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.classes.iter().map(|c| c.lock().len()).sum()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("rented", &self.rented())
            .field("returned", &self.returned())
            .field("idle", &self.idle())
            .finish()
    }
}

/// Zero-copy `IoBuf` wrapper for Bytes.
///
/// Lets encoded frames go straight to compio write operations without an
/// intermediate `to_vec()`.
///
/// SAFETY: Bytes is immutable and refcounted, so it's safe to expose as `IoBuf`.
#[derive(Debug, Clone)]
pub struct IoBytes(Bytes);

impl IoBytes {
    #[must_use]
    pub const fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Bytes> for IoBytes {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<IoBytes> for Bytes {
    fn from(io_bytes: IoBytes) -> Self {
        io_bytes.0
    }
}

// SAFETY: IoBytes wraps Bytes which is:
// - Immutable (no mutable aliasing)
// - Refcounted (memory stays valid for the whole operation)
// - Contiguous (valid pointer/len guarantees)
unsafe impl compio::buf::IoBuf for IoBytes {
    #[inline]
    fn as_buf_ptr(&self) -> *const u8 {
        self.0.as_ptr()
    }

    #[inline]
    fn buf_len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    fn buf_capacity(&self) -> usize {
        self.0.len()
    }
}
