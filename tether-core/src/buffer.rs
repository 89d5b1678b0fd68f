use crate::alloc::BufferPool;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by [`ManagedBuffer`] misuse.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer already disposed")]
    Disposed,

    #[error("tracked {tracked} bytes with only {free} bytes of free space")]
    Overflow { tracked: usize, free: usize },
}

/// A growable receive buffer backed by an array rented from a [`BufferPool`].
///
/// The buffer keeps a write cursor (`data_length`): bytes are written into
/// [`free_space`](Self::free_space) by an external reader, then committed with
/// [`track_data_size`](Self::track_data_size).
///
/// # Lifecycle
///
/// - Rented once per listen session
/// - Doubled by [`grow`](Self::grow) when a message does not fit
/// - Rewound by [`reset`](Self::reset) between messages
/// - Returned to the pool exactly once, by [`dispose`](Self::dispose) or on drop
///
/// Exactly one receive loop owns a given buffer; there is no internal locking.
pub struct ManagedBuffer {
    pool: Arc<BufferPool>,
    array: Option<Vec<u8>>,
    data_length: usize,
    grow_count: u32,
}

impl ManagedBuffer {
    /// Rent a buffer able to hold at least `initial_size` bytes.
    #[must_use]
    pub fn new(pool: Arc<BufferPool>, initial_size: usize) -> Self {
        let array = pool.rent(initial_size);
        Self {
            pool,
            array: Some(array),
            data_length: 0,
            grow_count: 0,
        }
    }

    #[inline]
    fn array(&self) -> Result<&Vec<u8>, BufferError> {
        self.array.as_ref().ok_or(BufferError::Disposed)
    }

    /// Mutable view of the unwritten capacity.
    pub fn free_space(&mut self) -> Result<&mut [u8], BufferError> {
        let start = self.data_length;
        let array = self.array.as_mut().ok_or(BufferError::Disposed)?;
        Ok(&mut array[start..])
    }

    /// Read-only view of the committed bytes.
    pub fn data(&self) -> Result<&[u8], BufferError> {
        Ok(&self.array()?[..self.data_length])
    }

    /// Commit `n` bytes written into the free space.
    pub fn track_data_size(&mut self, n: usize) -> Result<(), BufferError> {
        let free = self.array()?.len() - self.data_length;
        if n > free {
            return Err(BufferError::Overflow { tracked: n, free });
        }
        self.data_length += n;
        Ok(())
    }

    /// Double the capacity, keeping the committed bytes.
    ///
    /// The previous array goes back to the pool.
    pub fn grow(&mut self) -> Result<(), BufferError> {
        let old = self.array.take().ok_or(BufferError::Disposed)?;
        let mut bigger = self.pool.rent(old.len() * 2);
        bigger[..self.data_length].copy_from_slice(&old[..self.data_length]);
        self.pool.give_back(old);
        self.array = Some(bigger);
        self.grow_count += 1;
        Ok(())
    }

    /// Rewind the cursor without reallocating.
    pub fn reset(&mut self) -> Result<(), BufferError> {
        self.array()?;
        self.data_length = 0;
        Ok(())
    }

    /// Return the array to the pool.
    ///
    /// Fails with [`BufferError::Disposed`] when called twice.
    pub fn dispose(&mut self) -> Result<(), BufferError> {
        let array = self.array.take().ok_or(BufferError::Disposed)?;
        self.pool.give_back(array);
        self.data_length = 0;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.array.is_none()
    }

    /// Committed length.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data_length
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data_length == 0
    }

    /// Current capacity, 0 once disposed.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.array.as_ref().map_or(0, Vec::len)
    }

    /// Free bytes left before a grow is needed, 0 once disposed.
    #[inline]
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.capacity().saturating_sub(self.data_length)
    }

    /// How many times this buffer doubled.
    #[inline]
    #[must_use]
    pub const fn grow_count(&self) -> u32 {
        self.grow_count
    }
}

impl Drop for ManagedBuffer {
    fn drop(&mut self) {
        if let Some(array) = self.array.take() {
            self.pool.give_back(array);
        }
    }
}

impl fmt::Debug for ManagedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedBuffer")
            .field("len", &self.data_length)
            .field("capacity", &self.capacity())
            .field("grow_count", &self.grow_count)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
