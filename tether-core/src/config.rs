//! Receive buffer sizing
//!
//! Every listen session rents one receive buffer from the pool and doubles it
//! whenever a message does not fit. Tuning the initial size trades memory per
//! idle connection against the number of grow steps for large messages.

/// Default initial receive buffer size (8KB)
///
/// Messages larger than this trigger one or more doublings:
/// - Small messages (< 1KB): 4096 bytes sufficient
/// - Medium messages (1-8KB): 8192 bytes (default)
/// - Large messages (> 8KB): 16384 or larger
pub const DEFAULT_RECEIVE_BUF_SIZE: usize = 8192;

/// Default size of a single transport read (8KB)
///
/// Used as the staging chunk the codec consumes frames from.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8192;

/// Small receive buffer size (1KB)
///
/// For chatty connections exchanging short text messages.
pub const SMALL_RECEIVE_BUF_SIZE: usize = 1024;

/// Small read chunk size (4KB)
pub const SMALL_READ_CHUNK_SIZE: usize = 4096;

/// Large receive buffer size (64KB)
///
/// For bulk binary transfers where growth steps would dominate.
pub const LARGE_RECEIVE_BUF_SIZE: usize = 65536;

/// Large read chunk size (64KB)
pub const LARGE_READ_CHUNK_SIZE: usize = 65536;

/// Receive buffer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    /// Initial size of the pooled receive buffer
    pub receive_buf_size: usize,
    /// Size of each transport read
    pub read_chunk_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            receive_buf_size: DEFAULT_RECEIVE_BUF_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl BufferConfig {
    /// Configuration for short messages (< 1KB)
    #[must_use]
    pub const fn small() -> Self {
        Self {
            receive_buf_size: SMALL_RECEIVE_BUF_SIZE,
            read_chunk_size: SMALL_READ_CHUNK_SIZE,
        }
    }

    /// Configuration for large payloads (tens of KB and up)
    #[must_use]
    pub const fn large() -> Self {
        Self {
            receive_buf_size: LARGE_RECEIVE_BUF_SIZE,
            read_chunk_size: LARGE_READ_CHUNK_SIZE,
        }
    }

    /// Custom buffer configuration
    ///
    /// Zero sizes are bumped to 1 so the receive loop always makes progress.
    #[must_use]
    pub const fn custom(receive_buf_size: usize, read_chunk_size: usize) -> Self {
        Self {
            receive_buf_size: if receive_buf_size == 0 { 1 } else { receive_buf_size },
            read_chunk_size: if read_chunk_size == 0 { 1 } else { read_chunk_size },
        }
    }
}
