//! RAII guard against half-written frames.
//!
//! When a send future is dropped or cancelled mid-write, the stream may hold
//! part of a frame and every later frame would be misparsed by the peer.
//!
//! 1. [`PoisonGuard::new`] sets the connection's flag (assume failure)
//! 2. If the write does not complete, the flag stays set
//! 3. Only [`PoisonGuard::disarm`] after the full write clears it
//!
//! A poisoned connection accepts no further sends and must be torn down.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use tether_core::poison::PoisonGuard;
//!
//! let poisoned = AtomicBool::new(false);
//! {
//!     let _guard = PoisonGuard::new(&poisoned);
//!     // write interrupted here
//! }
//! assert!(poisoned.load(Ordering::Acquire));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

/// Marks a connection poisoned unless disarmed.
///
/// Must live across the entire write; disarm only after the last byte went out.
pub struct PoisonGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PoisonGuard<'a> {
    #[inline]
    pub fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self { flag }
    }

    /// The write completed; the connection is healthy.
    #[inline]
    pub fn disarm(self) {
        self.flag.store(false, Ordering::Release);
    }
}
