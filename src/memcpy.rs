//! Copy entry point.
#![allow(unsafe_code)]

use crate::dispatch::Dispatcher;

/// Copies `n` bytes from `src` to `dest` through the process-wide
/// dispatcher and returns `dest`.
///
/// # Safety
///
/// - `src` must be valid for reads and `dest` for writes of `n` bytes
/// - The memory regions must not overlap
#[inline]
pub unsafe fn optimized_copy(dest: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    Dispatcher::global().copy(dest, src, n);
    dest
}
