//! Pattern fill with AVX2 and non-temporal dispatch.
//!
//! Byte `i` of the destination receives `pattern.to_le_bytes()[i % 8]`.
//! Every vector store is made with a copy of the pattern rotated to the
//! phase of its own offset, so overlapping head and tail stores agree.
#![allow(unsafe_code)]

#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use log::trace;

use crate::dispatch::Dispatcher;
use crate::scalar;
#[cfg(target_arch = "x86_64")]
use crate::transfer::StoreMode;

/// Fills `n` bytes at `dest` with the repeating 8-byte `pattern` through
/// the process-wide dispatcher and returns `dest`.
///
/// # Safety
///
/// - `dest` must be valid for writes of `n` bytes
#[inline]
pub unsafe fn optimized_fill(dest: *mut u8, pattern: u64, n: usize) -> *mut u8 {
    fill_with(Dispatcher::global(), dest, pattern, n);
    dest
}

/// Fills `n` bytes using the given dispatcher.
///
/// # Safety
///
/// - `dest` must be valid for writes of `n` bytes
pub unsafe fn fill_with(d: &Dispatcher, dest: *mut u8, pattern: u64, n: usize) {
    #[cfg(target_arch = "x86_64")]
    if n > 64 && d.use_avx2() {
        let store = d.store_mode(n);
        trace!("fill n={n} avx2 {store:?}");
        fill_avx2(dest, pattern, n, store);
        return;
    }

    trace!("fill n={n} scalar");
    scalar::fill_pattern(dest, pattern, n);
}

/// Pattern as seen by a store at byte offset `offset` from the fill start.
#[inline(always)]
fn phase(pattern: u64, offset: usize) -> u64 {
    pattern.rotate_right(8 * (offset % 8) as u32)
}

// =============================================================================
// AVX2 PATH (65 bytes and up)
// =============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn fill_avx2(dest: *mut u8, pattern: u64, n: usize, store: StoreMode) {
    let head = _mm256_set1_epi64x(pattern as i64);
    // n - 32, n - 64, n - 96 and n - 128 all share the phase of n.
    let tail = _mm256_set1_epi64x(phase(pattern, n) as i64);

    if n <= 128 {
        _mm256_storeu_si256(dest as *mut __m256i, head);
        _mm256_storeu_si256(dest.add(32) as *mut __m256i, head);
        _mm256_storeu_si256(dest.add(n - 64) as *mut __m256i, tail);
        _mm256_storeu_si256(dest.add(n - 32) as *mut __m256i, tail);
        return;
    }

    if n <= 256 {
        _mm256_storeu_si256(dest as *mut __m256i, head);
        _mm256_storeu_si256(dest.add(32) as *mut __m256i, head);
        _mm256_storeu_si256(dest.add(64) as *mut __m256i, head);
        _mm256_storeu_si256(dest.add(96) as *mut __m256i, head);
        _mm256_storeu_si256(dest.add(n - 128) as *mut __m256i, tail);
        _mm256_storeu_si256(dest.add(n - 96) as *mut __m256i, tail);
        _mm256_storeu_si256(dest.add(n - 64) as *mut __m256i, tail);
        _mm256_storeu_si256(dest.add(n - 32) as *mut __m256i, tail);
        return;
    }

    // Alignment prologue
    _mm256_storeu_si256(dest as *mut __m256i, head);
    let offset = 32 - ((dest as usize) & 31);
    let body = _mm256_set1_epi64x(phase(pattern, offset) as i64);
    let mut ptr = dest.add(offset);
    let end = dest.add(n);
    let remaining = n - offset;
    let loop_end = ptr.add(remaining & !127);

    match store {
        StoreMode::Temporal => {
            while ptr < loop_end {
                _mm256_store_si256(ptr as *mut __m256i, body);
                _mm256_store_si256(ptr.add(32) as *mut __m256i, body);
                _mm256_store_si256(ptr.add(64) as *mut __m256i, body);
                _mm256_store_si256(ptr.add(96) as *mut __m256i, body);
                ptr = ptr.add(128);
            }
        }
        StoreMode::NonTemporal => {
            while ptr < loop_end {
                _mm256_stream_si256(ptr as *mut __m256i, body);
                _mm256_stream_si256(ptr.add(32) as *mut __m256i, body);
                _mm256_stream_si256(ptr.add(64) as *mut __m256i, body);
                _mm256_stream_si256(ptr.add(96) as *mut __m256i, body);
                ptr = ptr.add(128);
            }
            // REQUIRED: streamed stores must be visible before returning.
            _mm_sfence();
        }
    }

    // Adaptive epilogue based on remainder
    if remaining & 127 > 64 {
        _mm256_storeu_si256(end.sub(128) as *mut __m256i, tail);
        _mm256_storeu_si256(end.sub(96) as *mut __m256i, tail);
    }
    _mm256_storeu_si256(end.sub(64) as *mut __m256i, tail);
    _mm256_storeu_si256(end.sub(32) as *mut __m256i, tail);
}
