//! Dual-destination fan-out: one read of the source, two writes.
//!
//! Callers are expected to pass destinations that share their low 12
//! address bits, which keeps both write streams on the same page offset.
//! This is not checked; any pair of non-overlapping destinations gives
//! correct output, only the aligned-store path needs their low 5 bits to
//! agree and falls back to unaligned stores otherwise.
#![allow(unsafe_code)]

#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use log::trace;

use crate::dispatch::Dispatcher;
use crate::scalar;
#[cfg(target_arch = "x86_64")]
use crate::transfer::StoreMode;

/// Below this the scalar kernel is used.
const AVX2_MIN: usize = 256;

/// Copies `n` bytes from `src` to both `first` and `second` through the
/// process-wide dispatcher.
///
/// # Safety
///
/// - `src` must be valid for reads of `n` bytes
/// - `first` and `second` must each be valid for writes of `n` bytes
/// - None of the three regions may overlap
#[inline]
pub unsafe fn optimized_dualcast(first: *mut u8, second: *mut u8, src: *const u8, n: usize) {
    dualcast_with(Dispatcher::global(), first, second, src, n);
}

/// Dualcast using the given dispatcher.
///
/// # Safety
///
/// Same contract as [`optimized_dualcast`].
pub unsafe fn dualcast_with(
    d: &Dispatcher,
    first: *mut u8,
    second: *mut u8,
    src: *const u8,
    n: usize,
) {
    #[cfg(target_arch = "x86_64")]
    if n >= AVX2_MIN && d.use_avx2() {
        let paired = (first as usize ^ second as usize) & 31 == 0;
        let store = if paired {
            d.store_mode(n)
        } else {
            StoreMode::Temporal
        };
        trace!("dualcast n={n} avx2 paired={paired} {store:?}");
        if paired {
            dualcast_avx2_aligned(first, second, src, n, store);
        } else {
            dualcast_avx2_unaligned(first, second, src, n);
        }
        return;
    }

    trace!("dualcast n={n} scalar");
    scalar::dualcast(first, second, src, n);
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn put2(first: *mut u8, second: *mut u8, at: usize, v: __m256i) {
    _mm256_storeu_si256(first.add(at) as *mut __m256i, v);
    _mm256_storeu_si256(second.add(at) as *mut __m256i, v);
}

/// Unaligned 32-byte blocks, then the scalar kernel for the last bytes.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn finish(first: *mut u8, second: *mut u8, src: *const u8, mut at: usize, n: usize) {
    while at + 32 <= n {
        let v = _mm256_loadu_si256(src.add(at) as *const __m256i);
        put2(first, second, at, v);
        at += 32;
    }
    scalar::dualcast(first.add(at), second.add(at), src.add(at), n - at);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn dualcast_avx2_unaligned(first: *mut u8, second: *mut u8, src: *const u8, n: usize) {
    let mut at = 0;
    while at + 128 <= n {
        let s = src.add(at);
        let v0 = _mm256_loadu_si256(s as *const __m256i);
        let v1 = _mm256_loadu_si256(s.add(32) as *const __m256i);
        let v2 = _mm256_loadu_si256(s.add(64) as *const __m256i);
        let v3 = _mm256_loadu_si256(s.add(96) as *const __m256i);
        put2(first, second, at, v0);
        put2(first, second, at + 32, v1);
        put2(first, second, at + 64, v2);
        put2(first, second, at + 96, v3);
        at += 128;
    }
    finish(first, second, src, at, n);
}

/// Both destinations sit at the same offset within a 32-byte block, so
/// one prologue aligns them together.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn dualcast_avx2_aligned(
    first: *mut u8,
    second: *mut u8,
    src: *const u8,
    n: usize,
    store: StoreMode,
) {
    // Alignment prologue
    let v = _mm256_loadu_si256(src as *const __m256i);
    put2(first, second, 0, v);
    let mut at = 32 - ((first as usize) & 31);

    macro_rules! body {
        ($store:ident) => {
            while at + 128 <= n {
                let s = src.add(at);
                let v0 = _mm256_loadu_si256(s as *const __m256i);
                let v1 = _mm256_loadu_si256(s.add(32) as *const __m256i);
                let v2 = _mm256_loadu_si256(s.add(64) as *const __m256i);
                let v3 = _mm256_loadu_si256(s.add(96) as *const __m256i);
                for (i, v) in [v0, v1, v2, v3].into_iter().enumerate() {
                    $store(first.add(at + 32 * i) as *mut __m256i, v);
                    $store(second.add(at + 32 * i) as *mut __m256i, v);
                }
                at += 128;
            }
        };
    }

    match store {
        StoreMode::Temporal => body!(_mm256_store_si256),
        StoreMode::NonTemporal => {
            body!(_mm256_stream_si256);
            // REQUIRED: streamed stores must be visible before returning.
            _mm_sfence();
        }
    }

    finish(first, second, src, at, n);
}
