//! Overlap-aware move.
//!
//! Disjoint ranges take the full copy dispatcher. Overlapping ranges are
//! copied in the direction that reads every source byte before the write
//! that could clobber it: forward when `dest` is below `src`, tail-first
//! otherwise.
#![allow(unsafe_code)]

#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use log::trace;

use crate::dispatch::Dispatcher;
use crate::scalar;

/// Moves `n` bytes from `src` to `dest` through the process-wide
/// dispatcher and returns `dest`.
///
/// # Safety
///
/// - `dest` and `src` must be valid for reads/writes of `n` bytes
/// - Regions may overlap
#[inline]
pub unsafe fn optimized_move(dest: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    move_with(Dispatcher::global(), dest, src, n);
    dest
}

/// Direction chosen for one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePlan {
    Nothing,
    /// Disjoint ranges: regular copy.
    Copy,
    /// Overlap with `dest` below `src`.
    Forward,
    /// Overlap with `dest` above `src`.
    Backward,
}

pub fn plan_move(dest: usize, src: usize, n: usize) -> MovePlan {
    if n == 0 || dest == src {
        return MovePlan::Nothing;
    }
    if src >= dest.wrapping_add(n) || dest >= src.wrapping_add(n) {
        return MovePlan::Copy;
    }
    if src > dest {
        MovePlan::Forward
    } else {
        MovePlan::Backward
    }
}

/// Moves `n` bytes using the given dispatcher.
///
/// # Safety
///
/// - `dest` and `src` must be valid for reads/writes of `n` bytes
/// - Regions may overlap
pub unsafe fn move_with(d: &Dispatcher, dest: *mut u8, src: *const u8, n: usize) {
    let plan = plan_move(dest as usize, src as usize, n);
    trace!("move n={n} plan={plan:?}");

    match plan {
        MovePlan::Nothing => {}
        MovePlan::Copy => d.copy(dest, src, n),
        MovePlan::Forward => {
            #[cfg(target_arch = "x86_64")]
            if d.use_avx2() && n > 64 {
                memmove_forward_avx2(dest, src, n);
                return;
            }
            scalar::copy_forward_words(dest, src, n);
        }
        MovePlan::Backward => {
            #[cfg(target_arch = "x86_64")]
            if d.use_avx2() && n > 64 {
                memmove_backward_avx2(dest, src, n);
                return;
            }
            scalar::copy_backward(dest, src, n);
        }
    }
}

// =============================================================================
// AVX2 OVERLAP PATHS
// =============================================================================

/// All loads before all stores, so any overlap of up to 64 bytes is safe.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn memmove_small_overlap(dest: *mut u8, src: *const u8, n: usize) {
    if n >= 32 {
        let v0 = _mm_loadu_si128(src as *const __m128i);
        let v1 = _mm_loadu_si128(src.add(16) as *const __m128i);
        let v2 = _mm_loadu_si128(src.add(n - 32) as *const __m128i);
        let v3 = _mm_loadu_si128(src.add(n - 16) as *const __m128i);
        _mm_storeu_si128(dest as *mut __m128i, v0);
        _mm_storeu_si128(dest.add(16) as *mut __m128i, v1);
        _mm_storeu_si128(dest.add(n - 32) as *mut __m128i, v2);
        _mm_storeu_si128(dest.add(n - 16) as *mut __m128i, v3);
        return;
    }

    if n >= 16 {
        let v0 = _mm_loadu_si128(src as *const __m128i);
        let v1 = _mm_loadu_si128(src.add(n - 16) as *const __m128i);
        _mm_storeu_si128(dest as *mut __m128i, v0);
        _mm_storeu_si128(dest.add(n - 16) as *mut __m128i, v1);
        return;
    }

    if n >= 8 {
        let a = core::ptr::read_unaligned(src as *const u64);
        let b = core::ptr::read_unaligned(src.add(n - 8) as *const u64);
        core::ptr::write_unaligned(dest as *mut u64, a);
        core::ptr::write_unaligned(dest.add(n - 8) as *mut u64, b);
        return;
    }

    if n >= 4 {
        let a = core::ptr::read_unaligned(src as *const u32);
        let b = core::ptr::read_unaligned(src.add(n - 4) as *const u32);
        core::ptr::write_unaligned(dest as *mut u32, a);
        core::ptr::write_unaligned(dest.add(n - 4) as *mut u32, b);
        return;
    }

    if n >= 2 {
        let a = core::ptr::read_unaligned(src as *const u16);
        let b = core::ptr::read_unaligned(src.add(n - 2) as *const u16);
        core::ptr::write_unaligned(dest as *mut u16, a);
        core::ptr::write_unaligned(dest.add(n - 2) as *mut u16, b);
        return;
    }

    if n == 1 {
        *dest = *src;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn memmove_forward_avx2(dest: *mut u8, src: *const u8, n: usize) {
    let mut d = dest;
    let mut s = src;
    let mut rem = n;

    while rem >= 128 {
        let v0 = _mm256_loadu_si256(s as *const __m256i);
        let v1 = _mm256_loadu_si256(s.add(32) as *const __m256i);
        let v2 = _mm256_loadu_si256(s.add(64) as *const __m256i);
        let v3 = _mm256_loadu_si256(s.add(96) as *const __m256i);
        _mm256_storeu_si256(d as *mut __m256i, v0);
        _mm256_storeu_si256(d.add(32) as *mut __m256i, v1);
        _mm256_storeu_si256(d.add(64) as *mut __m256i, v2);
        _mm256_storeu_si256(d.add(96) as *mut __m256i, v3);
        d = d.add(128);
        s = s.add(128);
        rem -= 128;
    }

    while rem >= 32 {
        let v = _mm256_loadu_si256(s as *const __m256i);
        _mm256_storeu_si256(d as *mut __m256i, v);
        d = d.add(32);
        s = s.add(32);
        rem -= 32;
    }

    if rem > 0 {
        memmove_small_overlap(d, s, rem);
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn memmove_backward_avx2(dest: *mut u8, src: *const u8, n: usize) {
    let mut rem = n;

    while rem >= 128 {
        rem -= 128;
        let s = src.add(rem);
        let d = dest.add(rem);
        let v0 = _mm256_loadu_si256(s as *const __m256i);
        let v1 = _mm256_loadu_si256(s.add(32) as *const __m256i);
        let v2 = _mm256_loadu_si256(s.add(64) as *const __m256i);
        let v3 = _mm256_loadu_si256(s.add(96) as *const __m256i);
        _mm256_storeu_si256(d.add(96) as *mut __m256i, v3);
        _mm256_storeu_si256(d.add(64) as *mut __m256i, v2);
        _mm256_storeu_si256(d.add(32) as *mut __m256i, v1);
        _mm256_storeu_si256(d as *mut __m256i, v0);
    }

    while rem >= 32 {
        rem -= 32;
        let v = _mm256_loadu_si256(src.add(rem) as *const __m256i);
        _mm256_storeu_si256(dest.add(rem) as *mut __m256i, v);
    }

    if rem > 0 {
        memmove_small_overlap(dest, src, rem);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::head_len;
    use crate::caps::Capabilities;
    use crate::config::{BackendChoice, Config};

    const LENGTHS: [usize; 24] = [
        0, 1, 2, 3, 4, 7, 8, 15, 16, 31, 32, 63, 64, 65, 127, 128, 129, 255, 256, 257, 511, 512,
        513, 1023,
    ];

    fn make_buf() -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        buf
    }

    fn dispatchers() -> Vec<Dispatcher> {
        let caps = Capabilities::get();
        [true, false]
            .into_iter()
            .map(|avx2| {
                let config = Config {
                    avx2,
                    backend: BackendChoice::Portable,
                    ..Config::default()
                };
                Dispatcher::new(&config, caps)
            })
            .collect()
    }

    fn check_case(d: &Dispatcher, src_off: usize, dst_off: usize, n: usize) {
        let mut got = make_buf();
        let mut expected = got.clone();

        unsafe {
            let base = got.as_mut_ptr();
            move_with(d, base.add(dst_off), base.add(src_off), n);
            core::ptr::copy(
                expected.as_ptr().add(src_off),
                expected.as_mut_ptr().add(dst_off),
                n,
            );
        }

        assert_eq!(
            got, expected,
            "mismatch src_off={src_off} dst_off={dst_off} n={n}"
        );
    }

    #[test]
    fn test_plan_move() {
        assert_eq!(plan_move(100, 100, 10), MovePlan::Nothing);
        assert_eq!(plan_move(100, 200, 0), MovePlan::Nothing);
        assert_eq!(plan_move(100, 200, 100), MovePlan::Copy);
        assert_eq!(plan_move(200, 100, 100), MovePlan::Copy);
        assert_eq!(plan_move(100, 150, 100), MovePlan::Forward);
        assert_eq!(plan_move(150, 100, 100), MovePlan::Backward);
    }

    #[test]
    fn test_move_non_overlap() {
        for d in dispatchers() {
            for n in LENGTHS {
                check_case(&d, 0, 2048, n);
                check_case(&d, 17, 2200, n);
                check_case(&d, 2200, 17, n);
            }
        }
    }

    #[test]
    fn test_move_disjoint_at_copy_thresholds() {
        // Disjoint moves take the copy dispatcher's routes.
        for d in dispatchers() {
            for n in [1023usize, 1024, 3999, 4000, 15999, 16000, 31999, 32000, 32001] {
                let mut got: Vec<u8> = (0..2 * n + 256).map(|i| (i % 251) as u8).collect();
                let mut expected = got.clone();
                let base = head_len(got.as_ptr() as usize);
                for (src_shift, dst_shift) in [(0, 0), (11, 3), (12, 5)] {
                    let dst_off = base + dst_shift;
                    let src_off = base + n + 128 + src_shift;
                    assert_eq!(
                        plan_move(
                            got.as_ptr() as usize + dst_off,
                            got.as_ptr() as usize + src_off,
                            n
                        ),
                        MovePlan::Copy
                    );
                    unsafe {
                        let p = got.as_mut_ptr();
                        move_with(&d, p.add(dst_off), p.add(src_off), n);
                    }
                    expected.copy_within(src_off..src_off + n, dst_off);
                    assert_eq!(got, expected, "n={n} src_shift={src_shift} dst_shift={dst_shift}");
                }
            }
        }
    }

    #[test]
    fn test_move_overlap_forward() {
        for d in dispatchers() {
            for n in LENGTHS {
                check_case(&d, 1, 0, n);
                check_case(&d, 7, 0, n);
                check_case(&d, 31, 0, n);
                check_case(&d, 300, 200, n);
            }
        }
    }

    #[test]
    fn test_move_overlap_backward() {
        for d in dispatchers() {
            for n in LENGTHS {
                check_case(&d, 0, 1, n);
                check_case(&d, 0, 7, n);
                check_case(&d, 0, 31, n);
                check_case(&d, 200, 300, n);
            }
        }
    }

    #[test]
    fn test_move_shift_by_k() {
        // dst = src + k across the overlap, against memmove semantics.
        for d in dispatchers() {
            for k in [-100isize, -1, 0, 1, 100] {
                for n in [1usize, 99, 100, 101, 1024, 2000] {
                    let src_off = 1000usize;
                    let dst_off = (src_off as isize + k) as usize;
                    check_case(&d, src_off, dst_off, n);
                }
            }
        }
    }
}
