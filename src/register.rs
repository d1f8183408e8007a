//! The 64-byte register interface used by the wide transfer loop, and its
//! portable implementation.
//!
//! Every method mirrors one AVX-512 instruction so the transfer loop can
//! be written once. The portable register follows the same lane semantics
//! byte for byte, which keeps every realignment strategy available (and
//! testable) on machines without AVX-512.
#![allow(unsafe_code)]

use crate::align::PermuteIndex;
use crate::caps::VECTOR_WIDTH;

/// A 64-byte vector register.
///
/// # Safety
///
/// Implementations may require CPU features; callers must only use an
/// implementation after confirming support.
pub unsafe trait WideRegister: Copy {
    /// Unaligned 64-byte load.
    unsafe fn load(p: *const u8) -> Self;

    /// Aligned 64-byte load. `p` must be 64-byte aligned.
    unsafe fn load_aligned(p: *const u8) -> Self;

    /// Loads bytes `skip..64` of the block at `p`, zeroing bytes
    /// `0..skip`. Bytes below `p + skip` are never accessed.
    unsafe fn load_skip(p: *const u8, skip: usize) -> Self;

    /// Aligned temporal store.
    unsafe fn store(p: *mut u8, v: Self);

    /// Aligned non-temporal store; must be followed by [`Self::fence`].
    unsafe fn stream(p: *mut u8, v: Self);

    /// Orders preceding non-temporal stores.
    unsafe fn fence();

    /// Bytes `shift..shift + 64` of `lo || hi`; `shift` is a multiple of 4.
    unsafe fn align_right(hi: Self, lo: Self, shift: usize) -> Self;

    /// 16-bit two-source permute: word `i` of the result is word
    /// `idx[i] & 31` of `lo` when bit 5 is clear, of `hi` otherwise.
    unsafe fn permute_pairs(lo: Self, idx: &PermuteIndex, hi: Self) -> Self;

    /// Shifts each 16-byte lane right (toward byte 0) by `n` bytes.
    unsafe fn lane_shift_right(self, n: usize) -> Self;

    /// Shifts each 16-byte lane left (toward byte 15) by `n` bytes.
    unsafe fn lane_shift_left(self, n: usize) -> Self;

    /// Byte `i` comes from `from` where bit `i` of `mask` is set.
    unsafe fn blend(self, mask: u64, from: Self) -> Self;
}

const LANE: usize = 16;

/// Plain-memory register with the AVX-512 lane semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct Portable(pub [u8; VECTOR_WIDTH]);

impl Portable {
    #[inline(always)]
    fn word(&self, i: usize) -> [u8; 2] {
        [self.0[2 * i], self.0[2 * i + 1]]
    }
}

unsafe impl WideRegister for Portable {
    #[inline(always)]
    unsafe fn load(p: *const u8) -> Self {
        Portable(core::ptr::read_unaligned(p as *const [u8; VECTOR_WIDTH]))
    }

    #[inline(always)]
    unsafe fn load_aligned(p: *const u8) -> Self {
        debug_assert_eq!(p as usize % VECTOR_WIDTH, 0);
        Portable(core::ptr::read(p as *const [u8; VECTOR_WIDTH]))
    }

    #[inline(always)]
    unsafe fn load_skip(p: *const u8, skip: usize) -> Self {
        let mut out = [0u8; VECTOR_WIDTH];
        // `p` itself may lie before the source allocation; only offsets at
        // or past `skip` are dereferenced.
        for (i, byte) in out.iter_mut().enumerate().skip(skip) {
            *byte = *p.wrapping_add(i);
        }
        Portable(out)
    }

    #[inline(always)]
    unsafe fn store(p: *mut u8, v: Self) {
        debug_assert_eq!(p as usize % VECTOR_WIDTH, 0);
        core::ptr::write(p as *mut [u8; VECTOR_WIDTH], v.0);
    }

    #[inline(always)]
    unsafe fn stream(p: *mut u8, v: Self) {
        #[cfg(target_arch = "x86_64")]
        {
            use core::arch::x86_64::_mm_stream_si64;
            for i in 0..VECTOR_WIDTH / 8 {
                let mut word = [0u8; 8];
                word.copy_from_slice(&v.0[i * 8..i * 8 + 8]);
                // SAFETY: `p` is 64-byte aligned so every 8-byte slot is
                // aligned; MOVNTI is part of SSE2, baseline on x86_64.
                _mm_stream_si64(p.add(i * 8) as *mut i64, i64::from_ne_bytes(word));
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            Self::store(p, v);
        }
    }

    #[inline(always)]
    unsafe fn fence() {
        #[cfg(target_arch = "x86_64")]
        core::arch::x86_64::_mm_sfence();
    }

    #[inline(always)]
    unsafe fn align_right(hi: Self, lo: Self, shift: usize) -> Self {
        debug_assert!(shift % 4 == 0 && shift < VECTOR_WIDTH);
        let mut out = [0u8; VECTOR_WIDTH];
        out[..VECTOR_WIDTH - shift].copy_from_slice(&lo.0[shift..]);
        out[VECTOR_WIDTH - shift..].copy_from_slice(&hi.0[..shift]);
        Portable(out)
    }

    #[inline(always)]
    unsafe fn permute_pairs(lo: Self, idx: &PermuteIndex, hi: Self) -> Self {
        let mut out = [0u8; VECTOR_WIDTH];
        for (i, &sel) in idx.0.iter().enumerate() {
            let lane = (sel & 31) as usize;
            let word = if sel & 32 == 0 {
                lo.word(lane)
            } else {
                hi.word(lane)
            };
            out[2 * i] = word[0];
            out[2 * i + 1] = word[1];
        }
        Portable(out)
    }

    #[inline(always)]
    unsafe fn lane_shift_right(self, n: usize) -> Self {
        let mut out = [0u8; VECTOR_WIDTH];
        if n < LANE {
            for base in (0..VECTOR_WIDTH).step_by(LANE) {
                out[base..base + LANE - n].copy_from_slice(&self.0[base + n..base + LANE]);
            }
        }
        Portable(out)
    }

    #[inline(always)]
    unsafe fn lane_shift_left(self, n: usize) -> Self {
        let mut out = [0u8; VECTOR_WIDTH];
        if n < LANE {
            for base in (0..VECTOR_WIDTH).step_by(LANE) {
                out[base + n..base + LANE].copy_from_slice(&self.0[base..base + LANE - n]);
            }
        }
        Portable(out)
    }

    #[inline(always)]
    unsafe fn blend(self, mask: u64, from: Self) -> Self {
        let mut out = self.0;
        for (i, byte) in out.iter_mut().enumerate() {
            if (mask >> i) & 1 == 1 {
                *byte = from.0[i];
            }
        }
        Portable(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::permute_index;

    fn seq(start: u8) -> Portable {
        let mut out = [0u8; VECTOR_WIDTH];
        for (i, b) in out.iter_mut().enumerate() {
            *b = start.wrapping_add(i as u8);
        }
        Portable(out)
    }

    fn concat(lo: Portable, hi: Portable) -> Vec<u8> {
        lo.0.iter().chain(hi.0.iter()).copied().collect()
    }

    #[test]
    fn test_align_right_matches_window() {
        let lo = seq(0);
        let hi = seq(64);
        let joined = concat(lo, hi);
        for shift in (0..64).step_by(4) {
            let r = unsafe { Portable::align_right(hi, lo, shift) };
            assert_eq!(&r.0[..], &joined[shift..shift + 64], "shift={shift}");
        }
    }

    #[test]
    fn test_permute_matches_window() {
        let lo = seq(0);
        let hi = seq(64);
        let joined = concat(lo, hi);
        for offset in (2..=62).step_by(2) {
            let r = unsafe { Portable::permute_pairs(lo, permute_index(offset), hi) };
            assert_eq!(&r.0[..], &joined[offset..offset + 64], "offset={offset}");
        }
    }

    #[test]
    fn test_lane_shifts() {
        let v = seq(0);
        let r = unsafe { v.lane_shift_right(3) };
        assert_eq!(r.0[0], 3);
        assert_eq!(r.0[12], 15);
        assert_eq!(r.0[13], 0);
        assert_eq!(r.0[16], 19);

        let l = unsafe { v.lane_shift_left(1) };
        assert_eq!(l.0[0], 0);
        assert_eq!(l.0[1], 0);
        assert_eq!(l.0[2], 1);
        assert_eq!(l.0[16], 0);
        assert_eq!(l.0[17], 16);

        let zero = unsafe { v.lane_shift_left(16) };
        assert!(zero.0.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blend_and_skip_load() {
        let a = seq(0);
        let b = seq(100);
        let r = unsafe { a.blend(0b101, b) };
        assert_eq!(&r.0[..4], &[100, 1, 102, 3]);

        let block = seq(7);
        let r = unsafe { Portable::load_skip(block.0.as_ptr(), 5) };
        assert_eq!(&r.0[..5], &[0; 5]);
        assert_eq!(&r.0[5..], &block.0[5..]);
    }
}
