//! AVX-512 wide register (`avx512f` + `avx512bw`).
//!
//! Byte-shift and align-right instructions take their shift as an
//! immediate, so the runtime shift is matched onto the 16 possible
//! encodings. The match is hoisted out of the loop by the optimizer once
//! the transfer loop is monomorphized for [`Zmm`].
#![allow(unsafe_code)]

use core::arch::x86_64::*;

use crate::align::{PermuteIndex, Strategy};
use crate::register::WideRegister;
use crate::transfer::{self, StoreMode};

#[derive(Clone, Copy)]
pub struct Zmm(__m512i);

macro_rules! by_lane_shift {
    ($op:ident, $v:expr, $n:expr) => {
        match $n {
            0 => $v,
            1 => $op::<1>($v),
            2 => $op::<2>($v),
            3 => $op::<3>($v),
            4 => $op::<4>($v),
            5 => $op::<5>($v),
            6 => $op::<6>($v),
            7 => $op::<7>($v),
            8 => $op::<8>($v),
            9 => $op::<9>($v),
            10 => $op::<10>($v),
            11 => $op::<11>($v),
            12 => $op::<12>($v),
            13 => $op::<13>($v),
            14 => $op::<14>($v),
            15 => $op::<15>($v),
            _ => _mm512_setzero_si512(),
        }
    };
}

unsafe impl WideRegister for Zmm {
    #[inline(always)]
    unsafe fn load(p: *const u8) -> Self {
        Zmm(core::ptr::read_unaligned(p as *const __m512i))
    }

    #[inline(always)]
    unsafe fn load_aligned(p: *const u8) -> Self {
        Zmm(core::ptr::read(p as *const __m512i))
    }

    #[inline(always)]
    unsafe fn load_skip(p: *const u8, skip: usize) -> Self {
        let mask: __mmask64 = if skip >= 64 { 0 } else { !((1u64 << skip) - 1) };
        // SAFETY: masked-off bytes are neither read nor faulted on, so the
        // bytes of the block below the true source start stay untouched.
        Zmm(_mm512_maskz_loadu_epi8(mask, p.cast()))
    }

    #[inline(always)]
    unsafe fn store(p: *mut u8, v: Self) {
        core::ptr::write(p as *mut __m512i, v.0);
    }

    #[inline(always)]
    unsafe fn stream(p: *mut u8, v: Self) {
        // SAFETY: non-temporal stores require 64-byte alignment; the
        // transfer loop only stores to the aligned destination cursor.
        _mm512_stream_si512(p.cast(), v.0);
    }

    #[inline(always)]
    unsafe fn fence() {
        _mm_sfence();
    }

    #[inline(always)]
    unsafe fn align_right(hi: Self, lo: Self, shift: usize) -> Self {
        let (a, b) = (hi.0, lo.0);
        Zmm(match shift / 4 {
            0 => b,
            1 => _mm512_alignr_epi32::<1>(a, b),
            2 => _mm512_alignr_epi32::<2>(a, b),
            3 => _mm512_alignr_epi32::<3>(a, b),
            4 => _mm512_alignr_epi32::<4>(a, b),
            5 => _mm512_alignr_epi32::<5>(a, b),
            6 => _mm512_alignr_epi32::<6>(a, b),
            7 => _mm512_alignr_epi32::<7>(a, b),
            8 => _mm512_alignr_epi32::<8>(a, b),
            9 => _mm512_alignr_epi32::<9>(a, b),
            10 => _mm512_alignr_epi32::<10>(a, b),
            11 => _mm512_alignr_epi32::<11>(a, b),
            12 => _mm512_alignr_epi32::<12>(a, b),
            13 => _mm512_alignr_epi32::<13>(a, b),
            14 => _mm512_alignr_epi32::<14>(a, b),
            15 => _mm512_alignr_epi32::<15>(a, b),
            _ => _mm512_setzero_si512(),
        })
    }

    #[inline(always)]
    unsafe fn permute_pairs(lo: Self, idx: &PermuteIndex, hi: Self) -> Self {
        // SAFETY: `PermuteIndex` is 64-byte aligned and exactly 64 bytes.
        let idx = core::ptr::read(idx as *const PermuteIndex as *const __m512i);
        Zmm(_mm512_permutex2var_epi16(lo.0, idx, hi.0))
    }

    #[inline(always)]
    unsafe fn lane_shift_right(self, n: usize) -> Self {
        Zmm(by_lane_shift!(_mm512_bsrli_epi128, self.0, n))
    }

    #[inline(always)]
    unsafe fn lane_shift_left(self, n: usize) -> Self {
        Zmm(by_lane_shift!(_mm512_bslli_epi128, self.0, n))
    }

    #[inline(always)]
    unsafe fn blend(self, mask: u64, from: Self) -> Self {
        Zmm(_mm512_mask_mov_epi8(self.0, mask, from.0))
    }
}

/// Wide transfer loop compiled for AVX-512.
///
/// # Safety
///
/// - The CPU must support `avx512f` and `avx512bw`
/// - Same contract as [`transfer::run`]
#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn transfer(dest: *mut u8, src: *const u8, n: usize, strategy: Strategy, store: StoreMode) {
    transfer::run::<Zmm>(dest, src, n, strategy, store);
}
