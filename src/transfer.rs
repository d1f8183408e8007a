//! Wide vector transfer loop.
//!
//! Moves `n / 64` whole registers into a 64-byte aligned destination,
//! four per iteration, then single registers, then hands the sub-register
//! tail to the scalar kernel. The loop body is generic over
//! [`WideRegister`] and parameterized by the realignment [`Strategy`].
#![allow(unsafe_code)]

use crate::align::{ODD_HIGH_MASK, ODD_LOW_MASK, Strategy, misalignment, permute_index};
use crate::caps::VECTOR_WIDTH;
use crate::register::{Portable, WideRegister};
use crate::scalar;

/// Temporal stores keep the destination cached; non-temporal stores
/// bypass the cache for transfers larger than it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Temporal,
    NonTemporal,
}

/// Signature shared by every compiled instance of the loop.
pub type VectorKernel = unsafe fn(*mut u8, *const u8, usize, Strategy, StoreMode);

#[inline(always)]
unsafe fn put<R: WideRegister>(p: *mut u8, v: R, mode: StoreMode) {
    match mode {
        StoreMode::Temporal => R::store(p, v),
        StoreMode::NonTemporal => R::stream(p, v),
    }
}

/// Runs the transfer loop.
///
/// # Safety
///
/// - `dest` must be 64-byte aligned and valid for writes of `n` bytes
/// - `src` must be valid for reads of `n` bytes
/// - The regions must not overlap
/// - For realigning strategies, `src` must sit exactly `strategy.shift()`
///   bytes past a 64-byte boundary
/// - `R` must be supported by the running CPU
#[inline(always)]
pub unsafe fn run<R: WideRegister>(
    dest: *mut u8,
    src: *const u8,
    n: usize,
    strategy: Strategy,
    store: StoreMode,
) {
    debug_assert_eq!(dest as usize % VECTOR_WIDTH, 0);
    debug_assert!(
        strategy == Strategy::Unaligned || misalignment(src as usize) == strategy.shift(),
        "{strategy:?} run on a source {} bytes past a boundary",
        misalignment(src as usize)
    );

    let mut d = dest;
    let mut s = src;
    let mut blocks = n / VECTOR_WIDTH;
    let tail = n % VECTOR_WIDTH;

    match strategy {
        Strategy::Aligned => {
            while blocks > 3 {
                let v0 = R::load_aligned(s);
                let v1 = R::load_aligned(s.add(64));
                let v2 = R::load_aligned(s.add(128));
                let v3 = R::load_aligned(s.add(192));
                put(d, v0, store);
                put(d.add(64), v1, store);
                put(d.add(128), v2, store);
                put(d.add(192), v3, store);
                d = d.add(256);
                s = s.add(256);
                blocks -= 4;
            }
        }
        Strategy::Unaligned => {
            while blocks > 3 {
                let v0 = R::load(s);
                let v1 = R::load(s.add(64));
                let v2 = R::load(s.add(128));
                let v3 = R::load(s.add(192));
                put(d, v0, store);
                put(d.add(64), v1, store);
                put(d.add(128), v2, store);
                put(d.add(192), v3, store);
                d = d.add(256);
                s = s.add(256);
                blocks -= 4;
            }
        }
        Strategy::AlignRight { shift } => {
            realign(&mut d, &mut s, &mut blocks, shift, store, |lo: R, hi: R| unsafe {
                R::align_right(hi, lo, shift)
            });
        }
        Strategy::Permute { shift } => {
            let idx = permute_index(shift);
            realign(&mut d, &mut s, &mut blocks, shift, store, |lo: R, hi: R| unsafe {
                R::permute_pairs(lo, idx, hi)
            });
        }
        Strategy::OddLow { shift } => {
            // Bytes shift+1.. come from an even permute shifted up one byte
            // per lane; byte 0 of each lane comes from `lo` directly.
            let idx = permute_index(shift + 1);
            realign(&mut d, &mut s, &mut blocks, shift, store, |lo: R, hi: R| unsafe {
                let low = lo.lane_shift_right(shift);
                let high = R::permute_pairs(lo, idx, hi).lane_shift_left(1);
                high.blend(ODD_LOW_MASK, low)
            });
        }
        Strategy::OddHigh { shift } => {
            // Mirror image: bytes 0..15 of each lane from an even permute
            // shifted down one byte, byte 15 from `hi` directly.
            let idx = permute_index(shift - 1);
            let left = VECTOR_WIDTH - shift;
            realign(&mut d, &mut s, &mut blocks, shift, store, |lo: R, hi: R| unsafe {
                let low = R::permute_pairs(lo, idx, hi).lane_shift_right(1);
                let high = hi.lane_shift_left(left);
                high.blend(ODD_HIGH_MASK, low)
            });
        }
    }

    while blocks > 0 {
        put(d, R::load(s), store);
        d = d.add(VECTOR_WIDTH);
        s = s.add(VECTOR_WIDTH);
        blocks -= 1;
    }

    if store == StoreMode::NonTemporal {
        // REQUIRED: streamed blocks must be visible before returning.
        R::fence();
    }

    scalar::copy_unrolled(d, s, tail);
}

/// Realigning 4-way loop. Runs while more than four whole blocks remain,
/// so the fourth aligned source load of an iteration never reaches past
/// the end of the source.
#[inline(always)]
unsafe fn realign<R, F>(
    d: &mut *mut u8,
    s: &mut *const u8,
    blocks: &mut usize,
    shift: usize,
    store: StoreMode,
    combine: F,
) where
    R: WideRegister,
    F: Fn(R, R) -> R,
{
    if *blocks <= 4 {
        return;
    }

    // Seed with the aligned block holding the first source byte. The
    // block start may precede the source allocation, so the pointer is
    // only ever moved with wrapping arithmetic.
    let base = s.wrapping_sub(shift);
    let mut lo = R::load_skip(base, shift);
    let mut p = base.wrapping_add(VECTOR_WIDTH);
    let mut dst = *d;

    while *blocks > 4 {
        let b1 = R::load_aligned(p);
        let o0 = combine(lo, b1);
        let b2 = R::load_aligned(p.add(64));
        let o1 = combine(b1, b2);
        let b3 = R::load_aligned(p.add(128));
        let o2 = combine(b2, b3);
        let b4 = R::load_aligned(p.add(192));
        let o3 = combine(b3, b4);
        put(dst, o0, store);
        put(dst.add(64), o1, store);
        put(dst.add(128), o2, store);
        put(dst.add(192), o3, store);
        lo = b4;
        p = p.wrapping_add(256);
        dst = dst.add(256);
        *blocks -= 4;
    }

    *s = p.wrapping_sub(VECTOR_WIDTH - shift);
    *d = dst;
}

/// The loop compiled for the portable register.
///
/// # Safety
///
/// Same contract as [`run`].
pub unsafe fn portable(dest: *mut u8, src: *const u8, n: usize, strategy: Strategy, store: StoreMode) {
    run::<Portable>(dest, src, n, strategy, store);
}
