//! Scalar fallback kernels.
//!
//! Word-granular loops with no alignment requirement. They serve as the
//! standalone path for short or awkwardly aligned transfers and as the
//! tail handler of every vector loop.
#![allow(unsafe_code)]

use core::ptr::{read_unaligned, write_unaligned};

const WORD: usize = core::mem::size_of::<u64>();

#[inline(always)]
unsafe fn copy_bytes(dest: *mut u8, src: *const u8, n: usize) {
    for i in 0..n {
        *dest.add(i) = *src.add(i);
    }
}

/// Forward copy: word-aligns the destination, then 4-way unrolled word
/// loop, single words, byte tail.
///
/// # Safety
///
/// - `src` must be valid for reads and `dest` for writes of `n` bytes
/// - The regions must not overlap
#[inline]
pub unsafe fn copy_unrolled(dest: *mut u8, src: *const u8, n: usize) {
    let mut d = dest;
    let mut s = src;
    let mut rem = n;

    let head = (d as usize).wrapping_neg() & (WORD - 1);
    if head >= rem {
        copy_bytes(d, s, rem);
        return;
    }
    copy_bytes(d, s, head);
    d = d.add(head);
    s = s.add(head);
    rem -= head;

    while rem >= 4 * WORD {
        // SAFETY: `d` is word aligned from here on; `s` may not be, so
        // loads are unaligned. All four loads precede the stores.
        let w0 = read_unaligned(s as *const u64);
        let w1 = read_unaligned(s.add(8) as *const u64);
        let w2 = read_unaligned(s.add(16) as *const u64);
        let w3 = read_unaligned(s.add(24) as *const u64);
        (d as *mut u64).write(w0);
        (d.add(8) as *mut u64).write(w1);
        (d.add(16) as *mut u64).write(w2);
        (d.add(24) as *mut u64).write(w3);
        d = d.add(32);
        s = s.add(32);
        rem -= 32;
    }

    while rem >= WORD {
        (d as *mut u64).write(read_unaligned(s as *const u64));
        d = d.add(WORD);
        s = s.add(WORD);
        rem -= WORD;
    }

    copy_bytes(d, s, rem);
}

/// Forward word copy that tolerates overlap when `dest < src`.
///
/// Each word is read before the word that could clobber it is written.
///
/// # Safety
///
/// - `src` must be valid for reads and `dest` for writes of `n` bytes
/// - If the regions overlap, `dest` must be below `src`
#[inline]
pub unsafe fn copy_forward_words(dest: *mut u8, src: *const u8, n: usize) {
    let words = n / WORD;
    for i in 0..words {
        let v = read_unaligned(src.add(i * WORD) as *const u64);
        write_unaligned(dest.add(i * WORD) as *mut u64, v);
    }
    for i in words * WORD..n {
        *dest.add(i) = *src.add(i);
    }
}

/// Reverse copy from the tail toward the head.
///
/// # Safety
///
/// - `src` must be valid for reads and `dest` for writes of `n` bytes
/// - If the regions overlap, `dest` must be above `src`
#[inline]
pub unsafe fn copy_backward(dest: *mut u8, src: *const u8, n: usize) {
    let mut rem = n;
    while rem >= WORD {
        rem -= WORD;
        let v = read_unaligned(src.add(rem) as *const u64);
        write_unaligned(dest.add(rem) as *mut u64, v);
    }
    while rem > 0 {
        rem -= 1;
        *dest.add(rem) = *src.add(rem);
    }
}

/// Replicates the 8 little-endian bytes of `pattern` across `n` bytes.
/// A trailing partial repetition is truncated.
///
/// # Safety
///
/// - `dest` must be valid for writes of `n` bytes
#[inline]
pub unsafe fn fill_pattern(dest: *mut u8, pattern: u64, n: usize) {
    let bytes = pattern.to_le_bytes();
    let word = u64::from_ne_bytes(bytes);
    let mut i = 0;

    while i + 4 * WORD <= n {
        write_unaligned(dest.add(i) as *mut u64, word);
        write_unaligned(dest.add(i + 8) as *mut u64, word);
        write_unaligned(dest.add(i + 16) as *mut u64, word);
        write_unaligned(dest.add(i + 24) as *mut u64, word);
        i += 4 * WORD;
    }
    while i + WORD <= n {
        write_unaligned(dest.add(i) as *mut u64, word);
        i += WORD;
    }
    while i < n {
        *dest.add(i) = bytes[i % WORD];
        i += 1;
    }
}

/// Reads each source word once and stores it to both destinations.
///
/// # Safety
///
/// - `src` must be valid for reads of `n` bytes
/// - `first` and `second` must each be valid for writes of `n` bytes
/// - None of the three regions may overlap
#[inline]
pub unsafe fn dualcast(first: *mut u8, second: *mut u8, src: *const u8, n: usize) {
    let mut i = 0;
    while i + 4 * WORD <= n {
        let w0 = read_unaligned(src.add(i) as *const u64);
        let w1 = read_unaligned(src.add(i + 8) as *const u64);
        let w2 = read_unaligned(src.add(i + 16) as *const u64);
        let w3 = read_unaligned(src.add(i + 24) as *const u64);
        write_unaligned(first.add(i) as *mut u64, w0);
        write_unaligned(first.add(i + 8) as *mut u64, w1);
        write_unaligned(first.add(i + 16) as *mut u64, w2);
        write_unaligned(first.add(i + 24) as *mut u64, w3);
        write_unaligned(second.add(i) as *mut u64, w0);
        write_unaligned(second.add(i + 8) as *mut u64, w1);
        write_unaligned(second.add(i + 16) as *mut u64, w2);
        write_unaligned(second.add(i + 24) as *mut u64, w3);
        i += 4 * WORD;
    }
    while i + WORD <= n {
        let w = read_unaligned(src.add(i) as *const u64);
        write_unaligned(first.add(i) as *mut u64, w);
        write_unaligned(second.add(i) as *mut u64, w);
        i += WORD;
    }
    while i < n {
        let b = *src.add(i);
        *first.add(i) = b;
        *second.add(i) = b;
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buf(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_copy_unrolled_offsets() {
        let src = make_buf(600);
        let mut dst = vec![0u8; 600];
        for src_off in 0..9 {
            for dst_off in 0..9 {
                for n in [0usize, 1, 7, 8, 9, 31, 32, 33, 63, 64, 65, 255, 500] {
                    dst.fill(0xEE);
                    unsafe {
                        copy_unrolled(dst.as_mut_ptr().add(dst_off), src.as_ptr().add(src_off), n);
                    }
                    assert_eq!(
                        &dst[dst_off..dst_off + n],
                        &src[src_off..src_off + n],
                        "n={n} src_off={src_off} dst_off={dst_off}"
                    );
                    assert!(dst[..dst_off].iter().all(|&b| b == 0xEE));
                    assert!(dst[dst_off + n..].iter().all(|&b| b == 0xEE));
                }
            }
        }
    }

    #[test]
    fn test_overlapping_directions() {
        for shift in [1usize, 3, 8, 13] {
            for n in [0usize, 5, 8, 17, 64, 130] {
                let mut got = make_buf(256);
                let mut expected = got.clone();
                unsafe {
                    copy_forward_words(got.as_mut_ptr(), got.as_ptr().add(shift), n);
                    core::ptr::copy(expected.as_ptr().add(shift), expected.as_mut_ptr(), n);
                }
                assert_eq!(got, expected, "forward shift={shift} n={n}");

                let mut got = make_buf(256);
                let mut expected = got.clone();
                unsafe {
                    copy_backward(got.as_mut_ptr().add(shift), got.as_ptr(), n);
                    core::ptr::copy(expected.as_ptr(), expected.as_mut_ptr().add(shift), n);
                }
                assert_eq!(got, expected, "backward shift={shift} n={n}");
            }
        }
    }

    #[test]
    fn test_fill_pattern_truncates_tail() {
        let pattern = 0x00AB_CDEF_ABCD_EF00u64;
        let bytes = pattern.to_le_bytes();
        let mut buf = vec![0x11u8; 128];
        for off in 0..8 {
            for n in [0usize, 1, 7, 8, 9, 33, 100] {
                buf.fill(0x11);
                unsafe { fill_pattern(buf.as_mut_ptr().add(off), pattern, n) };
                for i in 0..n {
                    assert_eq!(buf[off + i], bytes[i % 8], "off={off} n={n} i={i}");
                }
                assert!(buf[off + n..].iter().all(|&b| b == 0x11));
            }
        }
    }

    #[test]
    fn test_dualcast_writes_both() {
        let src = make_buf(300);
        for n in [0usize, 1, 8, 31, 32, 33, 299] {
            let mut a = vec![0u8; 300];
            let mut b = vec![0u8; 300];
            unsafe { dualcast(a.as_mut_ptr(), b.as_mut_ptr().add(1), src.as_ptr(), n) };
            assert_eq!(&a[..n], &src[..n]);
            assert_eq!(&b[1..n + 1], &src[..n]);
            assert_eq!(b[0], 0);
        }
    }
}
