//! Alignment classification and shift resolution.
//!
//! Once the destination is 64-byte aligned, the source sits `shift` bytes
//! past an aligned block. Each output register is then built from two
//! consecutive aligned source blocks `lo` and `hi`: output byte `j` is byte
//! `shift + j` of the 128-byte concatenation `lo || hi`. The cheapest
//! instruction sequence for that depends on the shift:
//!
//! | shift                  | strategy                                        |
//! |------------------------|-------------------------------------------------|
//! | 0                      | straight load/store                             |
//! | multiple of 4          | 32-bit align-right                              |
//! | multiple of 2          | 16-bit two-source permute                       |
//! | odd, below 16          | per-lane right shift of `lo` + permuted `hi`    |
//! | odd, above 48          | permuted `lo` + per-lane left shift of `hi`     |
//! | odd, 16..=48           | none: scalar fallback                           |

use crate::caps::VECTOR_WIDTH;

/// Odd shifts below this use the low composite (per-lane shifts only work
/// within one 16-byte lane).
pub const ODD_LOW_LIMIT: usize = 16;

/// Odd shifts above this use the high composite.
pub const ODD_HIGH_LIMIT: usize = 48;

/// Byte lanes taking the low-composite shifted value: lane byte 0.
pub const ODD_LOW_MASK: u64 = 0x0001_0001_0001_0001;

/// Byte lanes taking the high-composite permuted value: lane bytes 0..15.
pub const ODD_HIGH_MASK: u64 = 0x7FFF_7FFF_7FFF_7FFF;

/// Bytes a pointer must advance to reach the next 64-byte boundary
/// (0 when already aligned).
#[inline(always)]
pub fn head_len(addr: usize) -> usize {
    addr.wrapping_neg() & (VECTOR_WIDTH - 1)
}

/// Offset of `addr` past the previous 64-byte boundary.
#[inline(always)]
pub fn misalignment(addr: usize) -> usize {
    addr & (VECTOR_WIDTH - 1)
}

/// Relative shift class between an aligned destination and its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftClass {
    Zero,
    Quad,
    Pair,
    OddLow,
    OddHigh,
    Awkward,
}

impl ShiftClass {
    pub fn of(shift: usize) -> ShiftClass {
        debug_assert!(shift < VECTOR_WIDTH);
        if shift == 0 {
            ShiftClass::Zero
        } else if shift % 4 == 0 {
            ShiftClass::Quad
        } else if shift % 2 == 0 {
            ShiftClass::Pair
        } else if shift < ODD_LOW_LIMIT {
            ShiftClass::OddLow
        } else if shift > ODD_HIGH_LIMIT {
            ShiftClass::OddHigh
        } else {
            ShiftClass::Awkward
        }
    }

    #[inline]
    pub fn is_odd(self) -> bool {
        matches!(self, ShiftClass::OddLow | ShiftClass::OddHigh)
    }
}

/// How the wide loop turns source blocks into aligned destination blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Source and destination both 64-byte aligned.
    Aligned,
    /// Unaligned loads, aligned stores, no realignment.
    Unaligned,
    AlignRight { shift: usize },
    Permute { shift: usize },
    OddLow { shift: usize },
    OddHigh { shift: usize },
}

impl Strategy {
    /// Realignment strategy for a source `shift` bytes past a 64-byte
    /// boundary, or `None` when no vector composition exists.
    pub fn for_shift(shift: usize) -> Option<Strategy> {
        match ShiftClass::of(shift) {
            ShiftClass::Zero => Some(Strategy::Aligned),
            ShiftClass::Quad => Some(Strategy::AlignRight { shift }),
            ShiftClass::Pair => Some(Strategy::Permute { shift }),
            ShiftClass::OddLow => Some(Strategy::OddLow { shift }),
            ShiftClass::OddHigh => Some(Strategy::OddHigh { shift }),
            ShiftClass::Awkward => None,
        }
    }

    /// Source misalignment the strategy expects; 0 for the load-only ones.
    pub fn shift(self) -> usize {
        match self {
            Strategy::Aligned | Strategy::Unaligned => 0,
            Strategy::AlignRight { shift }
            | Strategy::Permute { shift }
            | Strategy::OddLow { shift }
            | Strategy::OddHigh { shift } => shift,
        }
    }
}

// =============================================================================
// PERMUTATION TABLES
// =============================================================================

/// 32 16-bit lane selectors for a two-source word permute. Selector
/// values 0..31 pick from the first source, 32..63 from the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct PermuteIndex(pub [u16; 32]);

/// One table per even byte offset 2, 4, ..., 62. Table `k` starts at word
/// `k + 1`, so selecting with it yields bytes `2k + 2 ..` of `lo || hi`.
pub static PERMUTE_TABLES: [PermuteIndex; 31] = build_tables();

const fn build_tables() -> [PermuteIndex; 31] {
    let mut tables = [PermuteIndex([0; 32]); 31];
    let mut k = 0;
    while k < 31 {
        let mut lane = 0;
        while lane < 32 {
            tables[k].0[lane] = (k + 1 + lane) as u16;
            lane += 1;
        }
        k += 1;
    }
    tables
}

/// Table selecting bytes `byte_offset .. byte_offset + 64` of `lo || hi`.
///
/// `byte_offset` must be even and within `2..=62`.
#[inline]
pub fn permute_index(byte_offset: usize) -> &'static PermuteIndex {
    debug_assert!(byte_offset % 2 == 0 && (2..=62).contains(&byte_offset));
    &PERMUTE_TABLES[(byte_offset - 2) / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_partition_all_shifts() {
        let mut counts = std::collections::HashMap::new();
        for shift in 0..64 {
            *counts.entry(ShiftClass::of(shift)).or_insert(0) += 1;
        }
        assert_eq!(counts[&ShiftClass::Zero], 1);
        assert_eq!(counts[&ShiftClass::Quad], 15);
        assert_eq!(counts[&ShiftClass::Pair], 16);
        // 1, 3, ..., 15
        assert_eq!(counts[&ShiftClass::OddLow], 8);
        // 49, 51, ..., 63
        assert_eq!(counts[&ShiftClass::OddHigh], 8);
        // 17, 19, ..., 47
        assert_eq!(counts[&ShiftClass::Awkward], 16);
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(ShiftClass::of(15), ShiftClass::OddLow);
        assert_eq!(ShiftClass::of(17), ShiftClass::Awkward);
        assert_eq!(ShiftClass::of(47), ShiftClass::Awkward);
        assert_eq!(ShiftClass::of(49), ShiftClass::OddHigh);
        assert_eq!(ShiftClass::of(16), ShiftClass::Quad);
        assert_eq!(ShiftClass::of(48), ShiftClass::Quad);
        assert_eq!(ShiftClass::of(50), ShiftClass::Pair);
        assert!(Strategy::for_shift(33).is_none());
        assert_eq!(Strategy::for_shift(0), Some(Strategy::Aligned));
    }

    #[test]
    fn test_strategy_round_trips_shift() {
        for shift in 0..64 {
            if let Some(strategy) = Strategy::for_shift(shift) {
                assert_eq!(strategy.shift(), shift, "{strategy:?}");
            }
        }
        assert_eq!(Strategy::Unaligned.shift(), 0);
    }

    #[test]
    fn test_permute_tables() {
        assert_eq!(PERMUTE_TABLES[0].0[0], 1);
        assert_eq!(PERMUTE_TABLES[0].0[31], 32);
        assert_eq!(PERMUTE_TABLES[30].0[0], 31);
        assert_eq!(PERMUTE_TABLES[30].0[31], 62);
        for offset in (2..=62).step_by(2) {
            let table = permute_index(offset);
            assert_eq!(table.0[0] as usize, offset / 2);
            assert_eq!(table as *const PermuteIndex as usize % 64, 0);
        }
    }

    #[test]
    fn test_head_len() {
        assert_eq!(head_len(0), 0);
        assert_eq!(head_len(1), 63);
        assert_eq!(head_len(63), 1);
        assert_eq!(head_len(64), 0);
        assert_eq!(misalignment(130), 2);
    }
}
