//! Hardware capability detection.
//!
//! Detected once per process and read without synchronization afterwards.

use log::debug;
use once_cell::sync::Lazy;

/// Width of one wide register, in bytes.
pub const VECTOR_WIDTH: usize = 64;

/// Capabilities relevant to kernel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub has_avx2: bool,
    /// `avx512f` and `avx512bw` together.
    pub has_avx512: bool,
    /// Largest data/unified cache, if it could be determined.
    pub cache_capacity: Option<usize>,
}

static DETECTED: Lazy<Capabilities> = Lazy::new(|| {
    let caps = Capabilities::detect();
    debug!(
        "capabilities: avx2={} avx512={} cache_capacity={:?}",
        caps.has_avx2, caps.has_avx512, caps.cache_capacity
    );
    caps
});

impl Capabilities {
    /// Process-wide capabilities, detected on first use.
    #[inline]
    pub fn get() -> &'static Capabilities {
        &DETECTED
    }

    pub fn detect() -> Self {
        Capabilities {
            has_avx2: detect_avx2(),
            has_avx512: detect_avx512(),
            cache_capacity: last_level_cache_size(),
        }
    }

    /// A machine with no SIMD extensions and unknown cache, for tests.
    pub const fn baseline() -> Self {
        Capabilities {
            has_avx2: false,
            has_avx512: false,
            cache_capacity: None,
        }
    }
}

fn detect_avx2() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("avx2")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

fn detect_avx512() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512bw")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Size of the largest data or unified cache reported by CPUID.
///
/// Walks the deterministic cache parameter leaf (4 on Intel, 0x8000_001D
/// on AMD). Both share the same register layout.
#[cfg(target_arch = "x86_64")]
pub fn last_level_cache_size() -> Option<usize> {
    use core::arch::x86_64::{__cpuid, __cpuid_count};

    // SAFETY: CPUID is available on every x86_64 processor.
    let max_leaf = unsafe { __cpuid(0) }.eax;
    // SAFETY: as above.
    let max_ext_leaf = unsafe { __cpuid(0x8000_0000) }.eax;

    let walk = |leaf: u32| -> Option<usize> {
        let mut largest = None;
        for sub in 0..16 {
            // SAFETY: `leaf` was checked against the reported maximum.
            let r = unsafe { __cpuid_count(leaf, sub) };
            let cache_type = r.eax & 0x1F;
            if cache_type == 0 {
                break;
            }
            // 2 = instruction cache
            if cache_type == 2 {
                continue;
            }
            let ways = ((r.ebx >> 22) & 0x3FF) as usize + 1;
            let partitions = ((r.ebx >> 12) & 0x3FF) as usize + 1;
            let line = (r.ebx & 0xFFF) as usize + 1;
            let sets = r.ecx as usize + 1;
            let size = ways * partitions * line * sets;
            largest = Some(largest.map_or(size, |l: usize| l.max(size)));
        }
        largest
    };

    let intel = if max_leaf >= 4 { walk(4) } else { None };
    intel.or_else(|| {
        if max_ext_leaf >= 0x8000_001D {
            walk(0x8000_001D)
        } else {
            None
        }
    })
}

#[cfg(not(target_arch = "x86_64"))]
pub fn last_level_cache_size() -> Option<usize> {
    None
}
