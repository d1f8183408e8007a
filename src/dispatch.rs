//! # Kernel dispatcher
//!
//! Chooses, per call, between the scalar kernel and one of the wide-loop
//! realignment strategies. The choice is a pure function of the two
//! addresses and the length ([`Dispatcher::plan`]), kept apart from its
//! execution so every branch can be inspected without touching memory.
//!
//! The backend implementing the wide loop is picked once, when the
//! dispatcher is built, and stored as a function pointer.
#![allow(unsafe_code)]

use log::{debug, trace, warn};
use once_cell::sync::Lazy;

use crate::align::{ShiftClass, Strategy, head_len, misalignment};
use crate::caps::Capabilities;
use crate::config::{BackendChoice, Config, Thresholds};
use crate::scalar;
use crate::transfer::{self, StoreMode, VectorKernel};

/// Why a transfer went to the scalar kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarReason {
    /// Below the vector minimum; realignment would not amortize.
    Short,
    /// Larger than the known last-level cache.
    BeyondCache,
    /// Misaligned pair below its class minimum.
    MisalignedShort,
    /// Odd shift below the composite-strategy minimum.
    OddShiftShort,
    /// Odd shift in 16..=48: no vector composition.
    Awkward,
    /// Fully aligned length inside the measured scalar window.
    AlignedWindow,
}

/// Outcome of planning one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Scalar(ScalarReason),
    /// Copy `head` bytes with the scalar kernel to align the destination,
    /// then run the wide loop on the rest.
    Vector {
        head: usize,
        strategy: Strategy,
        store: StoreMode,
    },
}

impl Route {
    #[inline]
    pub fn is_vector(&self) -> bool {
        matches!(self, Route::Vector { .. })
    }
}

/// Wide-loop implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Portable,
    Avx512,
}

impl Backend {
    /// Resolves a configured choice against the detected CPU.
    pub fn select(choice: BackendChoice, caps: &Capabilities) -> Backend {
        let available = cfg!(all(feature = "avx512", target_arch = "x86_64")) && caps.has_avx512;
        match choice {
            BackendChoice::Portable => Backend::Portable,
            BackendChoice::Auto if available => Backend::Avx512,
            BackendChoice::Auto => Backend::Portable,
            BackendChoice::Avx512 if available => Backend::Avx512,
            BackendChoice::Avx512 => {
                warn!("avx512 backend requested but unavailable, using portable");
                Backend::Portable
            }
        }
    }

    pub fn kernel(self) -> VectorKernel {
        match self {
            #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
            Backend::Avx512 => crate::avx512::transfer,
            _ => transfer::portable,
        }
    }
}

/// Copy dispatcher bound to one set of thresholds and one backend.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    thresholds: Thresholds,
    cache_capacity: Option<usize>,
    scalar_beyond_cache: bool,
    backend: Backend,
    kernel: VectorKernel,
    avx2: bool,
}

static GLOBAL: Lazy<Dispatcher> =
    Lazy::new(|| Dispatcher::new(&Config::from_env_or_default(), Capabilities::get()));

impl Dispatcher {
    /// Process-wide dispatcher, configured from the environment on first
    /// use.
    #[inline]
    pub fn global() -> &'static Dispatcher {
        &GLOBAL
    }

    pub fn new(config: &Config, caps: &Capabilities) -> Self {
        let backend = Backend::select(config.backend, caps);
        let cache_capacity = config.cache_capacity.or(caps.cache_capacity);
        let avx2 = config.avx2 && caps.has_avx2;
        debug!(
            "dispatcher: backend={backend:?} avx2={avx2} cache_capacity={cache_capacity:?} thresholds={:?}",
            config.thresholds
        );
        Dispatcher {
            thresholds: config.thresholds,
            cache_capacity,
            scalar_beyond_cache: config.scalar_beyond_cache,
            backend,
            kernel: backend.kernel(),
            avx2,
        }
    }

    #[inline]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    #[inline]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    #[inline]
    pub fn cache_capacity(&self) -> Option<usize> {
        self.cache_capacity
    }

    /// Whether the AVX2 fill/dualcast/move loops may run.
    #[inline]
    pub fn use_avx2(&self) -> bool {
        self.avx2
    }

    /// Store policy for a transfer of `n` bytes. An unknown cache is
    /// treated as exceeded once the length passes the cache-check bound.
    #[inline]
    pub fn store_mode(&self, n: usize) -> StoreMode {
        let exceeds = match self.cache_capacity {
            Some(capacity) => n > capacity,
            None => n > self.thresholds.cache_check_above,
        };
        if exceeds {
            StoreMode::NonTemporal
        } else {
            StoreMode::Temporal
        }
    }

    /// Decides how `n` bytes from `src` to `dest` are copied.
    pub fn plan(&self, dest: usize, src: usize, n: usize) -> Route {
        let t = &self.thresholds;

        if n < t.vector_min {
            return Route::Scalar(ScalarReason::Short);
        }

        if n > t.cache_check_above && self.scalar_beyond_cache {
            if let Some(capacity) = self.cache_capacity {
                if n > capacity {
                    return Route::Scalar(ScalarReason::BeyondCache);
                }
            }
        }

        let store = self.store_mode(n);
        let head = head_len(dest);

        if head != 0 {
            if n < t.misaligned_dst_min || n <= head {
                return Route::Scalar(ScalarReason::MisalignedShort);
            }
            let rest = n - head;
            let shift = misalignment(src.wrapping_add(head));

            // Shifts that are a multiple of 16 keep whole 16-byte lanes
            // intact; plain unaligned loads handle them.
            let strategy = if shift % 16 == 0 {
                Strategy::Unaligned
            } else {
                let class = ShiftClass::of(shift);
                match Strategy::for_shift(shift) {
                    None => return Route::Scalar(ScalarReason::Awkward),
                    Some(_) if class.is_odd() && rest < t.odd_shift_min => {
                        return Route::Scalar(ScalarReason::OddShiftShort);
                    }
                    Some(strategy) => strategy,
                }
            };
            return Route::Vector {
                head,
                strategy,
                store,
            };
        }

        let shift = misalignment(src);
        if shift == 0 {
            let (lo, hi) = t.aligned_scalar_window;
            if lo < n && n < hi {
                return Route::Scalar(ScalarReason::AlignedWindow);
            }
            return Route::Vector {
                head: 0,
                strategy: Strategy::Aligned,
                store,
            };
        }

        if n < t.misaligned_src_min {
            return Route::Scalar(ScalarReason::MisalignedShort);
        }
        match Strategy::for_shift(shift) {
            Some(strategy) => Route::Vector {
                head: 0,
                strategy,
                store,
            },
            None => Route::Scalar(ScalarReason::Awkward),
        }
    }

    /// Copies `n` bytes along the planned route.
    ///
    /// # Safety
    ///
    /// - `src` must be valid for reads and `dest` for writes of `n` bytes
    /// - The regions must not overlap
    pub unsafe fn copy(&self, dest: *mut u8, src: *const u8, n: usize) {
        let route = self.plan(dest as usize, src as usize, n);
        trace!("copy n={n} route={route:?}");
        self.copy_along(dest, src, n, route);
    }

    /// Executes an already planned route.
    ///
    /// # Safety
    ///
    /// - Same as [`Dispatcher::copy`]
    /// - `route` must come from [`Dispatcher::plan`] for these arguments
    pub unsafe fn copy_along(&self, dest: *mut u8, src: *const u8, n: usize, route: Route) {
        match route {
            Route::Scalar(_) => scalar::copy_unrolled(dest, src, n),
            Route::Vector {
                head,
                strategy,
                store,
            } => {
                scalar::copy_unrolled(dest, src, head);
                (self.kernel)(dest.add(head), src.add(head), n - head, strategy, store);
            }
        }
    }
}
