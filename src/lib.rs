//! fastmem: bulk memory transfer kernels.
//!
//! Copy, overlap-safe move, pattern fill and dual-destination fan-out for
//! arbitrarily aligned buffers. Copies pick per call between a scalar
//! kernel and a 64-byte wide loop that realigns the source on the fly;
//! see [`dispatch`] for the policy.
//!
//! Raw `unsafe fn` entry points live in [`memcpy`], [`memmove`],
//! [`memfill`] and [`dualcast`]. [`execute`] is the checked, borrow-based
//! front end.

pub mod align;
#[cfg(all(feature = "avx512", target_arch = "x86_64"))]
pub mod avx512;
pub mod caps;
pub mod config;
pub mod dispatch;
pub mod dualcast;
pub mod error;
pub mod memcpy;
pub mod memfill;
pub mod memmove;
pub mod ops;
pub mod register;
pub mod scalar;
pub mod transfer;

pub use caps::{Capabilities, VECTOR_WIDTH};
pub use config::{BackendChoice, Config, Thresholds};
pub use dispatch::{Dispatcher, Route};
pub use dualcast::optimized_dualcast;
pub use error::{Error, Result};
pub use memcpy::optimized_copy;
pub use memfill::optimized_fill;
pub use memmove::optimized_move;
pub use ops::{
    ExecutionPath, Executor, Operation, OperationKind, Software, cache_capacity, execute,
    execute_on,
};
