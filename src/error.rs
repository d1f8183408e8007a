//! Error type for the validated operation API.
//!
//! The raw kernels never fail: every alignment/length combination has a
//! correct (if slower) path. Errors only come from input validation, from
//! configuration overrides, or from an external hardware executor.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("source view is empty")]
    EmptySource,
    #[error("destination view is empty")]
    EmptyDestination,
    #[error("destination holds {available} bytes, {needed} required")]
    DestinationTooSmall { needed: usize, available: usize },
    #[error("range {offset}..{offset}+{len} exceeds buffer of {buffer} bytes")]
    RangeOutOfBounds {
        offset: usize,
        len: usize,
        buffer: usize,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidConfig { key: &'static str, value: String },
    #[error("hardware path failed: {0}")]
    Hardware(String),
}

impl Error {
    /// True when the failure came from the accelerator path, meaning the
    /// same operation may be resubmitted on the software path.
    #[inline]
    pub fn is_hardware(&self) -> bool {
        matches!(self, Error::Hardware(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
