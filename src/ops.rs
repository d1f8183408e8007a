//! Safe operation API.
//!
//! An [`Operation`] borrows the buffers it works on, so copy and dualcast
//! regions can never alias: the borrow checker enforces what the raw
//! kernels leave to the caller. Every operation is validated in full
//! before the first byte is written.
#![allow(unsafe_code)]

use core::fmt;
use core::ops::Range;

use log::debug;

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::{dualcast, memfill, memmove};

/// One transfer request.
#[derive(Debug)]
pub enum Operation<'a> {
    /// `src.len()` bytes into the front of `dst`.
    Copy { src: &'a [u8], dst: &'a mut [u8] },
    /// `buf[src]` to `buf[dst..dst + src.len()]`; the ranges may overlap.
    Move {
        buf: &'a mut [u8],
        src: Range<usize>,
        dst: usize,
    },
    /// Every byte of `dst`, repeating the little-endian bytes of `pattern`.
    Fill { pattern: u64, dst: &'a mut [u8] },
    /// `src.len()` bytes into the front of both destinations.
    Dualcast {
        src: &'a [u8],
        dst1: &'a mut [u8],
        dst2: &'a mut [u8],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Copy,
    Move,
    Fill,
    Dualcast,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Copy => "copy",
            OperationKind::Move => "move",
            OperationKind::Fill => "fill",
            OperationKind::Dualcast => "dualcast",
        })
    }
}

fn fits(needed: usize, available: usize) -> Result<()> {
    if available == 0 {
        return Err(Error::EmptyDestination);
    }
    if available < needed {
        return Err(Error::DestinationTooSmall { needed, available });
    }
    Ok(())
}

fn in_bounds(offset: usize, len: usize, buffer: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= buffer => Ok(()),
        _ => Err(Error::RangeOutOfBounds {
            offset,
            len,
            buffer,
        }),
    }
}

impl Operation<'_> {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Copy { .. } => OperationKind::Copy,
            Operation::Move { .. } => OperationKind::Move,
            Operation::Fill { .. } => OperationKind::Fill,
            Operation::Dualcast { .. } => OperationKind::Dualcast,
        }
    }

    /// Bytes written per destination.
    pub fn len(&self) -> usize {
        match self {
            Operation::Copy { src, .. } | Operation::Dualcast { src, .. } => src.len(),
            Operation::Move { src, .. } => src.end.saturating_sub(src.start),
            Operation::Fill { dst, .. } => dst.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks lengths and ranges without touching any buffer.
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::Copy { src, dst } => {
                if src.is_empty() {
                    return Err(Error::EmptySource);
                }
                fits(src.len(), dst.len())
            }
            Operation::Move { buf, src, dst } => {
                if src.start > src.end {
                    return Err(Error::RangeOutOfBounds {
                        offset: src.start,
                        len: 0,
                        buffer: buf.len(),
                    });
                }
                let len = src.end - src.start;
                if len == 0 {
                    return Err(Error::EmptySource);
                }
                in_bounds(src.start, len, buf.len())?;
                in_bounds(*dst, len, buf.len())
            }
            Operation::Fill { dst, .. } => {
                if dst.is_empty() {
                    return Err(Error::EmptyDestination);
                }
                Ok(())
            }
            Operation::Dualcast { src, dst1, dst2 } => {
                if src.is_empty() {
                    return Err(Error::EmptySource);
                }
                fits(src.len(), dst1.len())?;
                fits(src.len(), dst2.len())
            }
        }
    }

    /// Runs an already validated operation.
    fn run(&mut self, d: &Dispatcher) {
        // SAFETY: `validate` has bounded every pointer range below by the
        // length of the slice it is derived from, and the borrows keep
        // distinct slices disjoint.
        unsafe {
            match self {
                Operation::Copy { src, dst } => d.copy(dst.as_mut_ptr(), src.as_ptr(), src.len()),
                Operation::Move { buf, src, dst } => {
                    let base = buf.as_mut_ptr();
                    memmove::move_with(d, base.add(*dst), base.add(src.start), src.end - src.start);
                }
                Operation::Fill { pattern, dst } => {
                    memfill::fill_with(d, dst.as_mut_ptr(), *pattern, dst.len())
                }
                Operation::Dualcast { src, dst1, dst2 } => dualcast::dualcast_with(
                    d,
                    dst1.as_mut_ptr(),
                    dst2.as_mut_ptr(),
                    src.as_ptr(),
                    src.len(),
                ),
            }
        }
    }
}

/// Where an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionPath {
    #[default]
    Software,
    /// An external offload engine. Its failures surface as
    /// [`Error::Hardware`].
    Hardware,
}

/// Something that can carry out an [`Operation`].
///
/// Takes the operation by mutable reference so that a caller seeing
/// [`Error::is_hardware`] can resubmit the same request elsewhere.
pub trait Executor {
    fn path(&self) -> ExecutionPath;

    fn execute(&self, op: &mut Operation<'_>) -> Result<()>;
}

/// The CPU execution path.
#[derive(Debug, Clone, Copy)]
pub struct Software<'d> {
    dispatcher: &'d Dispatcher,
}

impl Software<'static> {
    pub fn new() -> Self {
        Software {
            dispatcher: Dispatcher::global(),
        }
    }
}

impl Default for Software<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d> Software<'d> {
    pub fn with_dispatcher(dispatcher: &'d Dispatcher) -> Self {
        Software { dispatcher }
    }
}

impl Executor for Software<'_> {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::Software
    }

    fn execute(&self, op: &mut Operation<'_>) -> Result<()> {
        if let Err(e) = op.validate() {
            debug!("rejected {} of {} bytes: {e}", op.kind(), op.len());
            return Err(e);
        }
        op.run(self.dispatcher);
        Ok(())
    }
}

/// Validates and runs `op` on the software path.
pub fn execute(mut op: Operation<'_>) -> Result<()> {
    Software::new().execute(&mut op)
}

/// Runs `op` on the requested path. No retry is attempted: a hardware
/// failure is returned to the caller as is.
pub fn execute_on(
    path: ExecutionPath,
    hardware: Option<&dyn Executor>,
    op: &mut Operation<'_>,
) -> Result<()> {
    match path {
        ExecutionPath::Software => Software::new().execute(op),
        ExecutionPath::Hardware => match hardware {
            Some(engine) => engine.execute(op),
            None => Err(Error::Hardware("no hardware executor attached".into())),
        },
    }
}

/// Last-level cache capacity the process-wide dispatcher works with.
/// `None` when it could not be discovered and was not configured.
pub fn cache_capacity() -> Option<usize> {
    Dispatcher::global().cache_capacity()
}
