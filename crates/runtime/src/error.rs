//! Heap Error Handling
//!
//! Every fallible heap operation returns `Result<T, HeapError>` to its
//! immediate caller. Nothing is retried and nothing is queued; a failed
//! operation leaves no partially built or partially freed object behind.

use crate::frame::FrameId;
use crate::value::{Kind, ObjRef};
use snek_core::{CapacityOverflow, LimitExceeded};
use std::fmt;

/// Error returned by heap, frame and value operations
#[derive(Debug, Clone, PartialEq)]
pub enum HeapError {
    /// The allocation counter refused the charge, or a buffer could not be reserved
    AllocationFailed { requested: usize },
    /// An argument was absent or malformed
    InvalidArgument(&'static str),
    /// Array access outside `[0, len)`
    IndexOutOfBounds { index: usize, len: usize },
    /// Operation is not defined for the operand kinds
    TypeMismatch {
        op: &'static str,
        left: Kind,
        right: Option<Kind>,
    },
    /// Handle no longer names a live object
    StaleReference(ObjRef),
    /// Frame id is not on the frame stack
    UnknownFrame(FrameId),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::AllocationFailed { requested } => {
                write!(f, "allocation of {} bytes failed", requested)
            }
            HeapError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            HeapError::IndexOutOfBounds { index, len } => {
                write!(f, "index {} out of bounds for array of length {}", index, len)
            }
            HeapError::TypeMismatch {
                op,
                left,
                right: Some(right),
            } => write!(f, "{}: unsupported operands {} and {}", op, left, right),
            HeapError::TypeMismatch {
                op,
                left,
                right: None,
            } => write!(f, "{}: unsupported operand {}", op, left),
            HeapError::StaleReference(obj) => {
                write!(f, "{:?} does not refer to a live object", obj)
            }
            HeapError::UnknownFrame(id) => write!(f, "{} is not on the frame stack", id),
        }
    }
}

impl std::error::Error for HeapError {}

impl From<CapacityOverflow> for HeapError {
    fn from(e: CapacityOverflow) -> Self {
        HeapError::AllocationFailed {
            requested: e.requested,
        }
    }
}

impl From<LimitExceeded> for HeapError {
    fn from(e: LimitExceeded) -> Self {
        HeapError::AllocationFailed {
            requested: e.requested,
        }
    }
}

pub type HeapResult<T> = Result<T, HeapError>;
