//! Allocation errors.

use crate::mir::VReg;
use thiserror::Error;

/// Errors the allocator reports. Ordinary spilling, eviction and splitting
/// are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("register class '{class}' has no allocatable registers")]
    UnassignableRegisterClass { class: String },

    #[error("cannot allocate {vreg}: no register is free and its interval cannot be split further")]
    SpillFailure { vreg: VReg },

    #[error("interference graph is inconsistent at {vreg}: {reason}")]
    InconsistentGraph { vreg: VReg, reason: String },

    #[error("no live interval for {vreg}")]
    UnknownInterval { vreg: VReg },
}

pub type AllocResult<T> = Result<T, AllocError>;
