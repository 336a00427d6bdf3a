//! Virtual registers.
//!
//! Virtual registers are handed out by [`MachineFunction::new_vreg`] in an
//! unbounded supply. The allocator also mints fresh ones when it splits a
//! spilled live range into per-instruction pieces.
//!
//! [`MachineFunction::new_vreg`]: super::MachineFunction::new_vreg

use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VReg(pub u32);

impl VReg {
    /// Create a new virtual register.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the register ID.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl std::str::FromStr for VReg {
    type Err = std::num::ParseIntError;

    /// Parse the `vN` spelling used by the text format.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A missing prefix parses as "" and fails like any other bad number.
        s.strip_prefix('v').unwrap_or("").parse().map(VReg)
    }
}
