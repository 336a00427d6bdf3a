//! Target description.
//!
//! This module defines what the allocator knows about the machine:
//! - Register definitions, storage units and aliasing
//! - Register classes with allocation orders
//! - Target configuration presets
//! - Spill-slot frame layout

pub mod config;
pub mod registers;
pub mod abi;

pub use config::{ClassSpec, ConfigError, RegisterSpec, TargetConfig};
pub use registers::{PhysReg, RegClassId, RegUnit, RegisterClass, RegisterFile, RegisterInfo};
pub use abi::{SpillSlot, StackFrame};
