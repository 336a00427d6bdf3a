//! Machine IR (MIR).
//!
//! The Machine IR is the input the register allocator works on: functions
//! made of labelled basic blocks of instructions over virtual registers.
//! Each block records its loop nesting depth, which the spill-cost
//! estimator uses as a profile-free execution frequency.
//!
//! # Structure
//!
//! ```text
//! Module
//! └── Functions
//!     └── BasicBlocks (label, loop depth)
//!         └── Instructions
//! ```

mod instruction;
mod value;
mod function;
mod block;

pub use instruction::{MachineInst, Opcode, Operand};
pub use value::VReg;
pub use function::MachineFunction;
pub use block::MachineBlock;

use indexmap::IndexMap;

/// A Machine IR module containing functions.
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Functions in the module
    pub functions: IndexMap<String, MachineFunction>,
}

impl Module {
    /// Create a new empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
        }
    }

    /// Add a function to the module.
    pub fn add_function(&mut self, func: MachineFunction) {
        self.functions.insert(func.name.clone(), func);
    }

    /// Get a function by name.
    pub fn get_function(&self, name: &str) -> Option<&MachineFunction> {
        self.functions.get(name)
    }

    /// Iterate over all functions.
    pub fn iter_functions(&self) -> impl Iterator<Item = &MachineFunction> {
        self.functions.values()
    }
}
