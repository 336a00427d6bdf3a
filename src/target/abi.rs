//! Stack frame layout for spill code.
//!
//! Spill slots live below the frame pointer: slot `n` is addressed as
//! `-(n + 1) * slot_size(fp)`.

use super::registers::{PhysReg, RegisterFile};
use serde::{Deserialize, Serialize};

/// A stack slot holding a spilled virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpillSlot(pub u32);

impl SpillSlot {
    /// Frame-pointer-relative byte offset of this slot.
    pub fn offset(self, slot_size: u32) -> i32 {
        -(((self.0 + 1) * slot_size) as i32)
    }
}

impl std::fmt::Display for SpillSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

/// Stack frame information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    /// Bytes reserved for spill slots
    pub spill_size: u32,
    /// Callee-saved registers written by the function
    pub saved_regs: Vec<PhysReg>,
}

impl StackFrame {
    /// Frame for `num_slots` spill slots.
    pub fn with_slots(num_slots: usize, file: &RegisterFile) -> Self {
        Self {
            spill_size: num_slots as u32 * file.slot_size(),
            saved_regs: Vec::new(),
        }
    }

    /// Record a callee-saved register as clobbered.
    pub fn note_saved(&mut self, reg: PhysReg) {
        if !self.saved_regs.contains(&reg) {
            self.saved_regs.push(reg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_offsets() {
        assert_eq!(SpillSlot(0).offset(4), -4);
        assert_eq!(SpillSlot(3).offset(8), -32);
    }

    #[test]
    fn test_note_saved_dedups() {
        let mut frame = StackFrame::default();
        frame.note_saved(PhysReg(10));
        frame.note_saved(PhysReg(10));
        assert_eq!(frame.saved_regs, vec![PhysReg(10)]);
    }
}
