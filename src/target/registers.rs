//! Physical register file.
//!
//! A [`RegisterFile`] is the validated, index-based form of a
//! [`TargetConfig`](super::TargetConfig). Registers are identified by
//! [`PhysReg`] indices, classes by [`RegClassId`], and every register owns a
//! set of storage units ([`RegUnit`]). Two registers conflict exactly when
//! their unit sets intersect, which is how overlapping sub-registers (a
//! double-precision register covering two single-precision halves, say) are
//! modelled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical register identifier (index into the register file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysReg(pub u16);

impl PhysReg {
    /// Index into the register file.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A unit of physical storage. Registers sharing a unit alias each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegUnit(pub u16);

impl RegUnit {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Register class identifier (index into the register file's class table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegClassId(pub u16);

impl RegClassId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One physical register.
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    /// Assembly name
    pub name: String,
    /// Storage units this register occupies
    pub units: Vec<RegUnit>,
}

/// One register class: the registers a virtual register of this class may
/// live in, in allocation order.
#[derive(Debug, Clone)]
pub struct RegisterClass {
    /// Class name
    pub name: String,
    /// Allocation order
    pub order: Vec<PhysReg>,
}

impl RegisterClass {
    /// Does the class contain `reg`?
    pub fn contains(&self, reg: PhysReg) -> bool {
        self.order.contains(&reg)
    }
}

/// Validated register file built from a target configuration.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    pub(super) regs: Vec<RegisterInfo>,
    pub(super) classes: Vec<RegisterClass>,
    pub(super) num_units: usize,
    pub(super) default_class: RegClassId,
    pub(super) arg_regs: Vec<PhysReg>,
    pub(super) ret_regs: Vec<PhysReg>,
    pub(super) callee_saved: Vec<PhysReg>,
    pub(super) frame_pointer: PhysReg,
    pub(super) slot_size: u32,
}

impl RegisterFile {
    /// Number of physical registers.
    pub fn num_regs(&self) -> usize {
        self.regs.len()
    }

    /// Number of storage units.
    pub fn num_units(&self) -> usize {
        self.num_units
    }

    /// Iterate over all registers.
    pub fn regs(&self) -> impl Iterator<Item = PhysReg> + '_ {
        (0..self.regs.len()).map(|i| PhysReg(i as u16))
    }

    /// Assembly name of a register.
    pub fn name(&self, reg: PhysReg) -> &str {
        &self.regs[reg.index()].name
    }

    /// Look a register up by name.
    pub fn by_name(&self, name: &str) -> Option<PhysReg> {
        self.regs
            .iter()
            .position(|r| r.name == name)
            .map(|i| PhysReg(i as u16))
    }

    /// Storage units of a register.
    pub fn units(&self, reg: PhysReg) -> &[RegUnit] {
        &self.regs[reg.index()].units
    }

    /// Do two registers share any storage?
    pub fn aliases(&self, a: PhysReg, b: PhysReg) -> bool {
        let ua = self.units(a);
        self.units(b).iter().any(|u| ua.contains(u))
    }

    /// All register classes.
    pub fn classes(&self) -> &[RegisterClass] {
        &self.classes
    }

    /// Get a class by id.
    pub fn class(&self, id: RegClassId) -> &RegisterClass {
        &self.classes[id.index()]
    }

    /// Look a class up by name.
    pub fn class_by_name(&self, name: &str) -> Option<RegClassId> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| RegClassId(i as u16))
    }

    /// Class used for virtual registers without an explicit class.
    pub fn default_class(&self) -> RegClassId {
        self.default_class
    }

    /// Argument registers, in parameter order.
    pub fn arg_regs(&self) -> &[PhysReg] {
        &self.arg_regs
    }

    /// Return-value registers.
    pub fn ret_regs(&self) -> &[PhysReg] {
        &self.ret_regs
    }

    /// Is `reg` preserved across calls?
    pub fn is_callee_saved(&self, reg: PhysReg) -> bool {
        self.callee_saved.contains(&reg)
    }

    /// Register used as the base of spill slots.
    pub fn frame_pointer(&self) -> PhysReg {
        self.frame_pointer
    }

    /// Size in bytes of one spill slot.
    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }
}

#[cfg(test)]
mod tests {
    use crate::target::TargetConfig;

    #[test]
    fn test_default_file() {
        let file = TargetConfig::default().build().unwrap();
        let gpr = file.default_class();
        assert_eq!(file.class(gpr).name, "gpr");
        assert_eq!(file.class(gpr).order.len(), 13);

        let zero = file.by_name("zero").unwrap();
        let fp = file.by_name("fp").unwrap();
        assert!(!file.class(gpr).contains(zero));
        assert!(!file.class(gpr).contains(fp));
        assert_eq!(file.frame_pointer(), fp);
        assert_eq!(file.name(file.arg_regs()[0]), "a0");
    }

    #[test]
    fn test_paired_aliasing() {
        let file = TargetConfig::preset("paired").unwrap().build().unwrap();
        let s0 = file.by_name("s0").unwrap();
        let s1 = file.by_name("s1").unwrap();
        let s2 = file.by_name("s2").unwrap();
        let d0 = file.by_name("d0").unwrap();

        assert!(file.aliases(d0, s0));
        assert!(file.aliases(d0, s1));
        assert!(!file.aliases(d0, s2));
        assert!(!file.aliases(s0, s1));
        assert_eq!(file.units(d0).len(), 2);
    }
}
