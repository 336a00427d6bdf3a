//! Collaborator interfaces.
//!
//! The allocator does not compute liveness, know the register file layout or
//! decide calling conventions itself. It consumes those through the traits
//! below, so any front end with its own IR can drive it.

use super::interval::LiveInterval;
use crate::mir::{MachineFunction, VReg};
use crate::target::{ConfigError, PhysReg, RegClassId, RegUnit, RegisterFile};
use indexmap::IndexMap;

/// Source of live intervals for the virtual registers of one procedure.
pub trait LiveIntervalProvider {
    /// Every virtual register with at least one def or use.
    fn vregs(&self) -> Vec<VReg>;

    /// Current interval of `vreg`.
    fn interval_of(&self, vreg: VReg) -> Option<&LiveInterval>;

    /// Do the intervals of `a` and `b` overlap?
    fn overlaps(&self, a: VReg, b: VReg) -> bool {
        match (self.interval_of(a), self.interval_of(b)) {
            (Some(ia), Some(ib)) => ia.overlaps(ib),
            _ => false,
        }
    }

    /// Replace `parent` by the intervals it was split into.
    fn commit_split(&mut self, parent: VReg, children: &[(VReg, LiveInterval)]);
}

/// Register class and register file queries.
pub trait RegisterClassProvider {
    /// Class of an (original) virtual register.
    fn class_of(&self, vreg: VReg) -> RegClassId;

    /// Allocation order of a class.
    fn order_of(&self, class: RegClassId) -> &[PhysReg];

    /// Storage units occupied by `reg`.
    fn reg_units(&self, reg: PhysReg) -> &[RegUnit];

    /// Total number of storage units.
    fn num_units(&self) -> usize;

    fn reg_name(&self, reg: PhysReg) -> &str;

    fn class_name(&self, class: RegClassId) -> &str;
}

/// Preferred registers for a virtual register. Purely advisory.
pub trait HintProvider {
    fn hard_hints(&self, vreg: VReg, class: RegClassId) -> Vec<PhysReg>;
}

/// Register classes of one function resolved against a register file.
///
/// Virtual registers without a `class` annotation fall into the file's
/// default class.
#[derive(Debug)]
pub struct TargetClasses<'a> {
    file: &'a RegisterFile,
    classes: IndexMap<VReg, RegClassId>,
}

impl<'a> TargetClasses<'a> {
    pub fn new(file: &'a RegisterFile, func: &MachineFunction) -> Result<Self, ConfigError> {
        let mut classes = IndexMap::new();
        for (vreg, name) in &func.reg_classes {
            let class = file
                .class_by_name(name)
                .ok_or_else(|| ConfigError::UnknownClass(name.clone()))?;
            classes.insert(*vreg, class);
        }
        Ok(Self { file, classes })
    }

    pub fn file(&self) -> &RegisterFile {
        self.file
    }
}

impl RegisterClassProvider for TargetClasses<'_> {
    fn class_of(&self, vreg: VReg) -> RegClassId {
        self.classes
            .get(&vreg)
            .copied()
            .unwrap_or_else(|| self.file.default_class())
    }

    fn order_of(&self, class: RegClassId) -> &[PhysReg] {
        &self.file.class(class).order
    }

    fn reg_units(&self, reg: PhysReg) -> &[RegUnit] {
        self.file.units(reg)
    }

    fn num_units(&self) -> usize {
        self.file.num_units()
    }

    fn reg_name(&self, reg: PhysReg) -> &str {
        self.file.name(reg)
    }

    fn class_name(&self, class: RegClassId) -> &str {
        &self.file.class(class).name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetConfig;

    #[test]
    fn test_classes_resolve() {
        let file = TargetConfig::paired().build().unwrap();
        let mut func = MachineFunction::new("f");
        let a = func.new_vreg();
        let b = func.new_vreg();
        func.set_class(b, "fpr64");

        let classes = TargetClasses::new(&file, &func).unwrap();
        assert_eq!(classes.class_name(classes.class_of(a)), "gpr");
        assert_eq!(classes.class_name(classes.class_of(b)), "fpr64");
        let order = classes.order_of(classes.class_of(b));
        assert_eq!(classes.reg_name(order[0]), "d0");
    }

    #[test]
    fn test_unknown_class_rejected() {
        let file = TargetConfig::tiny().build().unwrap();
        let mut func = MachineFunction::new("f");
        let a = func.new_vreg();
        func.set_class(a, "vec");
        assert_eq!(
            TargetClasses::new(&file, &func).unwrap_err(),
            ConfigError::UnknownClass("vec".to_string())
        );
    }
}
