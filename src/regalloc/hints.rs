//! Allocation hints.
//!
//! Hints name physical registers a virtual register would like to live in:
//! argument registers for parameters, the return register for the returned
//! value, and so on. The select step tries hinted registers before the
//! class order but is free to ignore them.

use super::provider::HintProvider;
use crate::mir::{MachineFunction, VReg};
use crate::target::{ConfigError, PhysReg, RegClassId, RegisterFile};
use indexmap::IndexMap;

/// No preferences at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHints;

impl HintProvider for NoHints {
    fn hard_hints(&self, _vreg: VReg, _class: RegClassId) -> Vec<PhysReg> {
        Vec::new()
    }
}

/// An explicit hint table.
#[derive(Debug, Clone, Default)]
pub struct FixedHints {
    table: IndexMap<VReg, Vec<PhysReg>>,
}

impl FixedHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `reg` to the preferences of `vreg`.
    pub fn insert(&mut self, vreg: VReg, reg: PhysReg) {
        let regs = self.table.entry(vreg).or_default();
        if !regs.contains(&reg) {
            regs.push(reg);
        }
    }

    /// Resolve the register names recorded on `func`.
    pub fn from_function(func: &MachineFunction, file: &RegisterFile) -> Result<Self, ConfigError> {
        let mut hints = Self::new();
        for (vreg, names) in &func.hints {
            for name in names {
                let reg = file
                    .by_name(name)
                    .ok_or_else(|| ConfigError::UnknownRegister(name.clone()))?;
                hints.insert(*vreg, reg);
            }
        }
        Ok(hints)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl HintProvider for FixedHints {
    fn hard_hints(&self, vreg: VReg, _class: RegClassId) -> Vec<PhysReg> {
        self.table.get(&vreg).cloned().unwrap_or_default()
    }
}

/// Calling-convention hints.
///
/// Parameters prefer the argument register of their position and the
/// returned value prefers the first return register. Registers joined by a
/// `mov` share the preferences of whichever side has some, so a value
/// copied into an argument register is computed there directly.
#[derive(Debug, Clone, Default)]
pub struct AbiHints {
    table: IndexMap<VReg, Vec<PhysReg>>,
}

impl AbiHints {
    pub fn new(func: &MachineFunction, file: &RegisterFile) -> Self {
        let mut table: IndexMap<VReg, Vec<PhysReg>> = IndexMap::new();

        for (param, reg) in func.params.iter().zip(file.arg_regs()) {
            table.entry(*param).or_default().push(*reg);
        }
        if let (Some(ret), Some(reg)) = (func.ret_vreg, file.ret_regs().first()) {
            let regs = table.entry(ret).or_default();
            if !regs.contains(reg) {
                regs.push(*reg);
            }
        }

        let copies: Vec<(VReg, VReg)> = func
            .iter_blocks()
            .flat_map(|b| b.insts.iter())
            .filter(|inst| inst.opcode.is_copy())
            .filter_map(|inst| Some((inst.def()?, *inst.uses().first()?)))
            .collect();

        // Each pass hints at least one more register or stops.
        let mut changed = true;
        while changed {
            changed = false;
            for &(dst, src) in &copies {
                for (to, from) in [(dst, src), (src, dst)] {
                    if table.contains_key(&to) {
                        continue;
                    }
                    if let Some(regs) = table.get(&from).cloned() {
                        table.insert(to, regs);
                        changed = true;
                    }
                }
            }
        }

        Self { table }
    }
}

impl HintProvider for AbiHints {
    fn hard_hints(&self, vreg: VReg, _class: RegClassId) -> Vec<PhysReg> {
        self.table.get(&vreg).cloned().unwrap_or_default()
    }
}

/// Several providers queried in order; earlier ones take precedence.
#[derive(Default)]
pub struct HintChain<'a> {
    providers: Vec<Box<dyn HintProvider + 'a>>,
}

impl<'a> HintChain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl HintProvider + 'a) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

impl HintProvider for HintChain<'_> {
    fn hard_hints(&self, vreg: VReg, class: RegClassId) -> Vec<PhysReg> {
        let mut hints = Vec::new();
        for provider in &self.providers {
            for reg in provider.hard_hints(vreg, class) {
                if !hints.contains(&reg) {
                    hints.push(reg);
                }
            }
        }
        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MachineBlock, MachineInst};
    use crate::target::TargetConfig;

    #[test]
    fn test_abi_hints() {
        let file = TargetConfig::default().build().unwrap();
        let gpr = file.default_class();

        let mut func = MachineFunction::new("f");
        let a = func.new_vreg();
        let b = func.new_vreg();
        let sum = func.new_vreg();
        let out = func.new_vreg();
        func.params = vec![a, b];
        func.ret_vreg = Some(out);

        let mut entry = MachineBlock::new("entry");
        entry.push(MachineInst::add(sum, a, b));
        entry.push(MachineInst::mov(out, sum));
        entry.push(MachineInst::ret());
        func.add_block(entry);

        let hints = AbiHints::new(&func, &file);
        let a0 = file.by_name("a0").unwrap();
        let a1 = file.by_name("a1").unwrap();

        assert_eq!(hints.hard_hints(a, gpr), vec![a0]);
        assert_eq!(hints.hard_hints(b, gpr), vec![a1]);
        assert_eq!(hints.hard_hints(out, gpr), vec![a0]);
        // sum is copied into the return value
        assert_eq!(hints.hard_hints(sum, gpr), vec![a0]);
    }

    #[test]
    fn test_fixed_hints_from_names() {
        let file = TargetConfig::tiny().build().unwrap();
        let mut func = MachineFunction::new("f");
        let v = func.new_vreg();
        func.add_hint(v, "x1");

        let hints = FixedHints::from_function(&func, &file).unwrap();
        assert_eq!(hints.hard_hints(v, file.default_class()), vec![file.by_name("x1").unwrap()]);

        func.add_hint(v, "x7");
        assert_eq!(
            FixedHints::from_function(&func, &file).unwrap_err(),
            ConfigError::UnknownRegister("x7".to_string())
        );
    }

    #[test]
    fn test_chain_precedence() {
        let mut first = FixedHints::new();
        first.insert(VReg(0), PhysReg(3));
        let mut second = FixedHints::new();
        second.insert(VReg(0), PhysReg(1));
        second.insert(VReg(0), PhysReg(3));

        let chain = HintChain::new().with(first).with(second).with(NoHints);
        assert_eq!(chain.hard_hints(VReg(0), RegClassId(0)), vec![PhysReg(3), PhysReg(1)]);
        assert!(chain.hard_hints(VReg(1), RegClassId(0)).is_empty());
    }
}
