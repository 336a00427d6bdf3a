//! Machine functions.

use super::block::MachineBlock;
use super::value::VReg;
use crate::target::abi::StackFrame;
use indexmap::IndexMap;
use std::fmt;

/// A machine function.
#[derive(Debug, Clone)]
pub struct MachineFunction {
    /// Function name
    pub name: String,
    /// Basic blocks (ordered)
    pub blocks: IndexMap<String, MachineBlock>,
    /// Entry block label
    pub entry: String,
    /// Stack frame information
    pub frame: StackFrame,
    /// Next virtual register ID
    next_vreg: u32,
    /// Parameter virtual registers
    pub params: Vec<VReg>,
    /// Return value virtual register (if any)
    pub ret_vreg: Option<VReg>,
    /// Register class names for vregs outside the target's default class
    pub reg_classes: IndexMap<VReg, String>,
    /// Explicit preferred physical registers, by name
    pub hints: IndexMap<VReg, Vec<String>>,
}

impl MachineFunction {
    /// Create a new function.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name,
            blocks: IndexMap::new(),
            entry: String::new(),
            frame: StackFrame::default(),
            next_vreg: 0,
            params: Vec::new(),
            ret_vreg: None,
            reg_classes: IndexMap::new(),
            hints: IndexMap::new(),
        }
    }

    /// Allocate a new virtual register.
    pub fn new_vreg(&mut self) -> VReg {
        let vreg = VReg::new(self.next_vreg);
        self.next_vreg += 1;
        vreg
    }

    /// Get the number of virtual registers allocated.
    pub fn num_vregs(&self) -> u32 {
        self.next_vreg
    }

    /// Make sure `vreg` is covered by the counter (used by the parser,
    /// which sees register numbers rather than minting them).
    pub fn reserve_vreg(&mut self, vreg: VReg) {
        self.next_vreg = self.next_vreg.max(vreg.id() + 1);
    }

    /// Place `vreg` in a named register class.
    pub fn set_class(&mut self, vreg: VReg, class: impl Into<String>) {
        self.reg_classes.insert(vreg, class.into());
    }

    /// Record preferred physical registers for `vreg`.
    pub fn add_hint(&mut self, vreg: VReg, reg: impl Into<String>) {
        self.hints.entry(vreg).or_default().push(reg.into());
    }

    /// Add a basic block.
    pub fn add_block(&mut self, block: MachineBlock) {
        if self.entry.is_empty() {
            self.entry = block.label.clone();
        }
        self.blocks.insert(block.label.clone(), block);
    }

    /// Get a block by label.
    pub fn get_block(&self, label: &str) -> Option<&MachineBlock> {
        self.blocks.get(label)
    }

    /// Iterate over all blocks.
    pub fn iter_blocks(&self) -> impl Iterator<Item = &MachineBlock> {
        self.blocks.values()
    }

    /// Get block labels in order.
    pub fn block_labels(&self) -> Vec<&str> {
        self.blocks.keys().map(|s| s.as_str()).collect()
    }

    /// Total number of instructions across all blocks.
    pub fn num_insts(&self) -> usize {
        self.blocks.values().map(|b| b.len()).sum()
    }

    /// Update CFG edges (predecessors/successors) based on terminators.
    ///
    /// Branches have two successors (target and the next block in layout
    /// order); `jal` only its target; `ret` none. A block without a
    /// terminator falls through.
    pub fn rebuild_cfg(&mut self) {
        let labels: Vec<String> = self.blocks.keys().cloned().collect();
        let mut edges: Vec<(String, String)> = Vec::new();

        for (idx, block) in self.blocks.values().enumerate() {
            let fallthrough = labels.get(idx + 1);
            match block.terminator() {
                Some(term) => {
                    if let Some(target) = term.target() {
                        edges.push((block.label.clone(), target.to_string()));
                    }
                    if term.opcode.falls_through() {
                        if let Some(next) = fallthrough {
                            edges.push((block.label.clone(), next.clone()));
                        }
                    }
                }
                None => {
                    if let Some(next) = fallthrough {
                        edges.push((block.label.clone(), next.clone()));
                    }
                }
            }
        }

        for block in self.blocks.values_mut() {
            block.preds.clear();
            block.succs.clear();
        }

        for (from, to) in edges {
            if let Some(from_block) = self.blocks.get_mut(&from) {
                from_block.link_succ(&to);
            }
            if let Some(to_block) = self.blocks.get_mut(&to) {
                to_block.link_pred(&from);
            }
        }
    }

    /// Get all virtual registers mentioned in this function, in first-seen order.
    pub fn all_vregs(&self) -> Vec<VReg> {
        let mut vregs = Vec::new();
        for block in self.blocks.values() {
            for inst in &block.insts {
                for vreg in inst.uses().into_iter().chain(inst.def()) {
                    if !vregs.contains(&vreg) {
                        vregs.push(vreg);
                    }
                }
            }
        }
        vregs
    }
}

impl fmt::Display for MachineFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same layout the parser reads
        writeln!(f, "func {} {{", self.name)?;
        for param in &self.params {
            writeln!(f, "    param {}", param)?;
        }
        if let Some(ret) = self.ret_vreg {
            writeln!(f, "    ret {}", ret)?;
        }
        for (vreg, class) in &self.reg_classes {
            writeln!(f, "    class {} {}", vreg, class)?;
        }
        for (vreg, regs) in &self.hints {
            writeln!(f, "    hint {} {}", vreg, regs.join(", "))?;
        }
        for block in self.blocks.values() {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::MachineInst;

    #[test]
    fn test_function_basic() {
        let mut func = MachineFunction::new("test");

        let v0 = func.new_vreg();
        let v1 = func.new_vreg();
        assert_eq!(v0.id(), 0);
        assert_eq!(v1.id(), 1);
        assert_eq!(func.num_vregs(), 2);

        let mut entry = MachineBlock::new("entry");
        entry.push(MachineInst::add(v0, v0, v1));
        entry.push(MachineInst::ret());
        func.add_block(entry);

        assert_eq!(func.entry, "entry");
        assert!(func.get_block("entry").is_some());
        assert_eq!(func.num_insts(), 2);
    }

    #[test]
    fn test_rebuild_cfg_fallthrough() {
        let mut func = MachineFunction::new("cfg");
        let a = func.new_vreg();
        let b = func.new_vreg();

        let mut entry = MachineBlock::new("entry");
        entry.push(MachineInst::li(a, 1));
        entry.push(MachineInst::li(b, 2));
        entry.push(MachineInst::beq(a, b, "exit"));
        func.add_block(entry);

        let mut mid = MachineBlock::new("mid");
        mid.push(MachineInst::jal(func.new_vreg(), "exit"));
        func.add_block(mid);

        let mut exit = MachineBlock::new("exit");
        exit.push(MachineInst::ret());
        func.add_block(exit);

        func.rebuild_cfg();

        assert_eq!(func.get_block("entry").unwrap().succs, vec!["exit", "mid"]);
        assert_eq!(func.get_block("mid").unwrap().succs, vec!["exit"]);
        assert!(func.get_block("exit").unwrap().succs.is_empty());
        assert_eq!(func.get_block("exit").unwrap().preds, vec!["entry", "mid"]);
    }

    #[test]
    fn test_reserve_vreg() {
        let mut func = MachineFunction::new("f");
        func.reserve_vreg(VReg(9));
        assert_eq!(func.new_vreg(), VReg(10));
    }
}
