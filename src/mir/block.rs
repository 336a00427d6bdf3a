//! Machine basic blocks.

use super::instruction::MachineInst;
use super::value::VReg;
use std::collections::HashSet;
use std::fmt;

/// A labelled run of instructions with its CFG edges.
///
/// `loop_depth` stands in for execution frequency: spill costs of the
/// block's def/use sites are scaled by `10^loop_depth`.
#[derive(Debug, Clone)]
pub struct MachineBlock {
    pub label: String,
    /// Loop nesting depth (0 = not inside any loop)
    pub loop_depth: u32,
    pub insts: Vec<MachineInst>,
    /// Filled in by [`MachineFunction::rebuild_cfg`](super::MachineFunction::rebuild_cfg)
    pub preds: Vec<String>,
    pub succs: Vec<String>,
}

impl MachineBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            loop_depth: 0,
            insts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// Builder-style loop depth.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.loop_depth = depth;
        self
    }

    pub fn push(&mut self, inst: MachineInst) {
        self.insts.push(inst);
    }

    /// The last instruction, if it ends the block.
    pub fn terminator(&self) -> Option<&MachineInst> {
        self.insts.last().filter(|inst| inst.is_terminator())
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    /// Registers read before any write in this block.
    pub fn upward_exposed(&self) -> HashSet<VReg> {
        let mut defined = HashSet::new();
        let mut exposed = HashSet::new();
        for inst in &self.insts {
            for vreg in inst.uses() {
                if !defined.contains(&vreg) {
                    exposed.insert(vreg);
                }
            }
            defined.extend(inst.def());
        }
        exposed
    }

    /// Registers written anywhere in this block.
    pub fn defined(&self) -> HashSet<VReg> {
        self.insts.iter().filter_map(MachineInst::def).collect()
    }

    pub(crate) fn link_pred(&mut self, label: &str) {
        if !self.preds.iter().any(|p| p == label) {
            self.preds.push(label.to_string());
        }
    }

    pub(crate) fn link_succ(&mut self, label: &str) {
        if !self.succs.iter().any(|s| s == label) {
            self.succs.push(label.to_string());
        }
    }
}

impl fmt::Display for MachineBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loop_depth {
            0 => writeln!(f, "block {}:", self.label)?,
            depth => writeln!(f, "block {} depth {}:", self.label, depth)?,
        }
        for inst in &self.insts {
            writeln!(f, "    {}", inst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator() {
        let mut block = MachineBlock::new("entry");
        assert!(block.is_empty());
        assert_eq!(block.loop_depth, 0);

        block.push(MachineInst::add(VReg(0), VReg(1), VReg(2)));
        assert_eq!(block.len(), 1);
        assert!(block.terminator().is_none());

        block.push(MachineInst::ret());
        assert!(block.terminator().is_some());
    }

    #[test]
    fn test_upward_exposed_and_defined() {
        let mut block = MachineBlock::new("b");
        block.push(MachineInst::li(VReg(0), 1));
        block.push(MachineInst::add(VReg(2), VReg(0), VReg(1)));
        block.push(MachineInst::addi(VReg(1), VReg(2), 1));

        let exposed = block.upward_exposed();
        assert_eq!(exposed, HashSet::from([VReg(1)]));
        assert_eq!(block.defined(), HashSet::from([VReg(0), VReg(1), VReg(2)]));
    }

    #[test]
    fn test_display_matches_text_format() {
        let mut block = MachineBlock::new("body").with_depth(2);
        block.push(MachineInst::ret());
        assert_eq!(block.to_string(), "block body depth 2:\n    ret\n");
    }
}
