//! Machine instructions.
//!
//! A deliberately small RISC-style instruction set: enough to express
//! straight-line arithmetic, memory traffic, branches and loops so that the
//! register allocator can be driven end to end. Instructions carry at most one
//! destination operand and any number of sources.

use super::value::VReg;
use crate::target::PhysReg;
use std::fmt;

/// Machine opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ========== Arithmetic ==========
    /// ADD: rd = rs1 + rs2
    ADD,
    /// SUB: rd = rs1 - rs2
    SUB,
    /// MUL: rd = rs1 * rs2
    MUL,
    /// ADDI: rd = rs1 + imm
    ADDI,

    // ========== Logical ==========
    /// AND: rd = rs1 & rs2
    AND,
    /// OR: rd = rs1 | rs2
    OR,
    /// XOR: rd = rs1 ^ rs2
    XOR,

    // ========== Compare ==========
    /// SLT: rd = (rs1 < rs2) ? 1 : 0
    SLT,

    // ========== Memory ==========
    /// LW: rd = mem[rs1 + imm]
    LW,
    /// SW: mem[rs1 + imm] = rs2
    SW,

    // ========== Branch ==========
    /// BEQ: if (rs1 == rs2) goto label
    BEQ,
    /// BNE: if (rs1 != rs2) goto label
    BNE,
    /// BLT: if (rs1 < rs2) goto label
    BLT,
    /// BGE: if (rs1 >= rs2) goto label
    BGE,

    // ========== Jump ==========
    /// JAL: rd = return address; goto label
    JAL,

    // ========== Pseudo-ops ==========
    /// MOV rd, rs
    MOV,
    /// LI rd, imm
    LI,
    /// NOP
    NOP,
    /// RET
    RET,
    /// CALL label
    CALL,
}

impl Opcode {
    /// Every opcode, in mnemonic table order.
    pub const ALL: [Opcode; 20] = [
        Opcode::ADD, Opcode::SUB, Opcode::MUL, Opcode::ADDI,
        Opcode::AND, Opcode::OR, Opcode::XOR, Opcode::SLT,
        Opcode::LW, Opcode::SW,
        Opcode::BEQ, Opcode::BNE, Opcode::BLT, Opcode::BGE,
        Opcode::JAL,
        Opcode::MOV, Opcode::LI, Opcode::NOP, Opcode::RET, Opcode::CALL,
    ];

    /// Is this a branch instruction?
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::BEQ | Opcode::BNE | Opcode::BLT | Opcode::BGE)
    }

    /// Is this a terminator instruction?
    pub fn is_terminator(self) -> bool {
        self.is_branch() || matches!(self, Opcode::JAL | Opcode::RET)
    }

    /// Does control fall through to the next block after this terminator?
    pub fn falls_through(self) -> bool {
        !matches!(self, Opcode::JAL | Opcode::RET)
    }

    /// Does the first textual operand name a destination register?
    pub fn has_dst(self) -> bool {
        !matches!(
            self,
            Opcode::SW | Opcode::BEQ | Opcode::BNE | Opcode::BLT | Opcode::BGE |
            Opcode::NOP | Opcode::RET | Opcode::CALL
        )
    }

    /// Is this a register-to-register copy?
    pub fn is_copy(self) -> bool {
        matches!(self, Opcode::MOV)
    }

    /// Look up an opcode by its mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|op| op.to_string() == lower)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::ADD => "add",
            Opcode::SUB => "sub",
            Opcode::MUL => "mul",
            Opcode::ADDI => "addi",
            Opcode::AND => "and",
            Opcode::OR => "or",
            Opcode::XOR => "xor",
            Opcode::SLT => "slt",
            Opcode::LW => "lw",
            Opcode::SW => "sw",
            Opcode::BEQ => "beq",
            Opcode::BNE => "bne",
            Opcode::BLT => "blt",
            Opcode::BGE => "bge",
            Opcode::JAL => "jal",
            Opcode::MOV => "mov",
            Opcode::LI => "li",
            Opcode::NOP => "nop",
            Opcode::RET => "ret",
            Opcode::CALL => "call",
        };
        write!(f, "{}", name)
    }
}

/// An operand for a machine instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Virtual register (before register allocation)
    VReg(VReg),
    /// Physical register
    Reg(PhysReg),
    /// Immediate value
    Imm(i64),
    /// Label (block name or function name)
    Label(String),
    /// Memory operand: base register + offset
    Mem { base: VReg, offset: i32 },
    /// Memory operand with physical register
    MemReg { base: PhysReg, offset: i32 },
}

impl Operand {
    /// Is this a virtual register?
    pub fn is_vreg(&self) -> bool {
        matches!(self, Operand::VReg(_))
    }

    /// Get as virtual register if applicable.
    pub fn as_vreg(&self) -> Option<VReg> {
        match self {
            Operand::VReg(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::VReg(v) => write!(f, "{}", v),
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Imm(i) => write!(f, "{}", i),
            Operand::Label(l) => write!(f, "{}", l),
            Operand::Mem { base, offset } => write!(f, "{}({})", offset, base),
            Operand::MemReg { base, offset } => write!(f, "{}({})", offset, base),
        }
    }
}

/// A machine instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineInst {
    /// Opcode
    pub opcode: Opcode,
    /// Destination operand (if any)
    pub dst: Option<Operand>,
    /// Source operands
    pub srcs: Vec<Operand>,
    /// Comment for debugging
    pub comment: Option<String>,
}

impl MachineInst {
    /// Create a new instruction.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            dst: None,
            srcs: Vec::new(),
            comment: None,
        }
    }

    /// Set the destination.
    pub fn dst(mut self, dst: Operand) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Add a source operand.
    pub fn src(mut self, src: Operand) -> Self {
        self.srcs.push(src);
        self
    }

    /// Add a comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Create ADD rd, rs1, rs2
    pub fn add(rd: VReg, rs1: VReg, rs2: VReg) -> Self {
        Self::new(Opcode::ADD)
            .dst(Operand::VReg(rd))
            .src(Operand::VReg(rs1))
            .src(Operand::VReg(rs2))
    }

    /// Create ADDI rd, rs1, imm
    pub fn addi(rd: VReg, rs1: VReg, imm: i64) -> Self {
        Self::new(Opcode::ADDI)
            .dst(Operand::VReg(rd))
            .src(Operand::VReg(rs1))
            .src(Operand::Imm(imm))
    }

    /// Create MOV rd, rs
    pub fn mov(rd: VReg, rs: VReg) -> Self {
        Self::new(Opcode::MOV)
            .dst(Operand::VReg(rd))
            .src(Operand::VReg(rs))
    }

    /// Create LI rd, imm
    pub fn li(rd: VReg, imm: i64) -> Self {
        Self::new(Opcode::LI)
            .dst(Operand::VReg(rd))
            .src(Operand::Imm(imm))
    }

    /// Create LW rd, offset(base)
    pub fn lw(rd: VReg, base: VReg, offset: i32) -> Self {
        Self::new(Opcode::LW)
            .dst(Operand::VReg(rd))
            .src(Operand::Mem { base, offset })
    }

    /// Create SW rs, offset(base)
    pub fn sw(rs: VReg, base: VReg, offset: i32) -> Self {
        Self::new(Opcode::SW)
            .src(Operand::VReg(rs))
            .src(Operand::Mem { base, offset })
    }

    /// Create BEQ rs1, rs2, label
    pub fn beq(rs1: VReg, rs2: VReg, label: impl Into<String>) -> Self {
        Self::new(Opcode::BEQ)
            .src(Operand::VReg(rs1))
            .src(Operand::VReg(rs2))
            .src(Operand::Label(label.into()))
    }

    /// Create BNE rs1, rs2, label
    pub fn bne(rs1: VReg, rs2: VReg, label: impl Into<String>) -> Self {
        Self::new(Opcode::BNE)
            .src(Operand::VReg(rs1))
            .src(Operand::VReg(rs2))
            .src(Operand::Label(label.into()))
    }

    /// Create BLT rs1, rs2, label
    pub fn blt(rs1: VReg, rs2: VReg, label: impl Into<String>) -> Self {
        Self::new(Opcode::BLT)
            .src(Operand::VReg(rs1))
            .src(Operand::VReg(rs2))
            .src(Operand::Label(label.into()))
    }

    /// Create JAL rd, label
    pub fn jal(rd: VReg, label: impl Into<String>) -> Self {
        Self::new(Opcode::JAL)
            .dst(Operand::VReg(rd))
            .src(Operand::Label(label.into()))
    }

    /// Create RET
    pub fn ret() -> Self {
        Self::new(Opcode::RET)
    }

    /// Physical load used for spill reloads: `lw reg, offset(base)`.
    pub fn reload(reg: PhysReg, base: PhysReg, offset: i32) -> Self {
        Self::new(Opcode::LW)
            .dst(Operand::Reg(reg))
            .src(Operand::MemReg { base, offset })
    }

    /// Physical store used for spill stores: `sw reg, offset(base)`.
    pub fn spill(reg: PhysReg, base: PhysReg, offset: i32) -> Self {
        Self::new(Opcode::SW)
            .src(Operand::Reg(reg))
            .src(Operand::MemReg { base, offset })
    }

    /// Get the destination virtual register if applicable.
    pub fn def(&self) -> Option<VReg> {
        self.dst.as_ref().and_then(|op| op.as_vreg())
    }

    /// Get all used virtual registers.
    pub fn uses(&self) -> Vec<VReg> {
        let mut uses = Vec::new();
        for src in &self.srcs {
            if let Operand::VReg(v) = src {
                uses.push(*v);
            } else if let Operand::Mem { base, .. } = src {
                uses.push(*base);
            }
        }
        uses
    }

    /// Branch or jump target, if any.
    pub fn target(&self) -> Option<&str> {
        self.srcs.iter().find_map(|src| match src {
            Operand::Label(label) => Some(label.as_str()),
            _ => None,
        })
    }

    /// Is this a terminator instruction?
    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }
}

impl fmt::Display for MachineInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;

        if let Some(dst) = &self.dst {
            write!(f, " {}", dst)?;
        }

        for (i, src) in self.srcs.iter().enumerate() {
            if i == 0 && self.dst.is_none() {
                write!(f, " {}", src)?;
            } else {
                write!(f, ", {}", src)?;
            }
        }

        if let Some(comment) = &self.comment {
            write!(f, "  # {}", comment)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_display() {
        let inst = MachineInst::add(VReg(0), VReg(1), VReg(2));
        assert_eq!(format!("{}", inst), "add v0, v1, v2");

        let inst = MachineInst::addi(VReg(0), VReg(1), 42);
        assert_eq!(format!("{}", inst), "addi v0, v1, 42");

        let inst = MachineInst::lw(VReg(0), VReg(1), 8);
        assert_eq!(format!("{}", inst), "lw v0, 8(v1)");

        let inst = MachineInst::sw(VReg(3), VReg(1), -4).comment("store");
        assert_eq!(format!("{}", inst), "sw v3, -4(v1)  # store");
    }

    #[test]
    fn test_def_use() {
        let inst = MachineInst::add(VReg(0), VReg(1), VReg(2));
        assert_eq!(inst.def(), Some(VReg(0)));
        assert_eq!(inst.uses(), vec![VReg(1), VReg(2)]);

        let store = MachineInst::sw(VReg(4), VReg(5), 0);
        assert_eq!(store.def(), None);
        assert_eq!(store.uses(), vec![VReg(4), VReg(5)]);
    }

    #[test]
    fn test_mnemonic_lookup() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_mnemonic(&op.to_string()), Some(op));
        }
        assert_eq!(Opcode::from_mnemonic("ADD"), Some(Opcode::ADD));
        assert_eq!(Opcode::from_mnemonic("frobnicate"), None);
    }

    #[test]
    fn test_terminators() {
        assert!(Opcode::BEQ.is_terminator());
        assert!(Opcode::BEQ.falls_through());
        assert!(Opcode::JAL.is_terminator());
        assert!(!Opcode::JAL.falls_through());
        assert!(!Opcode::ADD.is_terminator());
        assert_eq!(MachineInst::bne(VReg(0), VReg(1), "exit").target(), Some("exit"));
    }
}
