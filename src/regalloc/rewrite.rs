//! Apply an allocation to a machine function.
//!
//! Virtual register operands become physical registers, spilled registers
//! are read and written through their per-instruction pieces, and the
//! requested reloads and stores are inserted around each instruction against
//! the frame pointer. Stores of incoming values go first, ahead of reloads.

use super::allocator::Allocation;
use super::spill::{SpillDirection, SpillRequest};
use crate::mir::{MachineBlock, MachineFunction, MachineInst, Operand, VReg};
use crate::target::{PhysReg, RegisterFile};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fmt::Write;

/// Rewrite `func` over physical registers.
pub fn rewrite(func: &MachineFunction, allocation: &Allocation, file: &RegisterFile) -> Result<MachineFunction> {
    let rewriter = Rewriter::new(allocation, file)?;

    let mut result = MachineFunction::new(&func.name);
    result.params = func.params.clone();
    result.ret_vreg = func.ret_vreg;
    result.reserve_vreg(VReg::new(func.num_vregs().saturating_sub(1)));

    let mut idx = 0u32;
    let mut removed_copies = 0;
    for block in func.iter_blocks() {
        let mut new_block = MachineBlock::new(&block.label).with_depth(block.loop_depth);
        new_block.preds = block.preds.clone();
        new_block.succs = block.succs.clone();

        for inst in &block.insts {
            let requests = rewriter.requests.get(&idx).map(Vec::as_slice).unwrap_or(&[]);

            for direction in [SpillDirection::Entry, SpillDirection::Load] {
                for request in requests.iter().filter(|r| r.direction == direction) {
                    new_block.push(rewriter.spill_code(request)?);
                }
            }

            let new_inst = rewriter.rewrite_instruction(inst, idx)?;
            if is_identity_copy(&new_inst) {
                removed_copies += 1;
            } else {
                new_block.push(new_inst);
            }

            for request in requests.iter().filter(|r| r.direction == SpillDirection::Store) {
                new_block.push(rewriter.spill_code(request)?);
            }

            idx += 1;
        }

        result.add_block(new_block);
    }

    result.frame.spill_size = allocation.slots.len() as u32 * file.slot_size();
    for reg in allocation.assignments.values() {
        if file.is_callee_saved(*reg) {
            result.frame.note_saved(*reg);
        }
    }

    log::debug!(
        "{}: rewrote {} instructions, {} spill ops, {} copies removed",
        func.name,
        idx,
        allocation.spills.len(),
        removed_copies
    );

    Ok(result)
}

/// `mov r, r` after renaming.
fn is_identity_copy(inst: &MachineInst) -> bool {
    inst.opcode.is_copy()
        && matches!((&inst.dst, inst.srcs.first()), (Some(Operand::Reg(d)), Some(Operand::Reg(s))) if d == s)
}

struct Rewriter<'a> {
    allocation: &'a Allocation,
    file: &'a RegisterFile,
    /// (original register, instruction) -> split piece
    pieces: HashMap<(VReg, u32), VReg>,
    /// instruction -> spill requests attached to it
    requests: HashMap<u32, Vec<SpillRequest>>,
}

impl<'a> Rewriter<'a> {
    fn new(allocation: &'a Allocation, file: &'a RegisterFile) -> Result<Self> {
        let mut pieces = HashMap::new();
        for (&piece, &origin) in &allocation.origins {
            let interval = allocation
                .intervals
                .get(&piece)
                .ok_or_else(|| anyhow!("split piece {} of {} has no interval", piece, origin))?;
            for site in interval.sites() {
                pieces.insert((origin, site.inst), piece);
            }
        }

        let mut requests: HashMap<u32, Vec<SpillRequest>> = HashMap::new();
        for request in &allocation.spills {
            requests.entry(request.point).or_default().push(*request);
        }

        Ok(Self { allocation, file, pieces, requests })
    }

    /// Physical register holding `vreg` at instruction `idx`.
    fn reg_for(&self, vreg: VReg, idx: u32) -> Result<PhysReg> {
        let holder = if self.allocation.is_spilled(vreg) {
            *self
                .pieces
                .get(&(vreg, idx))
                .ok_or_else(|| anyhow!("spilled {} has no piece at instruction {}", vreg, idx))?
        } else {
            vreg
        };
        self.allocation
            .register_of(holder)
            .ok_or_else(|| anyhow!("{} was not allocated a register", holder))
    }

    fn rewrite_operand(&self, operand: &Operand, idx: u32) -> Result<Operand> {
        match operand {
            Operand::VReg(vreg) => Ok(Operand::Reg(self.reg_for(*vreg, idx)?)),
            Operand::Mem { base, offset } => Ok(Operand::MemReg {
                base: self.reg_for(*base, idx)?,
                offset: *offset,
            }),
            other => Ok(other.clone()),
        }
    }

    fn rewrite_instruction(&self, inst: &MachineInst, idx: u32) -> Result<MachineInst> {
        let mut new_inst = inst.clone();
        if let Some(dst) = &inst.dst {
            new_inst.dst = Some(self.rewrite_operand(dst, idx)?);
        }
        new_inst.srcs = inst
            .srcs
            .iter()
            .map(|src| self.rewrite_operand(src, idx))
            .collect::<Result<Vec<_>>>()?;
        Ok(new_inst)
    }

    fn spill_code(&self, request: &SpillRequest) -> Result<MachineInst> {
        let reg = self
            .allocation
            .register_of(request.vreg)
            .ok_or_else(|| anyhow!("spill piece {} was not allocated a register", request.vreg))?;
        let fp = self.file.frame_pointer();
        let offset = request.slot.offset(self.file.slot_size());
        let origin = self.allocation.origin_of(request.vreg);

        Ok(match request.direction {
            SpillDirection::Load => MachineInst::reload(reg, fp, offset).comment(format!("reload {}", origin)),
            SpillDirection::Entry | SpillDirection::Store => {
                MachineInst::spill(reg, fp, offset).comment(format!("spill {}", origin))
            }
        })
    }
}

/// Render a rewritten function with register names instead of numbers.
pub fn format_function(func: &MachineFunction, file: &RegisterFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "function {}:", func.name);
    if func.frame.spill_size > 0 {
        let _ = writeln!(out, "  ; spill area: {} bytes", func.frame.spill_size);
    }
    if !func.frame.saved_regs.is_empty() {
        let saved: Vec<&str> = func.frame.saved_regs.iter().map(|r| file.name(*r)).collect();
        let _ = writeln!(out, "  ; saves: {}", saved.join(", "));
    }

    for block in func.iter_blocks() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}:", block.label);
        for inst in &block.insts {
            let _ = writeln!(out, "    {}", format_instruction(inst, file));
        }
    }
    out
}

fn format_operand(operand: &Operand, file: &RegisterFile) -> String {
    match operand {
        Operand::Reg(r) => file.name(*r).to_string(),
        Operand::MemReg { base, offset } => format!("{}({})", offset, file.name(*base)),
        other => other.to_string(),
    }
}

fn format_instruction(inst: &MachineInst, file: &RegisterFile) -> String {
    let mut operands: Vec<String> = Vec::new();
    if let Some(dst) = &inst.dst {
        operands.push(format_operand(dst, file));
    }
    operands.extend(inst.srcs.iter().map(|s| format_operand(s, file)));

    let mut text = inst.opcode.to_string();
    if !operands.is_empty() {
        text.push(' ');
        text.push_str(&operands.join(", "));
    }
    if let Some(comment) = &inst.comment {
        text.push_str("  # ");
        text.push_str(comment);
    }
    text
}
