//! Liveness analysis for register allocation.
//!
//! Computes a [`LiveInterval`] for each virtual register with a backward
//! dataflow pass over the CFG, then walks every block backwards to turn the
//! live-in/live-out sets into ranges of program points.
//!
//! Registers live into the function (parameters) get an entry site on
//! instruction 0, so spilling them stores the incoming value first.

use super::interval::{LiveInterval, LiveRange, ProgramPoint, UseSite};
use super::provider::LiveIntervalProvider;
use crate::mir::{MachineFunction, VReg};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Liveness information for a function.
#[derive(Debug, Clone)]
pub struct Liveness {
    /// Interval of each virtual register
    intervals: IndexMap<VReg, LiveInterval>,
    /// Registers live-in to each block
    live_in: HashMap<String, HashSet<VReg>>,
    /// Registers live-out of each block
    live_out: HashMap<String, HashSet<VReg>>,
    /// Number of instructions in the function
    num_insts: u32,
}

impl Liveness {
    /// Registers live on entry to `label`.
    pub fn live_in(&self, label: &str) -> Option<&HashSet<VReg>> {
        self.live_in.get(label)
    }

    /// Registers live on exit from `label`.
    pub fn live_out(&self, label: &str) -> Option<&HashSet<VReg>> {
        self.live_out.get(label)
    }

    /// Number of instructions numbered.
    pub fn num_insts(&self) -> u32 {
        self.num_insts
    }

    /// Is `vreg` live at `point`?
    pub fn is_live_at(&self, vreg: VReg, point: ProgramPoint) -> bool {
        self.intervals
            .get(&vreg)
            .map(|li| li.contains(point))
            .unwrap_or(false)
    }

    /// All intervals, in first-seen order.
    pub fn intervals(&self) -> &IndexMap<VReg, LiveInterval> {
        &self.intervals
    }
}

impl LiveIntervalProvider for Liveness {
    fn vregs(&self) -> Vec<VReg> {
        self.intervals.keys().copied().collect()
    }

    fn interval_of(&self, vreg: VReg) -> Option<&LiveInterval> {
        self.intervals.get(&vreg)
    }

    fn commit_split(&mut self, parent: VReg, children: &[(VReg, LiveInterval)]) {
        self.intervals.shift_remove(&parent);
        for (child, interval) in children {
            self.intervals.insert(*child, interval.clone());
        }
    }
}

/// Compute liveness information for a function.
///
/// The CFG edges of `func` must be current (see
/// [`MachineFunction::rebuild_cfg`]).
pub fn compute_liveness(func: &MachineFunction) -> Liveness {
    let labels: Vec<&str> = func.block_labels();

    // Per-block upward-exposed uses and definitions
    let mut upward: HashMap<&str, HashSet<VReg>> = HashMap::new();
    let mut kill: HashMap<&str, HashSet<VReg>> = HashMap::new();
    for block in func.iter_blocks() {
        upward.insert(block.label.as_str(), block.upward_exposed());
        kill.insert(block.label.as_str(), block.defined());
    }

    let mut live_in: HashMap<String, HashSet<VReg>> = HashMap::new();
    let mut live_out: HashMap<String, HashSet<VReg>> = HashMap::new();
    for label in &labels {
        live_in.insert(label.to_string(), HashSet::new());
        live_out.insert(label.to_string(), HashSet::new());
    }

    // Backward dataflow to a fixed point
    let mut changed = true;
    while changed {
        changed = false;

        for block in func.blocks.values().rev() {
            let mut out: HashSet<VReg> = HashSet::new();
            for succ in &block.succs {
                if let Some(succ_in) = live_in.get(succ) {
                    out.extend(succ_in.iter().copied());
                }
            }

            let mut inn: HashSet<VReg> = upward[block.label.as_str()].clone();
            let defs = &kill[block.label.as_str()];
            inn.extend(out.iter().filter(|v| !defs.contains(v)).copied());

            if live_in.get(&block.label) != Some(&inn) {
                live_in.insert(block.label.clone(), inn);
                changed = true;
            }
            if live_out.get(&block.label) != Some(&out) {
                live_out.insert(block.label.clone(), out);
                changed = true;
            }
        }
    }

    // Number instructions globally and build ranges block by block
    let mut intervals: IndexMap<VReg, LiveInterval> = IndexMap::new();
    for vreg in func.all_vregs() {
        intervals.insert(vreg, LiveInterval::new());
    }

    let mut first_inst = 0u32;
    for block in func.iter_blocks() {
        let count = block.insts.len() as u32;
        if count == 0 {
            continue;
        }
        let block_start = ProgramPoint::use_slot(first_inst);
        let block_end = ProgramPoint::after(first_inst + count - 1);
        let depth = block.loop_depth;

        // Open ranges: register -> end point of the range being built
        let mut open: IndexMap<VReg, ProgramPoint> = IndexMap::new();
        let mut outs: Vec<VReg> = live_out[&block.label].iter().copied().collect();
        outs.sort();
        for vreg in outs {
            open.insert(vreg, block_end);
        }

        for (offset, inst) in block.insts.iter().enumerate().rev() {
            let idx = first_inst + offset as u32;

            if let Some(def) = inst.def() {
                let interval = intervals.entry(def).or_default();
                let end = open
                    .shift_remove(&def)
                    .unwrap_or_else(|| ProgramPoint::after(idx));
                interval.add_range(LiveRange::new(ProgramPoint::def_slot(idx), end));
                interval.add_site(UseSite::def(idx, depth));
            }

            for vreg in inst.uses() {
                intervals.entry(vreg).or_default().add_site(UseSite::use_(idx, depth));
                open.entry(vreg).or_insert_with(|| ProgramPoint::def_slot(idx));
            }
        }

        // Whatever is still open in the first block arrives from the caller
        let at_entry = first_inst == 0;
        for (vreg, end) in open {
            let interval = intervals.entry(vreg).or_default();
            interval.add_range(LiveRange::new(block_start, end));
            if at_entry {
                interval.add_site(UseSite::entry(0, depth));
            }
        }

        first_inst += count;
    }

    // First-seen order: interval start, then register number
    intervals.retain(|_, li| !li.is_empty());
    intervals.sort_by(|va, a, vb, b| a.start().cmp(&b.start()).then(va.cmp(vb)));

    Liveness {
        intervals,
        live_in,
        live_out,
        num_insts: first_inst,
    }
}
