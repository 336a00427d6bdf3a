//! Allocation driver.
//!
//! Runs rounds until every node holds a register:
//!
//! 1. Build the interference graph over the pending nodes
//! 2. Weigh them
//! 3. Simplify onto a stack, cheapest first
//! 4. Select registers in stack order, evicting cheaper assignments when
//!    nothing is free
//! 5. Split every node select gave up on; its pieces and every evicted node
//!    are pending for the next round
//!
//! Nodes evict at most once in their life and every original register is
//! split at most once, so the loop terminates.

use super::coloring::{candidates, select_register, simplify, RoundState, Selection};
use super::error::{AllocError, AllocResult};
use super::interference::InterferenceGraph;
use super::interval::LiveInterval;
use super::matrix::RegMatrix;
use super::node::{Node, NodeId, NodeState};
use super::provider::{HintProvider, LiveIntervalProvider, RegisterClassProvider};
use super::spill::{split_at_sites, SpillDirection, SpillRequest, SpillSlots};
use super::weight::compute_weights;
use crate::mir::VReg;
use crate::stats::{AllocStats, Timer};
use crate::target::{PhysReg, SpillSlot};
use indexmap::IndexMap;
use serde::Serialize;

/// Result of allocating one procedure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Allocation {
    /// Register of every virtual register that ended up in one
    pub assignments: IndexMap<VReg, PhysReg>,
    /// Memory operations to insert, ordered by instruction
    pub spills: Vec<SpillRequest>,
    /// Final intervals of the assigned registers
    pub intervals: IndexMap<VReg, LiveInterval>,
    /// Split piece -> register it was split from
    pub origins: IndexMap<VReg, VReg>,
    /// Stack slot of every spilled original register
    pub slots: IndexMap<VReg, SpillSlot>,
    pub stats: AllocStats,
}

impl Allocation {
    pub fn register_of(&self, vreg: VReg) -> Option<PhysReg> {
        self.assignments.get(&vreg).copied()
    }

    /// Register `vreg` was split from, or `vreg` itself.
    pub fn origin_of(&self, vreg: VReg) -> VReg {
        self.origins.get(&vreg).copied().unwrap_or(vreg)
    }

    pub fn is_spilled(&self, vreg: VReg) -> bool {
        self.slots.contains_key(&vreg)
    }

    /// Split pieces of `origin`, in creation order.
    pub fn pieces_of(&self, origin: VReg) -> impl Iterator<Item = VReg> + '_ {
        self.origins
            .iter()
            .filter(move |(_, o)| **o == origin)
            .map(|(child, _)| *child)
    }

    /// Number of reloads and stores.
    pub fn spill_counts(&self) -> (usize, usize) {
        let loads = self
            .spills
            .iter()
            .filter(|r| r.direction == SpillDirection::Load)
            .count();
        (loads, self.spills.len() - loads)
    }
}

/// Interference-graph allocator for one procedure.
pub struct Allocator<'a, L, C, H>
where
    L: LiveIntervalProvider + ?Sized,
    C: RegisterClassProvider + ?Sized,
    H: HintProvider + ?Sized,
{
    intervals: &'a mut L,
    classes: &'a C,
    hints: &'a H,
    nodes: Vec<Node>,
    graph: InterferenceGraph,
    matrix: RegMatrix,
    slots: SpillSlots,
    spills: Vec<SpillRequest>,
    next_vreg: u32,
    stats: AllocStats,
}

impl<'a, L, C, H> Allocator<'a, L, C, H>
where
    L: LiveIntervalProvider + ?Sized,
    C: RegisterClassProvider + ?Sized,
    H: HintProvider + ?Sized,
{
    pub fn new(intervals: &'a mut L, classes: &'a C, hints: &'a H) -> Self {
        Self {
            intervals,
            classes,
            hints,
            nodes: Vec::new(),
            graph: InterferenceGraph::new(),
            matrix: RegMatrix::new(classes.num_units()),
            slots: SpillSlots::new(),
            spills: Vec::new(),
            next_vreg: 0,
            stats: AllocStats::new(),
        }
    }

    /// Allocate every virtual register the interval provider knows.
    pub fn run(mut self) -> AllocResult<Allocation> {
        let timer = Timer::start();

        let mut pending = self.seed()?;
        self.check_classes()?;

        while !pending.is_empty() {
            self.stats.rounds += 1;
            pending = self.round(pending)?;
        }

        self.stats.time = timer.stop();
        Ok(self.finish())
    }

    fn seed(&mut self) -> AllocResult<Vec<NodeId>> {
        let vregs = self.intervals.vregs();
        self.next_vreg = vregs.iter().map(|v| v.id() + 1).max().unwrap_or(0);

        let mut ids = Vec::with_capacity(vregs.len());
        for vreg in vregs {
            let interval = self
                .intervals
                .interval_of(vreg)
                .cloned()
                .ok_or(AllocError::UnknownInterval { vreg })?;
            let class = self.classes.class_of(vreg);
            ids.push(self.add_node(Node::new(vreg, class, interval)));
        }
        Ok(ids)
    }

    fn check_classes(&self) -> AllocResult<()> {
        for node in &self.nodes {
            if self.classes.order_of(node.class).is_empty() {
                return Err(AllocError::UnassignableRegisterClass {
                    class: self.classes.class_name(node.class).to_string(),
                });
            }
        }
        Ok(())
    }

    fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.stats.nodes += 1;
        id
    }

    /// One build/weigh/simplify/select/spill round. Returns the nodes
    /// pending for the next round.
    fn round(&mut self, pending: Vec<NodeId>) -> AllocResult<Vec<NodeId>> {
        let round = self.stats.rounds;

        log::trace!("round {}: {}", round, RoundState::Building);
        self.graph.clear();
        for &id in &pending {
            self.nodes[id.index()].state = NodeState::InGraph;
        }
        self.graph.build(&pending, &self.nodes)?;
        let edges = self.graph.num_edges();

        log::trace!("round {}: {}", round, RoundState::Weighing);
        compute_weights(&self.graph, &mut self.nodes);

        log::trace!("round {}: {}", round, RoundState::Simplifying);
        let mut stack = simplify(&mut self.graph, &mut self.nodes)?;

        log::trace!("round {}: {}", round, RoundState::Selecting);
        let mut next = Vec::new();
        let mut needs_spill = Vec::new();
        while let Some(id) = stack.pop() {
            match self.select(id) {
                Selection::Free(reg) => self.assign(id, reg),
                Selection::Evict(reg, victims) => {
                    for victim in victims {
                        self.evict(victim, id);
                        next.push(victim);
                    }
                    self.assign(id, reg);
                }
                Selection::Spill => {
                    self.nodes[id.index()].state = NodeState::NeedsSpill;
                    needs_spill.push(id);
                }
            }
        }

        let outcome = if needs_spill.is_empty() {
            RoundState::Done
        } else {
            RoundState::NeedsSpill
        };
        log::trace!("round {}: {}", round, outcome);

        let evicted = next.len();
        let spilled = needs_spill.len();
        for id in needs_spill {
            next.extend(self.spill(id)?);
        }

        log::debug!(
            "round {}: {} nodes, {} edges, {} spilled, {} evicted",
            round,
            pending.len(),
            edges,
            spilled,
            evicted
        );
        Ok(next)
    }

    fn select(&mut self, id: NodeId) -> Selection {
        let classes = self.classes;
        let node = &self.nodes[id.index()];
        let hints = self.hints.hard_hints(node.origin, node.class);
        let order = candidates(&hints, classes.order_of(node.class));

        if !hints.is_empty() {
            let names: Vec<&str> = hints.iter().map(|r| classes.reg_name(*r)).collect();
            log::trace!("{} hints [{}]", node.vreg, names.join(", "));
        }

        let selection = select_register(id, &order, classes, &self.matrix, &self.nodes);
        match &selection {
            Selection::Free(reg) | Selection::Evict(reg, _) => {
                if hints.contains(reg) {
                    self.stats.hints_honored += 1;
                }
                log::trace!("{} -> {}", node.vreg, classes.reg_name(*reg));
            }
            Selection::Spill => log::trace!("{} -> spill (weight {})", node.vreg, node.weight),
        }
        selection
    }

    fn assign(&mut self, id: NodeId, reg: PhysReg) {
        self.matrix.assign(id, self.classes.reg_units(reg));
        let node = &mut self.nodes[id.index()];
        node.assignment = Some(reg);
        node.state = NodeState::Assigned;
    }

    fn evict(&mut self, victim: NodeId, by: NodeId) {
        let classes = self.classes;
        let evictor = self.nodes[by.index()].vreg;
        let node = &mut self.nodes[victim.index()];
        if let Some(reg) = node.assignment.take() {
            self.matrix.unassign(victim, classes.reg_units(reg));
            log::debug!("{} evicted from {} by {}", node.vreg, classes.reg_name(reg), evictor);
        }
        node.state = NodeState::Pending;
        node.evicted_once = true;
        self.stats.evictions += 1;
    }

    /// Split `id` into per-instruction pieces backed by a stack slot.
    fn spill(&mut self, id: NodeId) -> AllocResult<Vec<NodeId>> {
        let node = &self.nodes[id.index()];
        if !node.spillable {
            return Err(AllocError::SpillFailure { vreg: node.vreg });
        }

        let (vreg, origin, class) = (node.vreg, node.origin, node.class);
        let interval = node.interval.clone();
        let slot = self.slots.slot_for(origin);

        let next_vreg = &mut self.next_vreg;
        let split = split_at_sites(&interval, slot, || {
            let child = VReg::new(*next_vreg);
            *next_vreg += 1;
            child
        });

        self.intervals.commit_split(vreg, &split.children);
        self.nodes[id.index()].state = NodeState::Spilled;

        log::debug!("spilled {} to {}: {} pieces", vreg, slot, split.children.len());

        self.stats.spilled_vregs += 1;
        self.stats.split_children += split.children.len();
        for request in &split.requests {
            if request.direction.is_store() {
                self.stats.spill_stores += 1;
            } else {
                self.stats.spill_loads += 1;
            }
        }
        self.spills.extend(split.requests);

        let mut ids = Vec::with_capacity(split.children.len());
        for (child, piece) in split.children {
            ids.push(self.add_node(Node::split_child(child, origin, class, piece)));
        }
        Ok(ids)
    }

    fn finish(mut self) -> Allocation {
        let mut allocation = Allocation::default();

        for node in &self.nodes {
            if node.is_split_child() {
                allocation.origins.insert(node.vreg, node.origin);
            }
            if let (NodeState::Assigned, Some(reg)) = (node.state, node.assignment) {
                allocation.assignments.insert(node.vreg, reg);
                allocation.intervals.insert(node.vreg, node.interval.clone());
            }
        }

        self.spills.sort_by_key(|r| (r.point, r.direction, r.vreg));
        allocation.spills = self.spills;
        allocation.slots = self.slots.into_map();
        allocation.stats = self.stats;
        allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MachineBlock, MachineFunction, MachineInst};
    use crate::regalloc::hints::NoHints;
    use crate::regalloc::liveness::compute_liveness;
    use crate::regalloc::provider::TargetClasses;
    use crate::target::{ClassSpec, RegisterSpec, TargetConfig};

    fn run(func: &mut MachineFunction, config: &TargetConfig) -> AllocResult<Allocation> {
        func.rebuild_cfg();
        let file = config.build().unwrap();
        let classes = TargetClasses::new(&file, func).unwrap();
        let mut liveness = compute_liveness(func);
        Allocator::new(&mut liveness, &classes, &NoHints).run()
    }

    fn single_register() -> TargetConfig {
        TargetConfig {
            name: "single".to_string(),
            registers: vec![
                RegisterSpec { name: "fp".to_string(), covers: vec![] },
                RegisterSpec { name: "r0".to_string(), covers: vec![] },
            ],
            classes: vec![ClassSpec { name: "gpr".to_string(), order: vec!["r0".to_string()] }],
            default_class: "gpr".to_string(),
            arg_regs: vec![],
            ret_regs: vec![],
            callee_saved: vec![],
            frame_pointer: "fp".to_string(),
            slot_size: 4,
        }
    }

    #[test]
    fn test_simple_allocation() {
        let mut func = MachineFunction::new("test");
        let v0 = func.new_vreg();
        let v1 = func.new_vreg();
        let v2 = func.new_vreg();

        let mut entry = MachineBlock::new("entry");
        entry.push(MachineInst::li(v0, 10));
        entry.push(MachineInst::li(v1, 20));
        entry.push(MachineInst::add(v2, v0, v1));
        entry.push(MachineInst::ret());
        func.add_block(entry);

        let alloc = run(&mut func, &TargetConfig::default()).unwrap();
        assert_eq!(alloc.assignments.len(), 3);
        assert_ne!(alloc.register_of(v0), alloc.register_of(v1));
        assert!(alloc.spills.is_empty());
        assert_eq!(alloc.stats.rounds, 1);
        assert_eq!(alloc.stats.evictions, 0);
    }

    #[test]
    fn test_pressure_forces_spill() {
        // Three values live at once, two registers
        let mut func = MachineFunction::new("pressure");
        let a = func.new_vreg();
        let b = func.new_vreg();
        let c = func.new_vreg();
        let d = func.new_vreg();

        let mut entry = MachineBlock::new("entry");
        entry.push(MachineInst::li(a, 1));
        entry.push(MachineInst::li(b, 2));
        entry.push(MachineInst::li(c, 3));
        entry.push(MachineInst::add(d, a, b));
        entry.push(MachineInst::add(d, d, c));
        entry.push(MachineInst::ret());
        func.add_block(entry);

        let alloc = run(&mut func, &TargetConfig::tiny()).unwrap();
        assert!(!alloc.slots.is_empty());
        assert!(alloc.stats.rounds >= 2);

        for &spilled in alloc.slots.keys() {
            assert!(alloc.is_spilled(spilled));
            assert!(!alloc.assignments.contains_key(&spilled));
            assert!(alloc.pieces_of(spilled).count() >= 2);
            for piece in alloc.pieces_of(spilled) {
                assert!(alloc.register_of(piece).is_some());
                assert_eq!(alloc.origin_of(piece), spilled);
            }
        }

        let (loads, stores) = alloc.spill_counts();
        assert_eq!(loads + stores, alloc.spills.len());
        assert!(loads >= 1 && stores >= 1);
    }

    #[test]
    fn test_empty_class_rejected_up_front() {
        let mut config = TargetConfig::tiny();
        config.classes.push(ClassSpec { name: "vec".to_string(), order: vec![] });

        let mut func = MachineFunction::new("f");
        let v = func.new_vreg();
        func.set_class(v, "vec");
        let mut entry = MachineBlock::new("entry");
        entry.push(MachineInst::li(v, 1));
        func.add_block(entry);

        assert_eq!(
            run(&mut func, &config).unwrap_err(),
            AllocError::UnassignableRegisterClass { class: "vec".to_string() }
        );
    }

    #[test]
    fn test_spill_failure_when_pieces_collide() {
        // add needs both operands in registers at once; one register exists
        let mut func = MachineFunction::new("f");
        let a = func.new_vreg();
        let b = func.new_vreg();
        let c = func.new_vreg();
        let mut entry = MachineBlock::new("entry");
        entry.push(MachineInst::li(a, 1));
        entry.push(MachineInst::li(b, 2));
        entry.push(MachineInst::add(c, a, b));
        func.add_block(entry);

        let err = run(&mut func, &single_register()).unwrap_err();
        assert!(matches!(err, AllocError::SpillFailure { .. }));
    }

    struct Forgetful;

    impl LiveIntervalProvider for Forgetful {
        fn vregs(&self) -> Vec<VReg> {
            vec![VReg(3)]
        }

        fn interval_of(&self, _vreg: VReg) -> Option<&LiveInterval> {
            None
        }

        fn commit_split(&mut self, _parent: VReg, _children: &[(VReg, LiveInterval)]) {}
    }

    #[test]
    fn test_unknown_interval() {
        let file = TargetConfig::tiny().build().unwrap();
        let func = MachineFunction::new("f");
        let classes = TargetClasses::new(&file, &func).unwrap();
        let err = Allocator::new(&mut Forgetful, &classes, &NoHints).run().unwrap_err();
        assert_eq!(err, AllocError::UnknownInterval { vreg: VReg(3) });
    }
}
