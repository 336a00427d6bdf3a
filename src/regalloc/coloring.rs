//! Simplify/select engine.
//!
//! Simplify repeatedly removes the cheapest node from the graph and pushes
//! it on a stack, so the most expensive nodes end up on top and are colored
//! first. Select pops the stack and gives each node the first register in
//! its candidate order that no overlapping assignment occupies, evicting
//! cheaper spillable assignments when nothing is free.

use super::error::AllocResult;
use super::interference::InterferenceGraph;
use super::matrix::{is_free, RegMatrix};
use super::node::{Node, NodeId, NodeState};
use super::provider::RegisterClassProvider;
use crate::target::PhysReg;
use std::fmt;

/// Phase of one allocation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Building,
    Weighing,
    Simplifying,
    Selecting,
    /// Every node of the round got a register
    Done,
    /// Some node has to be split before the next round
    NeedsSpill,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundState::Building => "building",
            RoundState::Weighing => "weighing",
            RoundState::Simplifying => "simplifying",
            RoundState::Selecting => "selecting",
            RoundState::Done => "done",
            RoundState::NeedsSpill => "needs-spill",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of selecting a register for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The register is free
    Free(PhysReg),
    /// The register becomes free once the listed nodes are evicted
    Evict(PhysReg, Vec<NodeId>),
    /// No register can be had
    Spill,
}

/// Empty the graph onto a stack, cheapest node first.
///
/// Ties go to the node inserted first. Every popped node is marked
/// [`NodeState::OnStack`].
pub fn simplify(graph: &mut InterferenceGraph, nodes: &mut [Node]) -> AllocResult<Vec<NodeId>> {
    let mut stack = Vec::with_capacity(graph.len());

    loop {
        let cheapest = graph.nodes().reduce(|best, id| {
            if nodes[id.index()].weight < nodes[best.index()].weight {
                id
            } else {
                best
            }
        });
        let Some(id) = cheapest else { break };

        graph.erase(id, nodes)?;
        nodes[id.index()].state = NodeState::OnStack;
        stack.push(id);
    }

    Ok(stack)
}

/// Registers to try, in order: hints that belong to the class, then the
/// class allocation order. Each register appears once.
pub fn candidates(hints: &[PhysReg], order: &[PhysReg]) -> Vec<PhysReg> {
    let mut result: Vec<PhysReg> = Vec::with_capacity(order.len());
    for &reg in hints.iter().filter(|r| order.contains(r)).chain(order) {
        if !result.contains(&reg) {
            result.push(reg);
        }
    }
    result
}

/// Pick a register for `id` among `candidates`.
///
/// A node that was evicted before may not evict others in turn; it either
/// finds a free register or spills.
pub fn select_register<C>(
    id: NodeId,
    candidates: &[PhysReg],
    classes: &C,
    matrix: &RegMatrix,
    nodes: &[Node],
) -> Selection
where
    C: RegisterClassProvider + ?Sized,
{
    for &reg in candidates {
        if is_free(matrix, id, classes.reg_units(reg), nodes) {
            return Selection::Free(reg);
        }
    }

    let node = &nodes[id.index()];
    if node.evicted_once {
        return Selection::Spill;
    }

    for &reg in candidates {
        let victims = matrix.interfering(id, classes.reg_units(reg), nodes);
        let evictable = victims.iter().all(|v| {
            let victim = &nodes[v.index()];
            victim.spillable && victim.weight <= node.weight
        });
        if evictable {
            return Selection::Evict(reg, victims);
        }
    }

    Selection::Spill
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MachineFunction, VReg};
    use crate::regalloc::interval::{LiveInterval, LiveRange, ProgramPoint, UseSite};
    use crate::regalloc::provider::TargetClasses;
    use crate::target::{RegClassId, TargetConfig};

    fn node(vreg: u32, start: u32, end: u32, weight: f64) -> Node {
        let mut li = LiveInterval::new();
        li.add_range(LiveRange::new(ProgramPoint(start), ProgramPoint(end)));
        li.add_site(UseSite::def(start / 2, 0));
        li.add_site(UseSite::use_((end - 1) / 2 + 1, 0));
        let mut n = Node::new(VReg(vreg), RegClassId(0), li);
        n.weight = weight;
        n
    }

    #[test]
    fn test_simplify_cheapest_first() {
        let mut nodes = vec![node(0, 0, 10, 3.0), node(1, 1, 10, 1.0), node(2, 2, 10, 2.0)];
        let mut graph = InterferenceGraph::new();
        graph.build(&[NodeId(0), NodeId(1), NodeId(2)], &nodes).unwrap();

        let stack = simplify(&mut graph, &mut nodes).unwrap();
        assert_eq!(stack, vec![NodeId(1), NodeId(2), NodeId(0)]);
        assert!(graph.is_empty());
        assert!(nodes.iter().all(|n| n.state == NodeState::OnStack));
    }

    #[test]
    fn test_simplify_ties_first_seen() {
        let mut nodes = vec![node(0, 4, 10, 1.0), node(1, 0, 10, 1.0)];
        let mut graph = InterferenceGraph::new();
        graph.build(&[NodeId(0), NodeId(1)], &nodes).unwrap();

        let stack = simplify(&mut graph, &mut nodes).unwrap();
        // v1 starts earlier, so it is seen first
        assert_eq!(stack, vec![NodeId(1), NodeId(0)]);
    }

    #[test]
    fn test_candidates_hints_first() {
        let order = [PhysReg(1), PhysReg(2), PhysReg(3)];
        assert_eq!(
            candidates(&[PhysReg(3), PhysReg(9), PhysReg(3)], &order),
            vec![PhysReg(3), PhysReg(1), PhysReg(2)]
        );
        assert_eq!(candidates(&[], &order), order.to_vec());
    }

    #[test]
    fn test_select_free_evict_spill() {
        let file = TargetConfig::tiny().build().unwrap();
        let func = MachineFunction::new("f");
        let classes = TargetClasses::new(&file, &func).unwrap();
        let order = classes.order_of(file.default_class()).to_vec();
        let x0 = order[0];

        let mut nodes = vec![node(0, 0, 10, 2.0), node(1, 0, 10, 5.0), node(2, 0, 10, 1.0)];
        let mut matrix = RegMatrix::new(classes.num_units());

        // Free
        assert_eq!(
            select_register(NodeId(0), &order[..1], &classes, &matrix, &nodes),
            Selection::Free(x0)
        );
        matrix.assign(NodeId(0), classes.reg_units(x0));

        // Heavier node evicts the lighter one
        assert_eq!(
            select_register(NodeId(1), &order[..1], &classes, &matrix, &nodes),
            Selection::Evict(x0, vec![NodeId(0)])
        );

        // Lighter node cannot evict
        assert_eq!(
            select_register(NodeId(2), &order[..1], &classes, &matrix, &nodes),
            Selection::Spill
        );

        // A node evicted before cannot evict even when heavier
        nodes[1].evicted_once = true;
        assert_eq!(
            select_register(NodeId(1), &order[..1], &classes, &matrix, &nodes),
            Selection::Spill
        );
    }

    #[test]
    fn test_unspillable_never_evicted() {
        let file = TargetConfig::tiny().build().unwrap();
        let func = MachineFunction::new("f");
        let classes = TargetClasses::new(&file, &func).unwrap();
        let x0 = classes.order_of(file.default_class())[0];

        let mut nodes = vec![node(0, 0, 10, 1.0), node(1, 0, 10, f64::INFINITY)];
        nodes[0].spillable = false;
        let mut matrix = RegMatrix::new(classes.num_units());
        matrix.assign(NodeId(0), classes.reg_units(x0));

        assert_eq!(
            select_register(NodeId(1), &[x0], &classes, &matrix, &nodes),
            Selection::Spill
        );
    }
}
