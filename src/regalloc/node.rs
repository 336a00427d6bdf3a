//! Allocation nodes.
//!
//! Every virtual register the allocator works on, original or created by a
//! split, gets one [`Node`] in an arena. Nodes are addressed by [`NodeId`]
//! and never removed, so ids stay valid for the whole allocation.

use super::interval::LiveInterval;
use crate::mir::VReg;
use crate::target::{PhysReg, RegClassId};
use std::fmt;

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Where a node is in the allocation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting for the next round
    Pending,
    /// In this round's interference graph
    InGraph,
    /// Removed from the graph, waiting on the select stack
    OnStack,
    /// Holding a physical register
    Assigned,
    /// Selection failed; waiting to be split
    NeedsSpill,
    /// Replaced by its split children
    Spilled,
}

/// A virtual register under allocation.
#[derive(Debug, Clone)]
pub struct Node {
    pub vreg: VReg,
    /// The original register this one was split from (itself if unsplit)
    pub origin: VReg,
    pub class: RegClassId,
    pub interval: LiveInterval,
    pub weight: f64,
    pub assignment: Option<PhysReg>,
    pub state: NodeState,
    /// Splitting would shrink the interval
    pub spillable: bool,
    /// The node has lost its register to an eviction before
    pub evicted_once: bool,
}

impl Node {
    pub fn new(vreg: VReg, class: RegClassId, interval: LiveInterval) -> Self {
        let spillable = interval.can_shrink();
        Self {
            vreg,
            origin: vreg,
            class,
            interval,
            weight: 0.0,
            assignment: None,
            state: NodeState::Pending,
            spillable,
            evicted_once: false,
        }
    }

    /// Node for a piece of `origin` created by splitting.
    pub fn split_child(vreg: VReg, origin: VReg, class: RegClassId, interval: LiveInterval) -> Self {
        Self {
            origin,
            spillable: false,
            ..Self::new(vreg, class, interval)
        }
    }

    pub fn is_split_child(&self) -> bool {
        self.vreg != self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regalloc::interval::{LiveRange, ProgramPoint, UseSite};

    #[test]
    fn test_spillable_follows_interval_shape() {
        let dead_def = LiveInterval::for_site(UseSite::def(3, 0));
        assert!(!Node::new(VReg(0), RegClassId(0), dead_def).spillable);

        let mut long = LiveInterval::new();
        long.add_range(LiveRange::new(ProgramPoint(1), ProgramPoint(9)));
        long.add_site(UseSite::def(0, 0));
        long.add_site(UseSite::use_(4, 0));
        let node = Node::new(VReg(1), RegClassId(0), long.clone());
        assert!(node.spillable);
        assert!(!node.is_split_child());

        let child = Node::split_child(VReg(5), VReg(1), RegClassId(0), long);
        assert!(!child.spillable);
        assert!(child.is_split_child());
        assert_eq!(child.state, NodeState::Pending);
    }
}
