//! Physical-register usage record.
//!
//! For every storage unit the matrix lists the nodes currently assigned to a
//! register occupying it. Checking a candidate register then means checking
//! each of its units for an assigned interval overlapping the node's, which
//! handles aliasing registers without special cases. The record survives
//! across rounds: nodes resolved in earlier rounds keep their units.

use super::node::{Node, NodeId};
use crate::target::RegUnit;

#[derive(Debug, Clone)]
pub struct RegMatrix {
    units: Vec<Vec<NodeId>>,
}

impl RegMatrix {
    pub fn new(num_units: usize) -> Self {
        Self {
            units: vec![Vec::new(); num_units],
        }
    }

    /// Record `id` as occupying `units`.
    pub fn assign(&mut self, id: NodeId, units: &[RegUnit]) {
        for unit in units {
            self.units[unit.index()].push(id);
        }
    }

    /// Release the units held by `id`.
    pub fn unassign(&mut self, id: NodeId, units: &[RegUnit]) {
        for unit in units {
            self.units[unit.index()].retain(|&n| n != id);
        }
    }

    /// Assigned nodes on `units` whose interval overlaps the one of `id`,
    /// without duplicates, in assignment order.
    pub fn interfering(&self, id: NodeId, units: &[RegUnit], nodes: &[Node]) -> Vec<NodeId> {
        let interval = &nodes[id.index()].interval;
        let mut found = Vec::new();
        for unit in units {
            for &other in &self.units[unit.index()] {
                if other != id
                    && !found.contains(&other)
                    && nodes[other.index()].interval.overlaps(interval)
                {
                    found.push(other);
                }
            }
        }
        found
    }
}

/// Can `id` take a register occupying `units` without any conflict?
pub fn is_free(matrix: &RegMatrix, id: NodeId, units: &[RegUnit], nodes: &[Node]) -> bool {
    matrix.interfering(id, units, nodes).is_empty()
}
