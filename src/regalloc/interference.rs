//! Interference graph.
//!
//! Nodes are the unresolved virtual registers of one round; an edge joins two
//! nodes whose live intervals overlap. Adjacency is kept in insertion order
//! so that iteration, and therefore every tie the allocator breaks, is
//! deterministic.

use super::error::{AllocError, AllocResult};
use super::node::{Node, NodeId};
use indexmap::{IndexMap, IndexSet};

/// Symmetric interference graph without self-loops.
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    adjacency: IndexMap<NodeId, IndexSet<NodeId>>,
}

impl InterferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every node in `ids`, in first-seen order (interval start,
    /// then register number).
    pub fn build(&mut self, ids: &[NodeId], nodes: &[Node]) -> AllocResult<()> {
        let mut order: Vec<NodeId> = ids.to_vec();
        order.sort_by(|a, b| {
            let na = &nodes[a.index()];
            let nb = &nodes[b.index()];
            na.interval
                .start()
                .cmp(&nb.interval.start())
                .then(na.vreg.cmp(&nb.vreg))
        });
        for id in order {
            self.insert(id, nodes)?;
        }
        Ok(())
    }

    /// Add `id`, with an edge to every present node its interval overlaps.
    pub fn insert(&mut self, id: NodeId, nodes: &[Node]) -> AllocResult<()> {
        if self.adjacency.contains_key(&id) {
            return Err(AllocError::InconsistentGraph {
                vreg: nodes[id.index()].vreg,
                reason: "inserted twice".to_string(),
            });
        }

        let interval = &nodes[id.index()].interval;
        let mut neighbors = IndexSet::new();
        for (&other, adj) in self.adjacency.iter_mut() {
            if nodes[other.index()].interval.overlaps(interval) {
                adj.insert(id);
                neighbors.insert(other);
            }
        }
        self.adjacency.insert(id, neighbors);
        Ok(())
    }

    /// Remove `id` and every edge touching it.
    pub fn erase(&mut self, id: NodeId, nodes: &[Node]) -> AllocResult<()> {
        let neighbors = self.adjacency.shift_remove(&id).ok_or_else(|| {
            AllocError::InconsistentGraph {
                vreg: nodes[id.index()].vreg,
                reason: "erased while not in the graph".to_string(),
            }
        })?;
        for n in neighbors {
            if let Some(adj) = self.adjacency.get_mut(&n) {
                adj.shift_remove(&id);
            }
        }
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.adjacency.contains_key(&id)
    }

    /// Number of neighbors (0 for absent nodes).
    pub fn degree(&self, id: NodeId) -> usize {
        self.adjacency.get(&id).map(|adj| adj.len()).unwrap_or(0)
    }

    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.get(&id).into_iter().flat_map(|adj| adj.iter().copied())
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn clear(&mut self) {
        self.adjacency.clear();
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.adjacency.values().map(|adj| adj.len()).sum::<usize>() / 2
    }
}
