//! Spill-cost estimation.
//!
//! The weight of a node approximates how many memory operations spilling it
//! would cost, discounted by how much pressure it puts on its neighbors:
//!
//! ```text
//! weight = Σ (is_def + is_use + at_entry) × 10^loop_depth / max(1, degree)
//! ```
//!
//! A register live into the function counts its entry as a def, since
//! spilling it means storing the incoming value.
//!
//! Nodes whose interval cannot be shrunk by splitting weigh infinity.

use super::interference::InterferenceGraph;
use super::interval::{LiveInterval, UseSite};
use super::node::Node;

/// Execution-frequency estimate per loop level.
pub const LOOP_FREQUENCY: f64 = 10.0;

/// Cost of the memory traffic one site would need if spilled.
pub fn site_cost(site: &UseSite) -> f64 {
    let accesses = site.is_def as u32 + site.is_use as u32 + site.at_entry as u32;
    accesses as f64 * LOOP_FREQUENCY.powi(site.loop_depth as i32)
}

/// Weight of an interval with `degree` neighbors.
pub fn spill_weight(interval: &LiveInterval, degree: usize, spillable: bool) -> f64 {
    if !spillable {
        return f64::INFINITY;
    }
    let cost: f64 = interval.sites().iter().map(site_cost).sum();
    cost / degree.max(1) as f64
}

/// Compute the weight of every node in `graph`.
pub fn compute_weights(graph: &InterferenceGraph, nodes: &mut [Node]) {
    for id in graph.nodes() {
        let node = &mut nodes[id.index()];
        node.weight = spill_weight(&node.interval, graph.degree(id), node.spillable);
        log::trace!("weight {} = {}", node.vreg, node.weight);
    }
}
