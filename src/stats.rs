//! Allocation statistics.
//!
//! Tracks metrics during allocation for verbose output and JSON reports.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Allocation statistics for one function, or summed over a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocStats {
    /// Rounds of build/simplify/select
    pub rounds: usize,
    /// Nodes created (original registers plus split pieces)
    pub nodes: usize,
    /// Assignments revoked by eviction
    pub evictions: usize,
    /// Original registers sent to the stack
    pub spilled_vregs: usize,
    /// Registers created by splitting
    pub split_children: usize,
    /// Reloads requested
    pub spill_loads: usize,
    /// Stores requested
    pub spill_stores: usize,
    /// Hinted registers that were granted
    pub hints_honored: usize,
    /// Time spent allocating
    #[serde(skip)]
    pub time: Duration,
}

impl AllocStats {
    /// Create a new stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add another function's numbers to these.
    pub fn merge(&mut self, other: &AllocStats) {
        self.rounds += other.rounds;
        self.nodes += other.nodes;
        self.evictions += other.evictions;
        self.spilled_vregs += other.spilled_vregs;
        self.split_children += other.split_children;
        self.spill_loads += other.spill_loads;
        self.spill_stores += other.spill_stores;
        self.hints_honored += other.hints_honored;
        self.time += other.time;
    }

    /// Display statistics.
    pub fn display(&self) {
        eprintln!("\n=== Allocation Statistics ===");
        eprintln!("Rounds:         {}", self.rounds);
        eprintln!("Nodes:          {}", self.nodes);
        eprintln!("Evictions:      {}", self.evictions);
        eprintln!("Spilled vregs:  {}", self.spilled_vregs);
        eprintln!("Split children: {}", self.split_children);
        eprintln!("Spill code:     {} loads, {} stores", self.spill_loads, self.spill_stores);
        eprintln!("Hints honored:  {}", self.hints_honored);
        eprintln!("Time:           {:?}", self.time);
    }
}

/// Timer helper for measuring phase durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Stop the timer and return elapsed duration.
    pub fn stop(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Count instructions in a module.
pub fn count_instructions(module: &crate::mir::Module) -> usize {
    module.functions.values()
        .map(|f| f.num_insts())
        .sum()
}

/// Count blocks in a module.
pub fn count_blocks(module: &crate::mir::Module) -> usize {
    module.functions.values()
        .map(|f| f.blocks.len())
        .sum()
}

/// Count vregs in a module.
pub fn count_vregs(module: &crate::mir::Module) -> usize {
    module.functions.values()
        .map(|f| f.num_vregs() as usize)
        .sum()
}
