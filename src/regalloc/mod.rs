//! Register allocation.
//!
//! An interference-graph allocator with eviction and live-range splitting.
//! Each round builds the graph over the unresolved virtual registers, weighs
//! them by estimated spill cost, simplifies them onto a stack and selects
//! registers in stack order. Registers that cannot be colored are split into
//! per-instruction pieces backed by a stack slot, and the pieces join the
//! next round.
//!
//! The allocator core ([`Allocator`]) talks to its collaborators only
//! through [`LiveIntervalProvider`], [`RegisterClassProvider`] and
//! [`HintProvider`]. [`allocate`] and [`allocate_function`] wire it to the
//! machine IR of this crate.

mod allocator;
mod coloring;
mod error;
mod hints;
mod interference;
mod interval;
mod liveness;
mod matrix;
mod node;
mod provider;
mod rewrite;
mod spill;
mod weight;

pub use allocator::{Allocation, Allocator};
pub use coloring::RoundState;
pub use error::{AllocError, AllocResult};
pub use hints::{AbiHints, FixedHints, HintChain, NoHints};
pub use interference::InterferenceGraph;
pub use interval::{LiveInterval, LiveRange, ProgramPoint, UseSite};
pub use liveness::{compute_liveness, Liveness};
pub use node::{Node, NodeId, NodeState};
pub use provider::{HintProvider, LiveIntervalProvider, RegisterClassProvider, TargetClasses};
pub use rewrite::{format_function, rewrite};
pub use spill::{SpillDirection, SpillRequest};
pub use weight::spill_weight;

use crate::mir::{MachineFunction, Module};
use crate::stats::AllocStats;
use crate::target::{RegisterFile, TargetConfig};
use anyhow::{Context, Result};

/// A function after register allocation.
#[derive(Debug, Clone)]
pub struct AllocatedFunction {
    /// The rewritten function over physical registers
    pub function: MachineFunction,
    /// Assignments, spill requests and statistics
    pub allocation: Allocation,
}

/// Allocate registers for a single function.
pub fn allocate_function(func: &MachineFunction, file: &RegisterFile) -> Result<AllocatedFunction> {
    let mut func = func.clone();
    func.rebuild_cfg();

    let mut liveness = compute_liveness(&func);
    let classes = TargetClasses::new(file, &func)
        .with_context(|| format!("Invalid register class in {}", func.name))?;
    let fixed = FixedHints::from_function(&func, file)
        .with_context(|| format!("Invalid register hint in {}", func.name))?;
    let hints = HintChain::new().with(fixed).with(AbiHints::new(&func, file));

    let allocation = Allocator::new(&mut liveness, &classes, &hints)
        .run()
        .with_context(|| format!("Register allocation failed for {}", func.name))?;
    let function = rewrite(&func, &allocation, file)?;

    Ok(AllocatedFunction { function, allocation })
}

/// Allocate every function of `module`, in declaration order.
pub fn allocate_module(module: &Module, file: &RegisterFile) -> Result<Vec<AllocatedFunction>> {
    module
        .functions
        .values()
        .map(|func| allocate_function(func, file))
        .collect()
}

/// Allocate registers for all functions in a module.
pub fn allocate(module: &Module, config: &TargetConfig) -> Result<Module> {
    let file = config.build().context("Invalid target configuration")?;

    let mut result = Module::new(&module.name);
    let mut stats = AllocStats::new();
    for allocated in allocate_module(module, &file)? {
        stats.merge(&allocated.allocation.stats);
        result.add_function(allocated.function);
    }
    log::debug!(
        "{}: {} rounds, {} spilled, {} evictions",
        module.name,
        stats.rounds,
        stats.spilled_vregs,
        stats.evictions
    );

    Ok(result)
}
