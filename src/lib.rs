//! Interference-graph register allocator
//!
//! This crate maps the virtual registers of a machine-level IR onto a small
//! fixed set of physical registers. Allocation proceeds in rounds: build the
//! interference graph, weigh every node by estimated spill cost, simplify
//! the graph onto a stack, select registers (evicting cheaper assignments
//! when needed), and split whatever could not be colored into
//! per-instruction pieces backed by stack slots.
//!
//! The allocator core consumes liveness, register classes and hints through
//! traits in [`regalloc`]; the [`mir`], [`target`] and [`parser`] modules
//! provide a small machine IR, table-driven register files and a text format
//! so the whole pipeline can be driven end to end.

pub mod mir;
pub mod parser;
pub mod regalloc;
pub mod stats;
pub mod target;

pub use regalloc::{allocate, allocate_function, allocate_module, AllocError, Allocation, Allocator};
pub use target::TargetConfig;

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a text MIR file into a module named after the file.
pub fn load_module(path: &Path) -> Result<mir::Module> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    let module = parser::parse_named(&name, &source)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(module)
}

/// Load a target configuration from a JSON file.
pub fn load_target(path: &Path) -> Result<TargetConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: TargetConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse target {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid target {}", path.display()))?;
    Ok(config)
}
