//! intfgraph CLI
//!
//! Runs the register allocator over text MIR files.
//!
//! # Usage
//!
//! ```bash
//! # Allocate with the default 16-register file and print the result
//! intfgraph input.mir
//!
//! # Stress spilling with the two-register preset
//! intfgraph input.mir --preset tiny --emit alloc
//!
//! # Machine-readable report
//! intfgraph input.mir --target my_target.json --emit json -o report.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use intfgraph::regalloc::{self, AllocatedFunction};
use intfgraph::target::RegisterFile;
use intfgraph::TargetConfig;
use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitType {
    /// Emit the rewritten functions over physical registers (default)
    Mir,
    /// Emit the assignment and spill decisions
    Alloc,
    /// Emit a JSON report of every allocation
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "intfgraph",
    version,
    about = "Interference-graph register allocator for text MIR",
    long_about = r#"
intfgraph

Allocates physical registers for functions written in a small text MIR,
spilling to stack slots when the register file runs out.

INPUT FORMAT:
  func NAME {
      param v0
      ret v2
      class v3 CLASS
      hint v4 REG[,REG]
  block LABEL depth N:
      add v2, v0, v1
      ret
  }

PRESETS:
  --preset default   16 registers, 13 allocatable
  --preset tiny      2 allocatable registers
  --preset paired    single/double floating-point registers that alias
"#
)]
struct Args {
    /// Input text MIR file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Use a preset register file
    #[arg(long, value_name = "NAME", conflicts_with = "target")]
    preset: Option<String>,

    /// Load the register file from a JSON target description
    #[arg(long, value_name = "FILE")]
    target: Option<PathBuf>,

    /// Output type
    #[arg(long, value_enum, default_value = "mir")]
    emit: EmitType,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct FunctionReport<'a> {
    name: &'a str,
    /// Assignments by register name
    registers: Vec<(String, &'a str)>,
    #[serde(flatten)]
    allocation: &'a intfgraph::Allocation,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let config = if let Some(path) = &args.target {
        intfgraph::load_target(path)?
    } else {
        let preset_name = args.preset.as_deref().unwrap_or("default");
        TargetConfig::preset(preset_name).ok_or_else(|| anyhow::anyhow!(
            "Unknown preset '{}'. Available presets: {}",
            preset_name,
            TargetConfig::preset_names().join(", ")
        ))?
    };

    let file = config
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    if args.verbose {
        eprintln!("Configuration:");
        eprintln!("  target:    {}", config.name);
        eprintln!("  registers: {}", file.num_regs());
        for class in file.classes() {
            eprintln!("  class {}: {} registers", class.name, class.order.len());
        }
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let module = intfgraph::load_module(&args.input)?;
    let allocated = regalloc::allocate_module(&module, &file)
        .with_context(|| format!("Failed to allocate {}", args.input.display()))?;

    let text = match args.emit {
        EmitType::Mir => allocated
            .iter()
            .map(|f| regalloc::format_function(&f.function, &file))
            .collect::<Vec<_>>()
            .join("\n"),
        EmitType::Alloc => format_allocations(&allocated, &file),
        EmitType::Json => {
            let reports: Vec<FunctionReport> = allocated
                .iter()
                .map(|f| FunctionReport {
                    name: &f.function.name,
                    registers: f
                        .allocation
                        .assignments
                        .iter()
                        .map(|(v, r)| (v.to_string(), file.name(*r)))
                        .collect(),
                    allocation: &f.allocation,
                })
                .collect();
            serde_json::to_string_pretty(&reports)?
        }
    };

    if let Some(output) = &args.output {
        std::fs::write(output, &text)
            .with_context(|| format!("Failed to write {}", output.display()))?;
    } else {
        println!("{}", text);
    }

    if args.verbose {
        let mut total = intfgraph::stats::AllocStats::new();
        for f in &allocated {
            total.merge(&f.allocation.stats);
        }
        eprintln!("Functions:    {}", allocated.len());
        eprintln!("Blocks:       {}", intfgraph::stats::count_blocks(&module));
        eprintln!("Instructions: {}", intfgraph::stats::count_instructions(&module));
        eprintln!("VRegs:        {}", intfgraph::stats::count_vregs(&module));
        total.display();
    }

    Ok(())
}

fn format_allocations(allocated: &[AllocatedFunction], file: &RegisterFile) -> String {
    let mut out = String::new();
    for f in allocated {
        let alloc = &f.allocation;
        let _ = writeln!(out, "{}: {} rounds", f.function.name, alloc.stats.rounds);
        for (vreg, reg) in &alloc.assignments {
            let origin = alloc.origin_of(*vreg);
            if origin == *vreg {
                let _ = writeln!(out, "  {} -> {}", vreg, file.name(*reg));
            } else {
                let _ = writeln!(out, "  {} -> {}  (piece of {})", vreg, file.name(*reg), origin);
            }
        }
        for (vreg, slot) in &alloc.slots {
            let _ = writeln!(out, "  {} spilled to {}", vreg, slot);
        }
        for request in &alloc.spills {
            let _ = writeln!(out, "  {}", request);
        }
    }
    out
}
