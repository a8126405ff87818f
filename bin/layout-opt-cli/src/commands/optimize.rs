// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `layout-opt optimize` command: run the pass and write the rewritten graph.
//!
//! Walks the type-state pipeline explicitly so each stage can be reported:
//! ```text
//! LayoutOptimizer<Configured> → analyze → <Analyzed> → rewrite → report
//! ```

use std::path::PathBuf;

use optimizer::{overrides, LayoutOptimizer, OptimizerConfig};

use super::HardwareArgs;

/// Arguments of `layout-opt optimize`, already split out by clap.
#[derive(Debug, Clone)]
pub struct OptimizeArgs {
    pub graph: PathBuf,
    pub hardware: HardwareArgs,
    pub config: Option<PathBuf>,
    pub policy: Option<String>,
    pub enable_analysis: bool,
    pub no_mem_reconfig: bool,
    pub override_input: Option<String>,
    pub override_output: Option<String>,
    pub override_conv2d: Option<String>,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

pub fn execute(args: OptimizeArgs) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            layout-opt · Graph Optimizer             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let config = build_config(&args)?;
    let hw = args.hardware.resolve()?;

    println!("  Config:");
    println!("   Graph:     {}", args.graph.display());
    println!(
        "   Hardware:  {} grid, {} B scratch/core ({} reserved)",
        hw.worker_grid, hw.scratch_bytes_per_core, hw.scratch_reserved_bytes,
    );
    if config.memory_layout_analysis_enabled {
        println!("   Analysis:  {}", config.memory_layout_analysis_policy);
    } else {
        println!("   Analysis:  disabled");
    }
    println!(
        "   Reconfig:  {}",
        if config.mem_reconfig_enabled { "enabled" } else { "disabled" },
    );
    println!(
        "   Overrides: {} input, {} output, {} conv2d",
        config.override_input_layout.len(),
        config.override_output_layout.len(),
        config.override_conv2d_config.len(),
    );
    println!();

    let mut graph = super::load_graph(&args.graph)?;
    println!("  {}", graph.summary());
    println!();

    // Step 1: Configured → Analyzed. Nothing is mutated yet.
    println!("  [1/2] Analyzing layouts and scheduling memory...");
    let analyzed = LayoutOptimizer::new(config, hw).analyze(&graph)?;
    let analysis = analyzed.analysis();
    println!(
        "        {} tensor types, {} nodes with candidates",
        analysis.tensor_types,
        analysis.legal.len(),
    );
    if let Some(plan) = &analysis.output.plan {
        println!("        {}", plan.summary());
    }
    println!();

    // Step 2: Analyzed → rewritten graph.
    println!("  [2/2] Rewriting graph...");
    let report = analyzed.rewrite(&mut graph)?;
    println!("        {}", report.summary());
    println!();

    if !report.warnings.is_empty() {
        println!("  Warnings:");
        for warning in &report.warnings {
            println!("   - {warning}");
        }
        println!();
    }

    // ── Outputs ────────────────────────────────────────────────
    if let Some(path) = &args.output {
        let json = graph_ir::GraphLoader::to_manifest(&graph).to_json()?;
        std::fs::write(path, json)
            .map_err(|e| anyhow::anyhow!("failed to write graph to '{}': {e}", path.display()))?;
        println!("  Graph written to {}", path.display());
    }
    if let Some(path) = &args.report {
        std::fs::write(path, report.to_json()?)
            .map_err(|e| anyhow::anyhow!("failed to write report to '{}': {e}", path.display()))?;
        println!("  Report written to {}", path.display());
    }

    Ok(())
}

/// Layers command-line flags over the optional TOML file.
fn build_config(args: &OptimizeArgs) -> anyhow::Result<OptimizerConfig> {
    let mut config = match &args.config {
        Some(path) => OptimizerConfig::from_file(path)?,
        None => OptimizerConfig::default(),
    };

    if let Some(policy) = &args.policy {
        config.memory_layout_analysis_policy = policy.clone();
        config.memory_layout_analysis_enabled = true;
    }
    if args.enable_analysis {
        config.memory_layout_analysis_enabled = true;
    }
    if args.no_mem_reconfig {
        config.mem_reconfig_enabled = false;
    }
    if let Some(s) = &args.override_input {
        config
            .override_input_layout
            .extend(overrides::parse_input_layout_overrides(s)?);
    }
    if let Some(s) = &args.override_output {
        config
            .override_output_layout
            .extend(overrides::parse_output_layout_overrides(s)?);
    }
    if let Some(s) = &args.override_conv2d {
        config
            .override_conv2d_config
            .extend(overrides::parse_conv2d_config_overrides(s)?);
    }

    tracing::debug!(?config, "effective optimizer configuration");
    Ok(config)
}
