// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `layout-opt inspect` command: display graph structure and candidate counts.
//!
//! Runs the analysis only; the graph file is never rewritten.

use std::path::PathBuf;

use optimizer::{LayoutOptimizer, OptimizerConfig};

use super::{truncate, HardwareArgs};

pub fn execute(
    graph_path: PathBuf,
    hardware: HardwareArgs,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            layout-opt · Graph Inspector             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let graph = super::load_graph(&graph_path)?;
    let hw = hardware.resolve()?;
    let config = match &config {
        Some(path) => OptimizerConfig::from_file(path)?,
        None => OptimizerConfig::default(),
    };

    // ── Summary ────────────────────────────────────────────────
    println!("  {}", graph.summary());
    println!(
        "  Hardware: {} grid, {:.1} KB usable scratch per core",
        hw.worker_grid,
        hw.usable_scratch_bytes() as f64 / 1024.0,
    );
    println!();

    let analyzed = LayoutOptimizer::new(config, hw).analyze(&graph)?;
    let analysis = analyzed.analysis();

    // ── Per-Function Detail ────────────────────────────────────
    for (index, func) in graph.functions().iter().enumerate() {
        let tag = if func.const_eval { " (const-eval)" } else { "" };
        println!("  Function {index}: {}{tag}", func.name);
        println!(
            "  {:<6} {:<24} {:<12} {:<22} {:>6}",
            "Id", "Name", "Op", "Result", "Cands",
        );
        println!("  {}", "-".repeat(74));

        for &id in &func.body {
            let node = graph.node(id);
            let result = node
                .result
                .as_ref()
                .map_or_else(|| "-".to_string(), |t| t.to_string());
            let candidates = analysis
                .legal
                .get(&id)
                .map_or_else(|| "-".to_string(), |c| c.len().to_string());
            println!(
                "  {:<6} {:<24} {:<12} {:<22} {:>6}",
                id.to_string(),
                truncate(&node.display_name(), 24),
                node.kind.as_str(),
                truncate(&result, 22),
                candidates,
            );
        }
        println!();
    }

    // ── Layout Space ───────────────────────────────────────────
    println!("  Layout space:");
    println!("   Tensor types:     {}", analysis.tensor_types);
    println!(
        "   Scalar kinds:     {}",
        analysis
            .types
            .kinds
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );
    println!(
        "   Total candidates: {}",
        analysis.legal.values().map(Vec::len).sum::<usize>(),
    );
    for warning in &analysis.warnings {
        println!("   warning: {warning}");
    }
    println!();
    Ok(())
}
