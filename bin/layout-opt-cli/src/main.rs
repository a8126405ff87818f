// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # layout-opt
//!
//! Command-line interface for the layout-and-memory optimizer.
//!
//! ## Usage
//! ```bash
//! # Optimize a graph with sharding analysis on an 8x8 grid
//! layout-opt optimize graph.json --grid 8x8 --scratch 1464K \
//!     --policy df-sharding -o graph.opt.json --report report.json
//!
//! # Force layouts by location
//! layout-opt optimize graph.json --override-output "relu_0=dram:interleaved"
//!
//! # Inspect candidate counts per node
//! layout-opt inspect graph.json --hardware hw.toml
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use commands::optimize::OptimizeArgs;
use commands::HardwareArgs;

#[derive(Parser)]
#[command(
    name = "layout-opt",
    about = "Tensor layout and scratch-memory scheduling for tiled accelerators",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct HardwareOpts {
    /// Hardware description file (TOML, or JSON by extension).
    #[arg(long)]
    hardware: Option<PathBuf>,

    /// Worker grid when no hardware file is given (e.g., "8x8").
    #[arg(long, default_value = "8x8")]
    grid: String,

    /// Scratch memory per core when no hardware file is given (e.g., "1464K").
    #[arg(long, default_value = "1464K")]
    scratch: String,
}

impl From<HardwareOpts> for HardwareArgs {
    fn from(opts: HardwareOpts) -> Self {
        Self {
            hardware: opts.hardware,
            grid: opts.grid,
            scratch: opts.scratch,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Assign layouts, schedule scratch memory and rewrite a graph.
    Optimize {
        /// Path to the graph manifest (JSON).
        graph: PathBuf,

        #[command(flatten)]
        hardware: HardwareOpts,

        /// Optimizer configuration file (TOML). Flags below override it.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Memory layout policy: df-sharding, greedy-l1-interleaved, bf-interleaved.
        /// Implies --enable-analysis.
        #[arg(short, long)]
        policy: Option<String>,

        /// Run the memory layout analysis.
        #[arg(long)]
        enable_analysis: bool,

        /// Do not insert layout conversions.
        #[arg(long)]
        no_mem_reconfig: bool,

        /// Forced conversions, e.g. "add_0=0:1,mm_0=1".
        #[arg(long)]
        override_input: Option<String>,

        /// Forced output layouts, e.g. "relu_0=2x2:l1:block_sharded:tile:bf16".
        #[arg(long)]
        override_output: Option<String>,

        /// Forced Conv2d parameters, e.g. "conv_0=weights_dtype#bf16:act_block_h_override#32".
        #[arg(long)]
        override_conv2d: Option<String>,

        /// Where to write the rewritten graph manifest.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to write the JSON report.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Inspect a graph: print nodes, result types and legal candidate counts.
    Inspect {
        /// Path to the graph manifest (JSON).
        graph: PathBuf,

        #[command(flatten)]
        hardware: HardwareOpts,

        /// Optimizer configuration file (TOML).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Optimize {
            graph,
            hardware,
            config,
            policy,
            enable_analysis,
            no_mem_reconfig,
            override_input,
            override_output,
            override_conv2d,
            output,
            report,
        } => commands::optimize::execute(OptimizeArgs {
            graph,
            hardware: hardware.into(),
            config,
            policy,
            enable_analysis,
            no_mem_reconfig,
            override_input,
            override_output,
            override_conv2d,
            output,
            report,
        }),
        Commands::Inspect {
            graph,
            hardware,
            config,
        } => commands::inspect::execute(graph, hardware.into(), config),
    }
}
