// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and shared CLI plumbing.

pub mod inspect;
pub mod optimize;

use std::path::{Path, PathBuf};

use layout_core::{GridShape, HardwareDesc};
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over the `-v` count.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose > 1)
        .with_writer(std::io::stderr)
        .init();
}

/// Where the hardware description comes from.
#[derive(Debug, Clone)]
pub struct HardwareArgs {
    pub hardware: Option<PathBuf>,
    pub grid: String,
    pub scratch: String,
}

impl HardwareArgs {
    /// A hardware file wins over the `--grid` / `--scratch` pair.
    pub fn resolve(&self) -> anyhow::Result<HardwareDesc> {
        if let Some(path) = &self.hardware {
            return optimizer::load_hardware(path).map_err(|e| {
                anyhow::anyhow!("failed to load hardware from '{}': {e}", path.display())
            });
        }
        let grid = GridShape::parse(&self.grid)
            .ok_or_else(|| anyhow::anyhow!("invalid worker grid '{}'", self.grid))?;
        let scratch = scratch_memory::ScratchBudget::parse(&self.scratch)
            .map_err(|e| anyhow::anyhow!("invalid scratch size '{}': {e}", self.scratch))?;
        let hw = HardwareDesc::new(grid, scratch.as_bytes());
        hw.validate()?;
        Ok(hw)
    }
}

/// Loads and validates a graph manifest.
pub fn load_graph(path: &Path) -> anyhow::Result<graph_ir::Graph<graph_ir::graph::Validated>> {
    graph_ir::GraphLoader::load(path)
        .map_err(|e| anyhow::anyhow!("failed to load graph from '{}': {e}", path.display()))
}

/// Truncates a string to `max_len` with ellipsis if needed.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
