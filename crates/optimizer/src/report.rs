// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! What one optimization pass did.
//!
//! [`OptimizationReport`] is the pass-level counterpart of
//! [`layout_planner::MemoryPlan::summary`]: candidate counts, inserted
//! nodes, spills, occupancy and warnings, serialisable for the CLI's
//! `--report` output.

use crate::RewriteStats;
use std::collections::BTreeMap;

/// Summary of an optimization pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct OptimizationReport {
    pub graph_name: String,
    /// Policy that scheduled the graph, when the analysis ran.
    pub policy: Option<String>,
    pub nodes_before: usize,
    pub nodes_after: usize,
    /// Distinct tensor types in the layout space.
    pub tensor_types: usize,
    /// Legal candidates per node, keyed by display name.
    pub legal_candidates: BTreeMap<String, usize>,
    /// Edges flagged for reconfiguration.
    pub reconfigs_flagged: usize,
    pub rewrite: RewriteStats,
    /// Display names of spilled nodes.
    pub spilled: Vec<String>,
    pub peak_scratch_bytes: usize,
    pub budget_bytes: usize,
    pub evictions: u64,
    pub warnings: Vec<String>,
}

impl OptimizationReport {
    pub fn total_candidates(&self) -> usize {
        self.legal_candidates.values().sum()
    }

    pub fn inserted_nodes(&self) -> usize {
        self.nodes_after.saturating_sub(self.nodes_before)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let policy = self.policy.as_deref().unwrap_or("disabled");
        format!(
            "Optimized '{}': {} nodes ({} inserted), {} candidates over {} types, \
             analysis {}, {} reconfigs ({} in place), {} spills, \
             peak {:.1}/{:.1} KB per core, {} warnings",
            self.graph_name,
            self.nodes_after,
            self.inserted_nodes(),
            self.total_candidates(),
            self.tensor_types,
            policy,
            self.rewrite.reconfigs_inserted,
            self.rewrite.reconfigs_in_place,
            self.spilled.len(),
            self.peak_scratch_bytes as f64 / 1024.0,
            self.budget_bytes as f64 / 1024.0,
            self.warnings.len(),
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
