// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory plan: the output of a memory layout policy.
//!
//! A plan holds, per function, the execution order of the scheduled nodes,
//! the configuration chosen for each of them, the nodes spilled to bulk
//! memory and the scratch occupancy after every step. It is the contract
//! between the scheduler and the rewriter.

use crate::{OpConfig, PlannerError};
use graph_ir::{graph::Validated, Graph, NodeId};
use scratch_memory::OccupancyStats;
use std::collections::{BTreeMap, BTreeSet};

/// The plan for one function.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FunctionPlan {
    /// Index of the function in the graph.
    pub func: usize,
    /// Scheduled nodes in execution order.
    pub schedule: Vec<NodeId>,
    /// Chosen configuration per scheduled node.
    pub chosen: BTreeMap<NodeId, OpConfig>,
    /// Nodes whose result is evicted to bulk memory right after production.
    pub spills: BTreeSet<NodeId>,
    /// Per-core scratch occupancy while each scheduled node runs, counting
    /// the scratch conversions of its operands.
    pub occupancy_trace: Vec<usize>,
    pub stats: OccupancyStats,
}

impl FunctionPlan {
    pub fn peak_bytes(&self) -> usize {
        self.occupancy_trace.iter().copied().max().unwrap_or(0)
    }
}

/// The complete plan produced by a [`crate::MemoryLayoutPolicy`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryPlan {
    /// Policy name that produced this plan.
    pub policy_name: String,
    /// Usable scratch bytes per core.
    pub budget_bytes: usize,
    pub functions: Vec<FunctionPlan>,
}

impl MemoryPlan {
    pub fn new(policy_name: &str, budget_bytes: usize) -> Self {
        Self {
            policy_name: policy_name.to_string(),
            budget_bytes,
            functions: Vec::new(),
        }
    }

    /// Peak per-core occupancy across all functions.
    pub fn peak_bytes(&self) -> usize {
        self.functions.iter().map(FunctionPlan::peak_bytes).max().unwrap_or(0)
    }

    pub fn spills(&self) -> BTreeSet<NodeId> {
        self.functions.iter().flat_map(|f| f.spills.iter().copied()).collect()
    }

    /// Chosen configuration of every scheduled node.
    pub fn chosen(&self) -> BTreeMap<NodeId, OpConfig> {
        self.functions
            .iter()
            .flat_map(|f| f.chosen.iter().map(|(k, v)| (*k, v.clone())))
            .collect()
    }

    pub fn schedules(&self) -> BTreeMap<usize, Vec<NodeId>> {
        self.functions.iter().map(|f| (f.func, f.schedule.clone())).collect()
    }

    pub fn total_evictions(&self) -> u64 {
        self.functions.iter().map(|f| f.stats.evictions).sum()
    }

    /// Validates the plan against the graph it was made for.
    ///
    /// Checks:
    /// - Every scheduled node is scheduled once and has a chosen config.
    /// - Each schedule is a topological order of its nodes.
    /// - Occupancy never exceeds the budget, and no chosen scratch layout
    ///   is larger than the budget on its own.
    /// - Spilled nodes end in bulk memory.
    pub fn validate(&self, graph: &Graph<Validated>) -> Result<(), PlannerError> {
        let fail = |detail: String| PlannerError::InvalidPlan {
            policy: self.policy_name.clone(),
            detail,
        };

        for fp in &self.functions {
            let mut position = BTreeMap::new();
            for (pos, &id) in fp.schedule.iter().enumerate() {
                if position.insert(id, pos).is_some() {
                    return Err(fail(format!("{id} is scheduled twice")));
                }
            }
            if position.len() != fp.chosen.len() || fp.chosen.keys().any(|k| !position.contains_key(k)) {
                return Err(fail(format!(
                    "function {}: schedule and chosen configs disagree",
                    fp.func
                )));
            }

            for (pos, &id) in fp.schedule.iter().enumerate() {
                for producer in graph.node(id).operands.iter().filter_map(|o| o.producer()) {
                    if position.get(&producer).is_some_and(|&p| p >= pos) {
                        return Err(fail(format!("{id} is scheduled before its operand {producer}")));
                    }
                }
            }

            if let Some(over) = fp.occupancy_trace.iter().find(|&&b| b > self.budget_bytes) {
                return Err(fail(format!(
                    "occupancy {over} exceeds budget {}",
                    self.budget_bytes
                )));
            }

            for (&id, cfg) in &fp.chosen {
                let Some(result) = &graph.node(id).result else { continue };
                let bytes = cfg.output_layout.scratch_bytes_per_core(&result.shape);
                if bytes > self.budget_bytes {
                    return Err(fail(format!("{id} needs {bytes} bytes per core")));
                }
                if fp.spills.contains(&id) && cfg.output_layout.is_scratch() {
                    return Err(fail(format!("spilled {id} is still in scratch memory")));
                }
            }
        }
        Ok(())
    }

    /// Returns a human-readable summary of the plan.
    pub fn summary(&self) -> String {
        let nodes: usize = self.functions.iter().map(|f| f.schedule.len()).sum();
        let peak_kb = self.peak_bytes() as f64 / 1024.0;
        let budget_kb = self.budget_bytes as f64 / 1024.0;
        format!(
            "Plan '{}': {} functions, {} nodes, {} spills, peak {:.1}/{:.1} KB per core",
            self.policy_name,
            self.functions.len(),
            nodes,
            self.spills().len(),
            peak_kb,
            budget_kb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{self, bf16};
    use layout_core::{GridShape, Layout, PageMode};

    fn sample(g: &Graph<Validated>) -> MemoryPlan {
        let t = bf16(&[64, 64]);
        let r0 = g.find_by_loc("relu_0").unwrap();
        let r1 = g.find_by_loc("relu_1").unwrap();
        let scratch = OpConfig::new(Layout::on_chip_interleaved(&t, PageMode::Tiled, GridShape::new(2, 2)));
        let mut plan = MemoryPlan::new("test", 4096);
        plan.functions.push(FunctionPlan {
            func: 0,
            schedule: vec![r0, r1],
            chosen: BTreeMap::from([(r0, scratch.clone()), (r1, scratch)]),
            spills: BTreeSet::new(),
            occupancy_trace: vec![2048, 4096],
            stats: OccupancyStats::default(),
        });
        plan
    }

    #[test]
    fn test_validate_ok() {
        let g = test_graphs::chain(&[64, 64], 2);
        let plan = sample(&g);
        plan.validate(&g).unwrap();
        assert_eq!(plan.peak_bytes(), 4096);
        assert_eq!(plan.schedules()[&0].len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_order() {
        let g = test_graphs::chain(&[64, 64], 2);
        let mut plan = sample(&g);
        plan.functions[0].schedule.reverse();
        assert!(matches!(plan.validate(&g), Err(PlannerError::InvalidPlan { .. })));
    }

    #[test]
    fn test_validate_rejects_over_budget() {
        let g = test_graphs::chain(&[64, 64], 2);
        let mut plan = sample(&g);
        plan.functions[0].occupancy_trace[1] = 5000;
        assert!(plan.validate(&g).is_err());
    }

    #[test]
    fn test_validate_rejects_scratch_spill() {
        let g = test_graphs::chain(&[64, 64], 2);
        let mut plan = sample(&g);
        let r0 = g.find_by_loc("relu_0").unwrap();
        plan.functions[0].spills.insert(r0);
        assert!(plan.validate(&g).is_err());
    }

    #[test]
    fn test_validate_rejects_missing_config() {
        let g = test_graphs::chain(&[64, 64], 2);
        let mut plan = sample(&g);
        let r1 = g.find_by_loc("relu_1").unwrap();
        plan.functions[0].chosen.remove(&r1);
        assert!(plan.validate(&g).is_err());
    }

    #[test]
    fn test_summary() {
        let g = test_graphs::chain(&[64, 64], 2);
        let s = sample(&g).summary();
        assert!(s.contains("Plan 'test'"));
        assert!(s.contains("2 nodes"));
        assert!(s.contains("0 spills"));
    }
}
