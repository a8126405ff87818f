// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory-aware scheduling of the legalized graph.
//!
//! The scheduler runs a [`MemoryLayoutPolicy`] over every optimizable
//! function, validates the resulting [`MemoryPlan`], narrows each node's
//! candidates to the chosen one and derives the reconfiguration map from
//! the final layouts.

use crate::reconfig::{compute_reconfigs, Edge, MemReconfigEntry, ReconfigMap};
use crate::{CandidateSet, MemoryLayoutPolicy, MemoryPlan, PlannerError, PolicyInput};
use graph_ir::{graph::Validated, Graph, NodeId};
use layout_core::HardwareDesc;
use scratch_memory::ScratchBudget;
use std::collections::{BTreeMap, BTreeSet};

/// Everything the rewriter needs from scheduling.
#[derive(Debug, Clone)]
pub struct SchedulerOutput {
    /// Candidates per node; a single entry for every scheduled node.
    pub candidates: CandidateSet,
    /// Execution order per function. Functions without an entry keep
    /// their program order.
    pub schedules: BTreeMap<usize, Vec<NodeId>>,
    pub reconfigs: ReconfigMap,
    pub spills: BTreeSet<NodeId>,
    /// The validated plan, when scheduling ran.
    pub plan: Option<MemoryPlan>,
}

impl SchedulerOutput {
    /// Output for a disabled analysis: candidates untouched, no schedule,
    /// no spills, only the user-forced edges.
    pub fn unscheduled(candidates: &CandidateSet, forced: &BTreeSet<Edge>) -> Self {
        Self {
            candidates: candidates.clone(),
            schedules: BTreeMap::new(),
            reconfigs: forced
                .iter()
                .map(|&e| (e, MemReconfigEntry::overridden()))
                .collect(),
            spills: BTreeSet::new(),
            plan: None,
        }
    }
}

/// Runs a memory layout policy under a scratch budget.
pub struct MemoryScheduler {
    policy: Box<dyn MemoryLayoutPolicy>,
    budget: ScratchBudget,
}

impl MemoryScheduler {
    pub fn new(policy: Box<dyn MemoryLayoutPolicy>, budget: ScratchBudget) -> Self {
        Self { policy, budget }
    }

    /// Uses the usable scratch capacity of `hw` as the budget.
    pub fn for_hardware(policy: Box<dyn MemoryLayoutPolicy>, hw: &HardwareDesc) -> Self {
        Self::new(policy, ScratchBudget::from_bytes(hw.usable_scratch_bytes()))
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn budget(&self) -> ScratchBudget {
        self.budget
    }

    /// Schedules every optimizable function.
    ///
    /// `pinned` nodes carry a user-forced output layout; `forced` edges
    /// always receive a reconfiguration.
    pub fn schedule(
        &self,
        graph: &Graph<Validated>,
        candidates: &CandidateSet,
        pinned: &BTreeSet<NodeId>,
        forced: &BTreeSet<Edge>,
    ) -> Result<SchedulerOutput, PlannerError> {
        tracing::info!(
            "scheduling with '{}' under {} per core",
            self.policy.name(),
            self.budget
        );
        let mut plan = MemoryPlan::new(self.policy.name(), self.budget.as_bytes());
        for (func, f) in graph.optimizable_functions() {
            let input = PolicyInput {
                graph,
                func,
                candidates,
                budget: self.budget,
                pinned,
                forced,
            };
            let fp = self.policy.plan_function(&input)?;
            tracing::debug!(
                "@{}: {} nodes scheduled, {} spilled, peak {} B/core",
                f.name,
                fp.schedule.len(),
                fp.spills.len(),
                fp.peak_bytes()
            );
            plan.functions.push(fp);
        }
        plan.validate(graph)?;

        let chosen = plan.chosen();
        let narrowed: CandidateSet = candidates
            .iter()
            .map(|(id, cfgs)| {
                let kept = match chosen.get(id) {
                    Some(c) => vec![c.clone()],
                    None => cfgs.clone(),
                };
                (*id, kept)
            })
            .collect();
        let layouts = chosen
            .iter()
            .map(|(id, c)| (*id, c.output_layout.clone()))
            .collect();
        let reconfigs = compute_reconfigs(graph, &layouts, forced);
        tracing::info!("{}, {} reconfigurations", plan.summary(), reconfigs.len());

        Ok(SchedulerOutput {
            candidates: narrowed,
            schedules: plan.schedules(),
            reconfigs,
            spills: plan.spills(),
            plan: Some(plan),
        })
    }
}

impl std::fmt::Debug for MemoryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryScheduler")
            .field("policy", &self.policy.name())
            .field("budget", &self.budget)
            .finish()
    }
}
