// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Greedy on-chip interleaved policy.
//!
//! Keeps program order and places each result on-chip interleaved when it
//! fits. Sharded candidates are never chosen, so elementwise chains never
//! need a resharding conversion.

use super::first_fit::{self, FitRules};
use super::{Dependencies, MemoryLayoutPolicy, PolicyInput};
use crate::{FunctionPlan, PlannerError};
use layout_core::{Layout, Placement};

#[derive(Debug, Clone, Default)]
pub struct GreedyL1Interleaved;

impl GreedyL1Interleaved {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn on_chip_interleaved(layout: &Layout) -> bool {
    layout.placement == Placement::OnChipInterleaved
}

impl MemoryLayoutPolicy for GreedyL1Interleaved {
    fn name(&self) -> &str {
        "greedy-l1-interleaved"
    }

    fn plan_function(&self, input: &PolicyInput<'_>) -> Result<FunctionPlan, PlannerError> {
        let deps = Dependencies::new(input);
        let rules = FitRules {
            admit: on_chip_interleaved,
            reuse_chain: false,
        };
        first_fit::schedule(self.name(), input, &deps, deps.program_order(), rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{self, bf16};
    use crate::{CandidateSet, OpConfig};
    use graph_ir::OpKind;
    use layout_core::{GridShape, PageMode};
    use scratch_memory::ScratchBudget;
    use std::collections::BTreeSet;

    #[test]
    fn test_never_picks_sharded() {
        let g = test_graphs::diamond(&[256, 256]);
        let t = bf16(&[256, 256]);
        let cands: CandidateSet = g
            .nodes()
            .iter()
            .filter(|n| n.kind.produces_tensor() && !matches!(n.kind, OpKind::Empty { .. }))
            .map(|n| {
                (
                    n.id,
                    vec![
                        OpConfig::new(Layout::bulk_interleaved(&t, PageMode::Tiled)),
                        OpConfig::new(Layout::sharded(&t, PageMode::Tiled, GridShape::new(8, 1)).unwrap()),
                        OpConfig::new(Layout::on_chip_interleaved(&t, PageMode::Tiled, GridShape::new(8, 8))),
                    ],
                )
            })
            .collect();
        let pinned = BTreeSet::new();
        let forced = BTreeSet::new();
        let plan = GreedyL1Interleaved::new()
            .plan_function(&PolicyInput {
                graph: &g,
                func: 0,
                candidates: &cands,
                budget: ScratchBudget::from_kb(1024),
                pinned: &pinned,
                forced: &forced,
            })
            .unwrap();
        assert_eq!(plan.schedule.len(), 3);
        assert!(plan.chosen.values().all(|c| on_chip_interleaved(&c.output_layout)));
    }
}
