// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Final configuration per node.

use crate::{CandidateSet, OpConfig, PlannerError};
use graph_ir::{graph::Validated, Graph, NodeId};
use std::collections::BTreeMap;

/// Picks the first remaining candidate of every node.
pub struct ConfigSelector;

impl ConfigSelector {
    pub fn select(
        graph: &Graph<Validated>,
        candidates: &CandidateSet,
    ) -> Result<BTreeMap<NodeId, OpConfig>, PlannerError> {
        candidates
            .iter()
            .map(|(&id, cfgs)| match cfgs.first() {
                Some(cfg) => Ok((id, cfg.clone())),
                None => Err(PlannerError::NoCandidates {
                    node: graph.node(id).display_name(),
                    detail: "candidate list is empty".into(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{self, bf16};
    use layout_core::{GridShape, Layout, PageMode};

    #[test]
    fn test_first_candidate_wins() {
        let g = test_graphs::chain(&[64, 64], 1);
        let id = g.find_by_loc("relu_0").unwrap();
        let t = bf16(&[64, 64]);
        let bulk = OpConfig::new(Layout::bulk_interleaved(&t, PageMode::Tiled));
        let l1 = OpConfig::new(Layout::on_chip_interleaved(&t, PageMode::Tiled, GridShape::new(2, 2)));
        let cands = CandidateSet::from([(id, vec![bulk.clone(), l1])]);
        assert_eq!(ConfigSelector::select(&g, &cands).unwrap()[&id], bulk);
    }

    #[test]
    fn test_empty_list_is_error() {
        let g = test_graphs::chain(&[64, 64], 1);
        let id = g.find_by_loc("relu_0").unwrap();
        let cands = CandidateSet::from([(id, vec![])]);
        assert!(matches!(
            ConfigSelector::select(&g, &cands),
            Err(PlannerError::NoCandidates { .. })
        ));
    }
}
