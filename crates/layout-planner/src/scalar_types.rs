// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Effective scalar kind of every tensor value.

use graph_ir::{graph::Validated, Graph, NodeId};
use layout_core::{ScalarKind, TensorType};
use std::collections::{BTreeMap, BTreeSet};

/// Result of [`ScalarTypeCollector::collect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalarTypes {
    pub per_node: BTreeMap<NodeId, ScalarKind>,
    pub kinds: BTreeSet<ScalarKind>,
}

impl ScalarTypes {
    /// The node's result type with its effective scalar kind.
    pub fn effective_type(&self, graph: &Graph<Validated>, id: NodeId) -> Option<TensorType> {
        let result = graph.node(id).result.as_ref()?;
        Some(match self.per_node.get(&id) {
            Some(&kind) => result.with_scalar_kind(kind),
            None => result.clone(),
        })
    }
}

/// Collects the scalar kind each tensor will be stored as.
pub struct ScalarTypeCollector;

impl ScalarTypeCollector {
    /// Walks every tensor-producing node of the non-const-eval functions.
    ///
    /// `overrides` maps location names to forced kinds; everything else
    /// keeps the kind of its current result type.
    pub fn collect(
        graph: &Graph<Validated>,
        overrides: &BTreeMap<String, ScalarKind>,
    ) -> ScalarTypes {
        let mut out = ScalarTypes::default();
        for (_, func) in graph.optimizable_functions() {
            for &id in &func.body {
                let node = graph.node(id);
                let Some(result) = &node.result else { continue };
                let kind = node
                    .loc
                    .as_ref()
                    .and_then(|loc| overrides.get(loc))
                    .copied()
                    .unwrap_or(result.scalar_kind);
                out.per_node.insert(id, kind);
                out.kinds.insert(kind);
            }
        }
        tracing::debug!(
            "collected scalar kinds for {} values: {:?}",
            out.per_node.len(),
            out.kinds
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs;

    #[test]
    fn test_defaults_to_result_kind() {
        let g = test_graphs::chain(&[64, 64], 2);
        let types = ScalarTypeCollector::collect(&g, &BTreeMap::new());
        assert_eq!(types.kinds, BTreeSet::from([ScalarKind::Bf16]));
        assert!(types.per_node.values().all(|&k| k == ScalarKind::Bf16));
    }

    #[test]
    fn test_override_wins() {
        let g = test_graphs::chain(&[64, 64], 2);
        let overrides = BTreeMap::from([("relu_1".to_string(), ScalarKind::F32)]);
        let types = ScalarTypeCollector::collect(&g, &overrides);
        let id = g.find_by_loc("relu_1").unwrap();
        assert_eq!(types.per_node[&id], ScalarKind::F32);
        assert_eq!(types.kinds.len(), 2);
        assert_eq!(
            types.effective_type(&g, id).unwrap().scalar_kind,
            ScalarKind::F32
        );
    }

    #[test]
    fn test_skips_const_eval() {
        let g = test_graphs::with_const_eval();
        let types = ScalarTypeCollector::collect(&g, &BTreeMap::new());
        let const_node = g.find_by_loc("ce_reshape").unwrap();
        assert!(!types.per_node.contains_key(&const_node));
    }
}
