// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-operation legalization of the shared layout space.
//!
//! Each node's candidates are the layouts of its effective tensor type,
//! filtered by what its operation kind accepts:
//!
//! | kind | accepts |
//! |---|---|
//! | matmul | tiled |
//! | conv2d | tiled, no width sharding |
//! | softmax | tiled, interleaved or height sharded |
//! | reshape | the first bulk interleaved layout only |
//! | anything else | everything |
//!
//! A forced output override then narrows the list to the first matching
//! layout, the list is truncated to `max_legal_layouts`, and Conv2d nodes get
//! their (overridden) Conv2d parameters attached to every candidate.

use crate::{
    CandidateSet, LayoutSpace, OpConfig, OpSpecificAttr, OutputLayoutOverride, PlannerError,
    ScalarTypes,
};
use graph_ir::{graph::Validated, Conv2dConfig, Graph, Node, OpKind};
use layout_core::{HardwareDesc, Layout, ShardStrategy};
use std::collections::BTreeMap;

/// Filters the layout space down to each node's legal configurations.
#[derive(Debug, Clone)]
pub struct PerOpLegalizer<'a> {
    hw: &'a HardwareDesc,
    max_legal_layouts: usize,
    output_overrides: &'a BTreeMap<String, OutputLayoutOverride>,
    conv2d_overrides: &'a BTreeMap<String, Conv2dConfig>,
}

impl<'a> PerOpLegalizer<'a> {
    pub fn new(
        hw: &'a HardwareDesc,
        max_legal_layouts: usize,
        output_overrides: &'a BTreeMap<String, OutputLayoutOverride>,
        conv2d_overrides: &'a BTreeMap<String, Conv2dConfig>,
    ) -> Self {
        Self {
            hw,
            max_legal_layouts,
            output_overrides,
            conv2d_overrides,
        }
    }

    /// Legalizes every tensor-producing node outside const-eval functions,
    /// except output-buffer allocations.
    pub fn legalize(
        &self,
        graph: &Graph<Validated>,
        space: &LayoutSpace,
        types: &ScalarTypes,
    ) -> Result<CandidateSet, PlannerError> {
        let mut candidates = CandidateSet::new();
        for (_, func) in graph.optimizable_functions() {
            for &id in &func.body {
                let node = graph.node(id);
                if matches!(node.kind, OpKind::Empty { .. } | OpKind::Return) {
                    continue;
                }
                let Some(tensor) = types.effective_type(graph, id) else {
                    continue;
                };
                let layouts = space.get(&tensor).ok_or_else(|| PlannerError::EmptyLayoutSpace {
                    tensor: tensor.to_string(),
                })?;
                let configs = self.legalize_node(node, layouts, &tensor)?;
                tracing::trace!(
                    "{}: {} legal of {} candidates",
                    node.display_name(),
                    configs.len(),
                    layouts.len()
                );
                candidates.insert(id, configs);
            }
        }
        tracing::debug!("legalized {} nodes", candidates.len());
        Ok(candidates)
    }

    fn legalize_node(
        &self,
        node: &Node,
        layouts: &[Layout],
        tensor: &layout_core::TensorType,
    ) -> Result<Vec<OpConfig>, PlannerError> {
        let mut legal: Vec<Layout> = match node.kind {
            OpKind::Reshape => layouts
                .iter()
                .find(|l| !l.is_scratch())
                .cloned()
                .into_iter()
                .collect(),
            _ => layouts
                .iter()
                .filter(|l| admits(&node.kind, l))
                .cloned()
                .collect(),
        };

        let forced = node.loc.as_ref().and_then(|loc| self.output_overrides.get(loc));
        if let Some(ovr) = forced {
            let chosen = layouts
                .iter()
                .find(|l| ovr.matches(l))
                .cloned()
                .or_else(|| ovr.construct(tensor, self.hw))
                .filter(|l| admits(&node.kind, l));
            legal = chosen.into_iter().collect();
        }

        legal.truncate(self.max_legal_layouts);
        if legal.is_empty() {
            let detail = if forced.is_some() {
                "forced output layout is not legal for this operation"
            } else {
                "no candidate satisfies the operation's layout constraints"
            };
            return Err(PlannerError::NoCandidates {
                node: node.display_name(),
                detail: detail.into(),
            });
        }

        let op_specific = match &node.kind {
            OpKind::Conv2d { config } => {
                let mut conv = config.clone().unwrap_or_default();
                if let Some(ovr) = node.loc.as_ref().and_then(|loc| self.conv2d_overrides.get(loc)) {
                    conv.apply_overrides(ovr);
                }
                Some(OpSpecificAttr::Conv2d(conv))
            }
            _ => None,
        };

        Ok(legal
            .into_iter()
            .map(|output_layout| OpConfig {
                output_layout,
                op_specific: op_specific.clone(),
            })
            .collect())
    }
}

/// Whether an operation of `kind` can produce its result in `layout`.
///
/// Reshape is handled separately: it keeps a single bulk layout.
pub fn admits(kind: &OpKind, layout: &Layout) -> bool {
    if kind.is_compute() && !layout.is_tiled() {
        return false;
    }
    match kind {
        OpKind::Conv2d { .. } => layout.shard_strategy() != Some(ShardStrategy::Width),
        OpKind::Softmax { .. } => matches!(layout.shard_strategy(), None | Some(ShardStrategy::Height)),
        OpKind::Reshape => !layout.is_scratch(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{self, hw};
    use crate::{LayoutSpaceEnumerator, MemoryLayoutKind, ScalarTypeCollector};
    use graph_ir::{NodeId, Operand, ValueType};
    use layout_core::{BufferTier, GridShape, PageMode, Placement, ScalarKind, TensorType};

    fn run(
        graph: &Graph<Validated>,
        hw: &HardwareDesc,
        row_major: bool,
        max: usize,
        outputs: &BTreeMap<String, OutputLayoutOverride>,
        convs: &BTreeMap<String, Conv2dConfig>,
    ) -> Result<CandidateSet, PlannerError> {
        let types = ScalarTypeCollector::collect(graph, &BTreeMap::new());
        let space = LayoutSpaceEnumerator::new(hw, row_major)
            .build(types.per_node.keys().filter_map(|&id| graph.node(id).result.as_ref()))?;
        PerOpLegalizer::new(hw, max, outputs, convs).legalize(graph, &space, &types)
    }

    #[test]
    fn test_skips_empty_and_const_eval() {
        let g = test_graphs::with_const_eval();
        let c = run(&g, &hw(2, 2, 1 << 20), false, 64, &BTreeMap::new(), &BTreeMap::new()).unwrap();
        assert_eq!(c.len(), 1);
        assert!(c.contains_key(&g.find_by_loc("relu_0").unwrap()));
    }

    #[test]
    fn test_kind_rules() {
        let g = test_graphs::matmul_softmax_reshape();
        let c = run(&g, &hw(4, 4, 1 << 20), true, 64, &BTreeMap::new(), &BTreeMap::new()).unwrap();

        let mm = &c[&g.find_by_loc("mm").unwrap()];
        assert!(mm.iter().all(|cfg| cfg.output_layout.is_tiled()));
        assert!(mm.iter().any(|cfg| cfg.output_layout.shard_strategy() == Some(ShardStrategy::Width)));

        let sm = &c[&g.find_by_loc("sm").unwrap()];
        assert!(sm.iter().all(|cfg| matches!(
            cfg.output_layout.shard_strategy(),
            None | Some(ShardStrategy::Height)
        )));

        let rs = &c[&g.find_by_loc("rs").unwrap()];
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].output_layout.placement, Placement::BulkInterleaved);
    }

    #[test]
    fn test_truncation_keeps_order() {
        let g = test_graphs::chain(&[256, 256], 1);
        let hw = hw(8, 8, 1 << 20);
        let full = run(&g, &hw, false, 64, &BTreeMap::new(), &BTreeMap::new()).unwrap();
        let capped = run(&g, &hw, false, 3, &BTreeMap::new(), &BTreeMap::new()).unwrap();
        let id = g.find_by_loc("relu_0").unwrap();
        assert_eq!(capped[&id].len(), 3);
        assert_eq!(&full[&id][..3], &capped[&id][..]);
    }

    #[test]
    fn test_forced_output_override() {
        let g = test_graphs::chain(&[256, 256], 1);
        let outputs = BTreeMap::from([(
            "relu_0".to_string(),
            OutputLayoutOverride {
                grid: Some(GridShape::new(8, 1)),
                memory_layout: Some(MemoryLayoutKind::HeightSharded),
                buffer_tier: Some(BufferTier::Scratch),
                ..Default::default()
            },
        )]);
        let c = run(&g, &hw(8, 8, 1 << 20), false, 64, &outputs, &BTreeMap::new()).unwrap();
        let cfgs = &c[&g.find_by_loc("relu_0").unwrap()];
        assert_eq!(cfgs.len(), 1);
        assert_eq!(cfgs[0].output_layout.grid, GridShape::new(8, 1));
        assert_eq!(cfgs[0].output_layout.shard_strategy(), Some(ShardStrategy::Height));
    }

    #[test]
    fn test_forced_override_outside_space_is_constructed() {
        let g = test_graphs::chain(&[64, 64], 1);
        let outputs = BTreeMap::from([(
            "relu_0".to_string(),
            OutputLayoutOverride {
                page_mode: Some(PageMode::RowMajor),
                buffer_tier: Some(BufferTier::Bulk),
                ..Default::default()
            },
        )]);
        // Row-major enumeration is off; the override still gets its layout.
        let c = run(&g, &hw(2, 2, 1 << 20), false, 64, &outputs, &BTreeMap::new()).unwrap();
        let cfgs = &c[&g.find_by_loc("relu_0").unwrap()];
        assert_eq!(cfgs[0].output_layout.page_mode, PageMode::RowMajor);
    }

    #[test]
    fn test_illegal_forced_override_is_fatal() {
        let g = test_graphs::matmul_softmax_reshape();
        let outputs = BTreeMap::from([(
            "sm".to_string(),
            OutputLayoutOverride {
                memory_layout: Some(MemoryLayoutKind::WidthSharded),
                grid: Some(GridShape::new(1, 4)),
                ..Default::default()
            },
        )]);
        let r = run(&g, &hw(4, 4, 1 << 20), false, 64, &outputs, &BTreeMap::new());
        assert!(matches!(r, Err(PlannerError::NoCandidates { .. })));
    }

    #[test]
    fn test_conv2d_override_attached() {
        let t = TensorType::new(vec![1, 1, 64, 64], ScalarKind::Bf16);
        let mut g = Graph::new("conv");
        let f = g.add_function("forward", vec![ValueType::new(t.clone())]);
        let conv = g.append(
            f,
            OpKind::Conv2d {
                config: Some(Conv2dConfig {
                    activation: Some("relu".into()),
                    ..Default::default()
                }),
            },
            Some("conv_0"),
            vec![Operand::Arg(0)],
            Some(t.clone()),
        );
        g.append(f, OpKind::Return, None, vec![Operand::Node(conv)], None);
        let g = g.validate().unwrap();

        let convs = BTreeMap::from([(
            "conv_0".to_string(),
            Conv2dConfig {
                act_block_h_override: Some(64),
                ..Default::default()
            },
        )]);
        let c = run(&g, &hw(2, 2, 1 << 20), false, 64, &BTreeMap::new(), &convs).unwrap();
        let cfgs = &c[&NodeId(0)];
        assert!(!cfgs.is_empty());
        for cfg in cfgs {
            let conv = cfg.conv2d_config().unwrap();
            assert_eq!(conv.activation.as_deref(), Some("relu"));
            assert_eq!(conv.act_block_h_override, Some(64));
            assert_ne!(cfg.output_layout.shard_strategy(), Some(ShardStrategy::Width));
        }
    }
}
