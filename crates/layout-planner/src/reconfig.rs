// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operand edges that need an explicit layout conversion.
//!
//! Once every node has its final layout, each operand edge is checked
//! against what the consumer requires of that operand:
//!
//! - compute kinds read tiled pages only;
//! - a sharded elementwise op reads same-shaped operands in its own layout;
//! - reshape cannot read sharded tensors;
//! - the output buffer of a destination-style op carries no requirement.
//!
//! User-forced edges are always recorded and convert to the consumer's
//! output layout.

use crate::OpConfig;
use graph_ir::{graph::Validated, Graph, Node, NodeId, OpKind, Operand};
use layout_core::{Layout, TensorType};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One operand edge. `producer` is `None` for function arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub producer: Option<NodeId>,
    pub consumer: NodeId,
    pub operand_index: usize,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.producer {
            Some(p) => write!(f, "{p} -> {}#{}", self.consumer, self.operand_index),
            None => write!(f, "arg -> {}#{}", self.consumer, self.operand_index),
        }
    }
}

/// Reconfiguration decision for one flagged edge.
///
/// Exactly one of `overridden` and `selected` holds. For a selected entry,
/// `reshard_output_config_map` maps the consumer's chosen candidate index to
/// the conversion targets considered, and `selected` indexes into that list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemReconfigEntry {
    pub overridden: bool,
    pub reshard_output_config_map: BTreeMap<usize, Vec<OpConfig>>,
    pub selected: Option<usize>,
}

impl MemReconfigEntry {
    /// An edge forced by the user; the target is derived when rewriting.
    pub fn overridden() -> Self {
        Self {
            overridden: true,
            reshard_output_config_map: BTreeMap::new(),
            selected: None,
        }
    }

    /// An edge flagged by analysis with the chosen conversion target.
    pub fn selected(consumer_config: usize, targets: Vec<OpConfig>, index: usize) -> Self {
        Self {
            overridden: false,
            reshard_output_config_map: BTreeMap::from([(consumer_config, targets)]),
            selected: Some(index),
        }
    }

    /// The selected conversion target, for non-overridden entries.
    pub fn selected_config(&self) -> Option<&OpConfig> {
        let index = self.selected?;
        self.reshard_output_config_map.values().next()?.get(index)
    }

    pub fn is_consistent(&self) -> bool {
        self.overridden != self.selected_config().is_some()
    }
}

/// Flagged edges, ordered.
pub type ReconfigMap = BTreeMap<Edge, MemReconfigEntry>;

/// Layout the consumer needs operand `index` in, when it differs from
/// `producer`. `consumer_layout` is the consumer's final output layout.
pub fn required_layout(
    consumer: &Node,
    consumer_layout: Option<&Layout>,
    index: usize,
    producer: &Layout,
    producer_type: &TensorType,
) -> Option<Layout> {
    if index >= consumer.num_data_operands() {
        return None;
    }
    let mut target = producer.clone();
    match &consumer.kind {
        OpKind::Return | OpKind::ToLayout { .. } | OpKind::Empty { .. } => return None,
        kind if kind.is_compute() && !target.is_tiled() => {
            target = target.with_page_mode(layout_core::PageMode::Tiled, producer_type);
        }
        kind if kind.is_elementwise() => {
            if let (Some(out), Some(result)) = (consumer_layout, &consumer.result) {
                if out.is_sharded() && result.shape == producer_type.shape {
                    target = out.retarget(producer_type);
                }
            }
        }
        OpKind::Reshape if target.is_sharded() => {
            target = target.to_on_chip_interleaved(producer_type);
        }
        _ => {}
    }
    (target != *producer).then_some(target)
}

/// Flags every edge whose consumer needs another layout, plus the
/// user-forced edges.
///
/// `layouts` holds the final layout of every scheduled node; producers
/// outside it (output buffers, unannotated arguments) are not checked.
pub fn compute_reconfigs(
    graph: &Graph<Validated>,
    layouts: &BTreeMap<NodeId, Layout>,
    forced: &BTreeSet<Edge>,
) -> ReconfigMap {
    let mut map = ReconfigMap::new();
    for (fi, func) in graph.optimizable_functions() {
        for &id in &func.body {
            let consumer = graph.node(id);
            for (index, &operand) in consumer.operands.iter().enumerate() {
                let edge = Edge {
                    producer: operand.producer(),
                    consumer: id,
                    operand_index: index,
                };
                if forced.contains(&edge)
                    && index < consumer.num_data_operands()
                    && !matches!(consumer.kind, OpKind::ToLayout { .. })
                {
                    map.insert(edge, MemReconfigEntry::overridden());
                    continue;
                }
                let (producer_layout, producer_type) = match operand {
                    Operand::Node(p) => match (layouts.get(&p), &graph.node(p).result) {
                        (Some(l), Some(t)) => (l.clone(), t.clone()),
                        _ => continue,
                    },
                    Operand::Arg(_) => match graph.operand_type(fi, operand) {
                        Some(v) => match v.layout {
                            Some(l) => (l, v.tensor),
                            None => continue,
                        },
                        None => continue,
                    },
                };
                let producer_type = producer_type.with_scalar_kind(producer_layout.scalar_kind);
                if let Some(target) = required_layout(
                    consumer,
                    layouts.get(&id),
                    index,
                    &producer_layout,
                    &producer_type,
                ) {
                    tracing::trace!("{edge}: {producer_layout} -> {target}");
                    map.insert(edge, MemReconfigEntry::selected(0, vec![OpConfig::new(target)], 0));
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{self, bf16};
    use layout_core::{GridShape, PageMode};

    fn final_layouts(
        g: &Graph<Validated>,
        pick: impl Fn(&TensorType) -> Layout,
    ) -> BTreeMap<NodeId, Layout> {
        g.nodes()
            .iter()
            .filter(|n| !matches!(n.kind, OpKind::Empty { .. } | OpKind::Return))
            .filter_map(|n| n.result.as_ref().map(|t| (n.id, pick(t))))
            .collect()
    }

    #[test]
    fn test_entry_consistency() {
        let sel = MemReconfigEntry::selected(
            0,
            vec![OpConfig::new(Layout::bulk_interleaved(&bf16(&[32, 32]), PageMode::Tiled))],
            0,
        );
        assert!(sel.is_consistent());
        assert!(sel.selected_config().is_some());
        assert!(MemReconfigEntry::overridden().is_consistent());
        let broken = MemReconfigEntry {
            overridden: false,
            reshard_output_config_map: BTreeMap::new(),
            selected: Some(0),
        };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn test_matching_layouts_need_nothing() {
        let g = test_graphs::chain(&[64, 64], 3);
        let layouts = final_layouts(&g, |t| Layout::bulk_interleaved(t, PageMode::Tiled));
        assert!(compute_reconfigs(&g, &layouts, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_sharded_elementwise_requires_own_layout() {
        let g = test_graphs::chain(&[256, 256], 2);
        let r0 = g.find_by_loc("relu_0").unwrap();
        let r1 = g.find_by_loc("relu_1").unwrap();
        let t = bf16(&[256, 256]);
        let mut layouts = BTreeMap::new();
        layouts.insert(r0, Layout::bulk_interleaved(&t, PageMode::Tiled));
        let sharded = Layout::sharded(&t, PageMode::Tiled, GridShape::new(8, 1)).unwrap();
        layouts.insert(r1, sharded.clone());

        let map = compute_reconfigs(&g, &layouts, &BTreeSet::new());
        assert_eq!(map.len(), 1);
        let (edge, entry) = map.iter().next().unwrap();
        assert_eq!(edge.producer, Some(r0));
        assert_eq!(edge.consumer, r1);
        assert_eq!(edge.operand_index, 0);
        assert_eq!(entry.selected_config().unwrap().output_layout, sharded);
    }

    #[test]
    fn test_compute_requires_tiled() {
        let g = test_graphs::matmul_softmax_reshape();
        let mm = g.find_by_loc("mm").unwrap();
        let sm = g.find_by_loc("sm").unwrap();
        let rs = g.find_by_loc("rs").unwrap();
        let t = bf16(&[256, 256]);
        let mut layouts = BTreeMap::new();
        layouts.insert(mm, Layout::bulk_interleaved(&t, PageMode::RowMajor));
        layouts.insert(sm, Layout::sharded(&t, PageMode::Tiled, GridShape::new(8, 1)).unwrap());
        layouts.insert(rs, Layout::bulk_interleaved(&bf16(&[1, 256, 256]), PageMode::Tiled));

        let map = compute_reconfigs(&g, &layouts, &BTreeSet::new());
        let to_sm = &map[&Edge { producer: Some(mm), consumer: sm, operand_index: 0 }];
        let target = &to_sm.selected_config().unwrap().output_layout;
        assert!(target.is_tiled());
        assert!(!target.is_scratch());

        // Reshape reading a sharded tensor gets it interleaved.
        let to_rs = &map[&Edge { producer: Some(sm), consumer: rs, operand_index: 0 }];
        let target = &to_rs.selected_config().unwrap().output_layout;
        assert!(target.is_scratch() && !target.is_sharded());
    }

    #[test]
    fn test_output_buffer_operand_ignored() {
        let g = test_graphs::chain(&[256, 256], 1);
        let r0 = g.find_by_loc("relu_0").unwrap();
        let t = bf16(&[256, 256]);
        let layouts = BTreeMap::from([(
            r0,
            Layout::sharded(&t, PageMode::Tiled, GridShape::new(8, 1)).unwrap(),
        )]);
        // The argument has no layout and the buffer is exempt.
        assert!(compute_reconfigs(&g, &layouts, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_forced_edge_always_recorded() {
        let g = test_graphs::chain(&[64, 64], 2);
        let layouts = final_layouts(&g, |t| Layout::bulk_interleaved(t, PageMode::Tiled));
        let edge = Edge {
            producer: g.find_by_loc("relu_0"),
            consumer: g.find_by_loc("relu_1").unwrap(),
            operand_index: 0,
        };
        let map = compute_reconfigs(&g, &layouts, &BTreeSet::from([edge]));
        assert!(map[&edge].overridden);
    }

    #[test]
    fn test_forced_edge_on_output_buffer_dropped() {
        let g = test_graphs::chain(&[64, 64], 2);
        let layouts = final_layouts(&g, |t| Layout::bulk_interleaved(t, PageMode::Tiled));
        let edge = Edge {
            producer: g.find_by_loc("empty_relu_1"),
            consumer: g.find_by_loc("relu_1").unwrap(),
            operand_index: 1,
        };
        assert!(compute_reconfigs(&g, &layouts, &BTreeSet::from([edge])).is_empty());
    }
}
