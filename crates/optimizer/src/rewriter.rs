// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Applies the analysis results to the graph.
//!
//! Steps, in order:
//! 1. Reorder each scheduled function; output buffers move right before
//!    their destination-style consumer.
//! 2. Retype nodes to their chosen layout, including output buffers and
//!    the targets of existing conversions.
//! 3. Apply Conv2d parameters.
//! 4. Materialize reconfigurations (optional).
//! 5. Materialize spills.
//! 6. Recompute function signatures.
//!
//! A use map (`producer → {(consumer, operand index)}`) is kept up to date
//! while nodes are inserted, so rewiring never scans the graph.

use crate::OptimizerError;
use graph_ir::{graph::Validated, BufferAlloc, Graph, NodeId, OpKind, Operand};
use layout_core::Layout;
use layout_planner::{Edge, MemReconfigEntry, OpConfig, SchedulerOutput};
use std::collections::{BTreeMap, BTreeSet};

/// Counts of what the rewriter changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RewriteStats {
    pub functions_reordered: usize,
    pub nodes_retyped: usize,
    pub conv2d_configured: usize,
    /// Conversions inserted before a consumer.
    pub reconfigs_inserted: usize,
    /// Existing conversions whose target was changed instead.
    pub reconfigs_in_place: usize,
    pub spills_inserted: usize,
}

type UseMap = BTreeMap<NodeId, BTreeSet<(NodeId, usize)>>;

/// Mutates a validated graph to match the analysis.
#[derive(Debug, Clone, Copy)]
pub struct GraphRewriter {
    mem_reconfig_enabled: bool,
}

impl GraphRewriter {
    pub fn new(mem_reconfig_enabled: bool) -> Self {
        Self {
            mem_reconfig_enabled,
        }
    }

    /// Rewrites `graph` in place.
    ///
    /// `chosen` holds the selected configuration of every legalized node.
    pub fn rewrite(
        &self,
        graph: &mut Graph<Validated>,
        chosen: &BTreeMap<NodeId, OpConfig>,
        output: &SchedulerOutput,
    ) -> Result<RewriteStats, OptimizerError> {
        let mut stats = RewriteStats::default();
        let mut owners = graph.owners();
        let mut uses = build_use_map(graph);

        for (&func, schedule) in &output.schedules {
            reorder(graph, func, schedule);
            stats.functions_reordered += 1;
        }

        for (&id, cfg) in chosen {
            if retype(graph, id, &cfg.output_layout) {
                stats.nodes_retyped += 1;
            }
            if let (OpKind::Conv2d { config }, Some(conv)) =
                (&mut graph.node_mut(id).kind, cfg.conv2d_config())
            {
                *config = Some(conv.clone());
                stats.conv2d_configured += 1;
            }
        }

        if self.mem_reconfig_enabled {
            for (edge, entry) in &output.reconfigs {
                let inserted =
                    materialize_reconfig(graph, &mut owners, &mut uses, *edge, entry)?;
                if inserted {
                    stats.reconfigs_inserted += 1;
                } else {
                    stats.reconfigs_in_place += 1;
                }
            }
        }

        for &id in &output.spills {
            materialize_spill(graph, &mut owners, &mut uses, id)?;
            stats.spills_inserted += 1;
        }

        let funcs: Vec<usize> = graph.optimizable_functions().map(|(fi, _)| fi).collect();
        for fi in funcs {
            let types = graph.return_types(fi);
            graph.function_mut(fi).result_types = types;
        }

        tracing::debug!(
            "rewrite: {} retyped, {} conversions inserted, {} updated in place, {} spills",
            stats.nodes_retyped,
            stats.reconfigs_inserted,
            stats.reconfigs_in_place,
            stats.spills_inserted
        );
        Ok(stats)
    }
}

// ── Steps ──────────────────────────────────────────────────────────

fn build_use_map(graph: &Graph<Validated>) -> UseMap {
    let mut uses = UseMap::new();
    for (_, func) in graph.optimizable_functions() {
        for &id in &func.body {
            for (index, operand) in graph.node(id).operands.iter().enumerate() {
                if let Some(p) = operand.producer() {
                    uses.entry(p).or_default().insert((id, index));
                }
            }
        }
    }
    uses
}

/// Puts the scheduled nodes first in schedule order, each preceded by any
/// unscheduled producer it needs. Everything else keeps its relative
/// order, and the return node stays last.
fn reorder(graph: &mut Graph<Validated>, func: usize, schedule: &[NodeId]) {
    let Some(f) = graph.functions().get(func) else {
        return;
    };
    let ret = f.return_node();
    let body: BTreeSet<NodeId> = f.body.iter().copied().collect();
    let rest: Vec<NodeId> = f.body.iter().copied().filter(|&id| Some(id) != ret).collect();

    let mut placed = BTreeSet::new();
    let mut order = Vec::with_capacity(body.len());
    for &id in schedule.iter().chain(&rest) {
        place(graph, &body, &mut placed, &mut order, id);
    }
    order.extend(ret);
    graph.function_mut(func).body = order;
}

fn place(
    graph: &Graph<Validated>,
    body: &BTreeSet<NodeId>,
    placed: &mut BTreeSet<NodeId>,
    order: &mut Vec<NodeId>,
    id: NodeId,
) {
    if !body.contains(&id) || !placed.insert(id) {
        return;
    }
    for p in graph.node(id).operands.iter().filter_map(|o| o.producer()) {
        place(graph, body, placed, order, p);
    }
    order.push(id);
}

/// Sets the node's result kind and layout. Returns whether anything
/// changed.
fn retype(graph: &mut Graph<Validated>, id: NodeId, layout: &Layout) -> bool {
    let node = graph.node_mut(id);
    let before = (node.result.clone(), node.layout.clone());
    if let Some(result) = &mut node.result {
        *result = result.with_scalar_kind(layout.scalar_kind);
    }
    node.layout = Some(layout.clone());
    if let OpKind::ToLayout { target } = &mut node.kind {
        *target = layout.clone();
    }
    let changed = before != (node.result.clone(), node.layout.clone());

    if let Some(buffer) = node.dps_init() {
        let buf = graph.node_mut(buffer);
        if let Some(result) = &mut buf.result {
            *result = result.with_scalar_kind(layout.scalar_kind);
        }
        buf.layout = Some(layout.clone());
        if let OpKind::Empty { alloc } = &mut buf.kind {
            *alloc = BufferAlloc::from_layout(layout);
        }
    }
    changed
}

/// Applies one reconfiguration. Returns `true` when a conversion node was
/// inserted, `false` when an existing one was updated.
fn materialize_reconfig(
    graph: &mut Graph<Validated>,
    owners: &mut BTreeMap<NodeId, usize>,
    uses: &mut UseMap,
    edge: Edge,
    entry: &MemReconfigEntry,
) -> Result<bool, OptimizerError> {
    let stale = |what: &str| OptimizerError::StaleAnalysis(format!("{edge}: {what}"));
    let func = *owners.get(&edge.consumer).ok_or_else(|| stale("consumer not in any function"))?;
    let operand = *graph
        .node(edge.consumer)
        .operands
        .get(edge.operand_index)
        .ok_or_else(|| stale("operand index out of range"))?;
    let producer = graph
        .operand_type(func, operand)
        .ok_or_else(|| stale("operand has no tensor type"))?;

    let target = if entry.overridden {
        graph
            .node(edge.consumer)
            .layout
            .as_ref()
            .map(|l| l.retarget(&producer.tensor))
            .ok_or_else(|| stale("consumer has no layout"))?
    } else {
        entry
            .selected_config()
            .map(|c| c.output_layout.clone())
            .ok_or_else(|| stale("no selected target"))?
    };

    if let Operand::Node(p) = operand {
        let node = graph.node_mut(p);
        if let OpKind::ToLayout { target: existing } = &mut node.kind {
            *existing = target.clone();
            if let Some(result) = &mut node.result {
                *result = result.with_scalar_kind(target.scalar_kind);
            }
            node.layout = Some(target);
            tracing::trace!("{edge}: updated {} in place", node.display_name());
            return Ok(false);
        }
    }

    let consumer_name = graph.node(edge.consumer).display_name();
    let id = graph.create_node(
        OpKind::ToLayout {
            target: target.clone(),
        },
        Some(format!("{consumer_name}_mem_reconfig_{}", edge.operand_index)),
        vec![operand],
        Some(producer.tensor.with_scalar_kind(target.scalar_kind)),
        Some(target),
    );
    insert_at(graph, func, id, edge.consumer, 0)?;
    owners.insert(id, func);

    graph.node_mut(edge.consumer).operands[edge.operand_index] = Operand::Node(id);
    if let Some(p) = operand.producer() {
        if let Some(set) = uses.get_mut(&p) {
            set.remove(&(edge.consumer, edge.operand_index));
            set.insert((id, 0));
        }
    }
    uses.entry(id)
        .or_default()
        .insert((edge.consumer, edge.operand_index));
    tracing::trace!("{edge}: inserted {}", graph.node(id).display_name());
    Ok(true)
}

/// Inserts a bulk conversion right after `id` and moves every other use
/// of `id` onto it.
fn materialize_spill(
    graph: &mut Graph<Validated>,
    owners: &mut BTreeMap<NodeId, usize>,
    uses: &mut UseMap,
    id: NodeId,
) -> Result<(), OptimizerError> {
    let stale = |what: &str| OptimizerError::StaleAnalysis(format!("spill of {id}: {what}"));
    let func = *owners.get(&id).ok_or_else(|| stale("node not in any function"))?;
    let node = graph.node(id);
    let (Some(result), Some(layout)) = (node.result.clone(), node.layout.clone()) else {
        return Err(stale("node has no type or layout"));
    };
    let target = layout.to_bulk_interleaved(&result.shape);
    let name = format!("{}_spill", node.display_name());

    let spill = graph.create_node(
        OpKind::ToLayout {
            target: target.clone(),
        },
        Some(name),
        vec![Operand::Node(id)],
        Some(result),
        Some(target),
    );
    insert_at(graph, func, spill, id, 1)?;
    owners.insert(spill, func);

    let redirected = uses.remove(&id).unwrap_or_default();
    for &(user, index) in &redirected {
        graph.node_mut(user).operands[index] = Operand::Node(spill);
    }
    tracing::trace!(
        "spilled {} through {} ({} uses redirected)",
        graph.node(id).display_name(),
        graph.node(spill).display_name(),
        redirected.len()
    );
    uses.insert(spill, redirected);
    uses.insert(id, BTreeSet::from([(spill, 0)]));
    Ok(())
}

/// Inserts `id` into the body of `func` at `anchor`'s position plus
/// `offset`.
fn insert_at(
    graph: &mut Graph<Validated>,
    func: usize,
    id: NodeId,
    anchor: NodeId,
    offset: usize,
) -> Result<(), OptimizerError> {
    let pos = graph
        .functions()
        .get(func)
        .and_then(|f| f.position(anchor))
        .ok_or_else(|| OptimizerError::StaleAnalysis(format!("{anchor} is not in function {func}")))?;
    graph.function_mut(func).body.insert(pos + offset, id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{GraphLoader, UnaryOp};
    use layout_core::{GridShape, PageMode, TensorType};
    use layout_planner::MemoryPlan;

    /// `%arg0 → relu_0 → relu_1 → return`, each relu with its own buffer.
    fn chain() -> Graph<Validated> {
        GraphLoader::from_json(
            r#"{
            "name": "chain",
            "functions": [{
                "name": "forward",
                "args": [{ "shape": [64, 64], "dtype": "bf16" }],
                "nodes": [
                    { "name": "buf_0", "op": "empty", "shape": [64, 64], "dtype": "bf16" },
                    { "name": "buf_1", "op": "empty", "shape": [64, 64], "dtype": "bf16" },
                    { "name": "relu_0", "op": "relu", "operands": ["%arg0", "buf_0"],
                      "shape": [64, 64], "dtype": "bf16" },
                    { "name": "relu_1", "op": "relu", "operands": ["relu_0", "buf_1"],
                      "shape": [64, 64], "dtype": "bf16" },
                    { "op": "return", "operands": ["relu_1"] }
                ]
            }]
        }"#,
        )
        .unwrap()
    }

    fn tt() -> TensorType {
        TensorType::new(vec![64, 64], layout_core::ScalarKind::Bf16)
    }

    fn scratch() -> Layout {
        Layout::on_chip_interleaved(&tt(), PageMode::Tiled, GridShape::new(2, 2))
    }

    fn bulk() -> Layout {
        Layout::bulk_interleaved(&tt(), PageMode::Tiled)
    }

    fn ids(g: &Graph<Validated>) -> (NodeId, NodeId) {
        (g.find_by_loc("relu_0").unwrap(), g.find_by_loc("relu_1").unwrap())
    }

    fn locs(g: &Graph<Validated>) -> Vec<String> {
        g.function(0).body.iter().map(|id| g.node(*id).display_name()).collect()
    }

    fn output(schedule: Vec<NodeId>) -> SchedulerOutput {
        SchedulerOutput {
            candidates: BTreeMap::new(),
            schedules: BTreeMap::from([(0, schedule)]),
            reconfigs: BTreeMap::new(),
            spills: BTreeSet::new(),
            plan: Some(MemoryPlan::new("test", 1024)),
        }
    }

    #[test]
    fn test_reorder_moves_buffers_next_to_consumers() {
        let mut g = chain();
        let (r0, r1) = ids(&g);
        let chosen = BTreeMap::from([(r0, OpConfig::new(bulk())), (r1, OpConfig::new(bulk()))]);
        let stats = GraphRewriter::new(true)
            .rewrite(&mut g, &chosen, &output(vec![r0, r1]))
            .unwrap();
        assert_eq!(stats.functions_reordered, 1);
        assert_eq!(locs(&g), ["buf_0", "relu_0", "buf_1", "relu_1", "%4"]);
    }

    #[test]
    fn test_retype_updates_buffer_allocation() {
        let mut g = chain();
        let (r0, r1) = ids(&g);
        let chosen = BTreeMap::from([(r0, OpConfig::new(scratch())), (r1, OpConfig::new(bulk()))]);
        let stats = GraphRewriter::new(true)
            .rewrite(&mut g, &chosen, &SchedulerOutput::unscheduled(&BTreeMap::new(), &BTreeSet::new()))
            .unwrap();
        assert_eq!(stats.nodes_retyped, 2);
        assert_eq!(g.node(r0).layout, Some(scratch()));
        let buf = g.node(g.find_by_loc("buf_0").unwrap());
        assert_eq!(buf.layout, Some(scratch()));
        match &buf.kind {
            OpKind::Empty { alloc } => assert_eq!(*alloc, BufferAlloc::from_layout(&scratch())),
            other => panic!("unexpected kind {other}"),
        }
        assert_eq!(g.function(0).result_types[0].layout, Some(bulk()));
    }

    #[test]
    fn test_selected_reconfig_inserted_before_consumer() {
        let mut g = chain();
        let (r0, r1) = ids(&g);
        let chosen = BTreeMap::from([(r0, OpConfig::new(scratch())), (r1, OpConfig::new(scratch()))]);
        let edge = Edge {
            producer: Some(r0),
            consumer: r1,
            operand_index: 0,
        };
        let mut out = output(vec![r0, r1]);
        out.reconfigs
            .insert(edge, MemReconfigEntry::selected(0, vec![OpConfig::new(bulk())], 0));

        let stats = GraphRewriter::new(true).rewrite(&mut g, &chosen, &out).unwrap();
        assert_eq!(stats.reconfigs_inserted, 1);
        let conv = g.find_by_loc("relu_1_mem_reconfig_0").unwrap();
        assert_eq!(g.node(conv).operands, vec![Operand::Node(r0)]);
        assert_eq!(g.node(conv).layout, Some(bulk()));
        assert_eq!(g.node(r1).operands[0], Operand::Node(conv));
        let body = locs(&g);
        let at = |name: &str| body.iter().position(|l| l == name).unwrap();
        assert_eq!(at("relu_1_mem_reconfig_0") + 1, at("relu_1"));
        assert!(at("relu_0") < at("relu_1_mem_reconfig_0"));
    }

    #[test]
    fn test_disabled_reconfig_leaves_edges_alone() {
        let mut g = chain();
        let (r0, r1) = ids(&g);
        let chosen = BTreeMap::from([(r0, OpConfig::new(scratch())), (r1, OpConfig::new(scratch()))]);
        let mut out = output(vec![r0, r1]);
        out.reconfigs.insert(
            Edge {
                producer: Some(r0),
                consumer: r1,
                operand_index: 0,
            },
            MemReconfigEntry::overridden(),
        );
        let before = g.nodes().len();
        let stats = GraphRewriter::new(false).rewrite(&mut g, &chosen, &out).unwrap();
        assert_eq!(stats.reconfigs_inserted, 0);
        assert_eq!(g.nodes().len(), before);
    }

    #[test]
    fn test_overridden_reconfig_targets_consumer_layout() {
        let mut g = chain();
        let (r0, r1) = ids(&g);
        let chosen = BTreeMap::from([(r0, OpConfig::new(bulk())), (r1, OpConfig::new(scratch()))]);
        let mut out = output(vec![r0, r1]);
        out.reconfigs.insert(
            Edge {
                producer: None,
                consumer: r0,
                operand_index: 0,
            },
            MemReconfigEntry::overridden(),
        );
        GraphRewriter::new(true).rewrite(&mut g, &chosen, &out).unwrap();
        let conv = g.find_by_loc("relu_0_mem_reconfig_0").unwrap();
        assert_eq!(g.node(conv).operands, vec![Operand::Arg(0)]);
        assert_eq!(g.node(conv).layout, Some(bulk()));
    }

    #[test]
    fn test_existing_conversion_updated_in_place() {
        let mut g = GraphLoader::from_json(
            r#"{
            "name": "conv",
            "functions": [{
                "name": "forward",
                "args": [{ "shape": [64, 64], "dtype": "bf16" }],
                "nodes": [
                    { "name": "tl", "op": "to_layout", "operands": ["%arg0"],
                      "shape": [64, 64], "dtype": "bf16",
                      "target": { "page_mode": "tiled", "placement": "bulk_interleaved",
                                  "buffer_tier": "bulk", "grid": { "rows": 1, "cols": 1 },
                                  "shard_shape": [32, 32], "scalar_kind": "bf16" } },
                    { "name": "buf", "op": "empty", "shape": [64, 64], "dtype": "bf16" },
                    { "name": "r", "op": "relu", "operands": ["tl", "buf"],
                      "shape": [64, 64], "dtype": "bf16" },
                    { "op": "return", "operands": ["r"] }
                ]
            }]
        }"#,
        )
        .unwrap();
        let tl = g.find_by_loc("tl").unwrap();
        let r = g.find_by_loc("r").unwrap();
        let chosen = BTreeMap::from([(tl, OpConfig::new(bulk())), (r, OpConfig::new(scratch()))]);
        let mut out = output(vec![tl, r]);
        out.reconfigs.insert(
            Edge {
                producer: Some(tl),
                consumer: r,
                operand_index: 0,
            },
            MemReconfigEntry::selected(0, vec![OpConfig::new(scratch())], 0),
        );
        let before = g.nodes().len();
        let stats = GraphRewriter::new(true).rewrite(&mut g, &chosen, &out).unwrap();
        assert_eq!(stats.reconfigs_in_place, 1);
        assert_eq!(g.nodes().len(), before);
        assert_eq!(g.node(tl).kind, OpKind::ToLayout { target: scratch() });
        assert_eq!(g.node(tl).layout, Some(scratch()));
    }

    #[test]
    fn test_spill_redirects_every_use() {
        let mut g = chain();
        let (r0, r1) = ids(&g);
        let chosen = BTreeMap::from([(r0, OpConfig::new(bulk())), (r1, OpConfig::new(scratch()))]);
        let mut out = output(vec![r0, r1]);
        out.spills.insert(r1);
        let stats = GraphRewriter::new(true).rewrite(&mut g, &chosen, &out).unwrap();
        assert_eq!(stats.spills_inserted, 1);

        let spill = g.find_by_loc("relu_1_spill").unwrap();
        assert_eq!(g.node(spill).operands, vec![Operand::Node(r1)]);
        assert_eq!(g.node(spill).layout, Some(scratch().to_bulk_interleaved(&tt().shape)));
        let ret = g.function(0).return_node().unwrap();
        assert_eq!(g.node(ret).operands, vec![Operand::Node(spill)]);
        let body = locs(&g);
        let at = |name: &str| body.iter().position(|l| l == name).unwrap();
        assert_eq!(at("relu_1") + 1, at("relu_1_spill"));
        assert_eq!(g.function(0).result_types[0].layout, g.node(spill).layout);
    }

    #[test]
    fn test_conv2d_config_applied() {
        let mut g = GraphLoader::from_json(
            r#"{
            "name": "conv",
            "functions": [{
                "name": "forward",
                "args": [{ "shape": [1, 1, 64, 32], "dtype": "bf16" }],
                "nodes": [
                    { "name": "conv_0", "op": "conv2d", "operands": ["%arg0"],
                      "shape": [1, 1, 64, 32], "dtype": "bf16" },
                    { "op": "return", "operands": ["conv_0"] }
                ]
            }]
        }"#,
        )
        .unwrap();
        let conv = g.find_by_loc("conv_0").unwrap();
        let t = TensorType::new(vec![1, 1, 64, 32], layout_core::ScalarKind::Bf16);
        let cfg = graph_ir::Conv2dConfig {
            act_block_h_override: Some(64),
            ..Default::default()
        };
        let chosen = BTreeMap::from([(
            conv,
            OpConfig {
                output_layout: Layout::bulk_interleaved(&t, PageMode::Tiled),
                op_specific: Some(layout_planner::OpSpecificAttr::Conv2d(cfg.clone())),
            },
        )]);
        let stats = GraphRewriter::new(true)
            .rewrite(&mut g, &chosen, &output(vec![conv]))
            .unwrap();
        assert_eq!(stats.conv2d_configured, 1);
        assert_eq!(g.node(conv).kind, OpKind::Conv2d { config: Some(cfg) });
    }

    #[test]
    fn test_unary_kind_untouched_by_conv2d_step() {
        let mut g = chain();
        let (r0, _) = ids(&g);
        let chosen = BTreeMap::from([(r0, OpConfig::new(bulk()))]);
        GraphRewriter::new(true)
            .rewrite(&mut g, &chosen, &output(vec![r0]))
            .unwrap();
        assert_eq!(g.node(r0).kind, OpKind::Unary(UnaryOp::Relu));
    }
}
