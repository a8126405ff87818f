// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! First-fit admission shared by every policy.
//!
//! Nodes are visited in the policy's order. Each one takes the first
//! admissible scratch candidate that fits the remaining budget. A
//! candidate's footprint is its own output plus every scratch conversion
//! its operands need under it, since those are live while it runs. When
//! none fits, live tensors are evicted to bulk memory until one does:
//!
//! ```text
//! victims = live operands of the node   (most recent first)
//!         ++ every other live tensor    (oldest first)
//! ```
//!
//! Only the shortest prefix that makes room is evicted, and only tensors
//! no scheduled consumer has read yet are victims. If evicting all of them
//! is still not enough, the node itself goes to bulk memory. Forced
//! layouts are never evicted, and a forced scratch layout that cannot be
//! placed is an error.

use super::{Dependencies, PolicyInput};
use crate::reconfig::{required_layout, Edge};
use crate::{FunctionPlan, OpConfig, PlannerError};
use graph_ir::{Node, NodeId, Operand};
use layout_core::{Layout, Shape, TensorType};
use scratch_memory::LiveSet;
use std::collections::{BTreeMap, BTreeSet};

/// What a policy allows the engine to do.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FitRules {
    /// Scratch layouts the policy may choose.
    pub admit: fn(&Layout) -> bool,
    /// Continue a sharded chain with the producer's exact layout.
    pub reuse_chain: bool,
}

/// A data operand as the node will read it.
#[derive(Debug)]
struct OperandView {
    index: usize,
    producer: Option<NodeId>,
    /// Current layout; `None` for arguments without one.
    layout: Option<Layout>,
    /// Layout the producer takes if it is evicted.
    evicted: Option<Layout>,
    tensor: TensorType,
}

/// Runs first-fit admission over `order`.
pub(crate) fn schedule(
    policy: &str,
    input: &PolicyInput<'_>,
    deps: &Dependencies,
    order: Vec<NodeId>,
    rules: FitRules,
) -> Result<FunctionPlan, PlannerError> {
    let graph = input.graph;
    let mut live: LiveSet<NodeId> = LiveSet::new(input.budget);
    let mut chosen: BTreeMap<NodeId, OpConfig> = BTreeMap::new();
    let mut spills = BTreeSet::new();
    let mut trace = Vec::with_capacity(order.len());
    let mut remaining: BTreeMap<NodeId, usize> = deps
        .consumers
        .iter()
        .map(|(id, c)| (*id, c.len()))
        .collect();

    for &id in &order {
        let node = graph.node(id);
        let (configs, shape) = match (input.candidates.get(&id), &node.result) {
            (Some(c), Some(t)) if !c.is_empty() => (c, &t.shape),
            _ => {
                return Err(PlannerError::NoCandidates {
                    node: node.display_name(),
                    detail: "scheduled without candidates".into(),
                })
            }
        };
        let pinned = input.pinned.contains(&id);
        let operands = operand_views(input, node, &chosen);
        let need = |cfg: &OpConfig, evicted: &[NodeId]| {
            cfg.output_layout.scratch_bytes_per_core(shape)
                + conversion_bytes(input, node, &cfg.output_layout, &operands, evicted)
        };

        let preferred: Vec<&OpConfig> = preferred_candidates(input, id, &chosen, &spills, rules, pinned)
            .into_iter()
            .map(|i| &configs[i])
            .collect();
        let first_fit = preferred.iter().find(|c| live.fits(need(c, &[]))).map(|c| (*c).clone());

        let (config, evicted) = match first_fit {
            Some(cfg) => (cfg, Vec::new()),
            None => {
                let data: Vec<NodeId> = node.operands[..node.num_data_operands()]
                    .iter()
                    .filter_map(|o| o.producer())
                    .collect();
                let untouched = |k: &NodeId| {
                    remaining
                        .get(k)
                        .map_or(true, |&left| left == deps.consumers_of(*k).len())
                };
                let victims = eviction_order(&live, &data, input.pinned, untouched);
                let all_freed: usize = victims.iter().filter_map(|&v| live.bytes_of(v)).sum();

                let room = room_after_eviction(&live, &victims, |evicted, budget| {
                    preferred
                        .iter()
                        .find(|c| need(c, evicted) <= budget)
                        .map(|c| (*c).clone())
                });
                let (count, cfg) = match room {
                    Some(found) => found,
                    None if pinned && !preferred.is_empty() => {
                        return Err(PlannerError::CapacityExceeded {
                            node: node.display_name(),
                            required_bytes: preferred.iter().map(|c| need(c, &victims)).min().unwrap_or(0),
                            available_bytes: live.available() + all_freed,
                        });
                    }
                    None => {
                        if !preferred.is_empty() {
                            tracing::debug!("[{policy}] {} spilled to bulk memory", node.display_name());
                            spills.insert(id);
                        }
                        let bulk = bulk_config(configs, shape).ok_or_else(|| PlannerError::NoCandidates {
                            node: node.display_name(),
                            detail: "no bulk fallback".into(),
                        })?;
                        room_after_eviction(&live, &victims, |evicted, budget| {
                            (need(&bulk, evicted) <= budget).then(|| bulk.clone())
                        })
                        .ok_or_else(|| PlannerError::CapacityExceeded {
                            node: node.display_name(),
                            required_bytes: need(&bulk, &victims),
                            available_bytes: live.available() + all_freed,
                        })?
                    }
                };

                for &v in &victims[..count] {
                    live.evict(v)?;
                    spills.insert(v);
                    if let (Some(vcfg), Some(vc), Some(vt)) = (
                        chosen.get_mut(&v),
                        input.candidates.get(&v),
                        &graph.node(v).result,
                    ) {
                        if let Some(bulk) = bulk_config(vc, &vt.shape) {
                            *vcfg = bulk;
                        }
                    }
                    tracing::debug!(
                        "[{policy}] evicted {} to make room for {}",
                        graph.node(v).display_name(),
                        node.display_name()
                    );
                }
                (cfg, victims[..count].to_vec())
            }
        };

        let bytes = config.output_layout.scratch_bytes_per_core(shape);
        let transient = conversion_bytes(input, node, &config.output_layout, &operands, &evicted);
        tracing::trace!(
            "[{policy}] {}: {} ({bytes} B/core, {transient} B/core of conversions)",
            node.display_name(),
            config
        );
        live.try_admit(id, bytes)?;
        chosen.insert(id, config);
        trace.push(live.occupancy() + transient);

        if deps.consumers_of(id).is_empty() && !deps.returned.contains(&id) {
            live.release(id)?;
        }
        for &p in deps.producers_of(id) {
            let Some(left) = remaining.get_mut(&p) else { continue };
            *left -= 1;
            if *left == 0 && !deps.returned.contains(&p) && live.contains(p) {
                live.release(p)?;
            }
        }
    }

    tracing::debug!(
        "[{policy}] function {}: {} nodes, {} spills, peak {} B/core",
        input.func,
        order.len(),
        spills.len(),
        trace.iter().copied().max().unwrap_or(0)
    );
    Ok(FunctionPlan {
        func: input.func,
        schedule: order,
        chosen,
        spills,
        occupancy_trace: trace,
        stats: live.stats().clone(),
    })
}

/// Indices of the scratch candidates the node may take, best first.
fn preferred_candidates(
    input: &PolicyInput<'_>,
    id: NodeId,
    chosen: &BTreeMap<NodeId, OpConfig>,
    spills: &BTreeSet<NodeId>,
    rules: FitRules,
    pinned: bool,
) -> Vec<usize> {
    let node = input.graph.node(id);
    let Some(configs) = input.candidates.get(&id) else {
        return Vec::new();
    };
    let mut out = Vec::new();

    if rules.reuse_chain && node.kind.is_elementwise() {
        let continued = node.operands[..node.num_data_operands()]
            .iter()
            .filter_map(|&o| match o {
                Operand::Node(p) if !spills.contains(&p) => chosen.get(&p),
                _ => None,
            })
            .find(|cfg| cfg.output_layout.is_sharded());
        if let (Some(prev), Some(first), Some(result)) = (continued, configs.first(), &node.result) {
            let tensor = result.with_scalar_kind(first.output_layout.scalar_kind);
            let want = prev.output_layout.retarget(&tensor);
            if let Some(i) = configs.iter().position(|c| c.output_layout == want) {
                out.push(i);
            }
        }
    }

    for (i, cfg) in configs.iter().enumerate() {
        let layout = &cfg.output_layout;
        if layout.is_scratch() && (pinned || (rules.admit)(layout)) && !out.contains(&i) {
            out.push(i);
        }
    }
    out
}

/// The data operands of `node` with the layouts chosen so far.
fn operand_views(
    input: &PolicyInput<'_>,
    node: &Node,
    chosen: &BTreeMap<NodeId, OpConfig>,
) -> Vec<OperandView> {
    node.operands[..node.num_data_operands()]
        .iter()
        .enumerate()
        .filter_map(|(index, &operand)| {
            let (layout, evicted, tensor) = match operand {
                Operand::Node(p) => {
                    let tensor = input.graph.node(p).result.clone()?;
                    let evicted = input
                        .candidates
                        .get(&p)
                        .and_then(|c| bulk_config(c, &tensor.shape))
                        .map(|c| c.output_layout);
                    (chosen.get(&p).map(|c| c.output_layout.clone()), evicted, tensor)
                }
                Operand::Arg(_) => {
                    let value = input.graph.operand_type(input.func, operand)?;
                    (value.layout, None, value.tensor)
                }
            };
            Some(OperandView {
                index,
                producer: operand.producer(),
                layout,
                evicted,
                tensor,
            })
        })
        .collect()
}

/// Per-core scratch bytes of the conversions `node` needs when it produces
/// `out` and the producers in `evicted` have moved to bulk memory.
fn conversion_bytes(
    input: &PolicyInput<'_>,
    node: &Node,
    out: &Layout,
    operands: &[OperandView],
    evicted: &[NodeId],
) -> usize {
    operands
        .iter()
        .filter_map(|op| {
            let edge = Edge {
                producer: op.producer,
                consumer: node.id,
                operand_index: op.index,
            };
            let target = if input.forced.contains(&edge) {
                out.retarget(&op.tensor)
            } else {
                let layout = match (op.producer, &op.evicted) {
                    (Some(p), Some(bulk)) if evicted.contains(&p) => bulk,
                    _ => op.layout.as_ref()?,
                };
                let tensor = op.tensor.with_scalar_kind(layout.scalar_kind);
                required_layout(node, Some(out), op.index, layout, &tensor)?
            };
            target
                .is_scratch()
                .then(|| target.scratch_bytes_per_core(&op.tensor.shape))
        })
        .sum()
}

/// Live tensors in the order they are given up.
fn eviction_order(
    live: &LiveSet<NodeId>,
    operands: &[NodeId],
    pinned: &BTreeSet<NodeId>,
    untouched: impl Fn(&NodeId) -> bool,
) -> Vec<NodeId> {
    let held = |k: &NodeId| !pinned.contains(k) && live.bytes_of(*k).unwrap_or(0) > 0 && untouched(k);
    let oldest = live.oldest_first();
    let mut out: Vec<NodeId> = oldest
        .iter()
        .rev()
        .filter(|k| operands.contains(k) && held(k))
        .copied()
        .collect();
    out.extend(oldest.iter().filter(|k| !operands.contains(k) && held(k)).copied());
    out
}

/// Shortest prefix of `victims` after whose eviction `place` finds a
/// config, with the prefix length. `place` gets the prefix and the budget
/// it would leave.
fn room_after_eviction(
    live: &LiveSet<NodeId>,
    victims: &[NodeId],
    place: impl Fn(&[NodeId], usize) -> Option<OpConfig>,
) -> Option<(usize, OpConfig)> {
    let mut budget = live.available();
    for n in 0..=victims.len() {
        if n > 0 {
            budget += live.bytes_of(victims[n - 1]).unwrap_or(0);
        }
        if let Some(cfg) = place(&victims[..n], budget) {
            return Some((n, cfg));
        }
    }
    None
}

/// The node's first bulk candidate, or its first candidate moved to bulk.
fn bulk_config(configs: &[OpConfig], shape: &Shape) -> Option<OpConfig> {
    configs
        .iter()
        .find(|c| !c.output_layout.is_scratch())
        .cloned()
        .or_else(|| {
            configs.first().map(|first| OpConfig {
                output_layout: first.output_layout.to_bulk_interleaved(shape),
                op_specific: first.op_specific.clone(),
            })
        })
}
