// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The optimization pass with a type-state pipeline.
//!
//! ```text
//! LayoutOptimizer<Configured>
//!     │  .analyze(&graph)      overrides checked, candidates, schedule
//!     ▼
//! LayoutOptimizer<Analyzed>
//!     │  .rewrite(&mut graph)
//!     ▼
//!   OptimizationReport
//! ```
//!
//! Analysis only reads the graph, so every configuration error surfaces
//! before anything is mutated.

use crate::observer::{OptimizerObserver, TracingObserver};
use crate::{GraphRewriter, OptimizationReport, OptimizerConfig, OptimizerError};
use graph_ir::{graph::Validated, Conv2dConfig, Graph, NodeId, OpKind};
use layout_core::{HardwareDesc, ScalarKind, TensorType};
use layout_planner::{
    CandidateSet, ConfigSelector, Edge, LayoutSpaceEnumerator, MemoryScheduler, OpConfig,
    PerOpLegalizer, ScalarTypeCollector, ScalarTypes, SchedulerOutput,
};
use std::collections::{BTreeMap, BTreeSet};

// ── Type-state markers ─────────────────────────────────────────────

/// Configured, nothing analyzed yet.
#[derive(Debug)]
pub struct Configured;

/// Analysis finished; holds everything the rewriter needs.
#[derive(Debug)]
pub struct Analyzed {
    analysis: Analysis,
}

/// Sealed trait for optimizer states.
pub trait OptimizerState: std::fmt::Debug {}
impl OptimizerState for Configured {}
impl OptimizerState for Analyzed {}

// ── Analysis ───────────────────────────────────────────────────────

/// Everything computed from the graph before it is rewritten.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub graph_name: String,
    /// Arena size of the analyzed graph.
    pub node_count: usize,
    pub types: ScalarTypes,
    /// Distinct tensor types in the layout space.
    pub tensor_types: usize,
    /// Legal candidates per node, before scheduling narrowed them.
    pub legal: CandidateSet,
    pub output: SchedulerOutput,
    /// The selected configuration per node.
    pub chosen: BTreeMap<NodeId, OpConfig>,
    pub warnings: Vec<String>,
}

/// Overrides resolved against the graph.
#[derive(Debug, Default)]
struct ResolvedOverrides {
    forced: BTreeSet<Edge>,
    /// Nodes with a forced output layout.
    outputs: BTreeSet<NodeId>,
    scalar_kinds: BTreeMap<String, ScalarKind>,
    /// Conv2d overrides that address Conv2d nodes.
    conv2d: BTreeMap<String, Conv2dConfig>,
    warnings: Vec<String>,
}

// ── Optimizer ──────────────────────────────────────────────────────

/// The layout-and-memory optimization pass.
///
/// # Example
/// ```no_run
/// use graph_ir::GraphLoader;
/// use layout_core::{GridShape, HardwareDesc};
/// use optimizer::{LayoutOptimizer, OptimizerConfig};
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut graph = GraphLoader::load(Path::new("model.json"))?;
/// let hw = HardwareDesc::new(GridShape::new(8, 8), 1464 * 1024);
/// let config = OptimizerConfig {
///     memory_layout_analysis_enabled: true,
///     ..Default::default()
/// };
/// let report = LayoutOptimizer::new(config, hw)
///     .analyze(&graph)?
///     .rewrite(&mut graph)?;
/// println!("{}", report.summary());
/// # Ok(())
/// # }
/// ```
pub struct LayoutOptimizer<S: OptimizerState = Configured> {
    config: OptimizerConfig,
    hw: HardwareDesc,
    observer: Box<dyn OptimizerObserver>,
    state: S,
}

impl<S: OptimizerState> LayoutOptimizer<S> {
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn hardware(&self) -> &HardwareDesc {
        &self.hw
    }
}

// ── Configured → Analyzed ──────────────────────────────────────────

impl LayoutOptimizer<Configured> {
    pub fn new(config: OptimizerConfig, hw: HardwareDesc) -> Self {
        tracing::info!(
            "optimizer created: analysis {}, policy '{}', {} B/core on {}",
            if config.memory_layout_analysis_enabled { "on" } else { "off" },
            config.memory_layout_analysis_policy,
            hw.usable_scratch_bytes(),
            hw.worker_grid
        );
        Self {
            config,
            hw,
            observer: Box::new(TracingObserver),
            state: Configured,
        }
    }

    /// Replaces the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: impl OptimizerObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Runs every analysis on `graph` without modifying it.
    ///
    /// Steps:
    /// 1. Check the configuration and resolve the overrides.
    /// 2. Collect scalar kinds and enumerate the layout space.
    /// 3. Legalize every node.
    /// 4. Schedule (when enabled) and select one configuration per node.
    pub fn analyze(
        mut self,
        graph: &Graph<Validated>,
    ) -> Result<LayoutOptimizer<Analyzed>, OptimizerError> {
        self.config.validate()?;
        self.hw.validate()?;
        let policy = self.config.create_policy()?;
        let mut resolved = resolve_overrides(&self.config, graph)?;

        let types = ScalarTypeCollector::collect(graph, &resolved.scalar_kinds);
        let tensors: BTreeSet<TensorType> = types
            .per_node
            .keys()
            .filter(|&&id| !matches!(graph.node(id).kind, OpKind::Empty { .. }))
            .filter_map(|&id| types.effective_type(graph, id))
            .collect();
        let space = LayoutSpaceEnumerator::new(&self.hw, self.config.row_major_enabled)
            .build(&tensors)?;
        self.observer.on_layouts_enumerated(&space);

        let legal = PerOpLegalizer::new(
            &self.hw,
            self.config.max_legal_layouts,
            &self.config.override_output_layout,
            &resolved.conv2d,
        )
        .legalize(graph, &space, &types)?;
        self.observer.on_legalized(graph, &legal);

        let pinned: BTreeSet<NodeId> = resolved
            .outputs
            .iter()
            .copied()
            .filter(|id| legal.contains_key(id))
            .collect();
        let mut forced = BTreeSet::new();
        for edge in std::mem::take(&mut resolved.forced) {
            if legal.contains_key(&edge.consumer) {
                forced.insert(edge);
            } else {
                resolved.warnings.push(format!(
                    "override_input_layout: '{}' is not optimized; skipped",
                    graph.node(edge.consumer).display_name()
                ));
            }
        }

        let output = if self.config.memory_layout_analysis_enabled {
            MemoryScheduler::for_hardware(policy, &self.hw).schedule(graph, &legal, &pinned, &forced)?
        } else {
            tracing::info!("memory layout analysis disabled; using first legal candidates");
            SchedulerOutput::unscheduled(&legal, &forced)
        };
        self.observer.on_scheduled(&output);

        let chosen = ConfigSelector::select(graph, &output.candidates)?;
        for w in &resolved.warnings {
            self.observer.on_warning(w);
        }
        tracing::info!(
            "analysis: {} tensor types, {} nodes, {} reconfigurations, {} spills",
            space.len(),
            chosen.len(),
            output.reconfigs.len(),
            output.spills.len()
        );

        let analysis = Analysis {
            graph_name: graph.name.clone(),
            node_count: graph.nodes().len(),
            types,
            tensor_types: space.len(),
            legal,
            output,
            chosen,
            warnings: resolved.warnings,
        };
        Ok(LayoutOptimizer {
            config: self.config,
            hw: self.hw,
            observer: self.observer,
            state: Analyzed { analysis },
        })
    }
}

// ── Analyzed → report ──────────────────────────────────────────────

impl LayoutOptimizer<Analyzed> {
    pub fn analysis(&self) -> &Analysis {
        &self.state.analysis
    }

    /// Rewrites the graph the analysis was computed on.
    pub fn rewrite(
        mut self,
        graph: &mut Graph<Validated>,
    ) -> Result<OptimizationReport, OptimizerError> {
        let analysis = &self.state.analysis;
        if graph.name != analysis.graph_name || graph.nodes().len() != analysis.node_count {
            return Err(OptimizerError::StaleAnalysis(format!(
                "analyzed '{}' with {} nodes, got '{}' with {}",
                analysis.graph_name,
                analysis.node_count,
                graph.name,
                graph.nodes().len()
            )));
        }

        let stats = GraphRewriter::new(self.config.mem_reconfig_enabled).rewrite(
            graph,
            &analysis.chosen,
            &analysis.output,
        )?;
        self.observer.on_rewritten(graph);

        let plan = analysis.output.plan.as_ref();
        let report = OptimizationReport {
            graph_name: graph.name.clone(),
            policy: plan.map(|p| p.policy_name.clone()),
            nodes_before: analysis.node_count,
            nodes_after: graph.nodes().len(),
            tensor_types: analysis.tensor_types,
            legal_candidates: analysis
                .legal
                .iter()
                .map(|(id, c)| (graph.node(*id).display_name(), c.len()))
                .collect(),
            reconfigs_flagged: analysis.output.reconfigs.len(),
            rewrite: stats,
            spilled: analysis
                .output
                .spills
                .iter()
                .map(|id| graph.node(*id).display_name())
                .collect(),
            peak_scratch_bytes: plan.map_or(0, |p| p.peak_bytes()),
            budget_bytes: plan.map_or(self.hw.usable_scratch_bytes(), |p| p.budget_bytes),
            evictions: plan.map_or(0, |p| p.total_evictions()),
            warnings: analysis.warnings.clone(),
        };
        tracing::info!("{}", report.summary());
        Ok(report)
    }
}

/// Analyzes and rewrites `graph` in one call.
pub fn optimize(
    graph: &mut Graph<Validated>,
    config: OptimizerConfig,
    hw: HardwareDesc,
) -> Result<OptimizationReport, OptimizerError> {
    LayoutOptimizer::new(config, hw).analyze(graph)?.rewrite(graph)
}

// ── Override resolution ────────────────────────────────────────────

fn locate(
    graph: &Graph<Validated>,
    option: &'static str,
    loc: &str,
) -> Result<NodeId, OptimizerError> {
    graph
        .find_by_loc(loc)
        .ok_or_else(|| OptimizerError::UnknownLocation {
            option,
            loc: loc.to_string(),
        })
}

fn resolve_overrides(
    config: &OptimizerConfig,
    graph: &Graph<Validated>,
) -> Result<ResolvedOverrides, OptimizerError> {
    let mut out = ResolvedOverrides::default();

    for (loc, indices) in &config.override_input_layout {
        let id = locate(graph, "override_input_layout", loc)?;
        let node = graph.node(id);
        if matches!(node.kind, OpKind::ToLayout { .. }) {
            out.warnings.push(format!(
                "override_input_layout: '{loc}' is a to_layout node; skipped"
            ));
            continue;
        }
        // The trailing output buffer is never converted.
        let num_data = node.num_data_operands();
        for &index in indices {
            let operand = node.operands[..num_data]
                .get(index)
                .ok_or_else(|| OptimizerError::OperandOutOfRange {
                    loc: loc.clone(),
                    index,
                    num_operands: num_data,
                })?;
            out.forced.insert(Edge {
                producer: operand.producer(),
                consumer: id,
                operand_index: index,
            });
        }
    }

    for (loc, ovr) in &config.override_output_layout {
        let id = locate(graph, "override_output_layout", loc)?;
        out.outputs.insert(id);
        if let Some(kind) = ovr.scalar_kind {
            out.scalar_kinds.insert(loc.clone(), kind);
        }
    }

    for (loc, conv) in &config.override_conv2d_config {
        let id = locate(graph, "override_conv2d_config", loc)?;
        match &graph.node(id).kind {
            OpKind::Conv2d { .. } => {
                out.conv2d.insert(loc.clone(), conv.clone());
            }
            other => out.warnings.push(format!(
                "override_conv2d_config: '{loc}' is a {other} node, not conv2d; skipped"
            )),
        }
    }

    tracing::debug!(
        "overrides: {} forced edges, {} forced outputs, {} conv2d",
        out.forced.len(),
        out.outputs.len(),
        out.conv2d.len()
    );
    Ok(out)
}
