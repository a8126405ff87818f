// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Trace points of the optimization pass.
//!
//! Every hook has a no-op default, so an observer only implements the
//! points it cares about. [`TracingObserver`] forwards all of them to
//! `tracing` and is what [`crate::LayoutOptimizer`] uses unless another
//! observer is injected.

use graph_ir::{graph::Validated, Graph};
use layout_planner::{CandidateSet, LayoutSpace, SchedulerOutput};

pub trait OptimizerObserver {
    /// The candidate layouts of every distinct tensor type.
    fn on_layouts_enumerated(&mut self, _space: &LayoutSpace) {}

    /// Legal candidates per node, before scheduling.
    fn on_legalized(&mut self, _graph: &Graph<Validated>, _candidates: &CandidateSet) {}

    /// Scheduling result, when the memory layout analysis ran.
    fn on_scheduled(&mut self, _output: &SchedulerOutput) {}

    /// A non-fatal problem that was skipped.
    fn on_warning(&mut self, _message: &str) {}

    /// The graph after rewriting.
    fn on_rewritten(&mut self, _graph: &Graph<Validated>) {}
}

/// Forwards every trace point to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl OptimizerObserver for TracingObserver {
    fn on_layouts_enumerated(&mut self, space: &LayoutSpace) {
        tracing::debug!("layout space: {} tensor types", space.len());
        for (tensor, layouts) in space {
            tracing::trace!("  {tensor}: {} layouts", layouts.len());
            for layout in layouts {
                tracing::trace!("    {layout}");
            }
        }
    }

    fn on_legalized(&mut self, graph: &Graph<Validated>, candidates: &CandidateSet) {
        for (id, configs) in candidates {
            tracing::trace!(
                "{}: {} legal candidates, first {}",
                graph.node(*id).display_name(),
                configs.len(),
                configs.first().map(ToString::to_string).unwrap_or_default()
            );
        }
    }

    fn on_scheduled(&mut self, output: &SchedulerOutput) {
        if let Some(plan) = &output.plan {
            tracing::debug!("{}", plan.summary());
        }
        for (edge, entry) in &output.reconfigs {
            match entry.selected_config() {
                Some(cfg) => tracing::trace!("reconfig {edge} -> {cfg}"),
                None => tracing::trace!("reconfig {edge} (overridden)"),
            }
        }
    }

    fn on_warning(&mut self, message: &str) {
        tracing::warn!("{message}");
    }

    fn on_rewritten(&mut self, graph: &Graph<Validated>) {
        tracing::debug!("rewritten: {}", graph.summary());
        tracing::trace!("{graph}");
    }
}
