// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # layout-planner
//!
//! Chooses a physical layout for every tensor of a validated graph and an
//! execution order that keeps scratch occupancy within budget.
//!
//! # Pipeline
//!
//! ```text
//! ScalarTypeCollector  effective scalar kind per value
//!   → LayoutSpaceEnumerator  candidate layouts per tensor type
//!   → PerOpLegalizer  legal candidates per node
//!   → MemoryScheduler  order, eviction, reconfigurations (optional)
//!   → ConfigSelector  one config per node
//! ```
//!
//! # Policies
//!
//! | Policy | Order | Scratch layouts |
//! |---|---|---|
//! | [`DfSharding`] | depth-first | sharded and interleaved, chains reuse layouts |
//! | [`GreedyL1Interleaved`] | program order | on-chip interleaved |
//! | [`BfInterleaved`] | breadth-first | on-chip interleaved |
//!
//! All policies implement [`MemoryLayoutPolicy`], so new ones plug into the
//! scheduler unchanged:
//!
//! ```ignore
//! struct MyPolicy;
//! impl MemoryLayoutPolicy for MyPolicy {
//!     fn name(&self) -> &str { "custom" }
//!     fn plan_function(&self, input: &PolicyInput<'_>)
//!         -> Result<FunctionPlan, PlannerError> { /* ... */ }
//! }
//! ```
//!
//! # Example
//! ```no_run
//! use graph_ir::GraphLoader;
//! use layout_core::{GridShape, HardwareDesc};
//! use layout_planner::{
//!     ConfigSelector, DfSharding, LayoutSpaceEnumerator, MemoryScheduler, PerOpLegalizer,
//!     ScalarTypeCollector,
//! };
//! use std::collections::{BTreeMap, BTreeSet};
//! use std::path::Path;
//!
//! let graph = GraphLoader::load(Path::new("model.json")).unwrap();
//! let hw = HardwareDesc::new(GridShape::new(8, 8), 1464 * 1024);
//! let types = ScalarTypeCollector::collect(&graph, &BTreeMap::new());
//! let space = LayoutSpaceEnumerator::new(&hw, false)
//!     .build(types.per_node.keys().filter_map(|&id| graph.node(id).result.as_ref()))
//!     .unwrap();
//! let candidates = PerOpLegalizer::new(&hw, 64, &BTreeMap::new(), &BTreeMap::new())
//!     .legalize(&graph, &space, &types)
//!     .unwrap();
//! let out = MemoryScheduler::for_hardware(Box::new(DfSharding::new()), &hw)
//!     .schedule(&graph, &candidates, &BTreeSet::new(), &BTreeSet::new())
//!     .unwrap();
//! let chosen = ConfigSelector::select(&graph, &out.candidates).unwrap();
//! println!("{} nodes configured", chosen.len());
//! ```

pub mod config_selector;
mod error;
pub mod layout_space;
pub mod legalizer;
pub mod op_config;
pub(crate) mod plan;
pub mod policy;
pub mod reconfig;
pub mod scalar_types;
pub mod scheduler;

#[cfg(test)]
mod test_graphs;

pub use config_selector::ConfigSelector;
pub use error::PlannerError;
pub use layout_space::{LayoutSpace, LayoutSpaceEnumerator};
pub use legalizer::PerOpLegalizer;
pub use op_config::{CandidateSet, MemoryLayoutKind, OpConfig, OpSpecificAttr, OutputLayoutOverride};
pub use plan::{FunctionPlan, MemoryPlan};
pub use policy::bf_interleaved::BfInterleaved;
pub use policy::df_sharding::DfSharding;
pub use policy::greedy_interleaved::GreedyL1Interleaved;
pub use policy::{Dependencies, MemoryLayoutPolicy, PolicyInput};
pub use reconfig::{Edge, MemReconfigEntry, ReconfigMap};
pub use scalar_types::{ScalarTypeCollector, ScalarTypes};
pub use scheduler::{MemoryScheduler, SchedulerOutput};

/// Names accepted by [`policy_by_name`], default first.
pub const POLICY_NAMES: [&str; 3] = ["df-sharding", "greedy-l1-interleaved", "bf-interleaved"];

/// Instantiates a policy from its configuration name.
pub fn policy_by_name(name: &str) -> Option<Box<dyn MemoryLayoutPolicy>> {
    let policy: Box<dyn MemoryLayoutPolicy> = match name.to_lowercase().as_str() {
        "df-sharding" | "df_sharding" => Box::new(DfSharding::new()),
        "greedy-l1-interleaved" | "greedy_l1_interleaved" => Box::new(GreedyL1Interleaved::new()),
        "bf-interleaved" | "bf_interleaved" => Box::new(BfInterleaved::new()),
        _ => return None,
    };
    tracing::debug!("selected memory layout policy '{}'", policy.name());
    Some(policy)
}
