// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`MemoryLayoutPolicy`] trait and policy implementations.
//!
//! A policy decides two things per function: the order the scheduled nodes
//! run in, and which scratch candidates it is willing to use. Admission,
//! eviction and liveness are shared by every policy through [`first_fit`].

pub mod bf_interleaved;
pub mod df_sharding;
pub(crate) mod first_fit;
pub mod greedy_interleaved;

use crate::{CandidateSet, Edge, FunctionPlan, PlannerError};
use graph_ir::{graph::Validated, Graph, NodeId};
use scratch_memory::ScratchBudget;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Everything a policy sees when planning one function.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub graph: &'a Graph<Validated>,
    /// Index of the function being planned.
    pub func: usize,
    pub candidates: &'a CandidateSet,
    pub budget: ScratchBudget,
    /// Nodes with a user-forced output layout. They keep it and are never
    /// evicted.
    pub pinned: &'a BTreeSet<NodeId>,
    /// User-forced conversion edges. Their targets occupy scratch memory
    /// while the consumer runs.
    pub forced: &'a BTreeSet<Edge>,
}

/// Trait for memory layout policies.
///
/// Policies are purely algorithmic: they read the graph and candidates and
/// return a [`FunctionPlan`] without touching the graph.
pub trait MemoryLayoutPolicy: Send + Sync {
    /// Name used to select this policy in the configuration.
    fn name(&self) -> &str;

    /// Plans one function.
    fn plan_function(&self, input: &PolicyInput<'_>) -> Result<FunctionPlan, PlannerError>;
}

/// Data dependencies between the scheduled nodes of one function.
///
/// Only nodes with candidates take part. Output buffers, arguments and
/// the return node are left out.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    /// Scheduled nodes in program order.
    pub nodes: Vec<NodeId>,
    /// Distinct scheduled producers of each node, in operand order.
    pub producers: BTreeMap<NodeId, Vec<NodeId>>,
    /// Distinct scheduled consumers of each node, in program order.
    pub consumers: BTreeMap<NodeId, Vec<NodeId>>,
    /// Nodes returned from the function.
    pub returned: BTreeSet<NodeId>,
}

impl Dependencies {
    pub fn new(input: &PolicyInput<'_>) -> Self {
        let mut deps = Self::default();
        let Some(func) = input.graph.functions().get(input.func) else {
            return deps;
        };
        for &id in &func.body {
            if !input.candidates.contains_key(&id) {
                continue;
            }
            deps.nodes.push(id);
            deps.consumers.entry(id).or_default();
            let mut producers = Vec::new();
            for p in input.graph.node(id).operands.iter().filter_map(|o| o.producer()) {
                if input.candidates.contains_key(&p) && !producers.contains(&p) {
                    producers.push(p);
                }
            }
            for &p in &producers {
                deps.consumers.entry(p).or_default().push(id);
            }
            deps.producers.insert(id, producers);
        }
        if let Some(ret) = func.return_node() {
            deps.returned = input
                .graph
                .node(ret)
                .operands
                .iter()
                .filter_map(|o| o.producer())
                .collect();
        }
        deps
    }

    pub fn program_order(&self) -> Vec<NodeId> {
        self.nodes.clone()
    }

    /// Kahn's algorithm with a FIFO queue seeded in program order.
    pub fn breadth_first(&self) -> Vec<NodeId> {
        let mut pending = self.in_degrees();
        let mut queue: VecDeque<NodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|id| pending[id] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for c in self.consumers_of(id) {
                if let Some(n) = pending.get_mut(c) {
                    *n -= 1;
                    if *n == 0 {
                        queue.push_back(*c);
                    }
                }
            }
        }
        order
    }

    /// Depth-first topological order.
    ///
    /// After each node, a ready consumer of the most recently scheduled
    /// node with one runs next (first in program order). With none ready
    /// anywhere on the current path, the earliest ready node in program
    /// order starts a new path.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let position: BTreeMap<NodeId, usize> =
            self.nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut pending = self.in_degrees();
        let mut ready: BTreeSet<(usize, NodeId)> = self
            .nodes
            .iter()
            .filter(|id| pending[*id] == 0)
            .map(|id| (position[id], *id))
            .collect();

        let mut path: Vec<NodeId> = Vec::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        while !ready.is_empty() {
            let mut next = None;
            while let Some(&top) = path.last() {
                next = self
                    .consumers_of(top)
                    .iter()
                    .find(|c| ready.contains(&(position[*c], **c)))
                    .copied();
                if next.is_some() {
                    break;
                }
                path.pop();
            }
            let Some(id) = next.or_else(|| ready.first().map(|&(_, id)| id)) else {
                break;
            };
            ready.remove(&(position[&id], id));
            order.push(id);
            path.push(id);
            for c in self.consumers_of(id) {
                if let Some(n) = pending.get_mut(c) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert((position[c], *c));
                    }
                }
            }
        }
        order
    }

    pub(crate) fn consumers_of(&self, id: NodeId) -> &[NodeId] {
        self.consumers.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn producers_of(&self, id: NodeId) -> &[NodeId] {
        self.producers.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    fn in_degrees(&self) -> BTreeMap<NodeId, usize> {
        self.nodes
            .iter()
            .map(|id| (*id, self.producers_of(*id).len()))
            .collect()
    }
}
