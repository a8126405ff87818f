// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The dataflow graph: an arena of nodes grouped into functions.
//!
//! # Type-State Pattern
//!
//! ```text
//! Graph<Loaded>     : nodes appended, not yet checked.
//!       │  .validate()
//!       ▼
//! Graph<Validated>  : operands topologically ordered, terminators and
//!                     destination-style buffers checked, ready for the
//!                     optimizer.
//! ```
//!
//! Nodes never move inside the arena. A function's `body` lists its node ids
//! in execution order; reordering and insertion only edit that list, so a
//! [`NodeId`] stays valid for the lifetime of the graph.

use crate::{GraphError, Node, NodeId, OpKind, Operand};
use layout_core::{Layout, TensorType};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been built but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: graph has been validated and is ready for optimization.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

// ── Functions ──────────────────────────────────────────────────────

/// The type of a value crossing a function boundary.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValueType {
    pub tensor: TensorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
}

impl ValueType {
    pub fn new(tensor: TensorType) -> Self {
        Self {
            tensor,
            layout: None,
        }
    }
}

/// A function: arguments, an ordered body and a declared signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// Constant-evaluation functions are left untouched by the optimizer.
    pub const_eval: bool,
    pub args: Vec<ValueType>,
    /// Node ids in execution order; the last one is the `Return`.
    pub body: Vec<NodeId>,
    /// Declared result types.
    pub result_types: Vec<ValueType>,
}

impl Function {
    /// The terminating return node.
    pub fn return_node(&self) -> Option<NodeId> {
        self.body.last().copied()
    }

    /// Position of `id` in the body.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.body.iter().position(|&n| n == id)
    }
}

// ── Graph ──────────────────────────────────────────────────────────

/// A compilation unit: the node arena plus its functions.
#[derive(Debug, Clone)]
pub struct Graph<S: GraphState = Loaded> {
    /// Human-readable unit name.
    pub name: String,
    nodes: Vec<Node>,
    functions: Vec<Function>,
    _state: std::marker::PhantomData<S>,
}

impl<S: GraphState> Graph<S> {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, index: usize) -> &Function {
        &self.functions[index]
    }

    /// Type and layout of the value an operand of a node in function
    /// `func` refers to.
    pub fn operand_type(&self, func: usize, operand: Operand) -> Option<ValueType> {
        match operand {
            Operand::Node(id) => {
                let node = self.nodes.get(id.index())?;
                Some(ValueType {
                    tensor: node.result.clone()?,
                    layout: node.layout.clone(),
                })
            }
            Operand::Arg(i) => self.functions.get(func)?.args.get(i).cloned(),
        }
    }

    /// Finds the node carrying location name `loc`.
    pub fn find_by_loc(&self, loc: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.loc.as_deref() == Some(loc))
            .map(|n| n.id)
    }

    /// Number of tensor-producing nodes.
    pub fn num_tensor_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.result.is_some()).count()
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        let const_eval = self.functions.iter().filter(|f| f.const_eval).count();
        format!(
            "Graph '{}': {} functions ({} const-eval), {} nodes, {} tensor results",
            self.name,
            self.functions.len(),
            const_eval,
            self.nodes.len(),
            self.num_tensor_nodes(),
        )
    }
}

// ── Loaded state ───────────────────────────────────────────────────

impl Graph<Loaded> {
    /// Creates an empty graph in the `Loaded` state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            functions: Vec::new(),
            _state: std::marker::PhantomData,
        }
    }

    /// Adds a function and returns its index.
    pub fn add_function(&mut self, name: impl Into<String>, args: Vec<ValueType>) -> usize {
        self.functions.push(Function {
            name: name.into(),
            const_eval: false,
            args,
            body: Vec::new(),
            result_types: Vec::new(),
        });
        self.functions.len() - 1
    }

    /// Marks a function as constant-evaluation.
    pub fn set_const_eval(&mut self, func: usize, const_eval: bool) {
        self.functions[func].const_eval = const_eval;
    }

    /// Appends a node at the end of function `func`.
    ///
    /// Appending a `Return` also sets the declared result types from its
    /// operands.
    pub fn append(
        &mut self,
        func: usize,
        kind: OpKind,
        loc: Option<&str>,
        operands: Vec<Operand>,
        result: Option<TensorType>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let is_return = kind == OpKind::Return;
        self.nodes.push(Node {
            id,
            kind,
            loc: loc.map(str::to_string),
            operands,
            result,
            layout: None,
        });
        self.functions[func].body.push(id);
        if is_return {
            let types = self.nodes[id.index()]
                .operands
                .iter()
                .filter_map(|&o| self.operand_type(func, o))
                .collect();
            self.functions[func].result_types = types;
        }
        id
    }

    /// Sets a node's initial layout annotation.
    pub fn set_layout(&mut self, id: NodeId, layout: Option<Layout>) {
        self.nodes[id.index()].layout = layout;
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - At least one function; function names are unique.
    /// - Every body is non-empty, ends with its only `Return`, and every
    ///   node belongs to exactly one body.
    /// - Operands refer to nodes defined earlier in the same function, or
    ///   to existing arguments.
    /// - Tensor-producing nodes carry a non-degenerate result type.
    /// - Destination-style nodes end with an `Empty` buffer of their own
    ///   result shape.
    /// - Location names are unique.
    pub fn validate(self) -> Result<Graph<Validated>, GraphError> {
        if self.functions.is_empty() {
            return Err(GraphError::InvalidGraph("graph contains no functions".into()));
        }

        let mut names = HashSet::new();
        for f in &self.functions {
            if !names.insert(f.name.as_str()) {
                return Err(GraphError::InvalidGraph(format!(
                    "duplicate function name '{}'",
                    f.name
                )));
            }
        }

        let mut owner: Vec<Option<usize>> = vec![None; self.nodes.len()];
        for (fi, f) in self.functions.iter().enumerate() {
            let Some(&last) = f.body.last() else {
                return Err(GraphError::InvalidGraph(format!(
                    "function '{}' has an empty body",
                    f.name
                )));
            };
            if self.nodes[last.index()].kind != OpKind::Return {
                return Err(GraphError::InvalidGraph(format!(
                    "function '{}' does not end with a return",
                    f.name
                )));
            }

            let mut defined = HashSet::new();
            for (pos, &id) in f.body.iter().enumerate() {
                let node = &self.nodes[id.index()];
                if owner[id.index()].replace(fi).is_some() {
                    return Err(self.invalid(node, "node appears in more than one body"));
                }
                if node.kind == OpKind::Return && pos + 1 != f.body.len() {
                    return Err(self.invalid(node, "return is not the last node"));
                }
                for &operand in &node.operands {
                    match operand {
                        Operand::Node(p) if !defined.contains(&p) => {
                            return Err(GraphError::UnknownOperand {
                                node: node.display_name(),
                                operand: operand.to_string(),
                            });
                        }
                        Operand::Arg(i) if i >= f.args.len() => {
                            return Err(GraphError::UnknownOperand {
                                node: node.display_name(),
                                operand: operand.to_string(),
                            });
                        }
                        _ => {}
                    }
                }
                self.check_result(node)?;
                defined.insert(id);
            }
        }

        if let Some(orphan) = owner.iter().position(Option::is_none) {
            return Err(self.invalid(&self.nodes[orphan], "node is not part of any function"));
        }

        let mut locs = HashSet::new();
        for node in &self.nodes {
            if let Some(loc) = &node.loc {
                if !locs.insert(loc.as_str()) {
                    return Err(self.invalid(node, "duplicate location name"));
                }
            }
        }

        Ok(Graph {
            name: self.name,
            nodes: self.nodes,
            functions: self.functions,
            _state: std::marker::PhantomData,
        })
    }

    fn check_result(&self, node: &Node) -> Result<(), GraphError> {
        match (&node.kind, &node.result) {
            (OpKind::Return, Some(_)) => Err(self.invalid(node, "return produces no value")),
            (OpKind::Return, None) => Ok(()),
            (_, None) => Err(self.invalid(node, "missing result type")),
            (kind, Some(result)) => {
                if result.shape.is_degenerate() {
                    return Err(self.invalid(node, "result shape has zero elements"));
                }
                if !kind.is_destination_style() {
                    return Ok(());
                }
                let init = node
                    .dps_init()
                    .map(|id| &self.nodes[id.index()])
                    .filter(|b| matches!(b.kind, OpKind::Empty { .. }));
                match init {
                    None => Err(self.invalid(node, "destination-style op needs a trailing empty buffer")),
                    Some(b) if b.result.as_ref().map(|t| &t.shape) != Some(&result.shape) => {
                        Err(self.invalid(node, "output buffer shape differs from result shape"))
                    }
                    Some(_) => Ok(()),
                }
            }
        }
    }

    fn invalid(&self, node: &Node, detail: &str) -> GraphError {
        GraphError::InvalidNode {
            node: node.display_name(),
            detail: detail.into(),
        }
    }
}

// ── Validated state ────────────────────────────────────────────────

impl Graph<Validated> {
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn function_mut(&mut self, index: usize) -> &mut Function {
        &mut self.functions[index]
    }

    /// Returns an iterator over the functions the optimizer may rewrite.
    pub fn optimizable_functions(&self) -> impl Iterator<Item = (usize, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.const_eval)
    }

    /// Appends a node to the arena without placing it in any body.
    ///
    /// The caller inserts the returned id into a function body.
    pub fn create_node(
        &mut self,
        kind: OpKind,
        loc: Option<String>,
        operands: Vec<Operand>,
        result: Option<TensorType>,
        layout: Option<Layout>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            loc,
            operands,
            result,
            layout,
        });
        id
    }

    /// Maps each node to the function whose body holds it.
    pub fn owners(&self) -> BTreeMap<NodeId, usize> {
        self.functions
            .iter()
            .enumerate()
            .flat_map(|(fi, f)| f.body.iter().map(move |&id| (id, fi)))
            .collect()
    }

    /// Declared results as seen from the return node's operands.
    pub fn return_types(&self, func: usize) -> Vec<ValueType> {
        let f = &self.functions[func];
        f.return_node()
            .map(|ret| {
                self.node(ret)
                    .operands
                    .iter()
                    .filter_map(|&o| self.operand_type(func, o))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> fmt::Display for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph '{}':", self.name)?;
        for func in &self.functions {
            let marker = if func.const_eval { " (const-eval)" } else { "" };
            writeln!(f, "  func @{}{}:", func.name, marker)?;
            for &id in &func.body {
                writeln!(f, "    {}", self.node(id).summary())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryOp, BufferAlloc, UnaryOp};
    use layout_core::{PageMode, ScalarKind};

    fn tt(rows: usize, cols: usize) -> TensorType {
        TensorType::new(vec![rows, cols], ScalarKind::Bf16)
    }

    fn empty() -> OpKind {
        OpKind::Empty {
            alloc: BufferAlloc {
                scalar_kind: ScalarKind::Bf16,
                page_mode: PageMode::Tiled,
                memory_config: None,
            },
        }
    }

    /// Helper: `relu(arg0 + arg1)` in one function.
    fn make_graph() -> Graph<Loaded> {
        let mut g = Graph::new("test");
        let f = g.add_function("forward", vec![ValueType::new(tt(64, 64)), ValueType::new(tt(64, 64))]);
        let e0 = g.append(f, empty(), Some("empty_0"), vec![], Some(tt(64, 64)));
        let add = g.append(
            f,
            OpKind::Binary(BinaryOp::Add),
            Some("add_0"),
            vec![Operand::Arg(0), Operand::Arg(1), Operand::Node(e0)],
            Some(tt(64, 64)),
        );
        let e1 = g.append(f, empty(), Some("empty_1"), vec![], Some(tt(64, 64)));
        let relu = g.append(
            f,
            OpKind::Unary(UnaryOp::Relu),
            Some("relu_0"),
            vec![Operand::Node(add), Operand::Node(e1)],
            Some(tt(64, 64)),
        );
        g.append(f, OpKind::Return, None, vec![Operand::Node(relu)], None);
        g
    }

    #[test]
    fn test_validate_ok() {
        let g = make_graph().validate().unwrap();
        assert_eq!(g.nodes().len(), 5);
        assert_eq!(g.function(0).result_types.len(), 1);
    }

    #[test]
    fn test_validate_no_functions() {
        assert!(Graph::new("empty").validate().is_err());
    }

    #[test]
    fn test_validate_missing_return() {
        let mut g = Graph::new("t");
        let f = g.add_function("f", vec![]);
        g.append(f, empty(), None, vec![], Some(tt(32, 32)));
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_validate_forward_reference() {
        let mut g = Graph::new("t");
        let f = g.add_function("f", vec![]);
        g.append(f, OpKind::Reshape, None, vec![Operand::Node(NodeId(1))], Some(tt(32, 32)));
        g.append(f, empty(), None, vec![], Some(tt(32, 32)));
        g.append(f, OpKind::Return, None, vec![], None);
        assert!(matches!(g.validate(), Err(GraphError::UnknownOperand { .. })));
    }

    #[test]
    fn test_validate_bad_argument_index() {
        let mut g = Graph::new("t");
        let f = g.add_function("f", vec![]);
        g.append(f, OpKind::Reshape, None, vec![Operand::Arg(2)], Some(tt(32, 32)));
        g.append(f, OpKind::Return, None, vec![], None);
        assert!(matches!(g.validate(), Err(GraphError::UnknownOperand { .. })));
    }

    #[test]
    fn test_validate_dps_without_buffer() {
        let mut g = Graph::new("t");
        let f = g.add_function("f", vec![ValueType::new(tt(32, 32))]);
        g.append(f, OpKind::Unary(UnaryOp::Relu), None, vec![Operand::Arg(0)], Some(tt(32, 32)));
        g.append(f, OpKind::Return, None, vec![], None);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_loc() {
        let mut g = Graph::new("t");
        let f = g.add_function("f", vec![]);
        g.append(f, empty(), Some("x"), vec![], Some(tt(32, 32)));
        g.append(f, empty(), Some("x"), vec![], Some(tt(32, 32)));
        g.append(f, OpKind::Return, None, vec![], None);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_validate_zero_shape() {
        let mut g = Graph::new("t");
        let f = g.add_function("f", vec![]);
        g.append(f, empty(), None, vec![], Some(tt(0, 32)));
        g.append(f, OpKind::Return, None, vec![], None);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_find_by_loc() {
        let g = make_graph().validate().unwrap();
        assert_eq!(g.find_by_loc("add_0"), Some(NodeId(1)));
        assert_eq!(g.find_by_loc("missing"), None);
    }

    #[test]
    fn test_create_node_stays_out_of_bodies() {
        let mut g = make_graph().validate().unwrap();
        let id = g.create_node(OpKind::Reshape, None, vec![Operand::Arg(0)], Some(tt(64, 64)), None);
        assert_eq!(id, NodeId(5));
        assert!(!g.owners().contains_key(&id));
    }

    #[test]
    fn test_return_types_follow_operands() {
        let g = make_graph().validate().unwrap();
        let types = g.return_types(0);
        assert_eq!(types, vec![ValueType::new(tt(64, 64))]);
    }

    #[test]
    fn test_summary_and_display() {
        let g = make_graph().validate().unwrap();
        assert!(g.summary().contains("1 functions"));
        let display = format!("{g}");
        assert!(display.contains("func @forward"));
        assert!(display.contains("loc(relu_0)"));
    }
}
