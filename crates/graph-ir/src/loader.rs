// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph loading from, and export to, JSON manifests.
//!
//! Loading resolves operand names to arena ids, fills kind-specific
//! attributes and validates the result. Export is the inverse and is what
//! the CLI writes after optimization, so an optimized graph can be loaded
//! again.

use crate::graph::{GraphState, Validated};
use crate::manifest::{parse_arg_ref, ManifestFunction, ManifestNode, ManifestValue};
use crate::{BufferAlloc, Graph, GraphError, GraphManifest, Node, OpKind, Operand, ValueType};
use layout_core::{PageMode, ScalarKind, TensorType};
use std::collections::HashMap;
use std::path::Path;

/// Loads graphs from manifests and exports them back.
///
/// # Example
/// ```no_run
/// use graph_ir::GraphLoader;
/// use std::path::Path;
///
/// let graph = GraphLoader::load(Path::new("./graphs/mlp.json")).unwrap();
/// println!("{}", graph.summary());
/// ```
pub struct GraphLoader;

impl GraphLoader {
    /// Loads and validates a graph from a manifest file.
    pub fn load(path: &Path) -> Result<Graph<Validated>, GraphError> {
        let manifest = GraphManifest::from_file(path)?;
        Self::from_manifest(&manifest)
    }

    /// Builds and validates a graph from a parsed manifest.
    pub fn from_manifest(manifest: &GraphManifest) -> Result<Graph<Validated>, GraphError> {
        let mut graph = Graph::new(manifest.name.clone());
        for mf in &manifest.functions {
            Self::build_function(&mut graph, mf)?;
        }
        let graph = graph.validate()?;
        tracing::debug!("{}", graph.summary());
        Ok(graph)
    }

    /// Parses a manifest string, then builds the graph.
    pub fn from_json(json: &str) -> Result<Graph<Validated>, GraphError> {
        Self::from_manifest(&GraphManifest::from_json(json)?)
    }

    fn build_function(graph: &mut Graph, mf: &ManifestFunction) -> Result<(), GraphError> {
        let args = mf
            .args
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let tensor = tensor_type(&format!("{}:%arg{i}", mf.name), &a.shape, &a.dtype)?;
                Ok(ValueType {
                    tensor,
                    layout: a.layout.clone(),
                })
            })
            .collect::<Result<Vec<_>, GraphError>>()?;

        let func = graph.add_function(mf.name.clone(), args);
        graph.set_const_eval(func, mf.const_eval);

        let mut names: HashMap<&str, Operand> = HashMap::new();
        for (pos, mn) in mf.nodes.iter().enumerate() {
            let label = mn
                .name
                .clone()
                .unwrap_or_else(|| format!("{}[{pos}]", mf.name));

            let operands = mn
                .operands
                .iter()
                .map(|o| {
                    parse_arg_ref(o)
                        .map(Operand::Arg)
                        .or_else(|| names.get(o.as_str()).copied())
                        .ok_or_else(|| GraphError::UnknownOperand {
                            node: label.clone(),
                            operand: o.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let result = match (&mn.shape, &mn.dtype) {
                (Some(shape), Some(dtype)) => Some(tensor_type(&label, shape, dtype)?),
                (None, None) => None,
                _ => {
                    return Err(GraphError::InvalidNode {
                        node: label,
                        detail: "shape and dtype must be given together".into(),
                    })
                }
            };

            let kind = build_kind(&label, mn, result.as_ref())?;
            let loc = mn.name.as_deref().filter(|n| !n.starts_with('%'));
            let id = graph.append(func, kind, loc, operands, result);
            graph.set_layout(id, mn.layout.clone());

            if let Some(name) = &mn.name {
                if names.insert(name.as_str(), Operand::Node(id)).is_some() {
                    return Err(GraphError::InvalidNode {
                        node: name.clone(),
                        detail: "duplicate node name".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Exports a graph as a manifest.
    ///
    /// Nodes without a location that are referenced by another node are
    /// named by their arena id (`%7`).
    pub fn to_manifest<S: GraphState>(graph: &Graph<S>) -> GraphManifest {
        let functions = graph
            .functions()
            .iter()
            .map(|f| ManifestFunction {
                name: f.name.clone(),
                const_eval: f.const_eval,
                args: f
                    .args
                    .iter()
                    .map(|a| ManifestValue {
                        shape: a.tensor.shape.dims().to_vec(),
                        dtype: a.tensor.scalar_kind.to_string(),
                        layout: a.layout.clone(),
                    })
                    .collect(),
                nodes: f.body.iter().map(|&id| export_node(graph, graph.node(id))).collect(),
            })
            .collect();

        GraphManifest {
            name: graph.name.clone(),
            functions,
        }
    }
}

fn export_node<S: GraphState>(graph: &Graph<S>, node: &Node) -> ManifestNode {
    let referenced = node.kind.produces_tensor();
    let mut out = ManifestNode {
        name: node.loc.clone().or_else(|| referenced.then(|| node.id.to_string())),
        op: node.kind.as_str().to_string(),
        operands: node
            .operands
            .iter()
            .map(|o| match o {
                Operand::Node(p) => graph.node(*p).display_name(),
                Operand::Arg(i) => format!("%arg{i}"),
            })
            .collect(),
        shape: node.result.as_ref().map(|t| t.shape.dims().to_vec()),
        dtype: node.result.as_ref().map(|t| t.scalar_kind.to_string()),
        layout: node.layout.clone(),
        ..ManifestNode::default()
    };
    match &node.kind {
        OpKind::Empty { alloc } => {
            out.page_mode = Some(alloc.page_mode);
            out.memory_config = alloc.memory_config.clone();
        }
        OpKind::ToLayout { target } => out.target = Some(target.clone()),
        OpKind::Conv2d { config } => out.conv2d_config = config.clone(),
        OpKind::Softmax { dim } => out.dim = Some(*dim),
        _ => {}
    }
    out
}

fn tensor_type(label: &str, shape: &[usize], dtype: &str) -> Result<TensorType, GraphError> {
    let kind = ScalarKind::from_str_loose(dtype).ok_or_else(|| GraphError::InvalidNode {
        node: label.to_string(),
        detail: format!("unsupported dtype '{dtype}'"),
    })?;
    Ok(TensorType::new(shape.to_vec(), kind))
}

fn build_kind(
    label: &str,
    mn: &ManifestNode,
    result: Option<&TensorType>,
) -> Result<OpKind, GraphError> {
    let invalid = |detail: String| GraphError::InvalidNode {
        node: label.to_string(),
        detail,
    };

    if mn.op == "to_layout" {
        let target = mn
            .target
            .clone()
            .ok_or_else(|| invalid("to_layout needs a target".into()))?;
        return Ok(OpKind::ToLayout { target });
    }

    let kind = OpKind::from_str_loose(&mn.op)
        .ok_or_else(|| invalid(format!("unrecognised op '{}'", mn.op)))?;
    Ok(match kind {
        OpKind::Empty { .. } => OpKind::Empty {
            alloc: BufferAlloc {
                scalar_kind: result
                    .map(|t| t.scalar_kind)
                    .ok_or_else(|| invalid("empty needs a result type".into()))?,
                page_mode: mn.page_mode.unwrap_or(PageMode::Tiled),
                memory_config: mn.memory_config.clone(),
            },
        },
        OpKind::Conv2d { .. } => OpKind::Conv2d {
            config: mn.conv2d_config.clone(),
        },
        OpKind::Softmax { dim } => OpKind::Softmax {
            dim: mn.dim.unwrap_or(dim),
        },
        other => other,
    })
}
