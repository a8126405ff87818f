// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the optimization pass.

/// Errors that abort the optimization pass.
///
/// Every configuration error is raised before the graph is touched.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    /// The configuration could not be read or is inconsistent.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// An override names a location no node carries.
    #[error("{option}: no node with location '{loc}'")]
    UnknownLocation { option: &'static str, loc: String },

    /// An input-layout override names an operand the node does not have.
    #[error("override_input_layout: '{loc}' has {num_operands} data operands, index {index} is out of range")]
    OperandOutOfRange {
        loc: String,
        index: usize,
        num_operands: usize,
    },

    /// The memory layout policy name is not known.
    #[error("unknown memory layout policy '{0}'")]
    UnknownPolicy(String),

    /// A compact override string is malformed.
    #[error("invalid override '{input}': {detail}")]
    InvalidOverride { input: String, detail: String },

    /// The graph changed between analysis and rewriting.
    #[error("analysis does not match the graph: {0}")]
    StaleAnalysis(String),

    #[error("graph error: {0}")]
    GraphError(#[from] graph_ir::GraphError),

    #[error("planner error: {0}")]
    PlannerError(#[from] layout_planner::PlannerError),

    #[error("hardware error: {0}")]
    LayoutError(#[from] layout_core::LayoutError),

    #[error("memory error: {0}")]
    MemoryError(#[from] scratch_memory::MemoryError),
}
