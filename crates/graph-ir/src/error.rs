// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph construction and manifest loading.

/// Errors that can occur when building or loading a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestRead(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// A node is malformed (bad result type, missing output buffer, ...).
    #[error("invalid node '{node}': {detail}")]
    InvalidNode { node: String, detail: String },

    /// An operand refers to a value that is not defined before its use.
    #[error("node '{node}' uses undefined value {operand}")]
    UnknownOperand { node: String, operand: String },

    /// The graph as a whole is malformed.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}
