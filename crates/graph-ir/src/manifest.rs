// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON graph manifest.
//!
//! The manifest is the on-disk form of a [`crate::Graph`]. Node names double
//! as location names; operands refer to earlier nodes by name or to function
//! arguments as `"%argN"`. A name starting with `%` is a reference alias only
//! and does not become a location.
//!
//! # Format
//! ```json
//! {
//!   "name": "mlp",
//!   "functions": [
//!     {
//!       "name": "forward",
//!       "args": [{ "shape": [64, 64], "dtype": "bf16" }],
//!       "nodes": [
//!         { "name": "empty_0", "op": "empty", "shape": [64, 64], "dtype": "bf16" },
//!         { "name": "relu_0", "op": "relu", "operands": ["%arg0", "empty_0"],
//!           "shape": [64, 64], "dtype": "bf16" },
//!         { "op": "return", "operands": ["relu_0"] }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::{Conv2dConfig, GraphError, MemoryConfig};
use layout_core::{Layout, PageMode};
use std::path::Path;

/// Top-level graph manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphManifest {
    pub name: String,
    pub functions: Vec<ManifestFunction>,
}

/// One function entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestFunction {
    pub name: String,
    #[serde(default)]
    pub const_eval: bool,
    #[serde(default)]
    pub args: Vec<ManifestValue>,
    pub nodes: Vec<ManifestNode>,
}

/// A function argument.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestValue {
    pub shape: Vec<usize>,
    pub dtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
}

/// One node entry. Kind-specific attributes are optional fields.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ManifestNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    /// `empty`: page mode of the allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_mode: Option<PageMode>,
    /// `empty`: memory descriptor of the allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_config: Option<MemoryConfig>,
    /// `to_layout`: conversion target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Layout>,
    /// `conv2d`: tuning parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv2d_config: Option<Conv2dConfig>,
    /// `softmax`: reduction dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<i32>,
}

impl GraphManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Serializes the manifest as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total node count over all functions.
    pub fn num_nodes(&self) -> usize {
        self.functions.iter().map(|f| f.nodes.len()).sum()
    }
}

/// Parses `"%argN"` into `N`.
pub(crate) fn parse_arg_ref(s: &str) -> Option<usize> {
    s.strip_prefix("%arg")?.parse().ok()
}
